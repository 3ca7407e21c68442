use anyhow::Result;
use kepco_capacity::apis::KepcoApiClient;
use kepco_capacity::error::CapacityError;
use kepco_capacity::types::AddressParams;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_PATH: &str = "/openapi/v1/dispersedGeneration.do";

fn params() -> AddressParams {
    AddressParams {
        metro_cd: "44".into(),
        city_cd: "133".into(),
        dong: "불당동".into(),
        ri: String::new(),
        jibun: String::new(),
    }
}

fn client(server: &MockServer) -> Result<KepcoApiClient> {
    Ok(KepcoApiClient::new(
        "test-key",
        &format!("{}{}", server.uri(), API_PATH),
        Duration::from_secs(5),
    )?
    .with_backoff(Duration::ZERO))
}

#[tokio::test]
async fn test_fetch_capacity_parses_records() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(API_PATH))
        .and(query_param("apiKey", "test-key"))
        .and(query_param("metroCd", "44"))
        .and(query_param("cityCd", "133"))
        .and(query_param("returnType", "json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"substNm": "천안", "mtrNo": "1", "dlNm": "불당1", "vol1": "20000", "vol2": "9000", "vol3": "3200"},
                {"substNm": "천안", "mtrNo": "2", "dlNm": "불당2", "vol1": 20000, "vol2": 0, "vol3": 4100}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let records = client(&server)?.fetch_capacity(&params()).await?;

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].dl_nm, "불당1");
    assert_eq!(records[0].min_capacity(), 3200);
    assert!(!records[1].is_connectable());
    Ok(())
}

#[tokio::test]
async fn test_http_error_status_is_reported() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(API_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = client(&server)?.fetch_capacity(&params()).await.unwrap_err();

    assert!(matches!(err, CapacityError::Api { status: Some(500), .. }));
    assert_eq!(err.message(), "한전 API HTTP 오류: 500");
    Ok(())
}

#[tokio::test]
async fn test_invalid_json_body() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(API_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = client(&server)?.fetch_capacity(&params()).await.unwrap_err();

    assert_eq!(err.message(), "한전 API 응답 JSON 파싱 실패");
    assert_eq!(err.status(), Some(200));
    Ok(())
}

#[tokio::test]
async fn test_empty_data_carries_api_message() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(API_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [],
            "resultMsg": "조회된 데이터가 없습니다"
        })))
        .mount(&server)
        .await;

    let err = client(&server)?.fetch_capacity(&params()).await.unwrap_err();

    assert!(matches!(err, CapacityError::NoData { .. }));
    assert_eq!(err.message(), "한전 API 응답에 데이터가 없습니다: 조회된 데이터가 없습니다");
    Ok(())
}

#[tokio::test]
async fn test_empty_message_falls_through_to_result_msg() -> Result<()> {
    for message in [json!(null), json!("")] {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(API_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [],
                "message": message,
                "resultMsg": "인증키 오류"
            })))
            .mount(&server)
            .await;

        let err = client(&server)?.fetch_capacity(&params()).await.unwrap_err();

        assert_eq!(err.message(), "한전 API 응답에 데이터가 없습니다: 인증키 오류");
    }
    Ok(())
}

#[tokio::test]
async fn test_malformed_records_fail_validation() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(API_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"substNm": {"x": 1}, "vol1": null, "dlNm": [1]}]
        })))
        .mount(&server)
        .await;

    let err = client(&server)?.fetch_capacity(&params()).await.unwrap_err();

    assert!(matches!(err, CapacityError::Api { status: Some(200), .. }));
    assert_eq!(err.message(), "한전 API 응답 파싱 실패 (레코드 검증 실패)");
    Ok(())
}

#[tokio::test]
async fn test_malformed_records_are_skipped_next_to_valid_ones() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(API_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"substNm": null, "dlNm": "깨짐"},
                {"substNm": "A", "subst_nm": "A", "dlNm": "불당1", "vol1": "5"}
            ]
        })))
        .mount(&server)
        .await;

    let records = client(&server)?.fetch_capacity(&params()).await?;

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].subst_nm, "A");
    assert_eq!(records[0].substation_capacity(), 5);
    Ok(())
}

#[tokio::test]
async fn test_connection_failure_after_retries() -> Result<()> {
    // Reserve a port, then free it so nothing is listening
    let port = std::net::TcpListener::bind("127.0.0.1:0")?.local_addr()?.port();
    let client = KepcoApiClient::new("test-key", &format!("http://127.0.0.1:{port}/api"), Duration::from_secs(2))?
        .with_backoff(Duration::ZERO);

    let err = client.fetch_capacity(&params()).await.unwrap_err();

    assert!(matches!(err, CapacityError::Api { status: None, .. }));
    assert!(err.message().starts_with("한전 API"));
    Ok(())
}
