use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use kepco_capacity::address::{parse_keyword_to_region, BdongTable};
use kepco_capacity::apis::KepcoApiClient;
use kepco_capacity::config::{CapacityThresholds, Settings};
use kepco_capacity::constants::{ALL, OPENAPI_SOURCE};
use kepco_capacity::logging;
use kepco_capacity::report::{format_capacity, group_by_substation, CapacitySummary, CapacityStatus};
use kepco_capacity::service::{
    region_from_keyword, CapacityLookup, LookupQuery, LookupResult, ScraperService, ONLINE_LABEL,
};
use kepco_capacity::types::{CapacityRecord, RegionInfo};
use serde_json::json;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "kepco_capacity")]
#[command(about = "KEPCO distribution line spare capacity lookup")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Engine {
    /// OpenAPI when a key and code table are configured, else the scrapers
    Auto,
    /// OpenAPI only
    Api,
    /// Browser engine fallback chain only
    Browser,
    /// KEPCO ON scraper only
    Online,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up capacity for a free-form address keyword
    Query {
        /// e.g. "충청남도 천안시 서북구 불당동"
        keyword: String,
        #[arg(long, value_enum, default_value = "auto")]
        engine: Engine,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
        /// Roll results up per substation
        #[arg(long)]
        group: bool,
    },
    /// Look up capacity for a region picked level by level
    Region {
        #[arg(long)]
        sido: String,
        /// Same as --sido for cities without a sigungu level (세종)
        #[arg(long)]
        sigungu: String,
        #[arg(long)]
        dong: Option<String>,
        #[arg(long)]
        ri: Option<String>,
        #[arg(long)]
        jibun: Option<String>,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        group: bool,
    },
    /// List regions from the legal-dong code table
    Regions {
        #[arg(long)]
        sido: Option<String>,
        #[arg(long)]
        sigungu: Option<String>,
        #[arg(long)]
        dong: Option<String>,
    },
    /// Print the browser engine fallback order
    Engines,
}

fn load_codes(settings: &Settings) -> anyhow::Result<BdongTable> {
    let Some(path) = &settings.bdong_codes_path else {
        bail!("BDONG_CODES_PATH is not set; point it at the legal-dong code JSON file");
    };
    Ok(BdongTable::load(path)?)
}

async fn query_api(settings: &Settings, keyword: &str) -> anyhow::Result<LookupResult> {
    let client = KepcoApiClient::from_settings(settings)?;
    let codes = load_codes(settings)?;
    let parsed = parse_keyword_to_region(keyword)?;
    let region = region_from_keyword(&parsed);
    let mut params = codes
        .to_kepco_params(&region)
        .with_context(|| format!("cannot resolve '{}' to OpenAPI codes", keyword))?;
    params.jibun = parsed.jibun;
    Ok(LookupResult {
        source: OPENAPI_SOURCE.to_string(),
        records: client.fetch_capacity(&params).await?,
    })
}

async fn query_keyword(settings: &Settings, keyword: &str, engine: Engine) -> anyhow::Result<LookupResult> {
    match engine {
        Engine::Auto => Ok(CapacityLookup::from_settings(settings)?
            .lookup(&LookupQuery::Keyword(keyword.to_string()))
            .await?),
        Engine::Api => query_api(settings, keyword).await,
        Engine::Browser => {
            let (engine, records) = ScraperService::from_settings(settings).fetch_with_engine(keyword).await?;
            Ok(LookupResult {
                source: engine.to_string(),
                records,
            })
        }
        Engine::Online => {
            let parsed = parse_keyword_to_region(keyword)?;
            let records = ScraperService::from_settings(settings)
                .fetch_online_region(&parsed)
                .await?;
            Ok(LookupResult {
                source: ONLINE_LABEL.to_string(),
                records,
            })
        }
    }
}

fn print_records(records: &[CapacityRecord], thresholds: &CapacityThresholds) {
    println!(
        "{:<10} {:<6} {:<12} {:>12} {:>12} {:>12}  {}",
        "변전소", "주변압기", "배전선로", "변전소(kW)", "주변압기(kW)", "배전선로(kW)", "최소 여유용량"
    );
    for r in records {
        let status = CapacityStatus::classify(r.min_capacity(), thresholds);
        println!(
            "{:<10} {:<6} {:<12} {:>12} {:>12} {:>12}  {} ({})",
            r.subst_nm,
            r.mtr_no,
            r.dl_nm,
            r.substation_capacity(),
            r.transformer_capacity(),
            r.dl_capacity(),
            format_capacity(r.min_capacity(), thresholds),
            status.label()
        );
    }
}

fn print_result(title: &str, result: &LookupResult, as_json: bool, group: bool, thresholds: &CapacityThresholds) -> anyhow::Result<()> {
    let summary = CapacitySummary::from_records(&result.records);
    if as_json {
        let mut out = json!({
            "query": title,
            "source": result.source,
            "summary": summary,
            "records": result.records,
        });
        if group {
            out["substations"] = serde_json::to_value(group_by_substation(&result.records))?;
        }
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("\n📊 {} ({}건, source: {})", title, summary.count, result.source);
    if result.records.is_empty() {
        println!("   조회 결과가 없습니다.");
        return Ok(());
    }
    println!(
        "   연계 가능: {} / 불가: {} | 최소 여유용량 min {} / median {} / max {}",
        summary.connectable,
        summary.not_connectable,
        format_capacity(summary.min_capacity_min, thresholds),
        format_capacity(summary.min_capacity_median, thresholds),
        format_capacity(summary.min_capacity_max, thresholds),
    );

    if group {
        for g in group_by_substation(&result.records) {
            println!(
                "   {} | DL {}개 (연계 가능 {}) | 최대 {} | 최소 {}",
                g.substation,
                g.dl_count,
                g.connectable,
                format_capacity(g.best_capacity, thresholds),
                format_capacity(g.worst_capacity, thresholds)
            );
        }
    } else {
        print_records(&result.records, thresholds);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load settings")?;
    let _guard = logging::init_logging(settings.debug);

    let cli = Cli::parse();
    let thresholds = settings.thresholds;

    match cli.command {
        Commands::Query {
            keyword,
            engine,
            json,
            group,
        } => {
            info!("Query '{}' with engine {:?}", keyword, engine);
            match query_keyword(&settings, &keyword, engine).await {
                Ok(result) => print_result(&keyword, &result, json, group, &thresholds)?,
                Err(e) => {
                    error!("Lookup failed: {:#}", e);
                    println!("❌ 조회 실패: {:#}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Region {
            sido,
            sigungu,
            dong,
            ri,
            jibun,
            json,
            group,
        } => {
            let mut region = RegionInfo::new(sido, sigungu);
            if let Some(dong) = dong {
                region = region.with_dong(dong);
            }
            if let Some(ri) = ri {
                region = region.with_ri(ri);
            }
            let title = region.display_name();
            let query = LookupQuery::Region {
                region,
                jibun: jibun.unwrap_or_default(),
            };
            let lookup = CapacityLookup::from_settings(&settings)?;
            match lookup.lookup(&query).await {
                Ok(result) => print_result(&title, &result, json, group, &thresholds)?,
                Err(e) => {
                    error!("Lookup failed: {}", e);
                    println!("❌ 조회 실패: {}", e.message());
                    std::process::exit(1);
                }
            }
        }
        Commands::Regions { sido, sigungu, dong } => {
            let codes = load_codes(&settings)?;
            let items = match (sido, sigungu, dong) {
                (Some(sido), Some(sigungu), Some(dong)) => codes.ri_list(&sido, &sigungu, &dong),
                (Some(sido), Some(sigungu), None) => {
                    let mut dongs = vec![ALL.to_string()];
                    dongs.extend(codes.dong_list(&sido, &sigungu));
                    dongs
                }
                (Some(sido), None, _) => codes.sigungu_list(&sido),
                (None, _, _) => codes.sido_list(),
            };
            for item in items {
                println!("{}", item);
            }
        }
        Commands::Engines => {
            let service = ScraperService::from_settings(&settings);
            for (i, name) in service.engine_order().iter().enumerate() {
                println!("{}. {}", i + 1, name);
            }
            println!(
                "retry: {} attempts, {:?} delay ({:?} on bot detection)",
                service.policy().max_attempts,
                service.policy().retry_delay,
                service.policy().bot_detection_delay
            );
        }
    }
    Ok(())
}
