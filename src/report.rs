//! Summaries and status tiers over lookup results.

use crate::config::CapacityThresholds;
use crate::types::CapacityRecord;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CapacitySummary {
    pub count: usize,
    pub connectable: usize,
    pub not_connectable: usize,
    pub min_capacity_min: i64,
    pub min_capacity_median: i64,
    pub min_capacity_max: i64,
}

impl CapacitySummary {
    /// Median is the lower middle value for even counts. All zero for no records.
    pub fn from_records(records: &[CapacityRecord]) -> Self {
        if records.is_empty() {
            return Self::default();
        }
        let mut caps: Vec<i64> = records.iter().map(CapacityRecord::min_capacity).collect();
        caps.sort_unstable();
        let connectable = records.iter().filter(|r| r.is_connectable()).count();

        Self {
            count: records.len(),
            connectable,
            not_connectable: records.len() - connectable,
            min_capacity_min: caps[0],
            min_capacity_median: caps[(caps.len() - 1) / 2],
            min_capacity_max: caps[caps.len() - 1],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacityStatus {
    /// Connectable with headroom
    Green,
    /// Connectable, watch closely
    Yellow,
    /// Connection difficult
    Orange,
    /// Not connectable
    Red,
}

impl CapacityStatus {
    pub fn classify(capacity_kw: i64, thresholds: &CapacityThresholds) -> Self {
        if capacity_kw >= thresholds.green {
            CapacityStatus::Green
        } else if capacity_kw >= thresholds.yellow {
            CapacityStatus::Yellow
        } else if capacity_kw >= thresholds.orange {
            CapacityStatus::Orange
        } else {
            CapacityStatus::Red
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CapacityStatus::Green => "여유",
            CapacityStatus::Yellow => "주의",
            CapacityStatus::Orange => "어려움",
            CapacityStatus::Red => "불가",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            CapacityStatus::Green => "🟢",
            CapacityStatus::Yellow => "🟡",
            CapacityStatus::Orange => "🟠",
            CapacityStatus::Red => "🔴",
        }
    }
}

/// `3200` -> `"3,200"`
pub fn format_kw(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if value < 0 {
        out.insert(0, '-');
    }
    out
}

/// `"🟢 3,200 kW"`
pub fn format_capacity(capacity_kw: i64, thresholds: &CapacityThresholds) -> String {
    let status = CapacityStatus::classify(capacity_kw, thresholds);
    format!("{} {} kW", status.emoji(), format_kw(capacity_kw))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubstationGroup {
    pub substation: String,
    pub dl_count: usize,
    pub connectable: usize,
    pub best_capacity: i64,
    pub worst_capacity: i64,
}

/// Per-substation rollup, best capacity first (ties by name).
pub fn group_by_substation(records: &[CapacityRecord]) -> Vec<SubstationGroup> {
    let mut groups: BTreeMap<&str, SubstationGroup> = BTreeMap::new();
    for record in records {
        let cap = record.min_capacity();
        let entry = groups
            .entry(record.subst_nm.as_str())
            .or_insert_with(|| SubstationGroup {
                substation: record.subst_nm.clone(),
                dl_count: 0,
                connectable: 0,
                best_capacity: cap,
                worst_capacity: cap,
            });
        entry.dl_count += 1;
        if record.is_connectable() {
            entry.connectable += 1;
        }
        entry.best_capacity = entry.best_capacity.max(cap);
        entry.worst_capacity = entry.worst_capacity.min(cap);
    }

    let mut result: Vec<SubstationGroup> = groups.into_values().collect();
    result.sort_by(|a, b| b.best_capacity.cmp(&a.best_capacity).then_with(|| a.substation.cmp(&b.substation)));
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(subst: &str, vol1: &str, vol2: &str, vol3: &str) -> CapacityRecord {
        CapacityRecord {
            subst_nm: subst.into(),
            vol1: vol1.into(),
            vol2: vol2.into(),
            vol3: vol3.into(),
            ..Default::default()
        }
    }

    #[test]
    fn summary_of_mixed_records() {
        let records = vec![
            record("천안", "20000", "10000", "3200"),
            record("천안", "20000", "10000", "0"),
            record("성환", "5000", "1500", "9000"),
            record("성환", "800", "900", "1000"),
        ];
        let summary = CapacitySummary::from_records(&records);
        assert_eq!(summary.count, 4);
        assert_eq!(summary.connectable, 3);
        assert_eq!(summary.not_connectable, 1);
        assert_eq!(summary.min_capacity_min, 0);
        // sorted: 0, 800, 1500, 3200 -> lower middle
        assert_eq!(summary.min_capacity_median, 800);
        assert_eq!(summary.min_capacity_max, 3200);
    }

    #[test]
    fn empty_summary_is_zero() {
        assert_eq!(CapacitySummary::from_records(&[]), CapacitySummary::default());
    }

    #[test]
    fn status_tiers() {
        let t = CapacityThresholds::default();
        assert_eq!(CapacityStatus::classify(3000, &t), CapacityStatus::Green);
        assert_eq!(CapacityStatus::classify(2999, &t), CapacityStatus::Yellow);
        assert_eq!(CapacityStatus::classify(1, &t), CapacityStatus::Orange);
        assert_eq!(CapacityStatus::classify(0, &t), CapacityStatus::Red);
        assert_eq!(format_capacity(3200, &t), "🟢 3,200 kW");
    }

    #[test]
    fn thousands_separator() {
        assert_eq!(format_kw(0), "0");
        assert_eq!(format_kw(999), "999");
        assert_eq!(format_kw(1000), "1,000");
        assert_eq!(format_kw(1234567), "1,234,567");
        assert_eq!(format_kw(-4500), "-4,500");
    }

    #[test]
    fn groups_sorted_by_best_capacity() {
        let records = vec![
            record("천안", "20000", "10000", "3200"),
            record("천안", "20000", "10000", "0"),
            record("성환", "5000", "4500", "9000"),
        ];
        let groups = group_by_substation(&records);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].substation, "성환");
        assert_eq!(groups[0].best_capacity, 4500);
        assert_eq!(groups[1].dl_count, 2);
        assert_eq!(groups[1].connectable, 1);
        assert_eq!(groups[1].worst_capacity, 0);
    }
}
