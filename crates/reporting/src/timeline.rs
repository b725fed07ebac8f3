//! Period bucketizer: groups dated metric rows into daily, weekly, or
//! monthly timeline buckets.

use campaign_core::{Granularity, MetricRecord};
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineBucket {
    /// `YYYY-MM-DD` for daily and weekly buckets (weeks keyed by their
    /// Monday), `YYYY-MM` for monthly buckets.
    pub bucket_key: String,
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: u64,
    pub cost: f64,
}

impl TimelineBucket {
    fn empty(bucket_key: String) -> Self {
        Self {
            bucket_key,
            impressions: 0,
            clicks: 0,
            conversions: 0,
            cost: 0.0,
        }
    }

    fn add(&mut self, record: &MetricRecord) {
        self.impressions = self.impressions.saturating_add(record.impressions);
        self.clicks = self.clicks.saturating_add(record.clicks);
        self.conversions = self.conversions.saturating_add(record.conversions);
        self.cost += record.cost;
    }
}

/// Start of the ISO week (Monday) containing `date`. The week holding the
/// earliest representable date starts at that date.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date.checked_sub_signed(Duration::days(i64::from(date.weekday().num_days_from_monday())))
        .unwrap_or(NaiveDate::MIN)
}

pub fn bucket_key(date: NaiveDate, granularity: Granularity) -> String {
    match granularity {
        Granularity::Daily => date.format("%Y-%m-%d").to_string(),
        Granularity::Weekly => week_start(date).format("%Y-%m-%d").to_string(),
        Granularity::Monthly => format!("{:04}-{:02}", date.year(), date.month()),
    }
}

/// Bucket `records` by `granularity`, sorted ascending by key. Keys are
/// zero-padded, so lexical order is chronological order.
pub fn bucketize<'a>(
    records: impl IntoIterator<Item = &'a MetricRecord>,
    granularity: Granularity,
) -> Vec<TimelineBucket> {
    let mut buckets: BTreeMap<String, TimelineBucket> = BTreeMap::new();
    for record in records {
        let key = bucket_key(record.date, granularity);
        buckets
            .entry(key)
            .or_insert_with_key(|k| TimelineBucket::empty(k.clone()))
            .add(record);
    }
    buckets.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn record(date: &str, impressions: u64, clicks: u64, conversions: u64, cost: f64) -> MetricRecord {
        MetricRecord {
            date: date.parse().unwrap(),
            campaign_id: Uuid::nil(),
            ad_id: None,
            impressions,
            clicks,
            conversions,
            cost,
            revenue: None,
        }
    }

    #[test]
    fn test_empty_input_yields_no_buckets() {
        let records: Vec<MetricRecord> = Vec::new();
        assert!(bucketize(&records, Granularity::Daily).is_empty());
    }

    #[test]
    fn test_daily_buckets_sorted_ascending() {
        let records = vec![
            record("2024-03-03", 10, 1, 0, 1.0),
            record("2024-03-01", 20, 2, 1, 2.0),
            record("2024-03-03", 5, 1, 1, 0.5),
        ];
        let buckets = bucketize(&records, Granularity::Daily);
        let keys: Vec<_> = buckets.iter().map(|b| b.bucket_key.as_str()).collect();
        assert_eq!(keys, vec!["2024-03-01", "2024-03-03"]);
        assert_eq!(buckets[1].impressions, 15);
        assert_eq!(buckets[1].clicks, 2);
    }

    #[test]
    fn test_weekly_buckets_start_on_monday() {
        // 2024-03-03 is a Sunday, 2024-03-04 a Monday.
        let records = vec![
            record("2024-03-03", 1, 0, 0, 0.0),
            record("2024-03-04", 1, 0, 0, 0.0),
            record("2024-03-10", 1, 0, 0, 0.0),
        ];
        let buckets = bucketize(&records, Granularity::Weekly);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].bucket_key, "2024-02-26");
        assert_eq!(buckets[1].bucket_key, "2024-03-04");
        assert_eq!(buckets[1].impressions, 2);
    }

    #[test]
    fn test_monthly_buckets_conserve_totals() {
        let records = vec![
            record("2023-12-31", 100, 10, 1, 12.5),
            record("2024-01-01", 200, 20, 2, 7.25),
            record("2024-01-31", 300, 30, 3, 1.0),
            record("2024-02-01", 400, 40, 4, 3.0),
        ];
        let buckets = bucketize(&records, Granularity::Monthly);
        let keys: Vec<_> = buckets.iter().map(|b| b.bucket_key.as_str()).collect();
        assert_eq!(keys, vec!["2023-12", "2024-01", "2024-02"]);

        let impressions: u64 = buckets.iter().map(|b| b.impressions).sum();
        let clicks: u64 = buckets.iter().map(|b| b.clicks).sum();
        let conversions: u64 = buckets.iter().map(|b| b.conversions).sum();
        let cost: f64 = buckets.iter().map(|b| b.cost).sum();
        assert_eq!(impressions, 1000);
        assert_eq!(clicks, 100);
        assert_eq!(conversions, 10);
        assert!((cost - 23.75).abs() < 1e-9);
        assert!(buckets.windows(2).all(|w| w[0].bucket_key < w[1].bucket_key));
    }

    #[test]
    fn test_counters_saturate_and_calendar_edge_is_clamped() {
        let mut first = record("2024-03-04", u64::MAX, u64::MAX - 1, 1, 1.0);
        let second = record("2024-03-05", 10, 10, 1, 1.0);
        let buckets = bucketize([&first, &second], Granularity::Weekly);
        assert_eq!(buckets[0].impressions, u64::MAX);
        assert_eq!(buckets[0].clicks, u64::MAX);
        assert_eq!(buckets[0].conversions, 2);

        first.date = NaiveDate::MIN;
        assert_eq!(week_start(NaiveDate::MIN), NaiveDate::MIN);
        let buckets = bucketize([&first], Granularity::Weekly);
        assert_eq!(buckets.len(), 1);
    }
}
