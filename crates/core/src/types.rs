use crate::error::{CampaignError, CampaignResult};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// One day of performance counters for a campaign (optionally a single ad).
/// Supplied by the ingestion side; never mutated here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRecord {
    pub date: NaiveDate,
    pub campaign_id: Uuid,
    #[serde(default)]
    pub ad_id: Option<Uuid>,
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: u64,
    pub cost: f64,
    /// Attributed revenue. When absent, revenue is estimated from conversions.
    #[serde(default)]
    pub revenue: Option<f64>,
}

impl MetricRecord {
    /// Revenue for this row, falling back to `conversions * revenue_per_conversion`.
    pub fn revenue_or_estimate(&self, revenue_per_conversion: f64) -> f64 {
        self.revenue
            .unwrap_or(self.conversions as f64 * revenue_per_conversion)
    }
}

/// Campaign registry entry, owned by a single user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub status: CampaignStatus,
    #[serde(default)]
    pub budget: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
}

/// Inclusive calendar-day range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> CampaignResult<Self> {
        if start > end {
            return Err(CampaignError::validation(format!(
                "date range start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// The `days`-long range ending on (and including) `end`.
    pub fn trailing(end: NaiveDate, days: u32) -> CampaignResult<Self> {
        if days == 0 {
            return Err(CampaignError::validation("trailing window must be at least one day"));
        }
        Ok(Self {
            start: days_before(end, i64::from(days) - 1)?,
            end,
        })
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// The range of equal length immediately preceding this one.
    pub fn previous(&self) -> CampaignResult<Self> {
        Ok(Self {
            start: days_before(self.start, self.days())?,
            end: days_before(self.start, 1)?,
        })
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// `date` moved back `days` days, rejected when it leaves chrono's calendar.
fn days_before(date: NaiveDate, days: i64) -> CampaignResult<NaiveDate> {
    date.checked_sub_signed(Duration::days(days))
        .ok_or_else(|| {
            CampaignError::validation(format!("{days} days before {date} is out of range"))
        })
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Dashboard look-back presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeriodPreset {
    #[serde(rename = "7d")]
    Last7Days,
    #[serde(rename = "30d")]
    Last30Days,
    #[serde(rename = "90d")]
    Last90Days,
}

impl PeriodPreset {
    pub fn days(self) -> u32 {
        match self {
            PeriodPreset::Last7Days => 7,
            PeriodPreset::Last30Days => 30,
            PeriodPreset::Last90Days => 90,
        }
    }

    pub fn range_ending(self, today: NaiveDate) -> CampaignResult<DateRange> {
        DateRange::trailing(today, self.days())
    }
}

impl FromStr for PeriodPreset {
    type Err = CampaignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "7d" => Ok(PeriodPreset::Last7Days),
            "30d" => Ok(PeriodPreset::Last30Days),
            "90d" => Ok(PeriodPreset::Last90Days),
            other => Err(CampaignError::validation(format!(
                "unknown period preset '{other}', expected 7d, 30d or 90d"
            ))),
        }
    }
}

/// Timeline bucket size. Weekly buckets start on Monday (ISO 8601 weeks).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl FromStr for Granularity {
    type Err = CampaignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" | "day" => Ok(Granularity::Daily),
            "weekly" | "week" => Ok(Granularity::Weekly),
            "monthly" | "month" => Ok(Granularity::Monthly),
            other => Err(CampaignError::validation(format!(
                "unknown granularity '{other}', expected daily, weekly or monthly"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_date_range_rejects_inverted_bounds() {
        let err = DateRange::new(date(2024, 3, 2), date(2024, 3, 1)).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_previous_period_has_equal_length() {
        let range = DateRange::new(date(2024, 3, 1), date(2024, 3, 7)).unwrap();
        let prev = range.previous().unwrap();
        assert_eq!(prev.start, date(2024, 2, 23));
        assert_eq!(prev.end, date(2024, 2, 29));
        assert_eq!(prev.days(), range.days());
        assert!(!prev.overlaps(&range));
    }

    #[test]
    fn test_ranges_at_calendar_edge_are_rejected() {
        let first = DateRange::new(NaiveDate::MIN, NaiveDate::MIN).unwrap();
        assert!(first.previous().unwrap_err().is_validation());
        assert!(DateRange::trailing(NaiveDate::MIN, 2).unwrap_err().is_validation());
        assert!(PeriodPreset::Last30Days
            .range_ending(NaiveDate::MIN)
            .unwrap_err()
            .is_validation());
        assert_eq!(DateRange::trailing(NaiveDate::MIN, 1).unwrap().start, NaiveDate::MIN);
    }

    #[test]
    fn test_preset_ranges_include_today() {
        let today = date(2024, 5, 31);
        let range = PeriodPreset::Last7Days.range_ending(today).unwrap();
        assert_eq!(range.days(), 7);
        assert_eq!(range.end, today);
        assert_eq!(range.start, date(2024, 5, 25));
    }

    #[test]
    fn test_unknown_preset_is_validation_error() {
        assert!("14d".parse::<PeriodPreset>().unwrap_err().is_validation());
        assert_eq!("90d".parse::<PeriodPreset>().unwrap(), PeriodPreset::Last90Days);
    }

    #[test]
    fn test_revenue_fallback() {
        let record = MetricRecord {
            date: date(2024, 1, 1),
            campaign_id: Uuid::new_v4(),
            ad_id: None,
            impressions: 100,
            clicks: 10,
            conversions: 3,
            cost: 20.0,
            revenue: None,
        };
        assert_eq!(record.revenue_or_estimate(50.0), 150.0);
        let attributed = MetricRecord {
            revenue: Some(99.0),
            ..record
        };
        assert_eq!(attributed.revenue_or_estimate(50.0), 99.0);
    }
}
