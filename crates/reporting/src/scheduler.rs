//! Recurring report schedules and the next-run calculator.
//!
//! Nothing here fires a report. An external timer calls
//! `AnalyticsService::run_due_schedules`, which claims each due schedule by
//! compare-and-set on `next_run` before regenerating it.

use campaign_core::{CampaignError, CampaignResult};
use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleFrequency {
    Daily,
    Weekly,
    Monthly,
}

impl FromStr for ScheduleFrequency {
    type Err = CampaignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(ScheduleFrequency::Daily),
            "weekly" => Ok(ScheduleFrequency::Weekly),
            "monthly" => Ok(ScheduleFrequency::Monthly),
            other => Err(CampaignError::validation(format!(
                "unknown schedule frequency '{other}', expected daily, weekly or monthly"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledReport {
    pub id: Uuid,
    /// The report this schedule regenerates. Not owned by the schedule.
    pub report_id: Uuid,
    pub user_id: Uuid,
    pub frequency: ScheduleFrequency,
    pub recipients: Vec<String>,
    pub enabled: bool,
    pub next_run: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledReport {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.next_run <= now
    }
}

/// Next execution time after `from`.
///
/// Monthly schedules keep the day of month where it exists and clamp to the
/// month's last day otherwise (Jan 31 -> Feb 29 in leap years, Feb 28 else).
pub fn next_run(frequency: ScheduleFrequency, from: DateTime<Utc>) -> CampaignResult<DateTime<Utc>> {
    let next = match frequency {
        ScheduleFrequency::Daily => from.checked_add_signed(Duration::hours(24)),
        ScheduleFrequency::Weekly => from.checked_add_signed(Duration::hours(7 * 24)),
        ScheduleFrequency::Monthly => from.checked_add_months(Months::new(1)),
    };
    next.ok_or_else(|| {
        CampaignError::Computation(format!("{frequency:?} schedule overflows from {from}"))
    })
}

pub fn validate_recipients(recipients: &[String]) -> CampaignResult<()> {
    if recipients.is_empty() {
        return Err(CampaignError::validation("a schedule needs at least one recipient"));
    }
    for recipient in recipients {
        let valid = recipient
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !valid {
            return Err(CampaignError::validation(format!(
                "'{recipient}' is not a valid email address"
            )));
        }
    }
    Ok(())
}
