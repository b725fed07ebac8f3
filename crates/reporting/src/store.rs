//! Repository interfaces the engine reads campaigns and metrics from and
//! persists reports and schedules into.

use crate::processors::{AudienceBreakdown, FunnelBreakdown};
use crate::report_builder::{Page, Report, ReportQuery};
use crate::scheduler::ScheduledReport;
use async_trait::async_trait;
use campaign_core::{Campaign, CampaignResult, DateRange, MetricRecord};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Read-only campaign registry.
#[async_trait]
pub trait CampaignStore: Send + Sync {
    /// Every campaign owned by `user_id`, in creation order.
    async fn campaigns_for_user(&self, user_id: Uuid) -> CampaignResult<Vec<Campaign>>;
}

/// Read-mostly store of per-day metric rows.
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Rows for `campaign_id` dated inside `range`.
    async fn records_for_campaign(
        &self,
        campaign_id: Uuid,
        range: &DateRange,
    ) -> CampaignResult<Vec<MetricRecord>>;

    /// Audience distribution supplied by an upstream telemetry source, if any.
    async fn audience_breakdown(
        &self,
        _campaign_ids: &[Uuid],
        _range: &DateRange,
    ) -> CampaignResult<Option<AudienceBreakdown>> {
        Ok(None)
    }

    /// Funnel-stage counts supplied by an upstream source, if any.
    async fn funnel_breakdown(
        &self,
        _campaign_ids: &[Uuid],
        _range: &DateRange,
    ) -> CampaignResult<Option<FunnelBreakdown>> {
        Ok(None)
    }
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn save_report(&self, report: &Report) -> CampaignResult<()>;

    /// The report, if it exists and belongs to `user_id`.
    async fn get_report(&self, user_id: Uuid, report_id: Uuid) -> CampaignResult<Option<Report>>;

    async fn list_reports(&self, user_id: Uuid, query: &ReportQuery) -> CampaignResult<Page<Report>>;

    async fn delete_report(&self, user_id: Uuid, report_id: Uuid) -> CampaignResult<Option<Report>>;

    async fn save_schedule(&self, schedule: &ScheduledReport) -> CampaignResult<()>;

    async fn get_schedule(&self, schedule_id: Uuid) -> CampaignResult<Option<ScheduledReport>>;

    /// Enabled schedules whose `next_run` is at or before `now`.
    async fn due_schedules(&self, now: DateTime<Utc>) -> CampaignResult<Vec<ScheduledReport>>;

    /// Compare-and-set on `next_run`: moves it to `next_run` only if it still
    /// equals `expected`. Returns whether this caller won.
    async fn advance_schedule(
        &self,
        schedule_id: Uuid,
        expected: DateTime<Utc>,
        next_run: DateTime<Utc>,
        fired_at: DateTime<Utc>,
    ) -> CampaignResult<bool>;
}
