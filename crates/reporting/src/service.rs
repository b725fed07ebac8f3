//! Analytics service facade: the operations an HTTP layer calls. Wires the
//! aggregator, dashboard, report builder, comparator and schedule runner to
//! injected stores.

use crate::aggregator::MetricAggregator;
use crate::comparator::{Comparator, ComparisonRequest, ComparisonResult};
use crate::dashboard::{CampaignAnalytics, CampaignDashboard, DashboardPayload, OverviewPayload};
use crate::export::ReportExporter;
use crate::processors::{ProcessorRegistry, ReportType};
use crate::recommendation::RecommendationEngine;
use crate::report_builder::{
    Page, Report, ReportBuilder, ReportQuery, ReportRequest, ReportStatus, ReportSummary,
};
use crate::scheduler::{next_run, validate_recipients, ScheduleFrequency, ScheduledReport};
use crate::store::{CampaignStore, MetricStore, ReportStore};
use campaign_core::config::PaginationConfig;
use campaign_core::{
    AppConfig, CampaignError, CampaignResult, DateRange, Granularity, PeriodPreset,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    pub report_id: Uuid,
    pub frequency: ScheduleFrequency,
    pub recipients: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// One schedule that fired during a run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FiredSchedule {
    pub schedule_id: Uuid,
    /// The freshly generated report.
    pub report_id: Uuid,
    pub status: ReportStatus,
    pub recipients: Vec<String>,
    pub next_run: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRun {
    pub fired: Vec<FiredSchedule>,
    /// Triggers that lost the race to another firing of the same schedule.
    pub suppressed: usize,
    pub failed: usize,
}

pub struct AnalyticsService {
    reports: Arc<dyn ReportStore>,
    dashboard: CampaignDashboard,
    builder: ReportBuilder,
    comparator: Comparator,
    pagination: PaginationConfig,
}

impl AnalyticsService {
    pub fn new(
        config: &AppConfig,
        campaigns: Arc<dyn CampaignStore>,
        metrics: Arc<dyn MetricStore>,
        reports: Arc<dyn ReportStore>,
    ) -> Self {
        let reporting = &config.reporting;
        let aggregator = Arc::new(MetricAggregator::new(
            campaigns,
            metrics,
            reporting.revenue_per_conversion,
        ));
        let recommendations = Arc::new(RecommendationEngine::new(config.recommendations.clone()));
        Self {
            reports,
            dashboard: CampaignDashboard::new(
                aggregator.clone(),
                recommendations,
                reporting.top_campaigns_limit,
            ),
            builder: ReportBuilder::new(
                aggregator.clone(),
                ProcessorRegistry::with_defaults(),
                Arc::new(ReportExporter::new(reporting)),
            ),
            comparator: Comparator::new(aggregator, reporting.comparison_window_days),
            pagination: config.pagination.clone(),
        }
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    // ─── Dashboards ─────────────────────────────────────────────────────────

    pub async fn get_dashboard(
        &self,
        user_id: Uuid,
        period: PeriodPreset,
    ) -> CampaignResult<DashboardPayload> {
        self.dashboard.dashboard(user_id, period, Self::today()).await
    }

    pub async fn get_overview(
        &self,
        user_id: Uuid,
        period: PeriodPreset,
        campaign_id: Option<Uuid>,
    ) -> CampaignResult<OverviewPayload> {
        self.dashboard
            .overview(user_id, period, campaign_id, Self::today())
            .await
    }

    pub async fn get_campaign_analytics(
        &self,
        user_id: Uuid,
        campaign_id: Uuid,
        period: PeriodPreset,
        breakdown: Granularity,
    ) -> CampaignResult<CampaignAnalytics> {
        self.dashboard
            .campaign_analytics(user_id, campaign_id, period, breakdown, Self::today())
            .await
    }

    pub async fn compare(
        &self,
        user_id: Uuid,
        request: &ComparisonRequest,
    ) -> CampaignResult<ComparisonResult> {
        self.comparator.compare(user_id, request, Self::today()).await
    }

    // ─── Reports ────────────────────────────────────────────────────────────

    pub async fn generate_report(
        &self,
        user_id: Uuid,
        request: &ReportRequest,
    ) -> CampaignResult<Report> {
        let report = self.builder.generate(user_id, request).await?;
        self.reports.save_report(&report).await?;
        Ok(report)
    }

    pub async fn list_reports(
        &self,
        user_id: Uuid,
        page: Option<u32>,
        limit: Option<u32>,
        report_type: Option<ReportType>,
        status: Option<ReportStatus>,
    ) -> CampaignResult<Page<ReportSummary>> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(self.pagination.default_limit);
        if page == 0 {
            return Err(CampaignError::validation("page numbers start at 1"));
        }
        if limit == 0 || limit > self.pagination.max_limit {
            return Err(CampaignError::validation(format!(
                "limit must be between 1 and {}",
                self.pagination.max_limit
            )));
        }

        let query = ReportQuery {
            page,
            limit,
            report_type,
            status,
        };
        let reports = self.reports.list_reports(user_id, &query).await?;
        Ok(reports.map(|r| r.summary()))
    }

    pub async fn get_report(&self, user_id: Uuid, report_id: Uuid) -> CampaignResult<Report> {
        self.reports
            .get_report(user_id, report_id)
            .await?
            .ok_or_else(|| CampaignError::not_found("report", report_id))
    }

    /// Delete a report and its artifact file. The artifact goes first, so a
    /// failed removal leaves the report in place and the error is returned.
    pub async fn delete_report(&self, user_id: Uuid, report_id: Uuid) -> CampaignResult<ReportSummary> {
        let report = self.get_report(user_id, report_id).await?;
        if let Some(file_url) = &report.file_url {
            self.builder.exporter().remove(file_url).map_err(|e| {
                warn!(report_id = %report_id, error = %e, "Report artifact could not be removed");
                e
            })?;
        }

        let deleted = self
            .reports
            .delete_report(user_id, report_id)
            .await?
            .ok_or_else(|| CampaignError::not_found("report", report_id))?;
        info!(report_id = %report_id, "Report deleted");
        Ok(deleted.summary())
    }

    // ─── Schedules ──────────────────────────────────────────────────────────

    pub async fn schedule_report(
        &self,
        user_id: Uuid,
        request: &ScheduleRequest,
    ) -> CampaignResult<ScheduledReport> {
        validate_recipients(&request.recipients)?;
        let report = self.get_report(user_id, request.report_id).await?;

        let now = Utc::now();
        let schedule = ScheduledReport {
            id: Uuid::new_v4(),
            report_id: report.id,
            user_id,
            frequency: request.frequency,
            recipients: request.recipients.clone(),
            enabled: request.enabled,
            next_run: next_run(request.frequency, now)?,
            last_run: None,
            created_at: now,
        };
        self.reports.save_schedule(&schedule).await?;
        info!(
            schedule_id = %schedule.id,
            report_id = %report.id,
            frequency = ?schedule.frequency,
            next_run = %schedule.next_run,
            "Report scheduled"
        );
        Ok(schedule)
    }

    pub async fn get_schedule(&self, user_id: Uuid, schedule_id: Uuid) -> CampaignResult<ScheduledReport> {
        self.reports
            .get_schedule(schedule_id)
            .await?
            .filter(|s| s.user_id == user_id)
            .ok_or_else(|| CampaignError::not_found("scheduled report", schedule_id))
    }

    pub async fn disable_schedule(
        &self,
        user_id: Uuid,
        schedule_id: Uuid,
    ) -> CampaignResult<ScheduledReport> {
        let mut schedule = self.get_schedule(user_id, schedule_id).await?;
        schedule.enabled = false;
        self.reports.save_schedule(&schedule).await?;
        info!(schedule_id = %schedule_id, "Schedule disabled");
        Ok(schedule)
    }

    /// Fire every schedule due at `now`.
    ///
    /// Each schedule is claimed by compare-and-set on its `next_run` before
    /// anything is generated, so overlapping triggers fire it once. The report
    /// is regenerated over a window of its original length ending today.
    pub async fn run_due_schedules(&self, now: DateTime<Utc>) -> CampaignResult<ScheduleRun> {
        let due = self.reports.due_schedules(now).await?;
        let mut run = ScheduleRun::default();

        for schedule in due {
            let following = match self.claim(&schedule, now).await {
                Ok(Some(following)) => following,
                Ok(None) => {
                    metrics::counter!("reports.schedule_suppressed").increment(1);
                    info!(schedule_id = %schedule.id, "Duplicate schedule trigger suppressed");
                    run.suppressed += 1;
                    continue;
                }
                Err(e) => {
                    metrics::counter!("reports.schedule_failures").increment(1);
                    warn!(schedule_id = %schedule.id, error = %e, "Schedule could not be claimed");
                    run.failed += 1;
                    continue;
                }
            };

            match self.fire(&schedule, now).await {
                Ok(report) => {
                    metrics::counter!("reports.schedule_fired").increment(1);
                    info!(
                        schedule_id = %schedule.id,
                        report_id = %report.id,
                        recipients = ?schedule.recipients,
                        next_run = %following,
                        "Scheduled report generated"
                    );
                    run.fired.push(FiredSchedule {
                        schedule_id: schedule.id,
                        report_id: report.id,
                        status: report.status,
                        recipients: schedule.recipients.clone(),
                        next_run: following,
                    });
                }
                Err(e) => {
                    metrics::counter!("reports.schedule_failures").increment(1);
                    warn!(schedule_id = %schedule.id, error = %e, "Scheduled report failed");
                    run.failed += 1;
                }
            }
        }
        Ok(run)
    }

    /// Advance `next_run` past `now`. `None` when another trigger got there first.
    async fn claim(
        &self,
        schedule: &ScheduledReport,
        now: DateTime<Utc>,
    ) -> CampaignResult<Option<DateTime<Utc>>> {
        let following = next_run(schedule.frequency, now)?;
        let claimed = self
            .reports
            .advance_schedule(schedule.id, schedule.next_run, following, now)
            .await?;
        Ok(claimed.then_some(following))
    }

    async fn fire(&self, schedule: &ScheduledReport, now: DateTime<Utc>) -> CampaignResult<Report> {
        let source = self.get_report(schedule.user_id, schedule.report_id).await?;
        let days = u32::try_from(source.date_range.days())
            .map_err(|_| CampaignError::Computation("report window is too long".into()))?;
        let window = DateRange::trailing(now.date_naive(), days)?;
        self.generate_report(schedule.user_id, &source.request_for(window))
            .await
    }
}
