//! Report builder: turns a report request into a persisted `Report`:
//! aggregate, shape with the report type's processor, and export file
//! formats into the reports directory.

use crate::aggregator::{Aggregate, CampaignFilter, MetricAggregator};
use crate::export::{ExportFormat, ReportExporter};
use crate::metrics::{ensure_finite, MetricField};
use crate::processors::{ProcessorRegistry, ReportContext, ReportType};
use campaign_core::{CampaignError, CampaignResult, CampaignStatus, DateRange, Granularity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const MAX_NAME_LEN: usize = 200;

// ─── Types ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    Pending,
    Completed,
    Failed,
}

/// Narrows the campaigns a report covers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFilters {
    #[serde(default)]
    pub campaign_status: Option<CampaignStatus>,
    /// Campaigns that spent less than this over the range are left out.
    #[serde(default)]
    pub min_spend: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub report_type: ReportType,
    pub date_range: DateRange,
    pub campaign_ids: Vec<Uuid>,
    pub metrics: Vec<MetricField>,
    pub filters: ReportFilters,
    pub group_by: Granularity,
    pub format: ExportFormat,
    pub status: ReportStatus,
    pub data: Value,
    pub file_url: Option<String>,
    /// Set when the data is complete but the artifact could not be written.
    pub export_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Report {
    fn pending(user_id: Uuid, request: &ReportRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            name: request.name.trim().to_string(),
            report_type: request.report_type,
            date_range: request.date_range,
            campaign_ids: request.campaign_ids.clone(),
            metrics: request.metrics.clone(),
            filters: request.filters.clone(),
            group_by: request.group_by,
            format: request.format,
            status: ReportStatus::Pending,
            data: Value::Null,
            file_url: None,
            export_error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// The request that would regenerate this report over `date_range`.
    pub fn request_for(&self, date_range: DateRange) -> ReportRequest {
        ReportRequest {
            report_type: self.report_type,
            name: self.name.clone(),
            date_range,
            campaign_ids: self.campaign_ids.clone(),
            metrics: self.metrics.clone(),
            filters: self.filters.clone(),
            group_by: self.group_by,
            format: self.format,
        }
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            id: self.id,
            name: self.name.clone(),
            report_type: self.report_type,
            date_range: self.date_range,
            format: self.format,
            status: self.status,
            file_url: self.file_url.clone(),
            export_error: self.export_error.clone(),
            created_at: self.created_at,
            completed_at: self.completed_at,
        }
    }
}

/// Listing view of a report, without its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub report_type: ReportType,
    pub date_range: DateRange,
    pub format: ExportFormat,
    pub status: ReportStatus,
    pub file_url: Option<String>,
    pub export_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    #[serde(rename = "type")]
    pub report_type: ReportType,
    pub name: String,
    pub date_range: DateRange,
    /// Empty means every campaign the user owns.
    #[serde(default)]
    pub campaign_ids: Vec<Uuid>,
    #[serde(default)]
    pub metrics: Vec<MetricField>,
    #[serde(default)]
    pub filters: ReportFilters,
    #[serde(default)]
    pub group_by: Granularity,
    #[serde(default)]
    pub format: ExportFormat,
}

impl ReportRequest {
    /// Checks that need no data access.
    pub fn validate(&self) -> CampaignResult<()> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(CampaignError::validation("report name must not be empty"));
        }
        if name.chars().any(char::is_control) {
            return Err(CampaignError::validation(
                "report name must not contain control characters",
            ));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(CampaignError::validation(format!(
                "report name exceeds {MAX_NAME_LEN} characters"
            )));
        }
        // Deserialized ranges bypass DateRange::new.
        DateRange::new(self.date_range.start, self.date_range.end)?;
        if self.report_type == ReportType::Custom && self.metrics.is_empty() {
            return Err(CampaignError::validation(
                "custom reports need at least one requested metric",
            ));
        }
        if let Some(min) = self.filters.min_spend {
            if !min.is_finite() || min < 0.0 {
                return Err(CampaignError::validation(
                    "minimum spend filter must be a non-negative number",
                ));
            }
        }
        Ok(())
    }
}

// ─── Listing ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportQuery {
    /// 1-based.
    pub page: u32,
    pub limit: u32,
    #[serde(default, rename = "type")]
    pub report_type: Option<ReportType>,
    #[serde(default)]
    pub status: Option<ReportStatus>,
}

impl ReportQuery {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page,
            limit,
            report_type: None,
            status: None,
        }
    }

    pub fn matches(&self, report: &Report) -> bool {
        self.report_type.map_or(true, |t| report.report_type == t)
            && self.status.map_or(true, |s| report.status == s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: usize,
    pub total_pages: u32,
}

impl<T> Page<T> {
    /// Cut page `page` (1-based) of `limit` items out of the full result.
    pub fn slice(items: Vec<T>, page: u32, limit: u32) -> Self {
        let total = items.len();
        let per_page = limit.max(1) as usize;
        let total_pages = total.div_ceil(per_page) as u32;
        let skip = (page.max(1) as usize - 1).saturating_mul(per_page);
        let items = items.into_iter().skip(skip).take(per_page).collect();
        Self {
            items,
            page,
            limit,
            total,
            total_pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            limit: self.limit,
            total: self.total,
            total_pages: self.total_pages,
        }
    }
}

// ─── Report Builder ─────────────────────────────────────────────────────────

pub struct ReportBuilder {
    aggregator: Arc<MetricAggregator>,
    registry: ProcessorRegistry,
    exporter: Arc<ReportExporter>,
}

impl ReportBuilder {
    pub fn new(
        aggregator: Arc<MetricAggregator>,
        registry: ProcessorRegistry,
        exporter: Arc<ReportExporter>,
    ) -> Self {
        Self {
            aggregator,
            registry,
            exporter,
        }
    }

    pub fn exporter(&self) -> &Arc<ReportExporter> {
        &self.exporter
    }

    /// Build a report for `user_id`.
    ///
    /// A computation failure yields a `FAILED` report. An export failure
    /// leaves the report `COMPLETED` with `export_error` set, since the data
    /// itself is sound. Validation, ownership and storage errors are returned.
    pub async fn generate(&self, user_id: Uuid, request: &ReportRequest) -> CampaignResult<Report> {
        request.validate()?;
        if !self.registry.supports(request.report_type) {
            return Err(CampaignError::validation(format!(
                "report type {} is not supported",
                request.report_type
            )));
        }

        let mut report = Report::pending(user_id, request);
        info!(
            report_id = %report.id,
            user_id = %user_id,
            report_type = %report.report_type,
            format = %report.format,
            "Generating report for {}",
            report.date_range
        );

        match self.build_payload(user_id, request).await {
            Ok(data) => {
                report.data = data;
                report.status = ReportStatus::Completed;
                report.completed_at = Some(Utc::now());
            }
            Err(CampaignError::Computation(msg)) => {
                metrics::counter!("reports.failed", "type" => report.report_type.as_str())
                    .increment(1);
                warn!(report_id = %report.id, error = %msg, "Report computation failed");
                report.data = serde_json::json!({ "error": msg });
                report.status = ReportStatus::Failed;
                return Ok(report);
            }
            Err(e) => return Err(e),
        }

        if report.format != ExportFormat::Json {
            match self.export_blocking(&report).await {
                Ok(file_url) => report.file_url = Some(file_url),
                Err(e) => report.export_error = Some(e.to_string()),
            }
        }

        metrics::counter!("reports.generated", "type" => report.report_type.as_str())
            .increment(1);
        info!(
            report_id = %report.id,
            file_url = report.file_url.as_deref().unwrap_or("-"),
            export_failed = report.export_error.is_some(),
            "Report completed"
        );
        Ok(report)
    }

    async fn build_payload(&self, user_id: Uuid, request: &ReportRequest) -> CampaignResult<Value> {
        let filter = CampaignFilter {
            campaign_ids: (!request.campaign_ids.is_empty()).then(|| request.campaign_ids.clone()),
            status: request.filters.campaign_status,
        };
        let mut aggregate = self
            .aggregator
            .aggregate(user_id, request.date_range, &filter, request.group_by)
            .await?;

        if let Some(min) = request.filters.min_spend {
            let kept: Vec<Uuid> = aggregate
                .per_campaign
                .iter()
                .filter(|c| c.metrics.spent >= min)
                .map(|c| c.campaign_id)
                .collect();
            if kept.len() < aggregate.per_campaign.len() {
                // Re-aggregate so totals, timeline and growth cover only the kept campaigns.
                let narrowed = CampaignFilter {
                    campaign_ids: Some(kept),
                    status: filter.status,
                };
                aggregate = self
                    .aggregator
                    .aggregate(user_id, request.date_range, &narrowed, request.group_by)
                    .await?;
            }
        }
        check_derived(&aggregate)?;

        let ids: Vec<Uuid> = aggregate.per_campaign.iter().map(|c| c.campaign_id).collect();
        let store = self.aggregator.metric_store();
        let (audience, funnel) = match request.report_type {
            ReportType::AudienceInsights => (
                store.audience_breakdown(&ids, &request.date_range).await?,
                None,
            ),
            ReportType::ConversionFunnel => (
                None,
                store.funnel_breakdown(&ids, &request.date_range).await?,
            ),
            _ => (None, None),
        };

        let ctx = ReportContext {
            aggregate: &aggregate,
            metrics: &request.metrics,
            audience: audience.as_ref(),
            funnel: funnel.as_ref(),
        };
        self.registry.process(request.report_type, &ctx)
    }

    /// File I/O runs on the blocking pool, off the async workers.
    async fn export_blocking(&self, report: &Report) -> CampaignResult<String> {
        let exporter = Arc::clone(&self.exporter);
        let snapshot = report.clone();
        let format = report.format;
        let dir = exporter.reports_dir().to_path_buf();
        let artifact = tokio::task::spawn_blocking(move || exporter.export(&snapshot, format))
            .await
            .map_err(|e| CampaignError::ExportIo {
                path: dir,
                source: std::io::Error::from(e),
            })??;
        Ok(artifact.file_url)
    }
}

/// Every derived metric of the aggregate must be a real number.
fn check_derived(aggregate: &Aggregate) -> CampaignResult<()> {
    let rows = std::iter::once(&aggregate.totals)
        .chain(aggregate.per_campaign.iter().map(|c| &c.metrics));
    for metrics in rows {
        for field in MetricField::ALL {
            ensure_finite(field.as_str(), metrics.value(field))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use crate::processors::{FunnelBreakdown, FunnelStage, ReportProcessor};
    use campaign_core::{AppConfig, Campaign, MetricRecord};
    use chrono::{NaiveDate, TimeZone};

    struct Setup {
        store: Arc<InMemoryStore>,
        builder: ReportBuilder,
        user: Uuid,
        a: Campaign,
        b: Campaign,
        _dir: tempfile::TempDir,
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn campaign(user_id: Uuid, name: &str, day: u32, status: CampaignStatus) -> Campaign {
        Campaign {
            id: Uuid::new_v4(),
            user_id,
            name: name.into(),
            status,
            budget: 500.0,
            created_at: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
        }
    }

    fn record(campaign_id: Uuid, day: &str, i: u64, c: u64, v: u64, cost: f64) -> MetricRecord {
        MetricRecord {
            date: date(day),
            campaign_id,
            ad_id: None,
            impressions: i,
            clicks: c,
            conversions: v,
            cost,
            revenue: None,
        }
    }

    fn setup_with_dir(reports_dir: std::path::PathBuf, dir: tempfile::TempDir) -> Setup {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let a = campaign(user, "Campaign A", 1, CampaignStatus::Active);
        let b = campaign(user, "Campaign B", 2, CampaignStatus::Paused);
        store.add_campaign(a.clone());
        store.add_campaign(b.clone());
        store.add_records(vec![
            record(a.id, "2024-03-01", 1000, 50, 5, 100.0),
            record(b.id, "2024-03-02", 2000, 20, 1, 50.0),
        ]);

        let mut config = AppConfig::default();
        config.reporting.reports_dir = reports_dir.to_string_lossy().into_owned();
        let aggregator = Arc::new(MetricAggregator::new(
            store.clone(),
            store.clone(),
            config.reporting.revenue_per_conversion,
        ));
        let builder = ReportBuilder::new(
            aggregator,
            ProcessorRegistry::with_defaults(),
            Arc::new(ReportExporter::new(&config.reporting)),
        );
        Setup {
            store,
            builder,
            user,
            a,
            b,
            _dir: dir,
        }
    }

    fn setup() -> Setup {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        setup_with_dir(path, dir)
    }

    fn request(report_type: ReportType, format: ExportFormat) -> ReportRequest {
        ReportRequest {
            report_type,
            name: "March".into(),
            date_range: DateRange::new(date("2024-03-01"), date("2024-03-31")).unwrap(),
            campaign_ids: vec![],
            metrics: vec![],
            filters: ReportFilters::default(),
            group_by: Granularity::Daily,
            format,
        }
    }

    #[tokio::test]
    async fn test_json_report_completes_without_artifact() {
        let s = setup();
        let report = s
            .builder
            .generate(s.user, &request(ReportType::CampaignPerformance, ExportFormat::Json))
            .await
            .unwrap();
        assert_eq!(report.status, ReportStatus::Completed);
        assert!(report.file_url.is_none());
        assert!(report.completed_at.is_some());
        assert_eq!(report.data["totals"]["impressions"], 3000);
    }

    #[tokio::test]
    async fn test_file_format_produces_artifact() {
        let s = setup();
        let report = s
            .builder
            .generate(s.user, &request(ReportType::BudgetAnalysis, ExportFormat::Csv))
            .await
            .unwrap();
        let file_url = report.file_url.unwrap();
        assert!(file_url.starts_with(&format!("reports/report-{}-", report.id)));
        assert!(file_url.ends_with(".csv"));
        assert!(report.export_error.is_none());
    }

    #[tokio::test]
    async fn test_export_failure_keeps_report_completed() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("reports");
        std::fs::write(&blocker, b"file").unwrap();
        let s = setup_with_dir(blocker, dir);

        let report = s
            .builder
            .generate(s.user, &request(ReportType::CampaignPerformance, ExportFormat::Document))
            .await
            .unwrap();
        assert_eq!(report.status, ReportStatus::Completed);
        assert!(report.file_url.is_none());
        assert!(report.export_error.is_some());
        assert!(report.data.is_object());
    }

    #[tokio::test]
    async fn test_validation_precedes_data_access() {
        let s = setup();
        let mut req = request(ReportType::Custom, ExportFormat::Json);
        let err = s.builder.generate(s.user, &req).await.unwrap_err();
        assert!(err.is_validation());

        req.report_type = ReportType::CampaignPerformance;
        req.name = "   ".into();
        assert!(s.builder.generate(s.user, &req).await.unwrap_err().is_validation());

        req.name = "ok".into();
        req.date_range = DateRange {
            start: date("2024-03-31"),
            end: date("2024-03-01"),
        };
        assert!(s.builder.generate(s.user, &req).await.unwrap_err().is_validation());
    }

    #[test]
    fn test_name_with_control_characters_is_rejected() {
        let mut req = request(ReportType::CampaignPerformance, ExportFormat::Csv);
        req.name = "Q1\nfake,header".into();
        assert!(req.validate().unwrap_err().is_validation());
        req.name = "Q1\tsplit".into();
        assert!(req.validate().unwrap_err().is_validation());
        req.name = "Q1 Search, Display".into();
        assert!(req.validate().is_ok());
    }

    struct BrokenProcessor;

    impl ReportProcessor for BrokenProcessor {
        fn report_type(&self) -> ReportType {
            ReportType::BudgetAnalysis
        }

        fn process(&self, _ctx: &ReportContext<'_>) -> CampaignResult<serde_json::Value> {
            Err(CampaignError::Computation("average cpc is undefined".into()))
        }
    }

    #[tokio::test]
    async fn test_computation_error_yields_failed_report() {
        let s = setup();
        let mut registry = ProcessorRegistry::with_defaults();
        registry.register(Box::new(BrokenProcessor));
        let builder = ReportBuilder::new(
            Arc::new(MetricAggregator::new(s.store.clone(), s.store.clone(), 50.0)),
            registry,
            Arc::clone(s.builder.exporter()),
        );

        let report = builder
            .generate(s.user, &request(ReportType::BudgetAnalysis, ExportFormat::Csv))
            .await
            .unwrap();
        assert_eq!(report.status, ReportStatus::Failed);
        assert_eq!(report.data["error"], "average cpc is undefined");
        assert!(report.file_url.is_none());
        assert!(report.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_foreign_campaign_is_not_found() {
        let s = setup();
        let mut req = request(ReportType::CampaignPerformance, ExportFormat::Json);
        req.campaign_ids = vec![Uuid::new_v4()];
        let err = s.builder.generate(s.user, &req).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_filters_narrow_campaigns() {
        let s = setup();
        let mut req = request(ReportType::CampaignPerformance, ExportFormat::Json);
        req.filters.min_spend = Some(75.0);
        let report = s.builder.generate(s.user, &req).await.unwrap();
        let rows = report.data["rows"].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(report.data["totals"]["impressions"], 1000);

        req.filters = ReportFilters {
            campaign_status: Some(CampaignStatus::Paused),
            min_spend: None,
        };
        let report = s.builder.generate(s.user, &req).await.unwrap();
        assert_eq!(report.data["totals"]["impressions"], 2000);
        assert_eq!(report.data["rows"][0]["campaignId"], serde_json::json!(s.b.id));
    }

    #[tokio::test]
    async fn test_funnel_uses_supplied_breakdown() {
        let s = setup();
        s.store.set_funnel(
            s.a.id,
            FunnelBreakdown {
                stages: vec![
                    FunnelStage {
                        name: "visit".into(),
                        count: 100,
                    },
                    FunnelStage {
                        name: "purchase".into(),
                        count: 10,
                    },
                ],
            },
        );
        let report = s
            .builder
            .generate(s.user, &request(ReportType::ConversionFunnel, ExportFormat::Json))
            .await
            .unwrap();
        assert_eq!(report.data["rows"][0]["stage"], "visit");
    }

    #[tokio::test]
    async fn test_unregistered_type_is_rejected() {
        let s = setup();
        let builder = ReportBuilder::new(
            Arc::new(MetricAggregator::new(s.store.clone(), s.store.clone(), 50.0)),
            ProcessorRegistry::empty(),
            Arc::clone(s.builder.exporter()),
        );
        let err = builder
            .generate(s.user, &request(ReportType::BudgetAnalysis, ExportFormat::Json))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_page_slicing() {
        let page = Page::slice((1..=25).collect::<Vec<_>>(), 3, 10);
        assert_eq!(page.items, vec![21, 22, 23, 24, 25]);
        assert_eq!(page.total, 25);
        assert_eq!(page.total_pages, 3);

        let beyond = Page::slice((1..=5).collect::<Vec<_>>(), 4, 10);
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total_pages, 1);
    }

    #[test]
    fn test_report_serializes_with_wire_names() {
        let report = crate::export::fixtures::report();
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["type"], "CAMPAIGN_PERFORMANCE");
        assert_eq!(value["status"], "COMPLETED");
        assert_eq!(value["groupBy"], "monthly");
        assert!(value["dateRange"]["start"].is_string());
        let summary = serde_json::to_value(report.summary()).unwrap();
        assert!(summary.get("data").is_none());
    }
}
