//! Campaign analytics and reporting: metric aggregation, dashboards,
//! report generation and export, comparisons, recommendations, and
//! recurring report schedules.

pub mod aggregator;
pub mod comparator;
pub mod dashboard;
pub mod export;
pub mod memory;
pub mod metrics;
pub mod processors;
pub mod recommendation;
pub mod report_builder;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod timeline;

pub use aggregator::{Aggregate, CampaignFilter, MetricAggregator};
pub use comparator::{Comparator, ComparisonRequest, ComparisonResult};
pub use dashboard::CampaignDashboard;
pub use export::{ExportFormat, ReportExporter};
pub use memory::InMemoryStore;
pub use metrics::{AggregatedMetrics, MetricField};
pub use processors::{ProcessorRegistry, ReportProcessor, ReportType};
pub use recommendation::{Recommendation, RecommendationEngine};
pub use report_builder::{Report, ReportBuilder, ReportRequest, ReportStatus};
pub use scheduler::{next_run, ScheduleFrequency, ScheduledReport};
pub use service::{AnalyticsService, ScheduleRequest};
pub use store::{CampaignStore, MetricStore, ReportStore};
