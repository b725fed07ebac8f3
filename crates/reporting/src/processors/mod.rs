//! Report type processors: one strategy per report type, looked up in a
//! registry so new types plug in without touching existing ones.

mod audience;
mod budget;
mod custom;
mod funnel;
mod performance;

pub use audience::{AudienceBreakdown, AudienceInsightsProcessor, SegmentMetrics};
pub use budget::BudgetAnalysisProcessor;
pub use custom::CustomProcessor;
pub use funnel::{ConversionFunnelProcessor, FunnelBreakdown, FunnelStage};
pub use performance::CampaignPerformanceProcessor;

use crate::aggregator::Aggregate;
use crate::metrics::MetricField;
use campaign_core::{CampaignError, CampaignResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportType {
    CampaignPerformance,
    AudienceInsights,
    BudgetAnalysis,
    ConversionFunnel,
    Custom,
}

impl ReportType {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportType::CampaignPerformance => "CAMPAIGN_PERFORMANCE",
            ReportType::AudienceInsights => "AUDIENCE_INSIGHTS",
            ReportType::BudgetAnalysis => "BUDGET_ANALYSIS",
            ReportType::ConversionFunnel => "CONVERSION_FUNNEL",
            ReportType::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = CampaignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CAMPAIGN_PERFORMANCE" => Ok(ReportType::CampaignPerformance),
            "AUDIENCE_INSIGHTS" => Ok(ReportType::AudienceInsights),
            "BUDGET_ANALYSIS" => Ok(ReportType::BudgetAnalysis),
            "CONVERSION_FUNNEL" => Ok(ReportType::ConversionFunnel),
            "CUSTOM" => Ok(ReportType::Custom),
            other => Err(CampaignError::validation(format!("unknown report type '{other}'"))),
        }
    }
}

/// Everything a processor may read. Breakdowns are only present when an
/// upstream source supplied them.
pub struct ReportContext<'a> {
    pub aggregate: &'a Aggregate,
    pub metrics: &'a [MetricField],
    pub audience: Option<&'a AudienceBreakdown>,
    pub funnel: Option<&'a FunnelBreakdown>,
}

pub trait ReportProcessor: Send + Sync {
    fn report_type(&self) -> ReportType;

    /// Shape aggregated data into this report type's payload. Payloads are
    /// JSON objects whose `rows` array is the tabular body used by exports.
    fn process(&self, ctx: &ReportContext<'_>) -> CampaignResult<serde_json::Value>;
}

pub struct ProcessorRegistry {
    processors: HashMap<ReportType, Box<dyn ReportProcessor>>,
}

impl ProcessorRegistry {
    pub fn empty() -> Self {
        Self {
            processors: HashMap::new(),
        }
    }

    /// Registry with every built-in report type.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(CampaignPerformanceProcessor));
        registry.register(Box::new(BudgetAnalysisProcessor));
        registry.register(Box::new(AudienceInsightsProcessor));
        registry.register(Box::new(ConversionFunnelProcessor));
        registry.register(Box::new(CustomProcessor));
        registry
    }

    /// Add or replace the processor for its report type.
    pub fn register(&mut self, processor: Box<dyn ReportProcessor>) {
        self.processors.insert(processor.report_type(), processor);
    }

    pub fn supports(&self, report_type: ReportType) -> bool {
        self.processors.contains_key(&report_type)
    }

    pub fn process(
        &self,
        report_type: ReportType,
        ctx: &ReportContext<'_>,
    ) -> CampaignResult<serde_json::Value> {
        let processor = self.processors.get(&report_type).ok_or_else(|| {
            CampaignError::validation(format!("no processor registered for {report_type}"))
        })?;
        processor.process(ctx)
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
