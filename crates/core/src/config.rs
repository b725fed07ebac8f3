use crate::error::{CampaignError, CampaignResult};
use serde::Deserialize;
use std::path::Path;

/// Root application configuration. Loaded from environment variables
/// with the prefix `CAMPAIGN_REPORTS__` and an optional TOML config file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub reporting: ReportingConfig,
    #[serde(default)]
    pub recommendations: RecommendationConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportingConfig {
    /// Directory that receives exported report artifacts.
    #[serde(default = "default_reports_dir")]
    pub reports_dir: String,
    /// Prefix of the relative `fileUrl` handed back to the HTTP layer.
    #[serde(default = "default_file_url_prefix")]
    pub file_url_prefix: String,
    /// Revenue attributed to a conversion when a metric row carries no revenue.
    /// This is an estimate, not business data; deployments should set it.
    #[serde(default = "default_revenue_per_conversion")]
    pub revenue_per_conversion: f64,
    /// Trailing window used by campaign comparisons.
    #[serde(default = "default_comparison_window_days")]
    pub comparison_window_days: u32,
    #[serde(default = "default_top_campaigns_limit")]
    pub top_campaigns_limit: usize,
    #[serde(default = "default_document_lines_per_page")]
    pub document_lines_per_page: usize,
}

/// Thresholds for the rule-based recommendation engine. All bounds are exclusive.
#[derive(Debug, Clone, Deserialize)]
pub struct RecommendationConfig {
    #[serde(default = "default_min_ctr")]
    pub min_ctr: f64,
    #[serde(default = "default_min_conversion_rate")]
    pub min_conversion_rate: f64,
    #[serde(default = "default_max_cpc")]
    pub max_cpc: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_page_limit")]
    pub default_limit: u32,
    #[serde(default = "default_max_page_limit")]
    pub max_limit: u32,
}

// Default functions
fn default_node_id() -> String {
    "reports-01".to_string()
}
fn default_reports_dir() -> String {
    "./reports".to_string()
}
fn default_file_url_prefix() -> String {
    "reports".to_string()
}
fn default_revenue_per_conversion() -> f64 {
    50.0
}
fn default_comparison_window_days() -> u32 {
    30
}
fn default_top_campaigns_limit() -> usize {
    5
}
fn default_document_lines_per_page() -> usize {
    50
}
fn default_min_ctr() -> f64 {
    1.0
}
fn default_min_conversion_rate() -> f64 {
    2.0
}
fn default_max_cpc() -> f64 {
    2.0
}
fn default_page_limit() -> u32 {
    10
}
fn default_max_page_limit() -> u32 {
    100
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            reports_dir: default_reports_dir(),
            file_url_prefix: default_file_url_prefix(),
            revenue_per_conversion: default_revenue_per_conversion(),
            comparison_window_days: default_comparison_window_days(),
            top_campaigns_limit: default_top_campaigns_limit(),
            document_lines_per_page: default_document_lines_per_page(),
        }
    }
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            min_ctr: default_min_ctr(),
            min_conversion_rate: default_min_conversion_rate(),
            max_cpc: default_max_cpc(),
        }
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: default_page_limit(),
            max_limit: default_max_page_limit(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            reporting: ReportingConfig::default(),
            recommendations: RecommendationConfig::default(),
            pagination: PaginationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables only.
    pub fn load() -> CampaignResult<Self> {
        Self::load_from(None)
    }

    /// Load configuration from an optional TOML file, then environment
    /// variables, which take precedence.
    pub fn load_from(path: Option<&Path>) -> CampaignResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("CAMPAIGN_REPORTS")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config: AppConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| CampaignError::Config(e.to_string()))?;
        config.validate()?;
        tracing::debug!(node_id = %config.node_id, "Configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> CampaignResult<()> {
        let r = &self.reporting;
        if !r.revenue_per_conversion.is_finite() || r.revenue_per_conversion < 0.0 {
            return Err(CampaignError::Config(
                "reporting.revenue_per_conversion must be a non-negative number".into(),
            ));
        }
        if r.comparison_window_days == 0 {
            return Err(CampaignError::Config(
                "reporting.comparison_window_days must be at least 1".into(),
            ));
        }
        if r.document_lines_per_page == 0 {
            return Err(CampaignError::Config(
                "reporting.document_lines_per_page must be at least 1".into(),
            ));
        }
        let p = &self.pagination;
        if p.default_limit == 0 || p.max_limit == 0 || p.default_limit > p.max_limit {
            return Err(CampaignError::Config(
                "pagination limits must be positive and default_limit <= max_limit".into(),
            ));
        }
        Ok(())
    }
}
