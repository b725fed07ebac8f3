//! Campaign Reports: operator CLI for the analytics engine.
//!
//! Loads configuration, seeds an in-memory store from a JSON fixture, and
//! prints dashboards, reports, comparisons and schedule times as JSON.

use anyhow::{bail, Context};
use campaign_core::config::AppConfig;
use campaign_core::{DateRange, Granularity, PeriodPreset};
use campaign_reporting::memory::Fixture;
use campaign_reporting::report_builder::ReportFilters;
use campaign_reporting::{
    next_run, AnalyticsService, ComparisonRequest, ExportFormat, InMemoryStore, MetricField,
    ReportRequest, ReportType, ScheduleFrequency,
};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "campaign-reports")]
#[command(about = "Campaign analytics, report generation and comparisons")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, env = "CAMPAIGN_REPORTS_CONFIG")]
    config: Option<PathBuf>,

    /// JSON fixture with `campaigns` and `records`
    #[arg(long, env = "CAMPAIGN_REPORTS_FIXTURE")]
    fixture: Option<PathBuf>,

    /// Acting user (defaults to the owner of the first fixture campaign)
    #[arg(long)]
    user: Option<Uuid>,

    /// Reports directory (overrides config)
    #[arg(long, env = "CAMPAIGN_REPORTS__REPORTING__REPORTS_DIR")]
    reports_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Dashboard summary: totals, growth, top campaigns, daily timeline
    Dashboard {
        /// 7d, 30d or 90d
        #[arg(long, default_value = "30d")]
        period: PeriodPreset,
    },

    /// Totals and growth against the previous period
    Overview {
        #[arg(long, default_value = "30d")]
        period: PeriodPreset,

        /// Restrict to one campaign
        #[arg(long)]
        campaign: Option<Uuid>,
    },

    /// Per-ad metrics, timeline and recommendations for one campaign
    Analytics {
        campaign: Uuid,

        #[arg(long, default_value = "30d")]
        period: PeriodPreset,

        /// daily, weekly or monthly
        #[arg(long, default_value = "daily")]
        breakdown: Granularity,
    },

    /// Generate a report and export it
    Generate {
        /// CAMPAIGN_PERFORMANCE, BUDGET_ANALYSIS, AUDIENCE_INSIGHTS, CONVERSION_FUNNEL or CUSTOM
        #[arg(long = "type", default_value = "CAMPAIGN_PERFORMANCE")]
        report_type: ReportType,

        #[arg(long)]
        name: String,

        #[arg(long)]
        start: NaiveDate,

        #[arg(long)]
        end: NaiveDate,

        /// Comma-separated campaign ids (default: all)
        #[arg(long, value_delimiter = ',')]
        campaigns: Vec<Uuid>,

        /// Comma-separated metric names
        #[arg(long, value_delimiter = ',')]
        metrics: Vec<MetricField>,

        #[arg(long, default_value = "daily")]
        group_by: Granularity,

        /// json, csv, spreadsheet or document
        #[arg(long, default_value = "json")]
        format: ExportFormat,

        /// Leave out campaigns that spent less than this
        #[arg(long)]
        min_spend: Option<f64>,
    },

    /// Compare campaigns over the trailing comparison window
    CompareCampaigns {
        #[arg(required = true, value_delimiter = ',')]
        campaigns: Vec<Uuid>,

        #[arg(long, value_delimiter = ',')]
        metrics: Vec<MetricField>,
    },

    /// Compare totals across date ranges written as START..END
    ComparePeriods {
        #[arg(required = true)]
        periods: Vec<String>,

        #[arg(long, value_delimiter = ',')]
        metrics: Vec<MetricField>,
    },

    /// Print when a schedule of the given frequency runs next
    NextRun {
        /// daily, weekly or monthly
        frequency: ScheduleFrequency,

        /// RFC 3339 start time (default: now)
        #[arg(long)]
        from: Option<DateTime<Utc>>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "campaign_reports=info,campaign_reporting=info".into()),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = match cli.config.as_deref() {
        Some(path) => AppConfig::load_from(Some(path))
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => AppConfig::load().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            AppConfig::default()
        }),
    };
    if let Some(dir) = cli.reports_dir {
        config.reporting.reports_dir = dir;
    }

    if let Commands::NextRun { frequency, from } = cli.command {
        let from = from.unwrap_or_else(Utc::now);
        let next = next_run(frequency, from)?;
        return print_json(&serde_json::json!({ "from": from, "nextRun": next }));
    }

    let Some(fixture_path) = cli.fixture.as_deref() else {
        bail!("--fixture is required for this command");
    };
    let fixture = load_fixture(fixture_path)?;
    let user = match cli.user {
        Some(user) => user,
        None => match fixture.campaigns.first() {
            Some(campaign) => campaign.user_id,
            None => bail!("fixture has no campaigns; pass --user"),
        },
    };

    let store = Arc::new(InMemoryStore::from_fixture(fixture));
    let service = AnalyticsService::new(&config, store.clone(), store.clone(), store);

    info!(
        node_id = %config.node_id,
        user_id = %user,
        reports_dir = %config.reporting.reports_dir,
        "Campaign reports ready"
    );

    match cli.command {
        Commands::Dashboard { period } => print_json(&service.get_dashboard(user, period).await?),
        Commands::Overview { period, campaign } => {
            print_json(&service.get_overview(user, period, campaign).await?)
        }
        Commands::Analytics {
            campaign,
            period,
            breakdown,
        } => print_json(
            &service
                .get_campaign_analytics(user, campaign, period, breakdown)
                .await?,
        ),
        Commands::Generate {
            report_type,
            name,
            start,
            end,
            campaigns,
            metrics,
            group_by,
            format,
            min_spend,
        } => {
            let request = ReportRequest {
                report_type,
                name,
                date_range: DateRange::new(start, end)?,
                campaign_ids: campaigns,
                metrics,
                filters: ReportFilters {
                    campaign_status: None,
                    min_spend,
                },
                group_by,
                format,
            };
            let report = service.generate_report(user, &request).await?;
            if let Some(error) = &report.export_error {
                warn!(report_id = %report.id, error = %error, "Report data kept, export failed");
            }
            print_json(&report)
        }
        Commands::CompareCampaigns { campaigns, metrics } => {
            let request = ComparisonRequest::Campaigns {
                campaign_ids: campaigns,
                metrics,
            };
            print_json(&service.compare(user, &request).await?)
        }
        Commands::ComparePeriods { periods, metrics } => {
            let periods = periods
                .iter()
                .map(|p| parse_period(p))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let request = ComparisonRequest::Periods { periods, metrics };
            print_json(&service.compare(user, &request).await?)
        }
        Commands::NextRun { .. } => Ok(()),
    }
}

fn load_fixture(path: &Path) -> anyhow::Result<Fixture> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading fixture {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing fixture {}", path.display()))
}

fn parse_period(s: &str) -> anyhow::Result<DateRange> {
    let (start, end) = s
        .split_once("..")
        .with_context(|| format!("period '{s}' is not START..END"))?;
    let start: NaiveDate = start.parse().with_context(|| format!("bad start in '{s}'"))?;
    let end: NaiveDate = end.parse().with_context(|| format!("bad end in '{s}'"))?;
    Ok(DateRange::new(start, end)?)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
