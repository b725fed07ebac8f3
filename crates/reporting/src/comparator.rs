//! Side-by-side comparison of campaigns over a trailing window, or of the
//! user's totals across several date ranges. No metric math lives here; every
//! entry comes straight from the aggregator.

use crate::aggregator::{CampaignFilter, MetricAggregator};
use crate::metrics::{AggregatedMetrics, MetricField};
use campaign_core::{CampaignError, CampaignResult, DateRange};
use chrono::NaiveDate;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const MAX_SUBJECTS: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ComparisonRequest {
    Campaigns {
        #[serde(rename = "campaignIds")]
        campaign_ids: Vec<Uuid>,
        #[serde(default)]
        metrics: Vec<MetricField>,
    },
    Periods {
        periods: Vec<DateRange>,
        #[serde(default)]
        metrics: Vec<MetricField>,
    },
}

impl ComparisonRequest {
    fn subject_count(&self) -> usize {
        match self {
            ComparisonRequest::Campaigns { campaign_ids, .. } => campaign_ids.len(),
            ComparisonRequest::Periods { periods, .. } => periods.len(),
        }
    }

    /// Requested fields; every field when none were named.
    fn fields(&self) -> Vec<MetricField> {
        let requested = match self {
            ComparisonRequest::Campaigns { metrics, .. } => metrics,
            ComparisonRequest::Periods { metrics, .. } => metrics,
        };
        if requested.is_empty() {
            MetricField::ALL.to_vec()
        } else {
            requested.clone()
        }
    }

    pub fn validate(&self) -> CampaignResult<()> {
        let count = self.subject_count();
        if count == 0 {
            return Err(CampaignError::validation("comparison needs at least one subject"));
        }
        if count > MAX_SUBJECTS {
            return Err(CampaignError::validation(format!(
                "comparison is limited to {MAX_SUBJECTS} subjects"
            )));
        }
        if let ComparisonRequest::Periods { periods, .. } = self {
            for period in periods {
                DateRange::new(period.start, period.end)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ComparisonSubject {
    Campaign {
        #[serde(rename = "campaignId")]
        campaign_id: Uuid,
        name: String,
    },
    Period { start: NaiveDate, end: NaiveDate },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonEntry {
    pub subject: ComparisonSubject,
    pub metrics: AggregatedMetrics,
    /// The requested fields only, rounded for display.
    pub values: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    /// Trailing window used in campaigns mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<DateRange>,
    pub entries: Vec<ComparisonEntry>,
}

pub struct Comparator {
    aggregator: Arc<MetricAggregator>,
    window_days: u32,
}

impl Comparator {
    pub fn new(aggregator: Arc<MetricAggregator>, window_days: u32) -> Self {
        Self {
            aggregator,
            window_days,
        }
    }

    pub async fn compare(
        &self,
        user_id: Uuid,
        request: &ComparisonRequest,
        today: NaiveDate,
    ) -> CampaignResult<ComparisonResult> {
        request.validate()?;
        let fields = request.fields();

        let result = match request {
            ComparisonRequest::Campaigns { campaign_ids, .. } => {
                let window = DateRange::trailing(today, self.window_days)?;
                let rows = self
                    .aggregator
                    .campaign_totals(user_id, window, &CampaignFilter::campaigns(campaign_ids.clone()))
                    .await?;
                // Entries follow the request order, not creation order.
                let entries = campaign_ids
                    .iter()
                    .filter_map(|id| rows.iter().find(|r| r.campaign_id == *id))
                    .map(|row| {
                        entry(
                            ComparisonSubject::Campaign {
                                campaign_id: row.campaign_id,
                                name: row.name.clone(),
                            },
                            row.metrics,
                            &fields,
                        )
                    })
                    .collect();
                ComparisonResult {
                    window: Some(window),
                    entries,
                }
            }
            ComparisonRequest::Periods { periods, .. } => {
                let all = CampaignFilter::all();
                let totals = try_join_all(
                    periods
                        .iter()
                        .map(|period| self.aggregator.totals(user_id, *period, &all)),
                )
                .await?;
                let entries = periods
                    .iter()
                    .zip(totals)
                    .map(|(period, metrics)| {
                        entry(
                            ComparisonSubject::Period {
                                start: period.start,
                                end: period.end,
                            },
                            metrics,
                            &fields,
                        )
                    })
                    .collect();
                ComparisonResult {
                    window: None,
                    entries,
                }
            }
        };

        debug!(user_id = %user_id, entries = result.entries.len(), "Comparison built");
        Ok(result)
    }
}

fn entry(subject: ComparisonSubject, metrics: AggregatedMetrics, fields: &[MetricField]) -> ComparisonEntry {
    let values = fields
        .iter()
        .map(|f| (f.as_str().to_string(), metrics.display_value(*f)))
        .collect();
    ComparisonEntry {
        subject,
        metrics,
        values,
    }
}
