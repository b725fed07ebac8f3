//! Conversion funnel: stage progression with drop-off between stages.

use super::{ReportContext, ReportProcessor, ReportType};
use crate::metrics::{percentage, round2};
use campaign_core::CampaignResult;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelStage {
    pub name: String,
    pub count: u64,
}

/// Ordered funnel stages supplied by an upstream source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunnelBreakdown {
    pub stages: Vec<FunnelStage>,
}

impl FunnelBreakdown {
    /// Sum stage counts by stage name, keeping first-seen stage order.
    pub fn merge(parts: Vec<FunnelBreakdown>) -> Option<FunnelBreakdown> {
        if parts.is_empty() {
            return None;
        }
        let mut merged = FunnelBreakdown::default();
        for part in parts {
            for stage in part.stages {
                match merged.stages.iter_mut().find(|s| s.name == stage.name) {
                    Some(existing) => existing.count += stage.count,
                    None => merged.stages.push(stage),
                }
            }
        }
        Some(merged)
    }
}

pub struct ConversionFunnelProcessor;

impl ReportProcessor for ConversionFunnelProcessor {
    fn report_type(&self) -> ReportType {
        ReportType::ConversionFunnel
    }

    fn process(&self, ctx: &ReportContext<'_>) -> CampaignResult<serde_json::Value> {
        // Without a supplied funnel, the ad counters already form one.
        let (source, stages) = match ctx.funnel {
            Some(funnel) => ("supplied", funnel.stages.clone()),
            None => {
                let totals = &ctx.aggregate.totals;
                let derived = [
                    ("impressions", totals.impressions),
                    ("clicks", totals.clicks),
                    ("conversions", totals.conversions),
                ]
                .into_iter()
                .map(|(name, count)| FunnelStage {
                    name: name.to_string(),
                    count,
                })
                .collect();
                ("metrics", derived)
            }
        };

        let first = stages.first().map_or(0, |s| s.count);
        let mut previous: Option<u64> = None;
        let mut rows = Vec::with_capacity(stages.len());
        for stage in &stages {
            let entered = previous.unwrap_or(stage.count);
            rows.push(json!({
                "stage": stage.name,
                "count": stage.count,
                "droppedOff": entered.saturating_sub(stage.count),
                "stageConversionRate": round2(percentage(stage.count as f64, entered as f64)),
                "overallConversionRate": round2(percentage(stage.count as f64, first as f64)),
            }));
            previous = Some(stage.count);
        }

        let overall = stages
            .last()
            .map_or(0.0, |last| percentage(last.count as f64, first as f64));

        Ok(json!({
            "source": source,
            "overallConversionRate": round2(overall),
            "rows": rows,
        }))
    }
}
