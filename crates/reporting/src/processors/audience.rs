//! Audience insights: shapes an upstream audience breakdown. No audience
//! figures are produced here; without a supplied breakdown the report is
//! empty and says so.

use super::{ReportContext, ReportProcessor, ReportType};
use crate::metrics::{conversion_rate, ctr, round2};
use campaign_core::CampaignResult;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

/// Counters for one segment of one audience dimension (e.g. `device = mobile`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentMetrics {
    pub segment: String,
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: u64,
}

/// Segment distributions keyed by dimension (`age`, `gender`, `device`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudienceBreakdown {
    pub dimensions: BTreeMap<String, Vec<SegmentMetrics>>,
}

impl AudienceBreakdown {
    /// Sum breakdowns segment-by-segment. `None` when nothing was supplied.
    pub fn merge(parts: Vec<AudienceBreakdown>) -> Option<AudienceBreakdown> {
        if parts.is_empty() {
            return None;
        }
        let mut merged = AudienceBreakdown::default();
        for part in parts {
            for (dimension, segments) in part.dimensions {
                let target = merged.dimensions.entry(dimension).or_default();
                for segment in segments {
                    match target.iter_mut().find(|s| s.segment == segment.segment) {
                        Some(existing) => {
                            existing.impressions += segment.impressions;
                            existing.clicks += segment.clicks;
                            existing.conversions += segment.conversions;
                        }
                        None => target.push(segment),
                    }
                }
            }
        }
        Some(merged)
    }
}

pub struct AudienceInsightsProcessor;

impl ReportProcessor for AudienceInsightsProcessor {
    fn report_type(&self) -> ReportType {
        ReportType::AudienceInsights
    }

    fn process(&self, ctx: &ReportContext<'_>) -> CampaignResult<serde_json::Value> {
        let Some(breakdown) = ctx.audience else {
            return Ok(json!({
                "available": false,
                "dimensions": {},
                "rows": [],
            }));
        };

        let mut rows = Vec::new();
        let mut dimensions = serde_json::Map::new();
        for (dimension, segments) in &breakdown.dimensions {
            let shaped: Vec<_> = segments
                .iter()
                .map(|s| {
                    json!({
                        "dimension": dimension,
                        "segment": s.segment,
                        "impressions": s.impressions,
                        "clicks": s.clicks,
                        "conversions": s.conversions,
                        "ctr": round2(ctr(s.clicks, s.impressions)),
                        "conversionRate": round2(conversion_rate(s.conversions, s.clicks)),
                    })
                })
                .collect();
            rows.extend(shaped.iter().cloned());
            dimensions.insert(dimension.clone(), serde_json::Value::Array(shaped));
        }

        Ok(json!({
            "available": true,
            "dimensions": dimensions,
            "rows": rows,
        }))
    }
}
