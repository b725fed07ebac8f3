//! Campaign performance: one row per campaign with its derived ratios.

use super::{ReportContext, ReportProcessor, ReportType};
use crate::aggregator::CampaignMetrics;
use crate::metrics::round2;
use campaign_core::CampaignResult;
use serde_json::json;

pub struct CampaignPerformanceProcessor;

fn performance_row(row: &CampaignMetrics) -> serde_json::Value {
    let m = &row.metrics;
    json!({
        "campaignId": row.campaign_id,
        "campaignName": row.name,
        "status": row.status,
        "impressions": m.impressions,
        "clicks": m.clicks,
        "conversions": m.conversions,
        "spent": round2(m.spent),
        "revenue": round2(m.revenue),
        "ctr": round2(m.ctr()),
        "conversionRate": round2(m.conversion_rate()),
        "cpc": round2(m.cpc()),
        "cpa": round2(m.cpa()),
        "roas": round2(m.roas()),
    })
}

impl ReportProcessor for CampaignPerformanceProcessor {
    fn report_type(&self) -> ReportType {
        ReportType::CampaignPerformance
    }

    fn process(&self, ctx: &ReportContext<'_>) -> CampaignResult<serde_json::Value> {
        let aggregate = ctx.aggregate;
        let rows: Vec<_> = aggregate.per_campaign.iter().map(performance_row).collect();
        Ok(json!({
            "rows": rows,
            "totals": aggregate.totals,
            "timeline": aggregate.timeline,
            "growth": aggregate.growth,
        }))
    }
}
