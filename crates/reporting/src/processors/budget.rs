//! Budget analysis: spend against budget, average CPC, and cost trends.

use super::{ReportContext, ReportProcessor, ReportType};
use crate::metrics::{cpc, percentage, round2};
use campaign_core::CampaignResult;
use serde_json::json;

pub struct BudgetAnalysisProcessor;

impl ReportProcessor for BudgetAnalysisProcessor {
    fn report_type(&self) -> ReportType {
        ReportType::BudgetAnalysis
    }

    fn process(&self, ctx: &ReportContext<'_>) -> CampaignResult<serde_json::Value> {
        let totals = &ctx.aggregate.totals;

        let rows: Vec<_> = ctx
            .aggregate
            .per_campaign
            .iter()
            .map(|c| {
                let m = &c.metrics;
                json!({
                    "campaignId": c.campaign_id,
                    "campaignName": c.name,
                    "budget": round2(m.budget),
                    "spent": round2(m.spent),
                    "remaining": round2(m.budget - m.spent),
                    "budgetUtilization": round2(m.budget_utilization()),
                    "averageCPC": round2(m.cpc()),
                })
            })
            .collect();

        let cost_trends: Vec<_> = ctx
            .aggregate
            .timeline
            .iter()
            .map(|b| {
                json!({
                    "period": b.bucket_key,
                    "spent": round2(b.cost),
                    "clicks": b.clicks,
                    "cpc": round2(cpc(b.cost, b.clicks)),
                })
            })
            .collect();

        Ok(json!({
            "totalSpent": round2(totals.spent),
            "totalBudget": round2(totals.budget),
            // DIVISION_UNDEFINED when no clicks were recorded.
            "averageCPC": round2(totals.cpc()),
            "budgetUtilization": round2(percentage(totals.spent, totals.budget)),
            "costTrends": cost_trends,
            "rows": rows,
        }))
    }
}
