//! Custom report: per-campaign metrics restricted to the requested fields.

use super::{ReportContext, ReportProcessor, ReportType};
use crate::metrics::AggregatedMetrics;
use crate::metrics::MetricField;
use campaign_core::{CampaignError, CampaignResult};
use serde_json::{json, Map, Value};

pub struct CustomProcessor;

fn select(metrics: &AggregatedMetrics, fields: &[MetricField]) -> Map<String, Value> {
    fields
        .iter()
        .map(|f| (f.as_str().to_string(), metrics.display_value(*f)))
        .collect()
}

impl ReportProcessor for CustomProcessor {
    fn report_type(&self) -> ReportType {
        ReportType::Custom
    }

    fn process(&self, ctx: &ReportContext<'_>) -> CampaignResult<Value> {
        if ctx.metrics.is_empty() {
            return Err(CampaignError::validation(
                "custom reports need at least one requested metric",
            ));
        }

        let rows: Vec<Value> = ctx
            .aggregate
            .per_campaign
            .iter()
            .map(|c| {
                let mut row = Map::new();
                row.insert("campaignId".into(), json!(c.campaign_id));
                row.insert("campaignName".into(), json!(c.name));
                row.extend(select(&c.metrics, ctx.metrics));
                Value::Object(row)
            })
            .collect();

        let fields: Vec<&str> = ctx.metrics.iter().map(|f| f.as_str()).collect();
        Ok(json!({
            "metrics": fields,
            "totals": select(&ctx.aggregate.totals, ctx.metrics),
            "rows": rows,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::fixtures;

    #[test]
    fn test_only_requested_fields_survive() {
        let aggregate = fixtures::aggregate();
        let fields = [MetricField::Clicks, MetricField::Cpa];
        let ctx = ReportContext {
            aggregate: &aggregate,
            metrics: &fields,
            audience: None,
            funnel: None,
        };
        let payload = CustomProcessor.process(&ctx).unwrap();
        let row = payload["rows"][0].as_object().unwrap();
        let keys: Vec<&str> = row.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["campaignId", "campaignName", "clicks", "cpa"]);
        assert_eq!(row["cpa"], 20.0);
        assert_eq!(payload["totals"]["clicks"], 70);
        assert_eq!(payload["totals"]["cpa"], 25.0);
        assert!(payload["totals"].get("impressions").is_none());
    }

    #[test]
    fn test_no_requested_metrics_is_rejected() {
        let aggregate = fixtures::aggregate();
        let ctx = ReportContext {
            aggregate: &aggregate,
            metrics: &[],
            audience: None,
            funnel: None,
        };
        assert!(CustomProcessor.process(&ctx).unwrap_err().is_validation());
    }
}
