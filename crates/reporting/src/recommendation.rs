//! Rule-based optimization recommendations over aggregated metrics.
//!
//! Rules run in a fixed order (CTR, conversion rate, CPC) so the output is
//! reproducible. Thresholds are exclusive and compared against unrounded
//! ratios.

use crate::metrics::{round2, AggregatedMetrics};
use campaign_core::config::RecommendationConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    ImproveCtr,
    OptimizeConversion,
    ReduceCpc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub kind: RecommendationType,
    pub priority: Priority,
    pub title: String,
    pub description: String,
    pub impact: String,
}

pub struct RecommendationEngine {
    thresholds: RecommendationConfig,
}

impl RecommendationEngine {
    pub fn new(thresholds: RecommendationConfig) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &RecommendationConfig {
        &self.thresholds
    }

    /// Recommendations for `metrics`, possibly none.
    pub fn recommend(&self, metrics: &AggregatedMetrics) -> Vec<Recommendation> {
        let t = &self.thresholds;
        let mut out = Vec::new();

        let ctr = metrics.ctr();
        if ctr < t.min_ctr {
            let target_clicks = metrics.impressions as f64 * t.min_ctr / 100.0;
            let gained = (target_clicks - metrics.clicks as f64).max(0.0);
            out.push(Recommendation {
                kind: RecommendationType::ImproveCtr,
                priority: Priority::High,
                title: "Improve click-through rate".into(),
                description: format!(
                    "CTR is {:.2}%, below the {:.2}% target. Test new headlines and \
                     creatives, and tighten targeting to more relevant audiences.",
                    round2(ctr),
                    t.min_ctr
                ),
                impact: format!(
                    "About {gained:.0} more clicks at the current impression volume"
                ),
            });
        }

        let conversion_rate = metrics.conversion_rate();
        if conversion_rate < t.min_conversion_rate {
            let target = metrics.clicks as f64 * t.min_conversion_rate / 100.0;
            let gained = (target - metrics.conversions as f64).max(0.0);
            out.push(Recommendation {
                kind: RecommendationType::OptimizeConversion,
                priority: Priority::High,
                title: "Optimize conversion rate".into(),
                description: format!(
                    "Conversion rate is {:.2}%, below the {:.2}% target. Review landing \
                     page relevance, load time, and the checkout flow.",
                    round2(conversion_rate),
                    t.min_conversion_rate
                ),
                impact: format!("About {gained:.0} more conversions from existing clicks"),
            });
        }

        let cpc = metrics.cpc();
        if cpc > t.max_cpc {
            let savings = (metrics.spent - metrics.clicks as f64 * t.max_cpc).max(0.0);
            out.push(Recommendation {
                kind: RecommendationType::ReduceCpc,
                priority: Priority::Medium,
                title: "Reduce cost per click".into(),
                description: format!(
                    "CPC is {:.2}, above the {:.2} ceiling. Lower bids on underperforming \
                     keywords and add negative keywords.",
                    round2(cpc),
                    t.max_cpc
                ),
                impact: format!("Up to {savings:.2} saved for the same clicks"),
            });
        }

        out
    }
}

impl Default for RecommendationEngine {
    fn default() -> Self {
        Self::new(RecommendationConfig::default())
    }
}
