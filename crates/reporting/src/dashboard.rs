//! Campaign performance dashboard: overview, growth, and per-campaign
//! analytics payloads built from the aggregator.

use crate::aggregator::{AdMetrics, CampaignFilter, CampaignMetrics, MetricAggregator};
use crate::metrics::{AggregatedMetrics, GrowthMetrics};
use crate::processors::AudienceBreakdown;
use crate::recommendation::{Recommendation, RecommendationEngine};
use crate::timeline::{bucketize, TimelineBucket};
use campaign_core::{Campaign, CampaignResult, CampaignStatus, DateRange, Granularity, PeriodPreset};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignCounts {
    pub total: u64,
    pub draft: u64,
    pub active: u64,
    pub paused: u64,
    pub completed: u64,
}

impl CampaignCounts {
    fn tally(campaigns: &[Campaign]) -> Self {
        let mut counts = Self::default();
        for campaign in campaigns {
            counts.total += 1;
            match campaign.status {
                CampaignStatus::Draft => counts.draft += 1,
                CampaignStatus::Active => counts.active += 1,
                CampaignStatus::Paused => counts.paused += 1,
                CampaignStatus::Completed => counts.completed += 1,
            }
        }
        counts
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardPayload {
    pub period: PeriodPreset,
    pub date_range: DateRange,
    pub totals: AggregatedMetrics,
    pub previous_period_totals: AggregatedMetrics,
    pub growth: GrowthMetrics,
    pub top_campaigns: Vec<CampaignMetrics>,
    pub timeline: Vec<TimelineBucket>,
    pub campaign_counts: CampaignCounts,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewPayload {
    pub period: PeriodPreset,
    pub campaign_id: Option<Uuid>,
    pub date_range: DateRange,
    pub totals: AggregatedMetrics,
    pub previous_period: DateRange,
    pub previous_period_totals: AggregatedMetrics,
    pub growth: GrowthMetrics,
    pub timeline: Vec<TimelineBucket>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignAnalytics {
    pub campaign: Campaign,
    pub period: PeriodPreset,
    pub date_range: DateRange,
    pub breakdown: Granularity,
    pub metrics: AggregatedMetrics,
    /// Highest spend first.
    pub ads: Vec<AdMetrics>,
    pub timeline: Vec<TimelineBucket>,
    /// Only present when an upstream source supplies one.
    pub audience: Option<AudienceBreakdown>,
    pub recommendations: Vec<Recommendation>,
    pub generated_at: DateTime<Utc>,
}

pub struct CampaignDashboard {
    aggregator: Arc<MetricAggregator>,
    recommendations: Arc<RecommendationEngine>,
    top_campaigns_limit: usize,
}

impl CampaignDashboard {
    pub fn new(
        aggregator: Arc<MetricAggregator>,
        recommendations: Arc<RecommendationEngine>,
        top_campaigns_limit: usize,
    ) -> Self {
        Self {
            aggregator,
            recommendations,
            top_campaigns_limit,
        }
    }

    pub async fn dashboard(
        &self,
        user_id: Uuid,
        period: PeriodPreset,
        today: NaiveDate,
    ) -> CampaignResult<DashboardPayload> {
        let range = period.range_ending(today)?;
        let all = CampaignFilter::all();
        let (campaigns, aggregate) = futures::try_join!(
            self.aggregator.resolve_campaigns(user_id, &all),
            self.aggregator.aggregate(user_id, range, &all, Granularity::Daily)
        )?;

        Ok(DashboardPayload {
            period,
            date_range: range,
            top_campaigns: aggregate.top_campaigns(self.top_campaigns_limit),
            totals: aggregate.totals,
            previous_period_totals: aggregate.previous_period_totals,
            growth: aggregate.growth,
            timeline: aggregate.timeline,
            campaign_counts: CampaignCounts::tally(&campaigns),
            generated_at: Utc::now(),
        })
    }

    /// Totals and growth for all campaigns, or for one when `campaign_id` is set.
    pub async fn overview(
        &self,
        user_id: Uuid,
        period: PeriodPreset,
        campaign_id: Option<Uuid>,
        today: NaiveDate,
    ) -> CampaignResult<OverviewPayload> {
        let range = period.range_ending(today)?;
        let filter = match campaign_id {
            Some(id) => CampaignFilter::campaigns(vec![id]),
            None => CampaignFilter::all(),
        };
        let aggregate = self
            .aggregator
            .aggregate(user_id, range, &filter, Granularity::Daily)
            .await?;

        Ok(OverviewPayload {
            period,
            campaign_id,
            date_range: range,
            totals: aggregate.totals,
            previous_period: aggregate.previous_period,
            previous_period_totals: aggregate.previous_period_totals,
            growth: aggregate.growth,
            timeline: aggregate.timeline,
            generated_at: Utc::now(),
        })
    }

    pub async fn campaign_analytics(
        &self,
        user_id: Uuid,
        campaign_id: Uuid,
        period: PeriodPreset,
        breakdown: Granularity,
        today: NaiveDate,
    ) -> CampaignResult<CampaignAnalytics> {
        let range = period.range_ending(today)?;
        let (campaign, ads, records) = self
            .aggregator
            .campaign_detail(user_id, campaign_id, range)
            .await?;
        let audience = self
            .aggregator
            .metric_store()
            .audience_breakdown(&[campaign.id], &range)
            .await?;

        let metrics = ads
            .iter()
            .map(|a| a.metrics)
            .sum::<AggregatedMetrics>()
            .with_budget(campaign.budget);
        let recommendations = self.recommendations.recommend(&metrics);

        Ok(CampaignAnalytics {
            period,
            date_range: range,
            breakdown,
            metrics,
            timeline: bucketize(&records, breakdown),
            ads,
            audience,
            recommendations,
            campaign,
            generated_at: Utc::now(),
        })
    }
}
