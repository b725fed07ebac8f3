//! Metric aggregator: loads a user's campaigns and their metric rows for a
//! date range and rolls them up per campaign, globally, and over time.

use crate::metrics::{AggregatedMetrics, GrowthMetrics};
use crate::store::{CampaignStore, MetricStore};
use crate::timeline::{bucketize, TimelineBucket};
use campaign_core::{
    Campaign, CampaignError, CampaignResult, CampaignStatus, DateRange, Granularity, MetricRecord,
};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Restricts which of a user's campaigns are aggregated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignFilter {
    /// Explicit campaigns. Every id must belong to the user.
    #[serde(default)]
    pub campaign_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub status: Option<CampaignStatus>,
}

impl CampaignFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn campaigns(ids: Vec<Uuid>) -> Self {
        Self {
            campaign_ids: Some(ids),
            status: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignMetrics {
    pub campaign_id: Uuid,
    pub name: String,
    pub status: CampaignStatus,
    pub metrics: AggregatedMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdMetrics {
    /// `None` collects rows not attributed to a specific ad.
    pub ad_id: Option<Uuid>,
    pub metrics: AggregatedMetrics,
}

/// Result of one aggregation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregate {
    pub date_range: DateRange,
    pub totals: AggregatedMetrics,
    /// One entry per requested campaign, in creation order.
    pub per_campaign: Vec<CampaignMetrics>,
    pub timeline: Vec<TimelineBucket>,
    pub previous_period: DateRange,
    pub previous_period_totals: AggregatedMetrics,
    pub growth: GrowthMetrics,
}

impl Aggregate {
    /// Campaigns by spend, highest first. Ties keep creation order.
    pub fn top_campaigns(&self, limit: usize) -> Vec<CampaignMetrics> {
        let mut ranked = self.per_campaign.clone();
        ranked.sort_by(|a, b| b.metrics.spent.total_cmp(&a.metrics.spent));
        ranked.truncate(limit);
        ranked
    }
}

/// Campaign rows loaded for one range.
struct Loaded {
    campaign: Campaign,
    records: Vec<MetricRecord>,
}

pub struct MetricAggregator {
    campaigns: Arc<dyn CampaignStore>,
    metrics: Arc<dyn MetricStore>,
    revenue_per_conversion: f64,
}

impl MetricAggregator {
    pub fn new(
        campaigns: Arc<dyn CampaignStore>,
        metrics: Arc<dyn MetricStore>,
        revenue_per_conversion: f64,
    ) -> Self {
        Self {
            campaigns,
            metrics,
            revenue_per_conversion,
        }
    }

    pub fn metric_store(&self) -> &Arc<dyn MetricStore> {
        &self.metrics
    }

    /// Full aggregation: per-campaign and global totals, a timeline at
    /// `granularity`, and growth against the preceding period of equal length.
    pub async fn aggregate(
        &self,
        user_id: Uuid,
        range: DateRange,
        filter: &CampaignFilter,
        granularity: Granularity,
    ) -> CampaignResult<Aggregate> {
        let campaigns = self.resolve_campaigns(user_id, filter).await?;
        let previous = range.previous()?;

        let (current, prior) = futures::try_join!(
            self.load(&campaigns, &range),
            self.load(&campaigns, &previous)
        )?;

        let per_campaign: Vec<CampaignMetrics> =
            current.iter().map(|l| self.campaign_metrics(l)).collect();
        let totals: AggregatedMetrics = per_campaign.iter().map(|c| c.metrics).sum();
        let previous_period_totals: AggregatedMetrics =
            prior.iter().map(|l| self.campaign_metrics(l).metrics).sum();
        let timeline = bucketize(current.iter().flat_map(|l| l.records.iter()), granularity);

        debug!(
            user_id = %user_id,
            campaigns = per_campaign.len(),
            buckets = timeline.len(),
            "Aggregated metrics for {range}"
        );

        Ok(Aggregate {
            date_range: range,
            growth: GrowthMetrics::between(&totals, &previous_period_totals),
            totals,
            per_campaign,
            timeline,
            previous_period: previous,
            previous_period_totals,
        })
    }

    /// Global totals only, without timeline or previous period.
    pub async fn totals(
        &self,
        user_id: Uuid,
        range: DateRange,
        filter: &CampaignFilter,
    ) -> CampaignResult<AggregatedMetrics> {
        let campaigns = self.resolve_campaigns(user_id, filter).await?;
        let loaded = self.load(&campaigns, &range).await?;
        Ok(loaded.iter().map(|l| self.campaign_metrics(l).metrics).sum())
    }

    /// Per-campaign totals only, in creation order.
    pub async fn campaign_totals(
        &self,
        user_id: Uuid,
        range: DateRange,
        filter: &CampaignFilter,
    ) -> CampaignResult<Vec<CampaignMetrics>> {
        let campaigns = self.resolve_campaigns(user_id, filter).await?;
        let loaded = self.load(&campaigns, &range).await?;
        Ok(loaded.iter().map(|l| self.campaign_metrics(l)).collect())
    }

    /// Per-ad rollup and raw rows for a single owned campaign.
    pub async fn campaign_detail(
        &self,
        user_id: Uuid,
        campaign_id: Uuid,
        range: DateRange,
    ) -> CampaignResult<(Campaign, Vec<AdMetrics>, Vec<MetricRecord>)> {
        let mut campaigns = self
            .resolve_campaigns(user_id, &CampaignFilter::campaigns(vec![campaign_id]))
            .await?;
        let campaign = campaigns
            .pop()
            .ok_or_else(|| CampaignError::not_found("campaign", campaign_id))?;
        let records = self.records_in_range(campaign.id, &range).await?;

        let mut order: Vec<Option<Uuid>> = Vec::new();
        let mut by_ad: HashMap<Option<Uuid>, AggregatedMetrics> = HashMap::new();
        for record in &records {
            let entry = by_ad.entry(record.ad_id).or_insert_with(|| {
                order.push(record.ad_id);
                AggregatedMetrics::default()
            });
            *entry += AggregatedMetrics::from_record(record, self.revenue_per_conversion);
        }
        let mut ads: Vec<AdMetrics> = order
            .into_iter()
            .map(|ad_id| AdMetrics {
                ad_id,
                metrics: by_ad.remove(&ad_id).unwrap_or_default(),
            })
            .collect();
        ads.sort_by(|a, b| b.metrics.spent.total_cmp(&a.metrics.spent));

        Ok((campaign, ads, records))
    }

    /// The user's campaigns narrowed by `filter`, in creation order.
    pub async fn resolve_campaigns(
        &self,
        user_id: Uuid,
        filter: &CampaignFilter,
    ) -> CampaignResult<Vec<Campaign>> {
        let mut owned = self.campaigns.campaigns_for_user(user_id).await?;
        owned.sort_by_key(|c| c.created_at);

        if let Some(ids) = &filter.campaign_ids {
            if let Some(missing) = ids.iter().find(|id| !owned.iter().any(|c| &c.id == *id)) {
                return Err(CampaignError::not_found("campaign", missing));
            }
            owned.retain(|c| ids.contains(&c.id));
        }
        if let Some(status) = filter.status {
            owned.retain(|c| c.status == status);
        }
        Ok(owned)
    }

    async fn load(&self, campaigns: &[Campaign], range: &DateRange) -> CampaignResult<Vec<Loaded>> {
        try_join_all(campaigns.iter().map(|campaign| async move {
            let records = self.records_in_range(campaign.id, range).await?;
            Ok::<_, CampaignError>(Loaded {
                campaign: campaign.clone(),
                records,
            })
        }))
        .await
    }

    /// Store rows, re-checked against campaign and range so a loose store
    /// can never leak rows across comparison periods.
    async fn records_in_range(
        &self,
        campaign_id: Uuid,
        range: &DateRange,
    ) -> CampaignResult<Vec<MetricRecord>> {
        let mut records = self.metrics.records_for_campaign(campaign_id, range).await?;
        records.retain(|r| r.campaign_id == campaign_id && range.contains(r.date));
        Ok(records)
    }

    fn campaign_metrics(&self, loaded: &Loaded) -> CampaignMetrics {
        CampaignMetrics {
            campaign_id: loaded.campaign.id,
            name: loaded.campaign.name.clone(),
            status: loaded.campaign.status,
            metrics: AggregatedMetrics::from_records(&loaded.records, self.revenue_per_conversion)
                .with_budget(loaded.campaign.budget),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn campaign(user_id: Uuid, name: &str, created_day: u32, budget: f64) -> Campaign {
        Campaign {
            id: Uuid::new_v4(),
            user_id,
            name: name.into(),
            status: CampaignStatus::Active,
            budget,
            created_at: Utc.with_ymd_and_hms(2024, 1, created_day, 0, 0, 0).unwrap(),
        }
    }

    fn record(campaign_id: Uuid, day: &str, i: u64, c: u64, v: u64, cost: f64) -> MetricRecord {
        MetricRecord {
            date: date(day),
            campaign_id,
            ad_id: None,
            impressions: i,
            clicks: c,
            conversions: v,
            cost,
            revenue: None,
        }
    }

    fn setup() -> (Arc<InMemoryStore>, MetricAggregator, Uuid, Campaign, Campaign) {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let a = campaign(user, "Campaign A", 1, 400.0);
        let b = campaign(user, "Campaign B", 2, 200.0);
        store.add_campaign(a.clone());
        store.add_campaign(b.clone());
        store.add_records(vec![
            record(a.id, "2024-03-01", 600, 30, 3, 60.0),
            record(a.id, "2024-03-02", 400, 20, 2, 40.0),
            record(b.id, "2024-03-02", 2000, 20, 1, 50.0),
            // previous period
            record(a.id, "2024-02-28", 500, 25, 2, 50.0),
        ]);
        let aggregator = MetricAggregator::new(store.clone(), store.clone(), 50.0);
        (store, aggregator, user, a, b)
    }

    #[tokio::test]
    async fn test_global_totals_are_sum_of_campaigns() {
        let (_store, aggregator, user, _a, _b) = setup();
        let range = DateRange::new(date("2024-03-01"), date("2024-03-02")).unwrap();
        let agg = aggregator
            .aggregate(user, range, &CampaignFilter::all(), Granularity::Daily)
            .await
            .unwrap();

        assert_eq!(agg.totals.impressions, 3000);
        assert_eq!(agg.totals.clicks, 70);
        assert_eq!(agg.totals.conversions, 6);
        assert_eq!(agg.totals.spent, 150.0);
        assert_eq!(agg.totals.budget, 600.0);

        let summed: AggregatedMetrics = agg.per_campaign.iter().map(|c| c.metrics).sum();
        assert_eq!(summed.impressions, agg.totals.impressions);
        assert_eq!(summed.clicks, agg.totals.clicks);
        assert_eq!(summed.conversions, agg.totals.conversions);
        assert_eq!(summed.spent, agg.totals.spent);
        assert_eq!(agg.timeline.len(), 2);
    }

    #[tokio::test]
    async fn test_previous_period_and_growth() {
        let (_store, aggregator, user, _a, _b) = setup();
        let range = DateRange::new(date("2024-03-01"), date("2024-03-02")).unwrap();
        let agg = aggregator
            .aggregate(user, range, &CampaignFilter::all(), Granularity::Daily)
            .await
            .unwrap();

        assert_eq!(agg.previous_period.start, date("2024-02-28"));
        assert_eq!(agg.previous_period.end, date("2024-02-29"));
        assert_eq!(agg.previous_period_totals.impressions, 500);
        assert_eq!(agg.growth.impressions, 500.0);
        assert_eq!(agg.growth.spent, 200.0);
    }

    #[tokio::test]
    async fn test_campaign_without_rows_is_zero_row() {
        let (store, aggregator, user, _a, _b) = setup();
        let idle = campaign(user, "Idle", 3, 0.0);
        store.add_campaign(idle.clone());
        let range = DateRange::new(date("2024-03-01"), date("2024-03-02")).unwrap();
        let agg = aggregator
            .aggregate(user, range, &CampaignFilter::all(), Granularity::Daily)
            .await
            .unwrap();

        assert_eq!(agg.per_campaign.len(), 3);
        let row = agg.per_campaign.iter().find(|c| c.campaign_id == idle.id).unwrap();
        assert!(row.metrics.is_empty());
        assert_eq!(row.metrics.ctr(), 0.0);
    }

    #[tokio::test]
    async fn test_top_campaigns_sorted_by_spend_stable() {
        let (store, aggregator, user, a, b) = setup();
        let twin = campaign(user, "Twin of B", 4, 0.0);
        store.add_campaign(twin.clone());
        store.add_records(vec![record(twin.id, "2024-03-01", 10, 1, 0, 50.0)]);
        let range = DateRange::new(date("2024-03-01"), date("2024-03-02")).unwrap();
        let agg = aggregator
            .aggregate(user, range, &CampaignFilter::all(), Granularity::Daily)
            .await
            .unwrap();

        let top: Vec<Uuid> = agg.top_campaigns(5).iter().map(|c| c.campaign_id).collect();
        assert_eq!(top, vec![a.id, b.id, twin.id]);
        assert_eq!(agg.top_campaigns(1).len(), 1);
    }

    #[tokio::test]
    async fn test_equal_creation_times_keep_insertion_order() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let inserted: Vec<Campaign> = (0..6)
            .map(|n| campaign(user, &format!("Launch {n}"), 5, 100.0))
            .collect();
        for c in &inserted {
            store.add_campaign(c.clone());
        }
        // Re-adding keeps the original slot.
        store.add_campaign(inserted[0].clone());
        let aggregator = MetricAggregator::new(store.clone(), store, 50.0);

        let range = DateRange::new(date("2024-03-01"), date("2024-03-02")).unwrap();
        let agg = aggregator
            .aggregate(user, range, &CampaignFilter::all(), Granularity::Daily)
            .await
            .unwrap();

        let expected: Vec<Uuid> = inserted.iter().map(|c| c.id).collect();
        let rows: Vec<Uuid> = agg.per_campaign.iter().map(|c| c.campaign_id).collect();
        let top: Vec<Uuid> = agg.top_campaigns(6).iter().map(|c| c.campaign_id).collect();
        assert_eq!(rows, expected);
        assert_eq!(top, expected);
    }

    #[tokio::test]
    async fn test_foreign_campaign_is_not_found() {
        let (_store, aggregator, user, _a, _b) = setup();
        let range = DateRange::new(date("2024-03-01"), date("2024-03-02")).unwrap();
        let err = aggregator
            .totals(user, range, &CampaignFilter::campaigns(vec![Uuid::new_v4()]))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_campaign_detail_groups_by_ad() {
        let (store, aggregator, user, a, _b) = setup();
        let ad = Uuid::new_v4();
        store.add_records(vec![MetricRecord {
            ad_id: Some(ad),
            ..record(a.id, "2024-03-02", 100, 10, 1, 500.0)
        }]);
        let range = DateRange::new(date("2024-03-01"), date("2024-03-02")).unwrap();
        let (campaign, ads, records) = aggregator.campaign_detail(user, a.id, range).await.unwrap();

        assert_eq!(campaign.id, a.id);
        assert_eq!(records.len(), 3);
        assert_eq!(ads.len(), 2);
        assert_eq!(ads[0].ad_id, Some(ad));
        assert_eq!(ads[1].ad_id, None);
        assert_eq!(ads[1].metrics.impressions, 1000);
    }
}
