//! In-memory store backed by DashMap.
//!
//! Production: back the store traits with the campaign database.
//! This provides the same API surface for development and testing.

use crate::processors::{AudienceBreakdown, FunnelBreakdown};
use crate::report_builder::{Page, Report, ReportQuery};
use crate::scheduler::ScheduledReport;
use crate::store::{CampaignStore, MetricStore, ReportStore};
use async_trait::async_trait;
use campaign_core::{Campaign, CampaignResult, DateRange, MetricRecord};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;
use uuid::Uuid;

/// Thread-safe in-memory store for campaigns, metric rows, reports, and schedules.
pub struct InMemoryStore {
    /// Campaigns keyed by id, each stamped with its insertion sequence.
    campaigns: DashMap<Uuid, (u64, Campaign)>,
    next_seq: AtomicU64,
    records: DashMap<Uuid, Vec<MetricRecord>>,
    audience: DashMap<Uuid, AudienceBreakdown>,
    funnels: DashMap<Uuid, FunnelBreakdown>,
    reports: DashMap<Uuid, Report>,
    schedules: DashMap<Uuid, ScheduledReport>,
}

/// Seed file layout accepted by [`InMemoryStore::from_fixture`].
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    pub campaigns: Vec<Campaign>,
    #[serde(default)]
    pub records: Vec<MetricRecord>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            campaigns: DashMap::new(),
            next_seq: AtomicU64::new(0),
            records: DashMap::new(),
            audience: DashMap::new(),
            funnels: DashMap::new(),
            reports: DashMap::new(),
            schedules: DashMap::new(),
        }
    }

    pub fn from_fixture(fixture: Fixture) -> Self {
        let store = Self::new();
        let (campaigns, records) = (fixture.campaigns.len(), fixture.records.len());
        for campaign in fixture.campaigns {
            store.add_campaign(campaign);
        }
        store.add_records(fixture.records);
        info!(campaigns, records, "In-memory store seeded from fixture");
        store
    }

    /// Insert or replace a campaign. A replaced campaign keeps its original position.
    pub fn add_campaign(&self, campaign: Campaign) {
        match self.campaigns.entry(campaign.id) {
            dashmap::mapref::entry::Entry::Occupied(mut slot) => slot.get_mut().1 = campaign,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                slot.insert((seq, campaign));
            }
        }
    }

    pub fn add_records(&self, records: impl IntoIterator<Item = MetricRecord>) {
        for record in records {
            self.records.entry(record.campaign_id).or_default().push(record);
        }
    }

    /// Attach an upstream audience breakdown to a campaign.
    pub fn set_audience(&self, campaign_id: Uuid, breakdown: AudienceBreakdown) {
        self.audience.insert(campaign_id, breakdown);
    }

    pub fn set_funnel(&self, campaign_id: Uuid, breakdown: FunnelBreakdown) {
        self.funnels.insert(campaign_id, breakdown);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CampaignStore for InMemoryStore {
    async fn campaigns_for_user(&self, user_id: Uuid) -> CampaignResult<Vec<Campaign>> {
        let mut campaigns: Vec<(u64, Campaign)> = self
            .campaigns
            .iter()
            .filter(|entry| entry.value().1.user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        // Equal creation times fall back to insertion order.
        campaigns.sort_by(|(a_seq, a), (b_seq, b)| {
            a.created_at.cmp(&b.created_at).then(a_seq.cmp(b_seq))
        });
        Ok(campaigns.into_iter().map(|(_, c)| c).collect())
    }
}

#[async_trait]
impl MetricStore for InMemoryStore {
    async fn records_for_campaign(
        &self,
        campaign_id: Uuid,
        range: &DateRange,
    ) -> CampaignResult<Vec<MetricRecord>> {
        Ok(self
            .records
            .get(&campaign_id)
            .map(|rows| rows.iter().filter(|r| range.contains(r.date)).cloned().collect())
            .unwrap_or_default())
    }

    async fn audience_breakdown(
        &self,
        campaign_ids: &[Uuid],
        _range: &DateRange,
    ) -> CampaignResult<Option<AudienceBreakdown>> {
        let parts: Vec<AudienceBreakdown> = campaign_ids
            .iter()
            .filter_map(|id| self.audience.get(id).map(|b| b.value().clone()))
            .collect();
        Ok(AudienceBreakdown::merge(parts))
    }

    async fn funnel_breakdown(
        &self,
        campaign_ids: &[Uuid],
        _range: &DateRange,
    ) -> CampaignResult<Option<FunnelBreakdown>> {
        let parts: Vec<FunnelBreakdown> = campaign_ids
            .iter()
            .filter_map(|id| self.funnels.get(id).map(|b| b.value().clone()))
            .collect();
        Ok(FunnelBreakdown::merge(parts))
    }
}

#[async_trait]
impl ReportStore for InMemoryStore {
    async fn save_report(&self, report: &Report) -> CampaignResult<()> {
        self.reports.insert(report.id, report.clone());
        Ok(())
    }

    async fn get_report(&self, user_id: Uuid, report_id: Uuid) -> CampaignResult<Option<Report>> {
        Ok(self
            .reports
            .get(&report_id)
            .filter(|r| r.user_id == user_id)
            .map(|r| r.value().clone()))
    }

    async fn list_reports(&self, user_id: Uuid, query: &ReportQuery) -> CampaignResult<Page<Report>> {
        let mut reports: Vec<Report> = self
            .reports
            .iter()
            .filter(|r| r.user_id == user_id && query.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Page::slice(reports, query.page, query.limit))
    }

    async fn delete_report(&self, user_id: Uuid, report_id: Uuid) -> CampaignResult<Option<Report>> {
        Ok(self
            .reports
            .remove_if(&report_id, |_, r| r.user_id == user_id)
            .map(|(_, r)| r))
    }

    async fn save_schedule(&self, schedule: &ScheduledReport) -> CampaignResult<()> {
        self.schedules.insert(schedule.id, schedule.clone());
        Ok(())
    }

    async fn get_schedule(&self, schedule_id: Uuid) -> CampaignResult<Option<ScheduledReport>> {
        Ok(self.schedules.get(&schedule_id).map(|s| s.value().clone()))
    }

    async fn due_schedules(&self, now: DateTime<Utc>) -> CampaignResult<Vec<ScheduledReport>> {
        let mut due: Vec<ScheduledReport> = self
            .schedules
            .iter()
            .filter(|s| s.is_due(now))
            .map(|s| s.value().clone())
            .collect();
        due.sort_by_key(|s| s.next_run);
        Ok(due)
    }

    async fn advance_schedule(
        &self,
        schedule_id: Uuid,
        expected: DateTime<Utc>,
        next_run: DateTime<Utc>,
        fired_at: DateTime<Utc>,
    ) -> CampaignResult<bool> {
        // The shard write lock held by get_mut makes the check-and-set atomic.
        let Some(mut entry) = self.schedules.get_mut(&schedule_id) else {
            return Ok(false);
        };
        if entry.next_run != expected {
            return Ok(false);
        }
        entry.next_run = next_run;
        entry.last_run = Some(fired_at);
        Ok(true)
    }
}
