//! Integration tests for the report flow: aggregation through the service
//! facade, exports on disk, comparisons, and concurrent schedule firing.

#[cfg(test)]
mod tests {
    use campaign_core::{AppConfig, Campaign, CampaignStatus, DateRange, Granularity, MetricRecord};
    use campaign_reporting::export::JsonExport;
    use campaign_reporting::report_builder::ReportFilters;
    use campaign_reporting::{
        AnalyticsService, ComparisonRequest, ExportFormat, InMemoryStore, MetricField,
        ReportExporter, ReportRequest, ReportStatus, ReportStore, ReportType, ScheduleFrequency,
        ScheduleRequest,
    };
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use std::sync::Arc;
    use uuid::Uuid;

    struct Harness {
        service: Arc<AnalyticsService>,
        store: Arc<InMemoryStore>,
        config: AppConfig,
        user: Uuid,
        a: Uuid,
        b: Uuid,
        day: NaiveDate,
        _dir: tempfile::TempDir,
    }

    /// Campaign A {1000, 50, 5, 100} and B {2000, 20, 1, 50} on yesterday's date.
    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.reporting.reports_dir = dir.path().to_string_lossy().into_owned();

        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let day = Utc::now().date_naive() - Duration::days(1);
        let mut ids = Vec::new();
        for (i, name) in ["Campaign A", "Campaign B"].into_iter().enumerate() {
            let campaign = Campaign {
                id: Uuid::new_v4(),
                user_id: user,
                name: name.into(),
                status: CampaignStatus::Active,
                budget: 500.0,
                created_at: Utc.with_ymd_and_hms(2024, 1, 1 + i as u32, 0, 0, 0).unwrap(),
            };
            ids.push(campaign.id);
            store.add_campaign(campaign);
        }
        let row = |campaign_id, impressions, clicks, conversions, cost| MetricRecord {
            date: day,
            campaign_id,
            ad_id: None,
            impressions,
            clicks,
            conversions,
            cost,
            revenue: None,
        };
        store.add_records(vec![
            row(ids[0], 1000, 50, 5, 100.0),
            row(ids[1], 2000, 20, 1, 50.0),
        ]);

        let service = Arc::new(AnalyticsService::new(
            &config,
            store.clone(),
            store.clone(),
            store.clone(),
        ));
        Harness {
            service,
            store,
            config,
            user,
            a: ids[0],
            b: ids[1],
            day,
            _dir: dir,
        }
    }

    fn request(h: &Harness, report_type: ReportType, format: ExportFormat) -> ReportRequest {
        ReportRequest {
            report_type,
            name: "Yesterday".into(),
            date_range: DateRange::new(h.day, h.day).unwrap(),
            campaign_ids: vec![],
            metrics: vec![],
            filters: ReportFilters::default(),
            group_by: Granularity::Daily,
            format,
        }
    }

    #[tokio::test]
    async fn test_two_campaign_totals() {
        let h = harness();
        let report = h
            .service
            .generate_report(h.user, &request(&h, ReportType::CampaignPerformance, ExportFormat::Json))
            .await
            .unwrap();

        let totals = &report.data["totals"];
        assert_eq!(totals["impressions"], 3000);
        assert_eq!(totals["clicks"], 70);
        assert_eq!(totals["conversions"], 6);
        assert_eq!(totals["spent"], 150.0);
        assert_eq!(totals["ctr"], 2.33);
        assert_eq!(totals["conversionRate"], 8.57);
        assert_eq!(totals["cpc"], 2.14);
        assert_eq!(totals["cpa"], 25.0);

        // Per-campaign rows add up to the totals.
        let rows = report.data["rows"].as_array().unwrap();
        let impressions: u64 = rows.iter().map(|r| r["impressions"].as_u64().unwrap()).sum();
        assert_eq!(impressions, 3000);
    }

    #[tokio::test]
    async fn test_json_export_round_trip() {
        let h = harness();
        let report = h
            .service
            .generate_report(h.user, &request(&h, ReportType::BudgetAnalysis, ExportFormat::Json))
            .await
            .unwrap();
        let exporter = ReportExporter::new(&h.config.reporting);
        let artifact = exporter.export(&report, ExportFormat::Json).unwrap();
        let decoded: JsonExport = serde_json::from_slice(&std::fs::read(&artifact.path).unwrap()).unwrap();
        assert_eq!(decoded.data, report.data);
    }

    #[tokio::test]
    async fn test_every_file_format_lands_on_disk() {
        let h = harness();
        for (format, ext) in [
            (ExportFormat::Csv, ".csv"),
            (ExportFormat::Spreadsheet, ".xls"),
            (ExportFormat::Document, ".pdf"),
        ] {
            let report = h
                .service
                .generate_report(h.user, &request(&h, ReportType::CampaignPerformance, format))
                .await
                .unwrap();
            assert_eq!(report.status, ReportStatus::Completed);
            let file_url = report.file_url.expect("artifact url");
            assert!(file_url.ends_with(ext));
            let name = file_url.rsplit('/').next().unwrap();
            assert!(h._dir.path().join(name).is_file());
        }

        let page = h
            .service
            .list_reports(h.user, Some(1), Some(10), None, Some(ReportStatus::Completed))
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, 1);
    }

    #[tokio::test]
    async fn test_campaign_comparison_and_custom_report() {
        let h = harness();
        let comparison = h
            .service
            .compare(
                h.user,
                &ComparisonRequest::Campaigns {
                    campaign_ids: vec![h.b, h.a],
                    metrics: vec![MetricField::Ctr],
                },
            )
            .await
            .unwrap();
        assert_eq!(comparison.entries.len(), 2);
        assert_eq!(comparison.entries[0].values["ctr"], 1.0);
        assert_eq!(comparison.entries[1].values["ctr"], 5.0);

        let mut custom = request(&h, ReportType::Custom, ExportFormat::Json);
        custom.metrics = vec![MetricField::Cpa];
        custom.campaign_ids = vec![h.b];
        let report = h.service.generate_report(h.user, &custom).await.unwrap();
        assert_eq!(report.data["rows"][0]["cpa"], 50.0);
        assert!(report.data["rows"][0].get("ctr").is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_triggers_fire_once() {
        let h = harness();
        let report = h
            .service
            .generate_report(h.user, &request(&h, ReportType::CampaignPerformance, ExportFormat::Json))
            .await
            .unwrap();
        let schedule = h
            .service
            .schedule_report(
                h.user,
                &ScheduleRequest {
                    report_id: report.id,
                    frequency: ScheduleFrequency::Daily,
                    recipients: vec!["analytics@example.com".into()],
                    enabled: true,
                },
            )
            .await
            .unwrap();

        let now = schedule.next_run + Duration::minutes(5);
        let runs = futures::future::join_all((0..8).map(|_| {
            let service = Arc::clone(&h.service);
            tokio::spawn(async move { service.run_due_schedules(now).await })
        }))
        .await;

        let fired: usize = runs
            .into_iter()
            .map(|r| r.unwrap().unwrap().fired.len())
            .sum();
        assert_eq!(fired, 1);

        let stored = h.store.get_schedule(schedule.id).await.unwrap().unwrap();
        assert_eq!(stored.next_run, now + Duration::hours(24));
        assert_eq!(stored.last_run, Some(now));
    }
}
