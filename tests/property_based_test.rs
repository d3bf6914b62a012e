//! Property-based tests using proptest
//!
//! Tests that verify properties hold for arbitrary inputs.

use chrono::{Duration, TimeZone, Utc};
use nas_engine::disk::{DiskInventory, SmartctlProbe};
use nas_engine::events::EventKind;
use nas_engine::exec::{FakeExecutor, FakeResponse};
use nas_engine::inventory::Inventory;
use nas_engine::metrics::MetricsCollector;
use nas_engine::policy::is_valid_policy_name;
use nas_engine::scan::{DiskScanner, Scanner};
use nas_engine::scheduler::Retention;
use nas_engine::smart_cache::SmartCache;
use nas_engine::store::MemoryStore;
use nas_engine::zfs::parse::parse_pool_list;
use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Helper to create a test metrics instance
fn create_test_metrics() -> MetricsCollector {
    MetricsCollector::new().expect("Failed to create metrics")
}

fn lsblk(devices: &BTreeSet<String>) -> String {
    let entries: Vec<_> = devices
        .iter()
        .map(|name| json!({ "name": name, "path": format!("/dev/{name}"), "type": "disk" }))
        .collect();
    json!({ "blockdevices": entries }).to_string()
}

/// Runs two disk scans, `before` then `after`, and returns the device paths
/// reported added and removed by the second one.
fn second_scan_diff(
    before: &BTreeSet<String>,
    after: &BTreeSet<String>,
) -> (BTreeSet<String>, BTreeSet<String>) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");

    runtime.block_on(async {
        let fake = Arc::new(FakeExecutor::new());
        let scanner = DiskScanner::new(
            DiskInventory::new(fake.clone(), false),
            Arc::new(MemoryStore::new()),
            Arc::new(Inventory::new()),
            Arc::new(SmartCache::new(Arc::new(SmartctlProbe::new(fake.clone())))),
        );
        let cancel = CancellationToken::new();

        fake.respond("lsblk", &[], FakeResponse::stdout(lsblk(before)));
        scanner.scan(&cancel).await.expect("first scan");
        fake.respond("lsblk", &[], FakeResponse::stdout(lsblk(after)));
        let events = scanner.scan(&cancel).await.expect("second scan");

        let mut added = BTreeSet::new();
        let mut removed = BTreeSet::new();
        for event in events {
            let device = event.payload["device"].as_str().unwrap_or_default().to_string();
            match event.kind {
                EventKind::DiskAdded => added.insert(device),
                EventKind::DiskRemoved => removed.insert(device),
                other => panic!("unexpected event {other:?}"),
            };
        }
        (added, removed)
    })
}

fn paths(names: &BTreeSet<String>) -> BTreeSet<String> {
    names.iter().map(|name| format!("/dev/{name}")).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_disk_events_are_the_set_difference(
        before in prop::collection::btree_set("sd[a-h]", 0..6),
        after in prop::collection::btree_set("sd[a-h]", 0..6),
    ) {
        // When: Scanning the "before" set and then the "after" set
        let (added, removed) = second_scan_diff(&before, &after);

        // Then: Added is after minus before, removed is before minus after
        let expected_added: BTreeSet<_> = paths(&after).difference(&paths(&before)).cloned().collect();
        let expected_removed: BTreeSet<_> = paths(&before).difference(&paths(&after)).cloned().collect();
        prop_assert_eq!(added, expected_added);
        prop_assert_eq!(removed, expected_removed);
    }
}

proptest! {
    #[test]
    fn test_keep_last_leaves_newest(n in 0usize..40, keep in 1usize..20) {
        // Given: n snapshots one hour apart
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let snapshots: Vec<_> = (0..n)
            .map(|i| (start + Duration::hours(i as i64), i))
            .collect();

        // When: Applying keep-last
        let expired = Retention::KeepLast(keep).select_expired(snapshots, start);

        // Then: Exactly min(n, keep) survive and they are the newest
        prop_assert_eq!(n - expired.len(), n.min(keep));
        prop_assert!(expired.iter().all(|&i| i < n.saturating_sub(keep)));
    }

    #[test]
    fn test_age_window_only_prunes_strictly_older(
        ages in prop::collection::vec(0i64..500, 0..30),
        window in 1i64..200,
    ) {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        let snapshots: Vec<_> = ages
            .iter()
            .map(|&age| (now - Duration::hours(age), age))
            .collect();

        let expired = Retention::MaxAge(Duration::hours(window)).select_expired(snapshots, now);

        let expected = ages.iter().filter(|&&age| age > window).count();
        prop_assert_eq!(expired.len(), expected);
        prop_assert!(expired.iter().all(|&age| age > window));
    }

    #[test]
    fn test_well_formed_policy_names_are_accepted(name in "[A-Za-z][A-Za-z0-9_-]{0,30}") {
        prop_assert!(is_valid_policy_name(&name));
    }

    #[test]
    fn test_policy_names_with_separators_are_rejected(
        head in "[a-z]{1,8}",
        separator in "[ @/.:]",
        tail in "[a-z]{1,8}",
    ) {
        let name = format!("{head}{separator}{tail}");
        prop_assert!(!is_valid_policy_name(&name));
    }

    #[test]
    fn test_pool_parser_never_panics(output in "\\PC*") {
        let pools = parse_pool_list(&output);
        prop_assert!(pools.iter().all(|p| !p.name.is_empty()));
    }

    #[test]
    fn test_any_label_value_renders_without_panic(pool_name in "\\PC*", status in "\\PC*") {
        // Given: A metrics collector and arbitrary label values
        let metrics = create_test_metrics();

        // When: Setting pool health with any strings
        metrics
            .pool_health
            .with_label_values(&[pool_name.as_str(), status.as_str()])
            .set(1.0);

        // Then: Rendering should not panic
        prop_assert!(metrics.render().is_ok());
    }

    #[test]
    fn test_any_temperature_renders(temp in -50.0f64..150.0f64) {
        let metrics = create_test_metrics();
        metrics.set_gauge(&metrics.disk_temperature_celsius, &["/dev/sda"], temp);

        let rendered = metrics.render().expect("render");

        prop_assert!(rendered.contains("nas_disk_temperature_celsius"));
    }
}
