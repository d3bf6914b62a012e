use nas_engine::metrics::MetricsCollector;

#[test]
fn test_metrics_registration() {
    // Verify that all metrics can be created and registered without panicking
    let metrics = MetricsCollector::new().expect("Failed to create metrics collector");

    let rendered = metrics.render();
    assert!(rendered.is_ok(), "Failed to render metrics");

    // Labelled vecs only appear once they have values; scalars always do
    let output = rendered.unwrap();
    assert!(output.contains("nas_up"), "Missing nas_up metric");
    assert!(output.contains("nas_monitor_ticks"), "Missing tick counter");
    assert!(
        output.contains("nas_events_dropped_total"),
        "Missing dropped events counter"
    );
    assert!(!output.contains("nas_nas_"), "Namespace applied twice");
}

#[test]
fn test_metrics_update() {
    let metrics = MetricsCollector::new().expect("Failed to create metrics collector");

    metrics.up.set(1.0);
    metrics.set_gauge(&metrics.pool_size_bytes, &["tank"], 1000000.0);
    metrics.set_gauge(&metrics.disk_temperature_celsius, &["/dev/sda"], 41.0);
    metrics
        .events_total
        .with_label_values(&["smart-alert", "warning"])
        .inc();

    let rendered = metrics.render().unwrap();
    assert!(rendered.contains("nas_up 1"), "up metric not set correctly");
    assert!(rendered.contains(r#"nas_pool_size_bytes{pool="tank"} 1000000"#));
    assert!(rendered.contains(r#"nas_disk_temperature_celsius{device="/dev/sda"} 41"#));
    assert!(rendered.contains(r#"nas_events_total{kind="smart-alert",severity="warning"} 1"#));
}

#[test]
fn test_metrics_reset_clears_labelled_series_only() {
    let metrics = MetricsCollector::new().expect("Failed to create metrics collector");

    // Given: A pool series and an event count
    metrics.set_gauge(&metrics.pool_free_bytes, &["pool1"], 1000.0);
    metrics
        .events_total
        .with_label_values(&["disk-added", "info"])
        .inc();
    metrics.events_dropped_total.inc_by(3);

    // When: Resetting
    metrics.reset();

    // Then: The pool series is gone, counters survive
    let rendered = metrics.render().expect("Failed to render after reset");
    assert!(!rendered.contains("pool1"));
    assert!(rendered.contains(r#"nas_events_total{kind="disk-added",severity="info"} 1"#));
    assert!(rendered.contains("nas_events_dropped_total 3"));
}
