//! Tests for the telemetry model

use crate::telemetry::{
    AnyValue, KeyValue, Resource, ResourceTelemetry, Signal, TelemetryBatch, TelemetryRecord,
};

fn resource(attrs: Vec<KeyValue>) -> ResourceTelemetry {
    ResourceTelemetry::new(
        Resource::with_attributes(attrs),
        vec![TelemetryRecord::new(1, "INFO", "hello")],
    )
}

// =============================================================================
// Attribute lookup
// =============================================================================

#[test]
fn test_routing_value_present() {
    let rt = resource(vec![KeyValue::string("service.name", "checkout")]);
    assert_eq!(rt.routing_value("service.name"), Some("checkout"));
}

#[test]
fn test_routing_value_missing() {
    let rt = resource(vec![KeyValue::string("host.name", "a")]);
    assert_eq!(rt.routing_value("service.name"), None);
}

#[test]
fn test_routing_value_empty_counts_as_missing() {
    let rt = resource(vec![KeyValue::string("service.name", "")]);
    assert_eq!(rt.routing_value("service.name"), None);
}

#[test]
fn test_routing_value_non_string_counts_as_missing() {
    let rt = resource(vec![KeyValue::new("service.name", AnyValue::int(7))]);
    assert_eq!(rt.routing_value("service.name"), None);
}

#[test]
fn test_routing_value_without_resource() {
    let rt = ResourceTelemetry {
        resource: None,
        records: vec![],
    };
    assert_eq!(rt.routing_value("service.name"), None);
}

#[test]
fn test_strip_attribute_removes_all_occurrences() {
    let mut rt = resource(vec![
        KeyValue::string("service.name", "a"),
        KeyValue::string("host.name", "h"),
        KeyValue::string("service.name", "b"),
    ]);

    let removed = rt.strip_attribute("service.name");
    assert_eq!(removed.and_then(|v| v.as_str().map(str::to_owned)), Some("a".into()));

    let attrs = &rt.resource.as_ref().unwrap().attributes;
    assert_eq!(attrs.len(), 1);
    assert_eq!(attrs[0].key, "host.name");
}

#[test]
fn test_strip_attribute_absent_is_noop() {
    let mut rt = resource(vec![KeyValue::string("host.name", "h")]);
    assert!(rt.strip_attribute("service.name").is_none());
    assert_eq!(rt.resource.unwrap().attributes.len(), 1);
}

// =============================================================================
// Batch helpers
// =============================================================================

#[test]
fn test_record_count() {
    let mut second = resource(vec![]);
    second.records.push(TelemetryRecord::new(2, "WARN", "again"));
    let batch = TelemetryBatch::new(Signal::Logs, vec![resource(vec![]), second]);

    assert_eq!(batch.record_count(), 3);
    assert!(!batch.is_empty());
    assert_eq!(batch.signal(), Signal::Logs);
}

#[test]
fn test_signal_names() {
    assert_eq!(Signal::Logs.as_str(), "logs");
    assert_eq!(Signal::Metrics.as_str(), "metrics");
    assert_eq!(Signal::Traces.as_str(), "traces");
    assert_eq!(Signal::Unspecified.as_str(), "unspecified");
}
