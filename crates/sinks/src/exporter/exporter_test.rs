//! Tests for the file exporter facade

use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use spool_config::{
    Compression, FileExporterConfig, Format, GroupByAttributeConfig, RotationConfig,
};
use spool_protocol::{
    KeyValue, Resource, ResourceTelemetry, Signal, TelemetryBatch, TelemetryRecord,
};
use tempfile::TempDir;

use super::{ExportStatus, FileExporter};
use crate::common::ErrorKind;
use crate::util::encode::EncodePipeline;

fn group(service: Option<&str>, bodies: &[&str]) -> ResourceTelemetry {
    let attributes = service
        .map(|s| vec![KeyValue::string("service.name", s)])
        .unwrap_or_default();
    let records = bodies
        .iter()
        .enumerate()
        .map(|(i, body)| TelemetryRecord::new(i as u64, "INFO", *body))
        .collect();
    ResourceTelemetry::new(Resource::with_attributes(attributes), records)
}

fn read_bodies(config: &FileExporterConfig, path: &Path) -> Vec<String> {
    let pipeline = EncodePipeline::from_config(config);
    let file = BufReader::new(File::open(path).unwrap());
    pipeline
        .reader(file)
        .read_all()
        .unwrap()
        .into_iter()
        .flat_map(|b| b.resources)
        .flat_map(|r| r.records)
        .map(|r| r.body)
        .collect()
}

fn base(dir: &TempDir) -> String {
    format!("{}/", dir.path().display())
}

#[test]
fn test_new_rejects_invalid_config() {
    let err = FileExporter::new(FileExporterConfig::default()).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test]
fn test_single_destination_in_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.json");
    let config = FileExporterConfig::new(path.display().to_string());
    let exporter = FileExporter::new(config.clone()).unwrap();

    let outcome = exporter.export(TelemetryBatch::new(
        Signal::Logs,
        vec![group(Some("a"), &["1", "2"]), group(Some("b"), &["3"])],
    ));
    assert_eq!(outcome.status(), ExportStatus::Success);
    assert_eq!(outcome.written, 3);

    exporter.export(TelemetryBatch::new(Signal::Logs, vec![group(None, &["4"])]));
    exporter.flush().unwrap();

    assert_eq!(read_bodies(&config, &path), vec!["1", "2", "3", "4"]);
}

#[test]
fn test_grouping_routes_and_defaults() {
    let dir = TempDir::new().unwrap();
    let config = FileExporterConfig::new(base(&dir))
        .with_group_by(GroupByAttributeConfig::new("service.name"));
    let exporter = FileExporter::new(config.clone()).unwrap();

    let outcome = exporter.export(TelemetryBatch::new(
        Signal::Logs,
        vec![
            group(Some("api"), &["a1"]),
            group(None, &["m1"]),
            group(Some("db"), &["d1"]),
            group(Some("api"), &["a2"]),
        ],
    ));
    assert_eq!(outcome.written, 4);
    exporter.flush().unwrap();

    assert_eq!(read_bodies(&config, &dir.path().join("api")), vec!["a1", "a2"]);
    assert_eq!(read_bodies(&config, &dir.path().join("db")), vec!["d1"]);
    assert_eq!(read_bodies(&config, &dir.path().join("MISSING")), vec!["m1"]);
}

#[test]
fn test_grouping_discards_missing() {
    let dir = TempDir::new().unwrap();
    let mut group_by = GroupByAttributeConfig::new("service.name");
    group_by.discard_if_attribute_not_found = true;
    let config = FileExporterConfig::new(base(&dir)).with_group_by(group_by);
    let exporter = FileExporter::new(config).unwrap();

    let outcome = exporter.export(TelemetryBatch::new(
        Signal::Logs,
        vec![group(None, &["x", "y"]), group(Some("api"), &["a"])],
    ));

    assert_eq!(outcome.discarded, 2);
    assert_eq!(outcome.written, 1);
    assert!(outcome.is_success());
    assert!(!dir.path().join("MISSING").exists());
    assert_eq!(exporter.metrics().records_discarded, 2);
}

#[test]
fn test_deleted_attribute_not_serialized() {
    let dir = TempDir::new().unwrap();
    let mut group_by = GroupByAttributeConfig::new("service.name");
    group_by.delete_sub_path_resource_attribute = true;
    let config = FileExporterConfig::new(base(&dir)).with_group_by(group_by);
    let exporter = FileExporter::new(config).unwrap();

    exporter.export(TelemetryBatch::new(Signal::Logs, vec![group(Some("api"), &["a"])]));
    exporter.flush().unwrap();

    let contents = fs::read_to_string(dir.path().join("api")).unwrap();
    assert!(!contents.contains("service.name"));
}

#[test]
fn test_failure_isolated_per_destination() {
    let dir = TempDir::new().unwrap();
    let mut group_by = GroupByAttributeConfig::new("service.name");
    group_by.auto_create_directories = false;
    let config = FileExporterConfig::new(base(&dir)).with_group_by(group_by);
    let exporter = FileExporter::new(config).unwrap();

    let outcome = exporter.export(TelemetryBatch::new(
        Signal::Logs,
        vec![
            group(Some("nested/api"), &["lost", "lost"]),
            group(Some("flat"), &["kept"]),
        ],
    ));

    assert_eq!(outcome.status(), ExportStatus::PartialFailure);
    assert_eq!(outcome.written, 1);
    assert_eq!(outcome.failed, 2);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].kind, ErrorKind::Resource);
    assert_eq!(outcome.failures[0].path, dir.path().join("nested/api"));
    assert!(dir.path().join("flat").exists());
}

#[test]
fn test_escaping_sub_path_fails() {
    let dir = TempDir::new().unwrap();
    let config = FileExporterConfig::new(base(&dir))
        .with_group_by(GroupByAttributeConfig::new("service.name"));
    let exporter = FileExporter::new(config).unwrap();

    let outcome = exporter.export(TelemetryBatch::new(
        Signal::Logs,
        vec![group(Some("../escape"), &["x"])],
    ));

    assert_eq!(outcome.status(), ExportStatus::Failure);
    assert_eq!(outcome.failures[0].kind, ErrorKind::Resource);
}

#[test]
fn test_proto_zstd_roundtrip_through_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.bin");
    let config = FileExporterConfig::new(path.display().to_string())
        .with_format(Format::Proto)
        .with_compression(Compression::Zstd);
    let exporter = FileExporter::new(config.clone()).unwrap();

    let batch = TelemetryBatch::new(
        Signal::Traces,
        vec![group(Some("api"), &["span-1", "span-2"])],
    );
    exporter.export(batch.clone());
    exporter.flush().unwrap();

    let pipeline = EncodePipeline::from_config(&config);
    let read = pipeline
        .reader(BufReader::new(File::open(&path).unwrap()))
        .read_all()
        .unwrap();
    assert_eq!(read, vec![batch]);
}

#[test]
fn test_rotation_applies_to_grouped_destinations() {
    let dir = TempDir::new().unwrap();
    let config = FileExporterConfig::new(base(&dir))
        .with_group_by(GroupByAttributeConfig::new("service.name"))
        .with_rotation(RotationConfig {
            max_megabytes: 1,
            max_backups: 1,
            ..RotationConfig::default()
        });
    let exporter = FileExporter::new(config).unwrap();

    let body = "x".repeat(300 * 1024);
    for _ in 0..8 {
        let outcome = exporter.export(TelemetryBatch::new(
            Signal::Logs,
            vec![group(Some("api.log"), &[body.as_str()])],
        ));
        assert!(outcome.is_success());
    }

    assert!(exporter.metrics().rotations >= 1);
    let backups = crate::util::rotation::list_backups(&dir.path().join("api.log")).unwrap();
    assert_eq!(backups.len(), 1);
}

#[test]
fn test_retention_never_removes_sibling_live_file() {
    let dir = TempDir::new().unwrap();
    let config = FileExporterConfig::new(base(&dir))
        .with_group_by(GroupByAttributeConfig::new("service.name"))
        .with_rotation(RotationConfig {
            max_megabytes: 1,
            max_backups: 1,
            ..RotationConfig::default()
        });
    let exporter = FileExporter::new(config).unwrap();

    let sibling = "app-2020-01-01T00-00-00.000";
    let outcome = exporter.export(TelemetryBatch::new(
        Signal::Logs,
        vec![group(Some(sibling), &["precious"])],
    ));
    assert_eq!(outcome.status(), ExportStatus::Failure);
    assert_eq!(outcome.failures[0].kind, ErrorKind::Resource);
    assert!(!dir.path().join(sibling).exists());

    let body = "x".repeat(400 * 1024);
    for _ in 0..6 {
        let outcome = exporter.export(TelemetryBatch::new(
            Signal::Logs,
            vec![group(Some("app"), &[body.as_str()])],
        ));
        assert!(outcome.is_success());
    }

    let backups = crate::util::rotation::list_backups(&dir.path().join("app")).unwrap();
    assert_eq!(backups.len(), 1);
    assert!(dir.path().join("app").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_flushes_and_closes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.json");
    let config = FileExporterConfig::new(path.display().to_string());
    let exporter = FileExporter::new(config.clone()).unwrap();
    exporter.start();

    exporter.export(TelemetryBatch::new(Signal::Logs, vec![group(None, &["last"])]));
    exporter.shutdown().await.unwrap();

    assert_eq!(read_bodies(&config, &path), vec!["last"]);
    assert_eq!(exporter.metrics().open_files, 0);

    let outcome = exporter.export(TelemetryBatch::new(Signal::Logs, vec![group(None, &["late"])]));
    assert_eq!(outcome.status(), ExportStatus::Failure);
    assert_eq!(outcome.failures[0].kind, ErrorKind::Closed);
}
