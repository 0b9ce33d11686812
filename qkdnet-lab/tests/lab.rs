use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use qkdnet_bb84::{KeyStatus, RunArtifact};
use qkdnet_lab::config::{load_config, Config, ConfigError, ConfigFormat, HardwareMode};
use qkdnet_lab::service::{self, LabService};
use qkdnet_telemetry::TelemetryHandle;

fn service_for(cfg: &Config) -> (LabService, TelemetryHandle) {
    let telemetry = TelemetryHandle::from_config(cfg.telemetry.clone());
    let service = LabService::new(cfg, telemetry.clone()).unwrap();
    (service, telemetry)
}

#[test]
fn shipped_config_is_valid() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/qkdnet-lab.toml");
    let config = load_config(&path, ConfigFormat::Auto).unwrap();
    let sample = Config::sample();
    assert_eq!(config.lab, sample.lab);
    assert_eq!(config.hardware, sample.hardware);
    assert_eq!(config.telemetry.endpoint, sample.telemetry.endpoint);
    assert_eq!(config.telemetry.labels, sample.telemetry.labels);
    // Pinned in the file, so independent of the flush-interval feature.
    assert_eq!(config.telemetry.flush_interval_ms, 5_000);
}

#[test]
fn loads_yaml_by_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lab.yaml");
    fs::write(
        &path,
        "lab:\n  seed: 3\n  key-length: 16\ntelemetry:\n  endpoint: http://localhost:4318\n",
    )
    .unwrap();
    let config = load_config(&path, ConfigFormat::Auto).unwrap();
    assert_eq!(config.lab.key_length, 16);
    assert_eq!(config.lab.seed, Some(3));
}

#[test]
fn missing_file_reports_path() {
    let err = load_config(Path::new("/definitely/not/here.toml"), ConfigFormat::Auto).unwrap_err();
    match err {
        ConfigError::Io { path, .. } => assert!(path.ends_with("here.toml")),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn invalid_values_fail_validation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lab.toml");
    fs::write(
        &path,
        "[lab]\nkey-length = 0\n\n[telemetry]\nendpoint = \"http://localhost:4318\"\n",
    )
    .unwrap();
    assert!(matches!(
        load_config(&path, ConfigFormat::Auto),
        Err(ConfigError::Validation(_))
    ));
}

#[tokio::test]
async fn iterations_export_valid_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = Config::sample();
    cfg.lab.export_dir = Some(dir.path().join("runs"));
    let (mut service, telemetry) = service_for(&cfg);

    for iteration in 1..=3 {
        let report = service.run_iteration(iteration).await.unwrap();
        let path = report.artifact.expect("export dir configured");
        let artifact = RunArtifact::from_json(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(artifact.status, report.status);
        assert_eq!(artifact.sifted_key.len(), report.sifted_length);
        assert!(report.verification.unwrap().is_cross_checked());
    }
    let snapshot = telemetry.flush();
    assert_eq!(snapshot.counter(service::RUNS), 3);
    assert_eq!(snapshot.counter(service::CROSS_CHECKED), 3);
    assert_eq!(snapshot.samples[service::QBER], vec![0.0; 3]);
}

#[tokio::test]
async fn offline_hardware_falls_back() {
    let mut cfg = Config::sample();
    cfg.hardware.mode = HardwareMode::Offline;
    let (mut service, telemetry) = service_for(&cfg);
    let report = service.run_iteration(1).await.unwrap();
    assert_eq!(report.status, KeyStatus::Secure);
    assert!(!report.verification.unwrap().is_cross_checked());
    let snapshot = telemetry.flush();
    assert_eq!(snapshot.counter(service::FALLBACK), 1);
    assert!(snapshot
        .warnings
        .iter()
        .any(|w| w.name == service::FALLBACK));
}

#[tokio::test]
async fn long_messages_surface_key_reuse() {
    let mut cfg = Config::sample();
    cfg.hardware.mode = HardwareMode::Disabled;
    cfg.lab.key_length = 16;
    cfg.lab.messages = vec!["a message far longer than an eight bit key".into()];
    let (mut service, telemetry) = service_for(&cfg);
    let report = service.run_iteration(1).await.unwrap();
    assert!(report.key_wraps > 0);
    assert_eq!(report.messages_delivered, 1);
    let snapshot = telemetry.flush();
    assert_eq!(snapshot.counter(service::KEY_WRAPAROUND), report.key_wraps as u64);
}

#[tokio::test]
async fn tampered_classical_channel_marks_messages() {
    let mut cfg = Config::sample();
    cfg.hardware.mode = HardwareMode::Disabled;
    cfg.lab.classical_eavesdropper = true;
    cfg.lab.messages = vec!["tampering shows up in a message of this length".into()];
    let (mut service, telemetry) = service_for(&cfg);
    let report = service.run_iteration(1).await.unwrap();
    assert_eq!(report.messages_compromised, 1);
    assert_eq!(telemetry.flush().counter(service::TAMPERED), 1);
}
