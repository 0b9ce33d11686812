use pretty_assertions::assert_eq;
use qkdnet_telemetry::{TelemetryConfig, TelemetryHandle, TelemetryWarning};
use std::thread;

#[test]
fn clones_share_state_across_threads() {
    let handle = TelemetryHandle::from_config(TelemetryConfig::sample("http://localhost:4318"));
    let workers: Vec<_> = (0..4)
        .map(|_| {
            let handle = handle.clone();
            thread::spawn(move || {
                for _ in 0..250 {
                    handle.record_counter("otp.messages", 1).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    handle.record_warning("hardware.fallback", "executor offline");

    let snapshot = handle.flush();
    assert_eq!(snapshot.counter("otp.messages"), 1_000);
    assert_eq!(
        snapshot.warnings,
        vec![TelemetryWarning {
            name: "hardware.fallback".into(),
            message: "executor offline".into(),
        }]
    );
    assert_eq!(snapshot.labels["component"], "qkdnet-lab");
}

#[test]
fn config_reads_kebab_case_with_defaults() {
    let config: TelemetryConfig =
        serde_json::from_str(r#"{"endpoint": "http://collector:4318"}"#).unwrap();
    assert_eq!(config.endpoint, "http://collector:4318");
    assert!(config.flush_interval_ms > 0);
    assert!(config.labels.is_empty());

    let config: TelemetryConfig = serde_json::from_str(
        r#"{"endpoint": "x", "flush-interval-ms": 250, "labels": {"site": "lab"}}"#,
    )
    .unwrap();
    assert_eq!(config.flush_interval_ms, 250);
    assert_eq!(config.labels["site"], "lab");
}
