//! Telemetry facade for qkdnet binaries. Counters, latency and value samples
//! and warnings are kept in memory so tests can assert on instrumentation
//! without an exporter.

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::SystemTime,
};
use thiserror::Error;

#[cfg(any(
    all(feature = "dev", feature = "test"),
    all(feature = "dev", feature = "prod"),
    all(feature = "test", feature = "prod")
))]
compile_error!(
    "Only one of the `dev`, `test`, or `prod` features may be enabled for qkdnet-telemetry."
);

#[cfg(not(any(feature = "dev", feature = "test", feature = "prod")))]
compile_error!("Enable one of the `dev`, `test`, or `prod` features for qkdnet-telemetry.");

#[cfg(feature = "dev")]
const DEFAULT_FLUSH_MS: u64 = 1_000;
#[cfg(feature = "test")]
const DEFAULT_FLUSH_MS: u64 = 500;
#[cfg(feature = "prod")]
const DEFAULT_FLUSH_MS: u64 = 5_000;

fn default_flush_interval_ms() -> u64 {
    DEFAULT_FLUSH_MS
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct TelemetryConfig {
    /// Collector the snapshots are addressed to. Only reported, never dialled.
    pub endpoint: String,
    /// Flush cadence in milliseconds.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Labels attached to every snapshot.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl TelemetryConfig {
    pub fn sample(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_owned(),
            flush_interval_ms: default_flush_interval_ms(),
            labels: BTreeMap::from([("component".into(), "qkdnet-lab".into())]),
        }
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("counter overflow for metric {0}")]
    CounterOverflow(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryWarning {
    pub name: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub timestamp: SystemTime,
    pub labels: BTreeMap<String, String>,
    pub counters: BTreeMap<String, u64>,
    pub latencies_ms: BTreeMap<String, Vec<u64>>,
    pub samples: BTreeMap<String, Vec<f64>>,
    pub warnings: Vec<TelemetryWarning>,
}

impl TelemetrySnapshot {
    /// Counter value, zero when the counter was never touched.
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn mean_sample(&self, name: &str) -> Option<f64> {
        let values = self.samples.get(name)?;
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[derive(Default)]
struct TelemetryState {
    counters: BTreeMap<String, u64>,
    latencies_ms: BTreeMap<String, Vec<u64>>,
    samples: BTreeMap<String, Vec<f64>>,
    warnings: Vec<TelemetryWarning>,
}

#[derive(Clone)]
pub struct TelemetryHandle {
    config: TelemetryConfig,
    state: Arc<Mutex<TelemetryState>>,
}

impl TelemetryHandle {
    pub fn from_config(config: TelemetryConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(TelemetryState::default())),
        }
    }

    // A panicking recorder leaves plain maps behind, still usable.
    fn state(&self) -> MutexGuard<'_, TelemetryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_counter(&self, name: &str, delta: u64) -> Result<(), TelemetryError> {
        let mut guard = self.state();
        let entry = guard.counters.entry(name.to_owned()).or_default();
        *entry = entry
            .checked_add(delta)
            .ok_or_else(|| TelemetryError::CounterOverflow(name.to_owned()))?;
        Ok(())
    }

    pub fn record_latency_ms(&self, name: &str, value: u64) {
        self.state()
            .latencies_ms
            .entry(name.to_owned())
            .or_default()
            .push(value);
    }

    /// Record an observed value such as a QBER estimate.
    pub fn record_sample(&self, name: &str, value: f64) {
        self.state()
            .samples
            .entry(name.to_owned())
            .or_default()
            .push(value);
    }

    pub fn record_warning(&self, name: &str, message: impl Into<String>) {
        self.state().warnings.push(TelemetryWarning {
            name: name.to_owned(),
            message: message.into(),
        });
    }

    pub fn flush(&self) -> TelemetrySnapshot {
        let mut guard = self.state();
        TelemetrySnapshot {
            timestamp: SystemTime::now(),
            labels: self.config.labels.clone(),
            counters: std::mem::take(&mut guard.counters),
            latencies_ms: std::mem::take(&mut guard.latencies_ms),
            samples: std::mem::take(&mut guard.samples),
            warnings: std::mem::take(&mut guard.warnings),
        }
    }

    pub fn flush_interval(&self) -> u64 {
        self.config.flush_interval_ms
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> TelemetryHandle {
        TelemetryHandle::from_config(TelemetryConfig::sample("http://localhost:4318"))
    }

    #[test]
    fn records_counters_and_latencies() {
        let handle = handle();
        handle.record_counter("bb84.runs", 1).unwrap();
        handle.record_counter("bb84.runs", 2).unwrap();
        handle.record_latency_ms("bb84.run", 42);
        let snapshot = handle.flush();
        assert_eq!(snapshot.counter("bb84.runs"), 3);
        assert_eq!(snapshot.counter("bb84.secure"), 0);
        assert_eq!(snapshot.latencies_ms["bb84.run"], vec![42]);
    }

    #[test]
    fn detects_counter_overflow() {
        let handle = handle();
        handle.record_counter("bb84.runs", u64::MAX).unwrap();
        let err = handle.record_counter("bb84.runs", 1).unwrap_err();
        assert!(matches!(err, TelemetryError::CounterOverflow(_)));
    }

    #[test]
    fn samples_average() {
        let handle = handle();
        handle.record_sample("bb84.qber", 0.25);
        handle.record_sample("bb84.qber", 0.75);
        let snapshot = handle.flush();
        assert_eq!(snapshot.mean_sample("bb84.qber"), Some(0.5));
        assert_eq!(snapshot.mean_sample("missing"), None);
    }

    #[test]
    fn flush_clears_state() {
        let handle = handle();
        handle.record_counter("bb84.runs", 1).unwrap();
        handle.record_warning("otp.key_wraparound", "pad reused");
        let first = handle.flush();
        assert_eq!(first.warnings.len(), 1);
        let second = handle.flush();
        assert!(second.counters.is_empty());
        assert!(second.warnings.is_empty());
    }
}
