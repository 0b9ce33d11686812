//! Lab loop: one BB84 run per iteration, followed by the configured messages,
//! an optional hardware cross-check and an optional JSON artifact.
//!
//! # Example
//! ```
//! use qkdnet_lab::config::{Config, HardwareMode};
//! use qkdnet_lab::service::LabService;
//! use qkdnet_telemetry::TelemetryHandle;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let mut cfg = Config::sample();
//! cfg.hardware.mode = HardwareMode::Disabled;
//! let telemetry = TelemetryHandle::from_config(cfg.telemetry.clone());
//! let mut service = LabService::new(&cfg, telemetry.clone()).unwrap();
//! let report = service.run_iteration(1).await.unwrap();
//! assert!(report.status.is_secure());
//! assert_eq!(telemetry.flush().counter("bb84.runs"), 1);
//! # });
//! ```

use std::{
    fs,
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use qkdnet_bb84::{Bb84Error, Bb84Simulator, KeyStatus, MessageStatus, ProtocolRun, RunArtifact};
use qkdnet_hardware::{
    CrossCheckConfig, CrossChecker, HardwareError, HardwareExecutor, LoopbackExecutor,
    RestExecutor, Verification,
};
use qkdnet_telemetry::{TelemetryError, TelemetryHandle};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{Config, HardwareMode, HardwareSection, LabSection};

pub const RUNS: &str = "bb84.runs";
pub const SECURE: &str = "bb84.secure";
pub const COMPROMISED: &str = "bb84.compromised";
pub const RUN_LATENCY: &str = "bb84.run_ms";
pub const QBER: &str = "bb84.qber";
pub const MESSAGES: &str = "otp.messages";
pub const DELIVERED: &str = "otp.delivered";
pub const TAMPERED: &str = "otp.compromised";
pub const KEY_WRAPAROUND: &str = "otp.key_wraparound";
pub const CROSS_CHECKED: &str = "hardware.cross_checked";
pub const FALLBACK: &str = "hardware.fallback";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Protocol(#[from] Bb84Error),
    #[error(transparent)]
    Hardware(#[from] HardwareError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error("unable to write artifact {path}: {source}")]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IterationReport {
    pub iteration: u32,
    pub status: KeyStatus,
    pub qber: f64,
    pub sifted_length: usize,
    /// SHA3-256 of the final key; absent when compromised.
    pub key_fingerprint: Option<String>,
    pub messages_delivered: usize,
    pub messages_compromised: usize,
    pub key_wraps: usize,
    pub verification: Option<Verification>,
    pub artifact: Option<PathBuf>,
}

pub struct LabService {
    config: LabSection,
    simulator: Bb84Simulator,
    checker: Option<CrossChecker>,
    telemetry: TelemetryHandle,
}

fn build_checker(section: &HardwareSection, seed: u64) -> Result<Option<CrossChecker>, ServiceError> {
    let executor: Arc<dyn HardwareExecutor> = match section.mode {
        HardwareMode::Disabled => return Ok(None),
        HardwareMode::Loopback => Arc::new(LoopbackExecutor::new(seed)),
        HardwareMode::Offline => Arc::new(LoopbackExecutor::offline()),
        HardwareMode::Rest => Arc::new(RestExecutor::with_timeout(
            section.base_url.clone(),
            Duration::from_millis(section.timeout_ms),
        )?),
    };
    let config = CrossCheckConfig {
        shots: section.shots,
        backend: section.backend.clone(),
        poll_interval: Duration::from_millis(section.poll_interval_ms),
        timeout: Duration::from_millis(section.timeout_ms),
    };
    Ok(Some(CrossChecker::new(executor, config)))
}

impl LabService {
    pub fn new(config: &Config, telemetry: TelemetryHandle) -> Result<Self, ServiceError> {
        let mut simulator = match config.lab.seed {
            Some(seed) => Bb84Simulator::new(seed),
            None => Bb84Simulator::from_entropy(),
        };
        simulator.set_classical_eavesdropper(config.lab.classical_eavesdropper);
        let checker = build_checker(&config.hardware, simulator.seed())?;
        Ok(Self {
            config: config.lab.clone(),
            simulator,
            checker,
            telemetry,
        })
    }

    pub fn simulator(&self) -> &Bb84Simulator {
        &self.simulator
    }

    pub async fn run_iteration(&mut self, iteration: u32) -> Result<IterationReport, ServiceError> {
        let started = Instant::now();
        let run = self
            .simulator
            .run_protocol(self.config.key_length, self.config.eavesdropper)?
            .clone();
        self.telemetry
            .record_latency_ms(RUN_LATENCY, started.elapsed().as_millis() as u64);
        self.telemetry.record_counter(RUNS, 1)?;
        self.telemetry.record_sample(QBER, run.qber());

        let mut report = IterationReport {
            iteration,
            status: run.status(),
            qber: run.qber(),
            sifted_length: run.sifted_key().len(),
            key_fingerprint: run.key_fingerprint(),
            messages_delivered: 0,
            messages_compromised: 0,
            key_wraps: 0,
            verification: None,
            artifact: None,
        };

        match run.status() {
            KeyStatus::Secure => {
                self.telemetry.record_counter(SECURE, 1)?;
                self.send_messages(&mut report)?;
            }
            KeyStatus::Compromised => {
                self.telemetry.record_counter(COMPROMISED, 1)?;
                if !self.config.messages.is_empty() {
                    warn!(iteration, qber = run.qber(), "run compromised; messages withheld");
                }
            }
        }

        report.verification = self.cross_check(&run).await?;
        report.artifact = self.export(&run, iteration)?;
        info!(
            iteration,
            status = %report.status,
            qber = report.qber,
            delivered = report.messages_delivered,
            "iteration complete"
        );
        Ok(report)
    }

    fn send_messages(&mut self, report: &mut IterationReport) -> Result<(), ServiceError> {
        for text in &self.config.messages {
            let message = match self.simulator.send_message(text) {
                Ok(message) => message,
                // A secure run that sifted nothing has no key to send with.
                Err(Bb84Error::NoSecureKey(reason)) => {
                    warn!(%reason, "messages skipped");
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            };
            self.telemetry.record_counter(MESSAGES, 1)?;
            match message.status {
                MessageStatus::Delivered => {
                    report.messages_delivered += 1;
                    self.telemetry.record_counter(DELIVERED, 1)?;
                }
                _ => {
                    report.messages_compromised += 1;
                    self.telemetry.record_counter(TAMPERED, 1)?;
                }
            }
            if message.key_wraps > 0 {
                report.key_wraps += message.key_wraps;
                self.telemetry
                    .record_counter(KEY_WRAPAROUND, message.key_wraps as u64)?;
                self.telemetry.record_warning(
                    KEY_WRAPAROUND,
                    format!("{} reused the pad {} time(s)", message.id, message.key_wraps),
                );
            }
        }
        Ok(())
    }

    async fn cross_check(&self, run: &ProtocolRun) -> Result<Option<Verification>, ServiceError> {
        let Some(checker) = &self.checker else {
            return Ok(None);
        };
        let verification = checker.verify(run).await;
        match &verification {
            Verification::CrossChecked(_) => self.telemetry.record_counter(CROSS_CHECKED, 1)?,
            Verification::LocalOnly { reason } => {
                self.telemetry.record_counter(FALLBACK, 1)?;
                self.telemetry.record_warning(FALLBACK, reason.clone());
            }
        }
        Ok(Some(verification))
    }

    fn export(&self, run: &ProtocolRun, iteration: u32) -> Result<Option<PathBuf>, ServiceError> {
        let Some(dir) = &self.config.export_dir else {
            return Ok(None);
        };
        let path = dir.join(format!("bb84-run-{iteration:04}.json"));
        let json = RunArtifact::from_run(run).to_json()?;
        fs::create_dir_all(dir)
            .and_then(|_| fs::write(&path, json))
            .map_err(|source| ServiceError::Export {
                path: path.clone(),
                source,
            })?;
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use qkdnet_telemetry::TelemetryConfig;

    use super::*;

    fn config(eavesdropper: bool) -> Config {
        Config {
            lab: LabSection {
                seed: Some(11),
                key_length: 128,
                eavesdropper,
                classical_eavesdropper: false,
                messages: vec!["HI".into()],
                export_dir: None,
            },
            hardware: HardwareSection::default(),
            telemetry: TelemetryConfig::sample("http://localhost"),
        }
    }

    #[tokio::test]
    async fn secure_iteration_sends_messages() {
        let cfg = config(false);
        let telemetry = TelemetryHandle::from_config(cfg.telemetry.clone());
        let mut service = LabService::new(&cfg, telemetry.clone()).unwrap();
        let report = service.run_iteration(1).await.unwrap();
        assert_eq!(report.status, KeyStatus::Secure);
        assert_eq!(report.messages_delivered, 1);
        assert!(report.verification.is_none());
        let snapshot = telemetry.flush();
        assert_eq!(snapshot.counter(RUNS), 1);
        assert_eq!(snapshot.counter(SECURE), 1);
        assert_eq!(snapshot.counter(DELIVERED), 1);
    }

    #[tokio::test]
    async fn compromised_iteration_withholds_messages() {
        let mut cfg = config(true);
        cfg.lab.key_length = 2000;
        let telemetry = TelemetryHandle::from_config(cfg.telemetry.clone());
        let mut service = LabService::new(&cfg, telemetry.clone()).unwrap();
        let report = service.run_iteration(1).await.unwrap();
        assert_eq!(report.status, KeyStatus::Compromised);
        assert!(report.key_fingerprint.is_none());
        let snapshot = telemetry.flush();
        assert_eq!(snapshot.counter(COMPROMISED), 1);
        assert_eq!(snapshot.counter(MESSAGES), 0);
    }
}
