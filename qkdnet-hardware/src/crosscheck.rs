//! Secondary verification of a local run against an executor's counts.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use qkdnet_bb84::ProtocolRun;

use crate::error::{HardwareError, HardwareResult};
use crate::executor::HardwareExecutor;
use crate::job::{CircuitJob, JobStatus, MeasurementCounts, DEFAULT_BACKEND, DEFAULT_SHOTS};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrossCheckConfig {
    pub shots: u32,
    pub backend: String,
    pub poll_interval: Duration,
    /// Budget for submission plus polling.
    pub timeout: Duration,
}

impl Default for CrossCheckConfig {
    fn default() -> Self {
        Self {
            shots: DEFAULT_SHOTS,
            backend: DEFAULT_BACKEND.into(),
            poll_interval: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrossCheckReport {
    pub job_id: String,
    pub backend: String,
    pub shots: u64,
    pub sifted_positions: usize,
    pub local_qber: f64,
    /// Shot-weighted mismatch rate between Alice's sifted bits and the
    /// executor's outcomes at the same positions.
    pub remote_qber: f64,
}

impl CrossCheckReport {
    pub fn discrepancy(&self) -> f64 {
        (self.remote_qber - self.local_qber).abs()
    }

    pub fn agrees(&self, tolerance: f64) -> bool {
        self.discrepancy() <= tolerance
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verification", rename_all = "kebab-case")]
pub enum Verification {
    CrossChecked(CrossCheckReport),
    /// The run stands on its local computation alone.
    LocalOnly { reason: String },
}

impl Verification {
    pub fn is_cross_checked(&self) -> bool {
        matches!(self, Verification::CrossChecked(_))
    }
}

/// Remote QBER over the sifted positions of `run`.
pub fn remote_qber(run: &ProtocolRun, counts: &MeasurementCounts) -> HardwareResult<f64> {
    let positions = &run.sift().positions;
    let expected = run.sifted_key();
    if positions.is_empty() {
        return Ok(0.0);
    }
    let width = run.key_length();
    let mut mismatches = 0u64;
    let mut observed = 0u64;
    for (outcome, count) in &counts.counts {
        if outcome.len() != width {
            return Err(HardwareError::Decode(format!(
                "outcome width {} does not match {width} qubits",
                outcome.len()
            )));
        }
        for (position, alice_bit) in positions.iter().zip(expected) {
            if MeasurementCounts::bit_at(outcome, *position)? != *alice_bit {
                mismatches += count;
            }
            observed += count;
        }
    }
    if observed == 0 {
        return Err(HardwareError::Decode("executor returned no shots".into()));
    }
    Ok(mismatches as f64 / observed as f64)
}

/// Submits a run's circuit, waits for counts and compares QBERs. Never fails:
/// any executor problem degrades the result to [`Verification::LocalOnly`].
pub struct CrossChecker {
    executor: Arc<dyn HardwareExecutor>,
    config: CrossCheckConfig,
}

impl CrossChecker {
    pub fn new(executor: Arc<dyn HardwareExecutor>, config: CrossCheckConfig) -> Self {
        Self { executor, config }
    }

    pub fn config(&self) -> &CrossCheckConfig {
        &self.config
    }

    pub async fn verify(&self, run: &ProtocolRun) -> Verification {
        let outcome = match tokio::time::timeout(self.config.timeout, self.execute(run)).await {
            Ok(result) => result,
            Err(_) => Err(HardwareError::Timeout(self.config.timeout)),
        };
        match outcome {
            Ok(report) => {
                info!(
                    job = %report.job_id,
                    local_qber = report.local_qber,
                    remote_qber = report.remote_qber,
                    "run cross-checked on executor"
                );
                Verification::CrossChecked(report)
            }
            Err(err) => {
                warn!(error = %err, "cross-check unavailable; keeping local result");
                Verification::LocalOnly {
                    reason: err.to_string(),
                }
            }
        }
    }

    async fn execute(&self, run: &ProtocolRun) -> HardwareResult<CrossCheckReport> {
        let job = CircuitJob::for_run(run, self.config.shots, self.config.backend.clone())?;
        let handle = self.executor.submit(&job).await?;
        let counts = loop {
            match self.executor.poll(&handle).await? {
                JobStatus::Completed(counts) => break counts,
                JobStatus::Failed(reason) => return Err(HardwareError::JobFailed(reason)),
                JobStatus::Pending | JobStatus::Running => {
                    tokio::time::sleep(self.config.poll_interval).await
                }
            }
        };
        Ok(CrossCheckReport {
            job_id: handle.id.0.clone(),
            backend: handle.backend.clone(),
            shots: counts.total(),
            sifted_positions: run.sift().positions.len(),
            local_qber: run.qber(),
            remote_qber: remote_qber(run, &counts)?,
        })
    }
}
