//! Job and result types exchanged with an executor.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use qkdnet_bb84::{bb84_qasm, ProtocolRun};

use crate::error::{HardwareError, HardwareResult};

pub const DEFAULT_SHOTS: u32 = 1024;
pub const DEFAULT_BACKEND: &str = "ibmq_qasm_simulator";

/// Circuit submission, serialized as the backend's submit-job body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitJob {
    pub qasm: String,
    pub shots: u32,
    pub backend: String,
    /// Width of the classical register.
    #[serde(skip)]
    pub qubits: usize,
}

impl CircuitJob {
    /// Preparation and measurement circuit of `run`.
    pub fn for_run(run: &ProtocolRun, shots: u32, backend: impl Into<String>) -> HardwareResult<Self> {
        let inputs = run.inputs();
        let qasm = bb84_qasm(&inputs.alice_bits, &inputs.alice_bases, &inputs.bob_bases)?;
        Ok(Self {
            qasm,
            shots,
            backend: backend.into(),
            qubits: inputs.len(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: JobId,
    pub backend: String,
    pub qubits: usize,
}

/// Histogram of measured bitstrings. Classical bit 0 is the rightmost
/// character of each key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementCounts {
    pub counts: BTreeMap<String, u64>,
    pub shots: u64,
}

impl MeasurementCounts {
    pub fn from_counts(counts: BTreeMap<String, u64>) -> Self {
        let shots = counts.values().sum();
        Self { counts, shots }
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Bit measured into classical bit `index` for one outcome.
    pub fn bit_at(outcome: &str, index: usize) -> HardwareResult<u8> {
        let width = outcome.len();
        if index >= width {
            return Err(HardwareError::Decode(format!(
                "outcome {outcome:?} has no classical bit {index}"
            )));
        }
        match outcome.as_bytes()[width - 1 - index] {
            b'0' => Ok(0),
            b'1' => Ok(1),
            other => Err(HardwareError::Decode(format!(
                "outcome {outcome:?} contains {:?}",
                other as char
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running,
    Completed(MeasurementCounts),
    Failed(String),
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed(_) | JobStatus::Failed(_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
    Maintenance,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantumDevice {
    pub name: String,
    pub status: DeviceStatus,
    pub queue_length: u32,
    pub n_qubits: u32,
    #[serde(default)]
    pub basis_gates: Vec<String>,
    pub simulator: bool,
}
