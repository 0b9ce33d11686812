//! In-process executor that runs the BB84 circuit subset on an ideal device.

use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{HardwareError, HardwareResult};
use crate::executor::HardwareExecutor;
use crate::job::{CircuitJob, JobHandle, JobId, JobStatus, MeasurementCounts};

/// Single-qubit state reachable with `x` and `h` from `|0⟩`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct QubitState {
    bit: u8,
    diagonal: bool,
}

impl QubitState {
    const ZERO: QubitState = QubitState {
        bit: 0,
        diagonal: false,
    };

    fn x(&mut self) {
        // X leaves |+⟩ and |-⟩ unchanged up to a global phase.
        if !self.diagonal {
            self.bit ^= 1;
        }
    }

    fn h(&mut self) {
        self.diagonal = !self.diagonal;
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Circuit {
    qubits: Vec<QubitState>,
    /// `(qubit, classical bit)` pairs in program order.
    measurements: Vec<(usize, usize)>,
    clbits: usize,
}

fn register_size(line: &str, keyword: &str) -> Option<HardwareResult<usize>> {
    let rest = line.strip_prefix(keyword)?.trim();
    let size = rest
        .split_once('[')
        .and_then(|(_, tail)| tail.split_once(']'))
        .map(|(n, _)| n.trim().parse::<usize>());
    Some(match size {
        Some(Ok(n)) => Ok(n),
        _ => Err(HardwareError::JobFailed(format!("bad register declaration {line:?}"))),
    })
}

fn index(operand: &str, register: char, bound: usize) -> HardwareResult<usize> {
    let operand = operand.trim();
    let parsed = operand
        .strip_prefix(register)
        .and_then(|rest| rest.strip_prefix('['))
        .and_then(|rest| rest.strip_suffix(']'))
        .and_then(|n| n.trim().parse::<usize>().ok());
    match parsed {
        Some(i) if i < bound => Ok(i),
        _ => Err(HardwareError::JobFailed(format!(
            "operand {operand:?} out of range for {register}[{bound}]"
        ))),
    }
}

fn parse_circuit(qasm: &str) -> HardwareResult<Circuit> {
    let mut qubits: Vec<QubitState> = Vec::new();
    let mut clbits = 0;
    let mut measurements = Vec::new();
    for raw in qasm.lines() {
        let line = raw.split("//").next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let line = line.trim_end_matches(';').trim();
        if line.starts_with("OPENQASM") || line.starts_with("include") || line.starts_with("barrier") {
            continue;
        }
        if let Some(size) = register_size(line, "qreg") {
            qubits = vec![QubitState::ZERO; size?];
            continue;
        }
        if let Some(size) = register_size(line, "creg") {
            clbits = size?;
            continue;
        }
        let (op, operands) = line
            .split_once(char::is_whitespace)
            .ok_or_else(|| HardwareError::JobFailed(format!("unsupported instruction {line:?}")))?;
        match op {
            "x" => {
                let i = index(operands, 'q', qubits.len())?;
                qubits[i].x();
            }
            "h" => {
                let i = index(operands, 'q', qubits.len())?;
                qubits[i].h();
            }
            "measure" => {
                let (q, c) = operands.split_once("->").ok_or_else(|| {
                    HardwareError::JobFailed(format!("malformed measurement {line:?}"))
                })?;
                measurements.push((index(q, 'q', qubits.len())?, index(c, 'c', clbits)?));
            }
            other => {
                return Err(HardwareError::JobFailed(format!(
                    "gate {other:?} is not supported by the loopback device"
                )))
            }
        }
    }
    Ok(Circuit {
        qubits,
        measurements,
        clbits,
    })
}

impl Circuit {
    fn sample(&self, rng: &mut ChaCha20Rng) -> String {
        let mut bits = vec![b'0'; self.clbits];
        for &(qubit, clbit) in &self.measurements {
            let state = self.qubits[qubit];
            let outcome = if state.diagonal {
                rng.gen::<bool>() as u8
            } else {
                state.bit
            };
            // Classical bit 0 is the rightmost character.
            bits[self.clbits - 1 - clbit] = b'0' + outcome;
        }
        String::from_utf8_lossy(&bits).into_owned()
    }
}

#[derive(Debug)]
struct LoopbackJob {
    status: JobStatus,
    polls_left: u32,
}

#[derive(Debug)]
struct LoopbackState {
    rng: ChaCha20Rng,
    jobs: HashMap<JobId, LoopbackJob>,
    next_id: u64,
}

/// Ideal, noiseless executor for tests and offline demos.
///
/// `offline()` builds one that refuses every call, standing in for an
/// unreachable remote service.
#[derive(Debug)]
pub struct LoopbackExecutor {
    online: bool,
    pending_polls: u32,
    state: Mutex<LoopbackState>,
}

impl LoopbackExecutor {
    pub fn new(seed: u64) -> Self {
        Self {
            online: true,
            pending_polls: 0,
            state: Mutex::new(LoopbackState {
                rng: ChaCha20Rng::seed_from_u64(seed),
                jobs: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    pub fn offline() -> Self {
        Self {
            online: false,
            ..Self::new(0)
        }
    }

    /// Report `Running` for this many polls before completing.
    pub fn with_pending_polls(mut self, polls: u32) -> Self {
        self.pending_polls = polls;
        self
    }

    fn state(&self) -> MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_online(&self) -> HardwareResult<()> {
        if self.online {
            Ok(())
        } else {
            Err(HardwareError::RemoteServiceUnavailable(
                "loopback executor is offline".into(),
            ))
        }
    }
}

#[async_trait]
impl HardwareExecutor for LoopbackExecutor {
    async fn submit(&self, job: &CircuitJob) -> HardwareResult<JobHandle> {
        self.ensure_online()?;
        let mut state = self.state();
        let id = JobId(format!("loopback-{}", state.next_id));
        state.next_id += 1;
        let status = match parse_circuit(&job.qasm) {
            Ok(circuit) => {
                let mut counts = BTreeMap::new();
                for _ in 0..job.shots {
                    *counts.entry(circuit.sample(&mut state.rng)).or_insert(0) += 1;
                }
                JobStatus::Completed(MeasurementCounts::from_counts(counts))
            }
            Err(err) => JobStatus::Failed(err.to_string()),
        };
        state.jobs.insert(
            id.clone(),
            LoopbackJob {
                status,
                polls_left: self.pending_polls,
            },
        );
        Ok(JobHandle {
            id,
            backend: job.backend.clone(),
            qubits: job.qubits,
        })
    }

    async fn poll(&self, handle: &JobHandle) -> HardwareResult<JobStatus> {
        self.ensure_online()?;
        let mut state = self.state();
        let job = state
            .jobs
            .get_mut(&handle.id)
            .ok_or_else(|| HardwareError::JobFailed(format!("unknown job {}", handle.id)))?;
        if job.polls_left > 0 {
            job.polls_left -= 1;
            return Ok(JobStatus::Running);
        }
        Ok(job.status.clone())
    }
}
