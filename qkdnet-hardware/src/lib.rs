//! Optional quantum-hardware delegate for BB84 runs.
//!
//! The engine in `qkdnet-bb84` never depends on this crate for correctness.
//! A [`CrossChecker`] submits a run's OPENQASM circuit to a
//! [`HardwareExecutor`], polls until measurement counts arrive and compares
//! the remote sifted error rate with the local one. Any failure along the way
//! yields [`Verification::LocalOnly`] instead of an error.

pub mod crosscheck;
pub mod error;
pub mod executor;
pub mod job;
pub mod loopback;
pub mod rest;

pub use crosscheck::{remote_qber, CrossCheckConfig, CrossCheckReport, CrossChecker, Verification};
pub use error::{HardwareError, HardwareResult};
pub use executor::HardwareExecutor;
pub use job::{
    CircuitJob, DeviceStatus, JobHandle, JobId, JobStatus, MeasurementCounts, QuantumDevice,
    DEFAULT_BACKEND, DEFAULT_SHOTS,
};
pub use loopback::LoopbackExecutor;
pub use rest::{HealthStatus, RestExecutor, DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT};
