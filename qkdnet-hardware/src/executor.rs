use async_trait::async_trait;

use crate::error::HardwareResult;
use crate::job::{CircuitJob, JobHandle, JobStatus};

/// Anything that can run a circuit and report its measurement counts later.
#[async_trait]
pub trait HardwareExecutor: Send + Sync {
    async fn submit(&self, job: &CircuitJob) -> HardwareResult<JobHandle>;

    async fn poll(&self, handle: &JobHandle) -> HardwareResult<JobStatus>;
}
