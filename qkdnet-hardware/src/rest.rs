//! HTTP client for the lab's quantum backend service.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

use crate::error::{HardwareError, HardwareResult};
use crate::executor::HardwareExecutor;
use crate::job::{CircuitJob, JobHandle, JobId, JobStatus, MeasurementCounts, QuantumDevice};

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize, PartialEq, Eq)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct DevicesResponse {
    success: bool,
    #[serde(default)]
    devices: Vec<QuantumDevice>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobResults {
    counts: BTreeMap<String, u64>,
    #[serde(default)]
    shots: u64,
}

#[derive(Debug, Deserialize)]
struct JobResponse {
    success: bool,
    job_id: Option<String>,
    #[serde(default)]
    status: String,
    results: Option<JobResults>,
    error: Option<String>,
}

impl JobResults {
    fn into_counts(self) -> MeasurementCounts {
        let mut counts = MeasurementCounts::from_counts(self.counts);
        if self.shots > 0 {
            counts.shots = self.shots;
        }
        counts
    }
}

/// Executor backed by the REST API (`/health`, `/qiskit/devices`,
/// `/qiskit/submit-job`, `/qiskit/jobs/{id}`).
///
/// The backend may answer a submission with results inline; those are kept
/// and returned by the first poll without another request.
pub struct RestExecutor {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
    inline_results: Mutex<HashMap<JobId, MeasurementCounts>>,
}

impl RestExecutor {
    pub fn new(base_url: impl Into<String>) -> HardwareResult<Self> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> HardwareResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| HardwareError::RemoteServiceUnavailable(err.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            timeout,
            client,
            inline_results: Mutex::new(HashMap::new()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn transport(&self, err: reqwest::Error) -> HardwareError {
        if err.is_timeout() {
            HardwareError::Timeout(self.timeout)
        } else if err.is_decode() {
            HardwareError::Decode(err.to_string())
        } else {
            HardwareError::RemoteServiceUnavailable(err.to_string())
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> HardwareResult<T> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| self.transport(err))?;
        response.json().await.map_err(|err| self.transport(err))
    }

    pub async fn health(&self) -> HardwareResult<HealthStatus> {
        self.get_json("health").await
    }

    pub async fn devices(&self) -> HardwareResult<Vec<QuantumDevice>> {
        let response: DevicesResponse = self.get_json("qiskit/devices").await?;
        if !response.success {
            return Err(HardwareError::RemoteServiceUnavailable(
                response.error.unwrap_or_else(|| "device listing refused".into()),
            ));
        }
        Ok(response.devices)
    }
}

fn status_from_response(response: JobResponse) -> HardwareResult<JobStatus> {
    if !response.success {
        return Ok(JobStatus::Failed(
            response.error.unwrap_or_else(|| "backend reported failure".into()),
        ));
    }
    if let Some(results) = response.results {
        return Ok(JobStatus::Completed(results.into_counts()));
    }
    match response.status.to_ascii_uppercase().as_str() {
        "QUEUED" | "INITIALIZING" | "VALIDATING" => Ok(JobStatus::Pending),
        "RUNNING" => Ok(JobStatus::Running),
        "ERROR" | "FAILED" | "CANCELLED" => Ok(JobStatus::Failed(
            response.error.unwrap_or_else(|| response.status.clone()),
        )),
        "DONE" | "COMPLETED" => Err(HardwareError::Decode(
            "job reported done without results".into(),
        )),
        other => Err(HardwareError::Decode(format!("unknown job status {other:?}"))),
    }
}

#[async_trait]
impl HardwareExecutor for RestExecutor {
    async fn submit(&self, job: &CircuitJob) -> HardwareResult<JobHandle> {
        let response: JobResponse = self
            .client
            .post(self.url("qiskit/submit-job"))
            .json(job)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| self.transport(err))?
            .json()
            .await
            .map_err(|err| self.transport(err))?;
        if !response.success {
            return Err(HardwareError::JobFailed(
                response.error.unwrap_or_else(|| "submission rejected".into()),
            ));
        }
        let id = response
            .job_id
            .clone()
            .map(JobId)
            .ok_or_else(|| HardwareError::Decode("submission response missing job_id".into()))?;
        debug!(job = %id, backend = %job.backend, "circuit submitted");
        if let Some(results) = response.results {
            self.inline_results
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(id.clone(), results.into_counts());
        }
        Ok(JobHandle {
            id,
            backend: job.backend.clone(),
            qubits: job.qubits,
        })
    }

    async fn poll(&self, handle: &JobHandle) -> HardwareResult<JobStatus> {
        let cached = self
            .inline_results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle.id);
        if let Some(counts) = cached {
            return Ok(JobStatus::Completed(counts));
        }
        let response: JobResponse = self.get_json(&format!("qiskit/jobs/{}", handle.id)).await?;
        status_from_response(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: &str) -> JobResponse {
        JobResponse {
            success: true,
            job_id: Some("job-1".into()),
            status: status.into(),
            results: None,
            error: None,
        }
    }

    #[test]
    fn maps_backend_states() {
        assert_eq!(status_from_response(response("QUEUED")).unwrap(), JobStatus::Pending);
        assert_eq!(status_from_response(response("running")).unwrap(), JobStatus::Running);
        assert!(matches!(
            status_from_response(response("CANCELLED")).unwrap(),
            JobStatus::Failed(_)
        ));
        assert!(status_from_response(response("DONE")).is_err());
        assert!(status_from_response(response("???")).is_err());
    }

    #[test]
    fn inline_results_complete_the_job() {
        let mut with_results = response("QUEUED");
        with_results.results = Some(JobResults {
            counts: BTreeMap::from([("00".into(), 512), ("11".into(), 512)]),
            shots: 1024,
        });
        match status_from_response(with_results).unwrap() {
            JobStatus::Completed(counts) => assert_eq!(counts.shots, 1024),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn joins_paths_without_double_slashes() {
        let executor = RestExecutor::new("http://localhost:5000/api/").unwrap();
        assert_eq!(executor.url("/health"), "http://localhost:5000/api/health");
        assert_eq!(
            executor.url("qiskit/devices"),
            "http://localhost:5000/api/qiskit/devices"
        );
    }
}
