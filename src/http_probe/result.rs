use chrono::{DateTime, Utc};

use super::error::{CauseCode, ProbeError};

/// Per-phase durations in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeTimings {
    pub dns_time: Option<f64>,
    pub liveness_time: f64,
    pub query_time: f64,
}

impl ProbeTimings {
    pub fn total(&self) -> f64 {
        self.dns_time.unwrap_or_default() + self.liveness_time + self.query_time
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeSuccess {
    pub url: String,
    /// Body of the liveness call, passed through untouched.
    pub raw_body: String,
    pub company_name: Option<String>,
    /// Only known when the probe ran in this process.
    pub timings: Option<ProbeTimings>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeFailure {
    pub message: String,
    pub cause: CauseCode,
    pub upstream_status: Option<u16>,
}

impl From<ProbeError> for ProbeFailure {
    fn from(err: ProbeError) -> Self {
        ProbeFailure {
            message: err.to_string(),
            cause: err.cause(),
            upstream_status: err.upstream_status(),
        }
    }
}

/// Outcome of one probe. Never both, never neither.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeResult {
    Success(ProbeSuccess),
    Failure(ProbeFailure),
}

impl ProbeResult {
    pub fn is_connected(&self) -> bool {
        matches!(self, ProbeResult::Success(_))
    }

    pub fn company_name(&self) -> Option<&str> {
        match self {
            ProbeResult::Success(success) => success.company_name.as_deref(),
            ProbeResult::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&ProbeFailure> {
        match self {
            ProbeResult::Success(_) => None,
            ProbeResult::Failure(failure) => Some(failure),
        }
    }
}

impl From<ProbeError> for ProbeResult {
    fn from(err: ProbeError) -> Self {
        ProbeResult::Failure(err.into())
    }
}

impl From<Result<ProbeSuccess, ProbeError>> for ProbeResult {
    fn from(result: Result<ProbeSuccess, ProbeError>) -> Self {
        match result {
            Ok(success) => ProbeResult::Success(success),
            Err(err) => err.into(),
        }
    }
}
