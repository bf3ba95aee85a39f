pub mod error;
pub mod probe;
pub mod proxy;
pub mod result;

#[cfg(test)]
pub(crate) mod test_support;

use std::fmt::Write;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::model::{ProbeMode, ProbeSettings};
use crate::target::ConnectionTarget;

pub mod prelude {
    pub use super::error::{CauseCode, ProbeError, classify};
    pub use super::result::{ProbeFailure, ProbeResult, ProbeSuccess, ProbeTimings};
    pub use super::{ConnectivityProber, ProbeRequest, report};
}

/// One connectivity test as requested by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub target: ConnectionTarget,
    /// Accepted and forwarded, but never compared with the extracted name.
    pub company_name: Option<String>,
}

impl ProbeRequest {
    pub fn new(target: ConnectionTarget) -> Self {
        ProbeRequest {
            target,
            company_name: None,
        }
    }

    pub fn with_company_name(mut self, company_name: Option<String>) -> Self {
        self.company_name = company_name.filter(|c| !c.trim().is_empty());
        self
    }
}

/// Verifies that an accounting server is reachable and reports its company.
/// Implementations never fail: every problem is folded into the result.
#[async_trait]
pub trait ConnectivityProber: Send + Sync {
    fn name(&self) -> &'static str;

    async fn probe(&self, request: &ProbeRequest) -> result::ProbeResult;
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Failed to create HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Invalid proxy endpoint: {0}")]
    ProxyEndpoint(#[from] url::ParseError),
}

/// Picks the prober implementation configured in `probe.mode`.
pub fn build_prober(settings: &ProbeSettings) -> Result<Arc<dyn ConnectivityProber>, SetupError> {
    let prober: Arc<dyn ConnectivityProber> = match settings.mode {
        ProbeMode::Direct => Arc::new(probe::DirectProber::from_settings(settings)?),
        ProbeMode::Proxy => Arc::new(proxy::ProxyProber::from_settings(settings)?),
    };
    log::debug!("Using {} prober", prober.name());
    Ok(prober)
}

pub fn report(mut err: &(dyn std::error::Error + 'static)) -> String {
    let mut s = format!("{}", err);
    while let Some(src) = err.source() {
        let _ = write!(s, "\n\nCaused by: {}", src);
        err = src;
    }
    s
}
