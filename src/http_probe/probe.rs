use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder};
use tokio::net::lookup_host;

use super::prelude::*;
use crate::config::model::ProbeSettings;
use crate::tally::{company_collection_xml, extract_company_name};
use crate::target::ConnectionTarget;

const APPLICATION_XML: &str = "application/xml";

/// Shared HTTP client for probe calls. The per-call timeout is set on every
/// request as well, so callers may hand in a client built elsewhere.
pub fn build_client(settings: &ProbeSettings) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(settings.timeout())
        .user_agent(settings.user_agent.as_str())
        .build()
}

/// Runs the liveness and company calls against the accounting server itself.
#[derive(Debug, Clone)]
pub struct DirectProber {
    client: Client,
    timeout: Duration,
    default_port: String,
}

impl DirectProber {
    pub fn new(client: Client, timeout: Duration, default_port: impl Into<String>) -> Self {
        DirectProber {
            client,
            timeout,
            default_port: default_port.into(),
        }
    }

    pub fn from_settings(settings: &ProbeSettings) -> Result<Self, reqwest::Error> {
        Ok(DirectProber::new(
            build_client(settings)?,
            settings.timeout(),
            settings.default_port.clone(),
        ))
    }

    pub async fn try_probe(&self, target: &ConnectionTarget) -> Result<ProbeSuccess, ProbeError> {
        let url = target.endpoint(&self.default_port)?;
        let host = target.host.as_str();
        let port = target.port_or(&self.default_port);

        let dns_started = Instant::now();
        let dns_time = resolve_host(target.resolvable_host(), self.timeout)
            .await
            .map_err(|e| match e {
                ResolveError::TimedOut => ProbeError::Timeout {
                    host: host.to_string(),
                    port: port.to_string(),
                },
                ResolveError::NotFound => ProbeError::HostNotFound {
                    host: host.to_string(),
                },
            })?;

        let liveness_budget = call_budget(self.timeout, dns_started.elapsed());
        let start = Instant::now();
        let raw_body = self
            .send(self.client.get(url.clone()), liveness_budget, host, port)
            .await?;
        let liveness_time = start.elapsed().as_secs_f64();

        let start = Instant::now();
        let company_reply = self
            .send(
                self.client.post(url.clone()).body(company_collection_xml()),
                self.timeout,
                host,
                port,
            )
            .await?;
        let query_time = start.elapsed().as_secs_f64();

        let company_name = extract_company_name(&company_reply)
            .map_err(|e| ProbeError::unknown(e.to_string()))?;

        Ok(ProbeSuccess {
            url: url.to_string(),
            raw_body,
            company_name,
            timings: Some(ProbeTimings {
                dns_time: Some(dns_time),
                liveness_time,
                query_time,
            }),
            checked_at: Utc::now(),
        })
    }

    async fn send(
        &self,
        request: RequestBuilder,
        timeout: Duration,
        host: &str,
        port: &str,
    ) -> Result<String, ProbeError> {
        let response = request
            .header(ACCEPT, APPLICATION_XML)
            .header(CONTENT_TYPE, APPLICATION_XML)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                log::debug!("Request to {host}:{port} failed: {}", report(&e));
                classify(&e, host, port)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| classify(&e, host, port))?;

        if !status.is_success() {
            return Err(ProbeError::server_error(status, &body));
        }
        Ok(body)
    }
}

#[async_trait]
impl ConnectivityProber for DirectProber {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn probe(&self, request: &ProbeRequest) -> ProbeResult {
        if let Some(company) = &request.company_name {
            log::debug!("Company name {company:?} supplied, not used for matching");
        }

        let result = self.try_probe(&request.target).await;
        match &result {
            Ok(success) => log::info!(
                "✅ {} reachable, company: {}",
                success.url,
                success.company_name.as_deref().unwrap_or("N/A")
            ),
            Err(e) => log::warn!("❌ Probe of {} failed ({}): {e}", request.target.host, e.cause()),
        }
        result.into()
    }
}

enum ResolveError {
    NotFound,
    TimedOut,
}

/// Resolves `host` with the system resolver and returns the elapsed seconds.
async fn resolve_host(host: &str, timeout: Duration) -> Result<f64, ResolveError> {
    let start = Instant::now();
    let result = tokio::time::timeout(timeout, lookup_host((host, 0))).await;
    let duration = start.elapsed().as_secs_f64();

    match result {
        Ok(Ok(mut addrs)) => {
            if addrs.next().is_some() {
                Ok(duration)
            } else {
                Err(ResolveError::NotFound)
            }
        }
        Ok(Err(_)) => Err(ResolveError::NotFound),
        Err(_) => Err(ResolveError::TimedOut),
    }
}

/// Time left for the liveness call once name resolution has used its share.
/// The lookup and the liveness call together stay within one timeout.
fn call_budget(timeout: Duration, resolve_elapsed: Duration) -> Duration {
    timeout.saturating_sub(resolve_elapsed)
}
