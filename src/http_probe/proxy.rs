use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use super::prelude::*;
use super::probe::build_client;
use super::SetupError;
use crate::config::model::ProbeSettings;

/// Body accepted by the proxy endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRequest {
    #[serde(default)]
    pub host: Option<String>,

    /// Accepts both `"9000"` and `9000`.
    #[serde(default, deserialize_with = "text_or_number")]
    pub port: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
}

fn text_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Text(String),
        Number(u64),
    }

    Ok(Option::<Port>::deserialize(deserializer)?.map(|port| match port {
        Port::Text(text) => text,
        Port::Number(number) => number.to_string(),
    }))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxySuccess {
    pub success: bool,
    pub data: String,
    pub active_company_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyFailure {
    pub success: bool,
    pub message: String,
    pub error: String,
}

/// Reply of the proxy endpoint; the two shapes are told apart by their fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProxyReply {
    Success(ProxySuccess),
    Failure(ProxyFailure),
}

impl ProxyReply {
    pub fn failure(message: impl Into<String>, error: impl Into<String>) -> Self {
        ProxyReply::Failure(ProxyFailure {
            success: false,
            message: message.into(),
            error: error.into(),
        })
    }
}

impl From<&ProbeResult> for ProxyReply {
    fn from(result: &ProbeResult) -> Self {
        match result {
            ProbeResult::Success(success) => ProxyReply::Success(ProxySuccess {
                success: true,
                data: success.raw_body.clone(),
                active_company_name: success.company_name.clone(),
            }),
            ProbeResult::Failure(failure) => {
                ProxyReply::failure(failure.message.clone(), failure.cause.as_str())
            }
        }
    }
}

/// Delegates the probe to a proxy endpoint that can reach the accounting server.
#[derive(Debug, Clone)]
pub struct ProxyProber {
    client: Client,
    endpoint: Url,
    timeout: Duration,
    default_port: String,
}

impl ProxyProber {
    pub fn new(client: Client, endpoint: Url, timeout: Duration, default_port: impl Into<String>) -> Self {
        ProxyProber {
            client,
            endpoint,
            timeout,
            default_port: default_port.into(),
        }
    }

    pub fn from_settings(settings: &ProbeSettings) -> Result<Self, SetupError> {
        let endpoint = Url::parse(&settings.proxy_endpoint)?;
        Ok(ProxyProber::new(
            build_client(settings)?,
            endpoint,
            settings.timeout(),
            settings.default_port.clone(),
        ))
    }

    async fn try_probe(&self, request: &ProbeRequest) -> Result<ProbeResult, ProbeError> {
        let target = &request.target;
        // Refuse locally what the proxy would refuse, before any traffic.
        let url = target.endpoint(&self.default_port)?;

        let body = ProxyRequest {
            host: Some(target.host.clone()),
            port: Some(target.port_or(&self.default_port).to_string()),
            company_name: request.company_name.clone(),
        };

        let proxy_host = self.endpoint.host_str().unwrap_or_default().to_string();
        let proxy_port = self
            .endpoint
            .port_or_known_default()
            .map(|p| p.to_string())
            .unwrap_or_default();

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                log::debug!("Proxy request failed: {}", report(&e));
                classify(&e, &proxy_host, &proxy_port)
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| classify(&e, &proxy_host, &proxy_port))?;

        decode_reply(status, &text, url.as_str())
    }
}

/// Turns the proxy's JSON reply back into a probe result.
fn decode_reply(status: StatusCode, text: &str, url: &str) -> Result<ProbeResult, ProbeError> {
    match serde_json::from_str::<ProxyReply>(text) {
        Ok(ProxyReply::Success(success)) if success.success => {
            Ok(ProbeResult::Success(ProbeSuccess {
                url: url.to_string(),
                raw_body: success.data,
                company_name: success.active_company_name,
                timings: None,
                checked_at: Utc::now(),
            }))
        }
        Ok(ProxyReply::Success(_)) => Err(ProbeError::unknown(format!(
            "Proxy reported failure without a reason (HTTP {})",
            status.as_u16()
        ))),
        Ok(ProxyReply::Failure(failure)) => {
            let cause = match CauseCode::from_code(&failure.error) {
                CauseCode::Unknown if status == StatusCode::BAD_REQUEST => CauseCode::InvalidInput,
                cause => cause,
            };
            let upstream_status = match cause {
                CauseCode::ServerError => Some(status.as_u16()),
                _ => None,
            };
            Ok(ProbeResult::Failure(ProbeFailure {
                message: failure.message,
                cause,
                upstream_status,
            }))
        }
        Err(_) if !status.is_success() => Err(ProbeError::server_error(status, text)),
        Err(e) => Err(ProbeError::unknown(format!("Unexpected reply from proxy: {e}"))),
    }
}

#[async_trait]
impl ConnectivityProber for ProxyProber {
    fn name(&self) -> &'static str {
        "proxy"
    }

    async fn probe(&self, request: &ProbeRequest) -> ProbeResult {
        match self.try_probe(request).await {
            Ok(result) => result,
            Err(e) => {
                log::warn!("❌ Proxy probe via {} failed: {e}", self.endpoint);
                e.into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "http://localhost:9000/";

    #[test]
    fn test_request_accepts_numeric_port() {
        let request: ProxyRequest =
            serde_json::from_str(r#"{"host":"localhost","port":9000,"companyName":"Acme"}"#)
                .expect("valid json");
        assert_eq!(request.host.as_deref(), Some("localhost"));
        assert_eq!(request.port.as_deref(), Some("9000"));
        assert_eq!(request.company_name.as_deref(), Some("Acme"));

        let request: ProxyRequest = serde_json::from_str(r#"{"host":"localhost"}"#).expect("valid json");
        assert_eq!(request.port, None);
    }

    #[test]
    fn test_success_reply_keeps_null_company() {
        let reply = ProxyReply::Success(ProxySuccess {
            success: true,
            data: "<RESPONSE/>".into(),
            active_company_name: None,
        });
        let json = serde_json::to_value(&reply).expect("serializes");
        assert_eq!(
            json,
            serde_json::json!({"success": true, "data": "<RESPONSE/>", "activeCompanyName": null})
        );
    }

    #[test]
    fn test_decode_success() {
        let text = r#"{"success":true,"data":"ok","activeCompanyName":"Acme Corp"}"#;
        let result = decode_reply(StatusCode::OK, text, URL).expect("decodes");
        assert!(result.is_connected());
        assert_eq!(result.company_name(), Some("Acme Corp"));
    }

    #[test]
    fn test_decode_classified_failure() {
        let text = r#"{"success":false,"message":"Connection refused. Server is not running at localhost:9000","error":"ConnectionRefused"}"#;
        let result = decode_reply(StatusCode::SERVICE_UNAVAILABLE, text, URL).expect("decodes");
        let failure = result.failure().expect("failure");
        assert_eq!(failure.cause, CauseCode::ConnectionRefused);
        assert!(failure.message.starts_with("Connection refused"));
    }

    #[test]
    fn test_decode_missing_fields_reply() {
        let text = r#"{"success":false,"message":"Host and port are required","error":"Missing required fields"}"#;
        let result = decode_reply(StatusCode::BAD_REQUEST, text, URL).expect("decodes");
        assert_eq!(result.failure().expect("failure").cause, CauseCode::InvalidInput);
    }

    #[test]
    fn test_decode_server_error_keeps_status() {
        let text = r#"{"success":false,"message":"HTTP 403: Forbidden","error":"ServerError"}"#;
        let result = decode_reply(StatusCode::FORBIDDEN, text, URL).expect("decodes");
        assert_eq!(result.failure().expect("failure").upstream_status, Some(403));
    }

    #[test]
    fn test_decode_non_json() {
        let err = decode_reply(StatusCode::BAD_GATEWAY, "upstream down", URL).unwrap_err();
        assert_eq!(err.cause(), CauseCode::ServerError);
        assert_eq!(err.to_string(), "upstream down");

        let err = decode_reply(StatusCode::OK, "<html/>", URL).unwrap_err();
        assert_eq!(err.cause(), CauseCode::Unknown);
    }
}
