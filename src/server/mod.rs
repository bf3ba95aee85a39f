//! HTTP endpoint that runs probes on behalf of callers that cannot reach the
//! accounting server themselves.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::http_probe::prelude::*;
use crate::http_probe::proxy::{ProxyReply, ProxyRequest};
use crate::target::ConnectionTarget;

pub const PROBE_PATH: &str = "/tally/api";

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Failed to accept connection: {0}")]
    Accept(#[source] std::io::Error),
}

/// HTTP status used for a failed probe.
pub fn status_for(failure: &ProbeFailure) -> StatusCode {
    match failure.cause {
        CauseCode::InvalidInput => StatusCode::BAD_REQUEST,
        CauseCode::ConnectionRefused | CauseCode::HostNotFound | CauseCode::NetworkUnreachable => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        CauseCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
        CauseCode::ServerError => failure
            .upstream_status
            .and_then(|s| StatusCode::from_u16(s).ok())
            .unwrap_or(StatusCode::BAD_GATEWAY),
        CauseCode::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub struct ProxyServer {
    listener: TcpListener,
    prober: Arc<dyn ConnectivityProber>,
}

impl ProxyServer {
    pub async fn bind(addr: &str, prober: Arc<dyn ConnectivityProber>) -> Result<Self, ServeError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServeError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        Ok(ProxyServer { listener, prober })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }

    /// Serves connections until accepting fails. Each connection gets its own task.
    pub async fn run(self) -> Result<(), ServeError> {
        if let Some(addr) = self.local_addr() {
            log::info!("Proxy endpoint listening on http://{addr}{PROBE_PATH}");
        }

        loop {
            let (stream, peer) = self.listener.accept().await.map_err(ServeError::Accept)?;
            let prober = self.prober.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let prober = prober.clone();
                    async move { Ok::<_, Infallible>(handle(prober, req).await) }
                });

                if let Err(e) = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    log::warn!("Connection from {peer} ended with error: {e}");
                }
            });
        }
    }
}

async fn handle(prober: Arc<dyn ConnectivityProber>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return json_response(
                StatusCode::BAD_REQUEST,
                &ProxyReply::failure("Invalid request body", e.to_string()),
            );
        }
    };

    route(prober.as_ref(), &method, &path, &body).await
}

pub async fn route(
    prober: &dyn ConnectivityProber,
    method: &Method,
    path: &str,
    body: &[u8],
) -> Response<Full<Bytes>> {
    if path != PROBE_PATH {
        return json_response(
            StatusCode::NOT_FOUND,
            &ProxyReply::failure("Not found", format!("No route for {path}")),
        );
    }
    if *method != Method::POST {
        return json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            &ProxyReply::failure("Method not allowed", format!("{method} is not supported")),
        );
    }

    let request: ProxyRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(e) => {
            return json_response(
                StatusCode::BAD_REQUEST,
                &ProxyReply::failure("Invalid request body", e.to_string()),
            );
        }
    };

    let (host, port) = match (non_blank(request.host), non_blank(request.port)) {
        (Some(host), Some(port)) => (host, port),
        _ => {
            return json_response(
                StatusCode::BAD_REQUEST,
                &ProxyReply::failure("Host and port are required", "Missing required fields"),
            );
        }
    };

    log::info!("Testing Tally connection to {host}:{port}");
    let probe_request = ProbeRequest::new(ConnectionTarget::new(host, Some(port)))
        .with_company_name(request.company_name);

    let result = prober.probe(&probe_request).await;
    log::debug!(
        "Probe via {} finished, company: {:?}",
        prober.name(),
        result.company_name()
    );
    let status = match result.failure() {
        None => StatusCode::OK,
        Some(failure) => status_for(failure),
    };

    json_response(status, &ProxyReply::from(&result))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn json_response(status: StatusCode, reply: &ProxyReply) -> Response<Full<Bytes>> {
    let body = match serde_json::to_vec(reply) {
        Ok(body) => body,
        Err(e) => {
            log::error!("Failed to serialize reply: {e}");
            br#"{"success":false,"message":"Connection test failed","error":"Unknown"}"#.to_vec()
        }
    };

    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
