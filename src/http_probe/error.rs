use std::error::Error as StdError;
use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const UNKNOWN_FALLBACK: &str = "Unknown error occurred";

/// Stable identifier of a failure bucket, shared by both probe
/// implementations and the proxy's JSON replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CauseCode {
    InvalidInput,
    NetworkUnreachable,
    ConnectionRefused,
    Timeout,
    HostNotFound,
    ServerError,
    Unknown,
}

impl CauseCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CauseCode::InvalidInput => "InvalidInput",
            CauseCode::NetworkUnreachable => "NetworkUnreachable",
            CauseCode::ConnectionRefused => "ConnectionRefused",
            CauseCode::Timeout => "Timeout",
            CauseCode::HostNotFound => "HostNotFound",
            CauseCode::ServerError => "ServerError",
            CauseCode::Unknown => "Unknown",
        }
    }

    /// Lenient inverse of [`CauseCode::as_str`]; unrecognised codes land in `Unknown`.
    pub fn from_code(code: &str) -> CauseCode {
        match code {
            "InvalidInput" => CauseCode::InvalidInput,
            "NetworkUnreachable" => CauseCode::NetworkUnreachable,
            "ConnectionRefused" => CauseCode::ConnectionRefused,
            "Timeout" => CauseCode::Timeout,
            "HostNotFound" => CauseCode::HostNotFound,
            "ServerError" => CauseCode::ServerError,
            _ => CauseCode::Unknown,
        }
    }
}

impl fmt::Display for CauseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified probe failure. The `Display` output is the message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("Invalid URL")]
    InvalidInput,

    #[error(
        "Cannot connect to {host}:{port}. Please ensure: 1) server running 2) ODBC/API enabled 3) IP/port correct 4) cross-origin access enabled"
    )]
    NetworkUnreachable { host: String, port: String },

    #[error("Connection refused. Server is not running at {host}:{port}")]
    ConnectionRefused { host: String, port: String },

    #[error("Connection timeout. Server at {host}:{port} is not responding")]
    Timeout { host: String, port: String },

    #[error("Cannot resolve host: {host}")]
    HostNotFound { host: String },

    #[error("{message}")]
    ServerError { status: u16, message: String },

    #[error("{0}")]
    Unknown(String),
}

impl ProbeError {
    pub fn cause(&self) -> CauseCode {
        match self {
            ProbeError::InvalidInput => CauseCode::InvalidInput,
            ProbeError::NetworkUnreachable { .. } => CauseCode::NetworkUnreachable,
            ProbeError::ConnectionRefused { .. } => CauseCode::ConnectionRefused,
            ProbeError::Timeout { .. } => CauseCode::Timeout,
            ProbeError::HostNotFound { .. } => CauseCode::HostNotFound,
            ProbeError::ServerError { .. } => CauseCode::ServerError,
            ProbeError::Unknown(_) => CauseCode::Unknown,
        }
    }

    /// Status code from the accounting server, when it answered at all.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            ProbeError::ServerError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Builds a `ServerError` from a non-2xx reply, preferring the body text.
    pub fn server_error(status: reqwest::StatusCode, body: &str) -> ProbeError {
        let message = if body.trim().is_empty() {
            format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or_default()
            )
        } else {
            body.to_string()
        };

        ProbeError::ServerError {
            status: status.as_u16(),
            message,
        }
    }

    pub fn unknown(message: impl Into<String>) -> ProbeError {
        let message = message.into();
        if message.trim().is_empty() {
            ProbeError::Unknown(UNKNOWN_FALLBACK.to_string())
        } else {
            ProbeError::Unknown(message)
        }
    }
}

/// Maps a transport failure against `host:port` onto the failure taxonomy.
/// Total: anything unrecognised becomes `Unknown`.
pub fn classify(err: &reqwest::Error, host: &str, port: &str) -> ProbeError {
    if err.is_builder() {
        return ProbeError::InvalidInput;
    }

    if let Some(status) = err.status() {
        return ProbeError::server_error(status, "");
    }

    if err.is_timeout() {
        return ProbeError::Timeout {
            host: host.to_string(),
            port: port.to_string(),
        };
    }

    match cause_from_chain(err) {
        Some(cause) => from_cause(cause, host, port, err),
        None if err.is_connect() => ProbeError::NetworkUnreachable {
            host: host.to_string(),
            port: port.to_string(),
        },
        None => ProbeError::unknown(err.to_string()),
    }
}

fn from_cause(cause: CauseCode, host: &str, port: &str, err: &reqwest::Error) -> ProbeError {
    let host = host.to_string();
    let port = port.to_string();
    match cause {
        CauseCode::ConnectionRefused => ProbeError::ConnectionRefused { host, port },
        CauseCode::Timeout => ProbeError::Timeout { host, port },
        CauseCode::HostNotFound => ProbeError::HostNotFound { host },
        CauseCode::NetworkUnreachable => ProbeError::NetworkUnreachable { host, port },
        _ => ProbeError::unknown(err.to_string()),
    }
}

/// Walks an error's `source()` chain looking for a recognisable network condition.
pub fn cause_from_chain(err: &(dyn StdError + 'static)) -> Option<CauseCode> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);

    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::ConnectionRefused => return Some(CauseCode::ConnectionRefused),
                io::ErrorKind::TimedOut => return Some(CauseCode::Timeout),
                io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable => {
                    return Some(CauseCode::NetworkUnreachable);
                }
                _ => {}
            }
        }

        if looks_like_dns_failure(&e.to_string()) {
            return Some(CauseCode::HostNotFound);
        }

        current = e.source();
    }

    None
}

fn looks_like_dns_failure(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("dns error")
        || message.contains("failed to lookup address")
        || message.contains("name or service not known")
        || message.contains("no such host")
        || message.contains("nodename nor servname")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Wrapper {
        message: &'static str,
        inner: Option<io::Error>,
    }

    impl fmt::Display for Wrapper {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.message)
        }
    }

    impl StdError for Wrapper {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            self.inner.as_ref().map(|e| e as &(dyn StdError + 'static))
        }
    }

    #[test]
    fn test_messages_match_taxonomy() {
        let host = "localhost".to_string();
        let port = "9000".to_string();

        assert_eq!(ProbeError::InvalidInput.to_string(), "Invalid URL");
        assert_eq!(
            ProbeError::ConnectionRefused {
                host: host.clone(),
                port: port.clone()
            }
            .to_string(),
            "Connection refused. Server is not running at localhost:9000"
        );
        assert_eq!(
            ProbeError::Timeout {
                host: host.clone(),
                port: port.clone()
            }
            .to_string(),
            "Connection timeout. Server at localhost:9000 is not responding"
        );
        assert_eq!(
            ProbeError::HostNotFound { host: host.clone() }.to_string(),
            "Cannot resolve host: localhost"
        );
        assert!(
            ProbeError::NetworkUnreachable { host, port }
                .to_string()
                .starts_with("Cannot connect to localhost:9000. Please ensure:")
        );
    }

    #[test]
    fn test_server_error_prefers_body() {
        let err = ProbeError::server_error(reqwest::StatusCode::BAD_GATEWAY, "<ERROR>busy</ERROR>");
        assert_eq!(err.to_string(), "<ERROR>busy</ERROR>");
        assert_eq!(err.upstream_status(), Some(502));
        assert_eq!(err.cause(), CauseCode::ServerError);

        let err = ProbeError::server_error(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "  ");
        assert_eq!(err.to_string(), "HTTP 500: Internal Server Error");
    }

    #[test]
    fn test_unknown_falls_back_to_generic_text() {
        assert_eq!(ProbeError::unknown("").to_string(), "Unknown error occurred");
        assert_eq!(ProbeError::unknown("boom").to_string(), "boom");
    }

    #[test]
    fn test_cause_code_round_trips_through_its_name() {
        for code in [
            CauseCode::InvalidInput,
            CauseCode::NetworkUnreachable,
            CauseCode::ConnectionRefused,
            CauseCode::Timeout,
            CauseCode::HostNotFound,
            CauseCode::ServerError,
            CauseCode::Unknown,
        ] {
            assert_eq!(CauseCode::from_code(code.as_str()), code);
        }
        assert_eq!(CauseCode::from_code("Missing required fields"), CauseCode::Unknown);
    }

    #[test]
    fn test_chain_detects_refused_connection() {
        let err = Wrapper {
            message: "error trying to connect",
            inner: Some(io::Error::new(io::ErrorKind::ConnectionRefused, "refused")),
        };
        assert_eq!(cause_from_chain(&err), Some(CauseCode::ConnectionRefused));
    }

    #[test]
    fn test_chain_detects_os_timeout_and_no_route() {
        let err = Wrapper {
            message: "error trying to connect",
            inner: Some(io::Error::new(io::ErrorKind::TimedOut, "timed out")),
        };
        assert_eq!(cause_from_chain(&err), Some(CauseCode::Timeout));

        let err = Wrapper {
            message: "error trying to connect",
            inner: Some(io::Error::new(io::ErrorKind::HostUnreachable, "no route")),
        };
        assert_eq!(cause_from_chain(&err), Some(CauseCode::NetworkUnreachable));
    }

    #[test]
    fn test_chain_detects_dns_failure() {
        let err = Wrapper {
            message: "dns error",
            inner: Some(io::Error::other("failed to lookup address information")),
        };
        assert_eq!(cause_from_chain(&err), Some(CauseCode::HostNotFound));
    }

    #[test]
    fn test_chain_without_known_condition() {
        let err = Wrapper {
            message: "something odd",
            inner: None,
        };
        assert_eq!(cause_from_chain(&err), None);
    }
}
