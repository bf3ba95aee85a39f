use serde::{Deserialize, Serialize};
use url::Url;

use crate::http_probe::error::ProbeError;

/// Host and optional port of an accounting server, as entered by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTarget {
    pub host: String,
    pub port: Option<String>,
}

impl ConnectionTarget {
    pub fn new(host: impl Into<String>, port: Option<String>) -> Self {
        ConnectionTarget {
            host: host.into(),
            port: port.filter(|p| !p.trim().is_empty()),
        }
    }

    /// The port to connect to, substituting `default_port` when none was given.
    pub fn port_or<'a>(&'a self, default_port: &'a str) -> &'a str {
        self.port.as_deref().unwrap_or(default_port)
    }

    /// Host with IPv6 brackets removed, as the resolver expects it.
    pub fn resolvable_host(&self) -> &str {
        self.host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(&self.host)
    }

    /// `http://{host}:{port}/`. Ports the URL parser cannot accept surface here
    /// as `InvalidInput`, the normalizer itself does not check them.
    pub fn endpoint(&self, default_port: &str) -> Result<Url, ProbeError> {
        if self.host.trim().is_empty() {
            return Err(ProbeError::InvalidInput);
        }
        let raw = format!("http://{}:{}/", self.host, self.port_or(default_port));
        Url::parse(&raw).map_err(|_| ProbeError::InvalidInput)
    }
}

/// Splits a URL into hostname and port. The port is `None` when it is absent
/// or equal to the scheme's default.
pub fn split_host_and_port(url: &str) -> Result<ConnectionTarget, ProbeError> {
    let parsed = Url::parse(url).map_err(|_| ProbeError::InvalidInput)?;

    let host = match parsed.host_str() {
        Some(h) if !h.is_empty() => h.to_string(),
        _ => return Err(ProbeError::InvalidInput),
    };
    let port = parsed.port().map(|p| p.to_string());

    Ok(ConnectionTarget { host, port })
}

/// Joins raw form input into `host:port`, defaults the scheme to `http://`
/// and splits the result back into a validated target.
pub fn normalize(raw_host: &str, raw_port: Option<&str>) -> Result<ConnectionTarget, ProbeError> {
    let raw_host = raw_host.trim();
    let mut candidate = match raw_port.map(str::trim).filter(|p| !p.is_empty()) {
        Some(port) => format!("{raw_host}:{port}"),
        None => raw_host.to_string(),
    };

    if !candidate.starts_with("http://") && !candidate.starts_with("https://") {
        candidate = format!("http://{candidate}");
    }

    let mut target = split_host_and_port(&candidate)?;
    if target.port.is_none() {
        // The parser forgets a port equal to the scheme default, but one the
        // user typed is still the port to test.
        target.port = typed_port(&candidate);
    }
    Ok(target)
}

/// Port spelled out in the authority of an already validated URL.
fn typed_port(url: &str) -> Option<String> {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next()?;
    let host_port = authority.rsplit('@').next()?;
    if host_port.ends_with(']') {
        return None;
    }
    let (_, port) = host_port.rsplit_once(':')?;
    port.parse::<u16>().ok().map(|p| p.to_string())
}
