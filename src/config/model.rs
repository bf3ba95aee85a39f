use std::time::Duration;

use serde::Deserialize;

/// Where the two probe calls are issued from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMode {
    /// Call the accounting server from this process.
    #[default]
    Direct,
    /// Ask a proxy endpoint to call it on our behalf.
    Proxy,
}

/// Top level configuration of tallyprobe.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Bind address of the proxy endpoint started by `serve`.
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default)]
    pub probe: ProbeSettings,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen: default_listen(),
            probe: ProbeSettings::default(),
        }
    }
}

/// Settings shared by both prober implementations.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeSettings {
    #[serde(default)]
    pub mode: ProbeMode,

    /// Proxy endpoint used in `proxy` mode.
    #[serde(default = "default_proxy_endpoint")]
    pub proxy_endpoint: String,

    /// Bound applied to every single HTTP call, not to the probe as a whole.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Port substituted when the user leaves it empty.
    #[serde(default = "default_port")]
    pub default_port: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl ProbeSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for ProbeSettings {
    fn default() -> Self {
        ProbeSettings {
            mode: ProbeMode::default(),
            proxy_endpoint: default_proxy_endpoint(),
            timeout_seconds: default_timeout_seconds(),
            default_port: default_port(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_proxy_endpoint() -> String {
    "http://127.0.0.1:3000/tally/api".to_string()
}

fn default_timeout_seconds() -> u64 {
    5
}

fn default_port() -> String {
    "9000".to_string()
}

fn default_user_agent() -> String {
    concat!("tallyprobe/", env!("CARGO_PKG_VERSION")).to_string()
}
