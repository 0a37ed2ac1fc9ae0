//! Client configuration: service endpoints, timeout and debug output.

use std::time::Duration;

use serde::Deserialize;

pub const API_ACCOUNT: &str = "https://account.cloud.online.net";
pub const API_COMPUTE: &str = "https://api.cloud.online.net";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Endpoints and per-call settings for an `OlClient`.
///
/// Deserializes from any serde format; missing fields fall back to the
/// public Online Labs endpoints and a 60 second timeout.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub account_url: String,
    pub compute_url: String,
    #[serde(rename = "timeout_secs", deserialize_with = "secs")]
    pub timeout: Duration,
    pub debug: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            account_url: API_ACCOUNT.to_string(),
            compute_url: API_COMPUTE.to_string(),
            timeout: DEFAULT_TIMEOUT,
            debug: false,
        }
    }
}

impl ClientConfig {
    /// Point both services elsewhere, e.g. at a local mock.
    pub fn with_base_urls(mut self, account_url: &str, compute_url: &str) -> Self {
        self.account_url = account_url.to_string();
        self.compute_url = compute_url.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub(crate) fn account(&self, path: &str) -> String {
        join(&self.account_url, path)
    }

    pub(crate) fn compute(&self, path: &str) -> String {
        join(&self.compute_url, path)
    }
}

fn join(base: &str, path: &str) -> String {
    format!("{}{path}", base.trim_end_matches('/'))
}

fn secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}
