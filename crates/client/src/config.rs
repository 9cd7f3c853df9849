//! Client configuration loaded from environment variables.

use std::time::Duration;

/// Base URL used when `UPSCALER_API_URL` is not set.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";

/// Bounded wait for the progress channel before submitting anyway.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(5);

/// Grace period between artifact retrieval and server-side cleanup.
pub const DEFAULT_CLEANUP_DELAY: Duration = Duration::from_secs(5);

/// Interval of the status-poll fallback.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Endpoints and timings for talking to the upscaling backend.
///
/// Resolved once at startup. Every field has a default suitable for a
/// backend running locally next to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// HTTP base URL (e.g. `http://127.0.0.1:8000`).
    pub api_url: String,
    /// WebSocket base URL (e.g. `ws://127.0.0.1:8000`).
    pub ws_url: String,
    pub ready_timeout: Duration,
    pub cleanup_delay: Duration,
    pub poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_api_url(DEFAULT_API_URL)
    }
}

impl ClientConfig {
    /// Configuration for `api_url` with the WebSocket URL derived from it
    /// and default timings.
    pub fn from_api_url(api_url: &str) -> Self {
        let api_url = normalize_base(api_url);
        Self {
            ws_url: derive_ws_url(&api_url),
            api_url,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            cleanup_delay: DEFAULT_CLEANUP_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Load configuration from the process environment.
    ///
    /// | Env Var                     | Default                  |
    /// |-----------------------------|--------------------------|
    /// | `UPSCALER_API_URL`          | `http://127.0.0.1:8000`  |
    /// | `UPSCALER_WS_URL`           | derived from the API URL |
    /// | `UPSCALER_READY_TIMEOUT_MS` | `5000`                   |
    /// | `UPSCALER_CLEANUP_DELAY_MS` | `5000`                   |
    /// | `UPSCALER_POLL_INTERVAL_MS` | `1000`                   |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reading values through
    /// `lookup`. Unparsable durations fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("UPSCALER_API_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let mut config = Self::from_api_url(&api_url);

        if let Some(ws_url) = lookup("UPSCALER_WS_URL").filter(|v| !v.trim().is_empty()) {
            config.ws_url = normalize_base(&ws_url);
        }

        let millis = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };
        config.ready_timeout = millis("UPSCALER_READY_TIMEOUT_MS", DEFAULT_READY_TIMEOUT);
        config.cleanup_delay = millis("UPSCALER_CLEANUP_DELAY_MS", DEFAULT_CLEANUP_DELAY);
        config.poll_interval = millis("UPSCALER_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL);

        config
    }

    /// Point at another backend, re-deriving the WebSocket URL.
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = normalize_base(api_url);
        self.ws_url = derive_ws_url(&self.api_url);
        self
    }

    pub fn with_ws_url(mut self, ws_url: &str) -> Self {
        self.ws_url = normalize_base(ws_url);
        self
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    pub fn with_cleanup_delay(mut self, delay: Duration) -> Self {
        self.cleanup_delay = delay;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

fn normalize_base(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Map an HTTP base URL onto the matching WebSocket scheme.
pub fn derive_ws_url(api_url: &str) -> String {
    if let Some(rest) = api_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        format!("ws://{api_url}")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_target_local_backend() {
        let config = ClientConfig::from_lookup(|_| None);
        assert_eq!(config.api_url, "http://127.0.0.1:8000");
        assert_eq!(config.ws_url, "ws://127.0.0.1:8000");
        assert_eq!(config.ready_timeout, Duration::from_secs(5));
        assert_eq!(config.cleanup_delay, Duration::from_secs(5));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn api_override_derives_ws_scheme() {
        let config =
            ClientConfig::from_lookup(lookup_from(&[("UPSCALER_API_URL", "https://up.example.com/")]));
        assert_eq!(config.api_url, "https://up.example.com");
        assert_eq!(config.ws_url, "wss://up.example.com");
    }

    #[test]
    fn explicit_ws_url_wins() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("UPSCALER_API_URL", "http://10.0.0.2:8000"),
            ("UPSCALER_WS_URL", "ws://10.0.0.3:9000/"),
        ]));
        assert_eq!(config.ws_url, "ws://10.0.0.3:9000");
    }

    #[test]
    fn durations_parse_or_fall_back() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("UPSCALER_READY_TIMEOUT_MS", "250"),
            ("UPSCALER_CLEANUP_DELAY_MS", "soon"),
        ]));
        assert_eq!(config.ready_timeout, Duration::from_millis(250));
        assert_eq!(config.cleanup_delay, DEFAULT_CLEANUP_DELAY);
    }

    #[test]
    fn api_override_keeps_timings() {
        let config = ClientConfig::default()
            .with_poll_interval(Duration::from_millis(50))
            .with_api_url("http://gpu-box:9000");
        assert_eq!(config.ws_url, "ws://gpu-box:9000");
        assert_eq!(config.poll_interval, Duration::from_millis(50));
    }

    #[test]
    fn bare_host_gets_ws_scheme() {
        assert_eq!(derive_ws_url("localhost:8000"), "ws://localhost:8000");
    }
}
