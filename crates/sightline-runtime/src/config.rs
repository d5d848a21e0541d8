//! Client configuration and control-plane URL resolution.

use std::time::Duration;

use crate::ConfigError;

pub const DEFAULT_ENDPOINT: &str = "127.0.0.1:8081";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_REGISTRATION_REFRESH_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_STACK_TRACE_MAX_FRAMES: usize = 64;

pub const ENV_API_KEY: &str = "SIGHTLINE_API_KEY";
pub const ENV_SERVICE_NAME: &str = "SIGHTLINE_SERVICE_NAME";
pub const ENV_ENDPOINT: &str = "SIGHTLINE_ENDPOINT";
pub const ENV_USE_SSL: &str = "SIGHTLINE_USE_SSL";
pub const ENV_POLL_INTERVAL_MS: &str = "SIGHTLINE_POLL_INTERVAL_MS";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "SIGHTLINE_REQUEST_TIMEOUT_MS";
pub const ENV_CODE_MONITORING: &str = "SIGHTLINE_CODE_MONITORING";

/// Paths that mark a full URL as pointing at a specific signal endpoint
/// rather than at a custom base.
const SERVICE_PATHS: &[&str] = &["/v1/traces", "/v1/metrics", "/api/v1/traces", "/api/v1/metrics"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_key: String,
    pub service_name: String,
    /// Bare host (`app.example.dev`) or full URL.
    pub endpoint: String,
    /// Scheme for bare hosts; ignored when `endpoint` carries one.
    pub use_ssl: bool,
    pub poll_interval: Duration,
    /// Per-request bound shared by poll, register, and capture calls.
    pub request_timeout: Duration,
    /// Pause between a successful auto-registration and the follow-up poll.
    pub registration_refresh_delay: Duration,
    pub stack_trace_max_frames: usize,
    /// Code monitoring switch; when off the agent never starts a client.
    pub enabled: bool,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            service_name: service_name.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            use_ssl: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            registration_refresh_delay: DEFAULT_REGISTRATION_REFRESH_DELAY,
            stack_trace_max_frames: DEFAULT_STACK_TRACE_MAX_FRAMES,
            enabled: true,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; unset keys keep their defaults.
    /// Identity is only validated when code monitoring is on.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new(
            lookup(ENV_API_KEY).unwrap_or_default(),
            lookup(ENV_SERVICE_NAME).unwrap_or_default(),
        );
        if let Some(endpoint) = lookup(ENV_ENDPOINT).filter(|v| !v.trim().is_empty()) {
            config.endpoint = endpoint.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_USE_SSL) {
            config.use_ssl = is_truthy(&raw);
        }
        if let Some(raw) = lookup(ENV_CODE_MONITORING) {
            config.enabled = is_truthy(&raw);
        }
        if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
            config.poll_interval = parse_millis(ENV_POLL_INTERVAL_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT_MS) {
            config.request_timeout = parse_millis(ENV_REQUEST_TIMEOUT_MS, &raw)?;
        }
        if config.enabled {
            config.validate()?;
        }
        Ok(config)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_ssl(mut self, use_ssl: bool) -> Self {
        self.use_ssl = use_ssl;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn with_registration_refresh_delay(mut self, delay: Duration) -> Self {
        self.registration_refresh_delay = delay;
        self
    }

    pub fn with_stack_trace_max_frames(mut self, max_frames: usize) -> Self {
        self.stack_trace_max_frames = max_frames;
        self
    }

    pub fn with_code_monitoring(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::MissingServiceName);
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidSetting {
                key: "poll_interval",
                value: "0".into(),
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Base URL for the snapshot endpoints (no path appended).
    pub fn base_url(&self) -> String {
        resolve_endpoint(&self.endpoint, "", self.use_ssl)
    }
}

fn is_truthy(raw: &str) -> bool {
    let v = raw.trim().to_ascii_lowercase();
    !(v.is_empty() || v == "0" || v == "false" || v == "off" || v == "no")
}

fn parse_millis(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    let millis: u64 = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
        ConfigError::InvalidSetting {
            key,
            value: raw.to_string(),
            reason: e.to_string(),
        }
    })?;
    if millis == 0 {
        return Err(ConfigError::InvalidSetting {
            key,
            value: raw.to_string(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(Duration::from_millis(millis))
}

/// Builds a full URL from an endpoint and a signal path.
///
/// - A bare host gets `https://` or `http://` per `use_ssl`, then `path`.
/// - An endpoint with a scheme keeps it; `use_ssl` is ignored.
/// - A full URL that already has a path is kept as given, except that an
///   empty `path` reduces a known signal URL (`/v1/traces`, ...) to its
///   scheme and host.
pub fn resolve_endpoint(endpoint: &str, path: &str, use_ssl: bool) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        let endpoint = endpoint.trim_end_matches('/');
        let without_scheme = endpoint
            .trim_start_matches("https://")
            .trim_start_matches("http://");

        if without_scheme.contains('/') {
            if path.is_empty() {
                return extract_base_url(endpoint);
            }
            return endpoint.to_string();
        }

        return format!("{endpoint}{path}");
    }

    let scheme = if use_ssl { "https://" } else { "http://" };
    format!("{scheme}{}{path}", endpoint.trim_end_matches('/'))
}

/// Reduces a URL to scheme + host, but only when it points at a known signal
/// path. Custom base paths (`/custom`, `/api`) are returned unchanged.
pub fn extract_base_url(full_url: &str) -> String {
    if !SERVICE_PATHS.iter().any(|p| full_url.contains(p)) {
        return full_url.to_string();
    }

    let (scheme, rest) = if let Some(rest) = full_url.strip_prefix("https://") {
        ("https://", rest)
    } else if let Some(rest) = full_url.strip_prefix("http://") {
        ("http://", rest)
    } else {
        return full_url.to_string();
    };

    match rest.find('/') {
        Some(idx) => format!("{scheme}{}", &rest[..idx]),
        None => full_url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn resolve_endpoint_table() {
        let cases: &[(&str, &str, bool, &str)] = &[
            ("app.example.dev", "/v1/traces", true, "https://app.example.dev/v1/traces"),
            ("localhost:8081", "/v1/traces", false, "http://localhost:8081/v1/traces"),
            ("app.example.dev/", "/v1/metrics", true, "https://app.example.dev/v1/metrics"),
            ("http://localhost:8081", "/v1/traces", true, "http://localhost:8081/v1/traces"),
            ("https://app.example.dev", "/v1/metrics", false, "https://app.example.dev/v1/metrics"),
            ("http://localhost:8081/", "/v1/traces", true, "http://localhost:8081/v1/traces"),
            ("http://localhost:8081/v1/traces", "/v1/traces", true, "http://localhost:8081/v1/traces"),
            ("http://localhost:8081/custom/path", "/v1/traces", true, "http://localhost:8081/custom/path"),
            ("https://app.example.dev/api/v2/", "/v1/traces", false, "https://app.example.dev/api/v2"),
            ("app.example.dev", "", true, "https://app.example.dev"),
            ("http://localhost:8081", "", true, "http://localhost:8081"),
            ("http://localhost:8081/", "", true, "http://localhost:8081"),
            ("http://localhost:8081/v1/traces", "", true, "http://localhost:8081"),
            ("https://app.example.dev/v1/traces", "", false, "https://app.example.dev"),
            ("http://localhost:8081/custom", "", true, "http://localhost:8081/custom"),
        ];

        for (endpoint, path, use_ssl, want) in cases {
            assert_eq!(
                resolve_endpoint(endpoint, path, *use_ssl),
                *want,
                "resolve_endpoint({endpoint:?}, {path:?}, {use_ssl})"
            );
        }
    }

    #[test]
    fn extract_base_url_keeps_custom_paths() {
        assert_eq!(extract_base_url("http://localhost:8081/api"), "http://localhost:8081/api");
        assert_eq!(
            extract_base_url("https://collector.internal/api/v1/metrics"),
            "https://collector.internal"
        );
        assert_eq!(extract_base_url("collector.internal/v1/traces"), "collector.internal/v1/traces");
    }

    #[test]
    fn base_url_follows_endpoint_resolution() {
        let config = ClientConfig::new("key", "checkout").with_endpoint("localhost:8080");
        assert_eq!(config.base_url(), "http://localhost:8080");

        let config = config.with_endpoint("app.example.dev").with_ssl(true);
        assert_eq!(config.base_url(), "https://app.example.dev");
    }

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn from_lookup_reads_every_setting() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            (ENV_API_KEY, "secret-key"),
            (ENV_SERVICE_NAME, "checkout"),
            (ENV_ENDPOINT, "collector.internal:9000"),
            (ENV_USE_SSL, "true"),
            (ENV_POLL_INTERVAL_MS, "1500"),
            (ENV_REQUEST_TIMEOUT_MS, "250"),
            (ENV_CODE_MONITORING, "off"),
        ]))
        .expect("valid config");

        assert_eq!(config.api_key, "secret-key");
        assert_eq!(config.service_name, "checkout");
        assert_eq!(config.endpoint, "collector.internal:9000");
        assert!(config.use_ssl);
        assert_eq!(config.poll_interval, Duration::from_millis(1500));
        assert_eq!(config.request_timeout, Duration::from_millis(250));
        assert!(!config.enabled);
    }

    #[test]
    fn from_lookup_applies_defaults() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            (ENV_API_KEY, "k"),
            (ENV_SERVICE_NAME, "svc"),
        ]))
        .expect("valid config");
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert!(config.enabled);
        assert!(!config.use_ssl);
    }

    #[test]
    fn from_lookup_rejects_missing_identity() {
        assert_eq!(
            ClientConfig::from_lookup(lookup_from(&[(ENV_SERVICE_NAME, "svc")])),
            Err(ConfigError::MissingApiKey)
        );
        assert_eq!(
            ClientConfig::from_lookup(lookup_from(&[(ENV_API_KEY, "k")])),
            Err(ConfigError::MissingServiceName)
        );
    }

    #[test]
    fn monitoring_off_needs_no_identity() {
        let config = ClientConfig::from_lookup(lookup_from(&[(ENV_CODE_MONITORING, "off")]))
            .expect("disabled config is accepted");
        assert!(!config.enabled);
        assert!(config.api_key.is_empty());
        assert_eq!(config.validate(), Err(ConfigError::MissingApiKey));
    }

    #[test]
    fn from_lookup_rejects_bad_intervals() {
        let err = ClientConfig::from_lookup(lookup_from(&[
            (ENV_API_KEY, "k"),
            (ENV_SERVICE_NAME, "svc"),
            (ENV_POLL_INTERVAL_MS, "soon"),
        ]))
        .expect_err("non-numeric interval");
        assert!(matches!(
            err,
            ConfigError::InvalidSetting {
                key: ENV_POLL_INTERVAL_MS,
                ..
            }
        ));

        let err = ClientConfig::from_lookup(lookup_from(&[
            (ENV_API_KEY, "k"),
            (ENV_SERVICE_NAME, "svc"),
            (ENV_REQUEST_TIMEOUT_MS, "0"),
        ]))
        .expect_err("zero timeout");
        assert!(matches!(err, ConfigError::InvalidSetting { .. }));
    }
}
