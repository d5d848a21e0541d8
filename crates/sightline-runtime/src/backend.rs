//! Control-plane transport.
//!
//! Calls are blocking; the poller, registrar, and dispatcher move them onto
//! tokio's blocking pool so nothing here runs on a caller's thread.

use sightline_types::{ActiveBreakpoints, AutoRegistration, BreakpointConfig, Snapshot};
use std::time::Duration;
use tracing::debug;

use crate::BackendError;

pub const ACTIVE_PATH: &str = "/sdk/snapshots/active";
pub const AUTO_REGISTER_PATH: &str = "/sdk/snapshots/auto-register";
pub const CAPTURE_PATH: &str = "/sdk/snapshots/capture";
pub const API_KEY_HEADER: &str = "X-API-Key";

pub trait Backend: Send + Sync + 'static {
    /// `GET /sdk/snapshots/active/{service}`; anything but 200 is an error.
    fn fetch_active(&self, service_name: &str) -> Result<Vec<BreakpointConfig>, BackendError>;

    /// `POST /sdk/snapshots/auto-register`; Ok only for 200 or 201.
    fn auto_register(&self, registration: &AutoRegistration) -> Result<(), BackendError>;

    /// `POST /sdk/snapshots/capture`; Ok only for 200 or 201.
    fn submit_snapshot(&self, snapshot: &Snapshot) -> Result<(), BackendError>;
}

/// `ureq`-backed transport sharing one agent (and its timeout) across all
/// three endpoints.
pub struct HttpBackend {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post_json(&self, url: &str, body: &str) -> Result<(), BackendError> {
        let result = self
            .agent
            .post(url)
            .set(API_KEY_HEADER, &self.api_key)
            .set("Content-Type", "application/json")
            .send_string(body);
        let response = classify(url, result)?;
        match response.status() {
            200 | 201 => Ok(()),
            status => Err(BackendError::UnexpectedStatus {
                url: url.to_string(),
                status,
            }),
        }
    }
}

impl Backend for HttpBackend {
    fn fetch_active(&self, service_name: &str) -> Result<Vec<BreakpointConfig>, BackendError> {
        let url = format!("{}{ACTIVE_PATH}/{service_name}", self.base_url);
        let result = self.agent.get(&url).set(API_KEY_HEADER, &self.api_key).call();
        let response = classify(&url, result)?;
        if response.status() != 200 {
            return Err(BackendError::UnexpectedStatus {
                url,
                status: response.status(),
            });
        }

        let body = response.into_string().map_err(|e| BackendError::Decode {
            url: url.clone(),
            message: e.to_string(),
        })?;
        let breakpoints = facet_json::from_str::<ActiveBreakpoints>(&body)
            .map_err(|e| BackendError::Decode {
                url: url.clone(),
                message: e.to_string(),
            })?
            .into_breakpoints();

        debug!(%url, breakpoints = breakpoints.len(), "fetched active breakpoints");
        Ok(breakpoints)
    }

    fn auto_register(&self, registration: &AutoRegistration) -> Result<(), BackendError> {
        let url = format!("{}{AUTO_REGISTER_PATH}", self.base_url);
        let body = facet_json::to_string(registration).map_err(|e| BackendError::Encode {
            what: "auto-registration",
            message: e.to_string(),
        })?;
        self.post_json(&url, &body)
    }

    fn submit_snapshot(&self, snapshot: &Snapshot) -> Result<(), BackendError> {
        let url = format!("{}{CAPTURE_PATH}", self.base_url);
        let body = facet_json::to_string(snapshot).map_err(|e| BackendError::Encode {
            what: "snapshot",
            message: e.to_string(),
        })?;
        self.post_json(&url, &body)
    }
}

fn classify(url: &str, result: Result<ureq::Response, ureq::Error>) -> Result<ureq::Response, BackendError> {
    match result {
        Ok(response) => Ok(response),
        Err(ureq::Error::Status(status, _)) => Err(BackendError::UnexpectedStatus {
            url: url.to_string(),
            status,
        }),
        Err(ureq::Error::Transport(transport)) => Err(BackendError::Transport {
            url: url.to_string(),
            message: transport.to_string(),
        }),
    }
}
