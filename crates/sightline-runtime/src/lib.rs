//! Core runtime behind the `sightline` facade.
//!
//! Owns the breakpoint cache and everything that talks to the control plane:
//! the background poller, auto-registration, the security scanner, and
//! snapshot submission. None of it ever blocks or fails the instrumented
//! caller; transport errors are logged and dropped.

mod backend;
mod config;
mod dispatch;
mod error;
mod poller;
mod registrar;
mod registry;
mod scan;

pub use backend::{
    ACTIVE_PATH, API_KEY_HEADER, AUTO_REGISTER_PATH, Backend, CAPTURE_PATH, HttpBackend,
};
pub use config::{
    ClientConfig, DEFAULT_ENDPOINT, DEFAULT_POLL_INTERVAL, DEFAULT_REGISTRATION_REFRESH_DELAY,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_STACK_TRACE_MAX_FRAMES, ENV_API_KEY, ENV_CODE_MONITORING,
    ENV_ENDPOINT, ENV_POLL_INTERVAL_MS, ENV_REQUEST_TIMEOUT_MS, ENV_SERVICE_NAME, ENV_USE_SSL,
    extract_base_url, resolve_endpoint,
};
pub use dispatch::SnapshotDispatcher;
pub use error::{BackendError, ConfigError};
pub use poller::Poller;
pub use registrar::{AutoRegistrar, Site};
pub use registry::{ActiveBreakpoint, BreakpointRegistry, Gate};
pub use scan::{SENSITIVE_VARIABLE_NAME, ScanResult, SecurityScanner, UNSCANNABLE};
