//! Non-breaking production snapshots for Tokio-based Rust services.
//!
//! Breakpoints are authored on a remote control plane and polled into a
//! local cache. Instrumented code calls a capture entry point
//! unconditionally; when a live breakpoint matches, the current variables
//! are scanned for secrets, a stack trace is taken, and the snapshot is
//! shipped in the background. The caller is never blocked on the network
//! and never sees an error.
//!
//! ```rust,no_run
//! use sightline::{Agent, ClientConfig, Variables};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sightline::ConfigError> {
//!     let agent = Agent::init(ClientConfig::new("api-key", "checkout"))?;
//!
//!     let amount = 10_i64;
//!     // Matched by `(function, label)` or by file and line.
//!     sightline::checkpoint!(agent, "before-charge", amount);
//!
//!     // Explicit location, no auto-registration.
//!     agent.check_and_capture("src/main.rs", 12, Variables::new().with("amount", amount));
//!
//!     agent.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! Trace identifiers reach snapshots through [`CaptureContext`], which
//! request middleware installs per task.

mod agent;
mod call_site;
mod client;
mod context;
mod variables;

pub use agent::Agent;
#[doc(hidden)]
pub use call_site::__function_path;
pub use call_site::CallSite;
pub use client::SnapshotClient;
pub use context::CaptureContext;
pub use variables::Variables;

pub use sightline_runtime::{
    Backend, BackendError, ClientConfig, ConfigError, HttpBackend, SecurityScanner, resolve_endpoint,
};
pub use sightline_types::{BreakpointConfig, SecurityFlag, Severity, Snapshot, ValueMap};

/// Captures the named locals at this point if a breakpoint allows it.
///
/// `checkpoint!(agent, "label", a, b)` matches by the enclosing function and
/// `"label"`; without a label the function's own name is used. Works with
/// anything exposing `check_and_capture_with_context` ([`Agent`],
/// [`SnapshotClient`]). Values must implement `Facet`.
#[macro_export]
macro_rules! checkpoint {
    ($target:expr, $label:literal $(, $name:ident)* $(,)?) => {
        $target.check_and_capture_with_context(
            &$crate::CaptureContext::current(),
            $crate::call_site!(),
            ::std::option::Option::Some($label),
            $crate::Variables::new()$(.with_facet(stringify!($name), &$name))*,
        )
    };
    ($target:expr $(, $name:ident)* $(,)?) => {
        $target.check_and_capture_with_context(
            &$crate::CaptureContext::current(),
            $crate::call_site!(),
            ::std::option::Option::None,
            $crate::Variables::new()$(.with_facet(stringify!($name), &$name))*,
        )
    };
}
