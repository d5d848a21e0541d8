//! Per-task trace context attached to snapshots.

use sightline_types::ValueMap;
use std::future::Future;

tokio::task_local! {
    static CURRENT: CaptureContext;
}

/// Trace identifiers and request data for the work currently executing.
///
/// Tracing or HTTP middleware installs one per request with [`scope`] (or
/// [`sync_scope`] for synchronous code); capture calls read it back with
/// [`current`].
///
/// [`scope`]: CaptureContext::scope
/// [`sync_scope`]: CaptureContext::sync_scope
/// [`current`]: CaptureContext::current
#[derive(Debug, Clone, Default)]
pub struct CaptureContext {
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub request_context: Option<ValueMap>,
}

impl CaptureContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trace(mut self, trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self.span_id = Some(span_id.into());
        self
    }

    pub fn with_request_context(mut self, request_context: ValueMap) -> Self {
        self.request_context = Some(request_context);
        self
    }

    /// The context installed for the current task, or an empty one.
    pub fn current() -> Self {
        CURRENT.try_with(Clone::clone).unwrap_or_default()
    }

    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        CURRENT.scope(self, fut).await
    }

    pub fn sync_scope<R>(self, f: impl FnOnce() -> R) -> R {
        CURRENT.sync_scope(self, f)
    }
}
