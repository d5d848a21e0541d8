use chrono::Utc;
use parking_lot::Mutex;
use sightline_runtime::{
    ActiveBreakpoint, AutoRegistrar, Backend, BackendError, BreakpointRegistry, ClientConfig,
    ConfigError, Gate, HttpBackend, Poller, ScanResult, SecurityScanner, Site, SnapshotDispatcher,
};
use sightline_trace_capture::CaptureOptions;
use sightline_types::{Snapshot, format_timestamp, label_key, location_key};
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::{CallSite, CaptureContext, Variables};

/// Frames belonging to the capture path itself.
const OWN_FRAMES: &[&str] = &["sightline::", "sightline_runtime::"];

/// Owns the breakpoint cache and the background work that keeps it current.
///
/// Cloning is cheap; clones share one cache, one poller, and one set of
/// registered call sites.
#[derive(Clone)]
pub struct SnapshotClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: ClientConfig,
    handle: Handle,
    registry: Arc<BreakpointRegistry>,
    poller: Arc<Poller>,
    registrar: AutoRegistrar,
    dispatcher: SnapshotDispatcher,
    scanner: SecurityScanner,
    capture_options: CaptureOptions,
    stop: Mutex<Option<watch::Sender<bool>>>,
}

impl SnapshotClient {
    /// Builds a client talking HTTP to the configured control plane. Must be
    /// called from within a tokio runtime.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        let handle = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
        let backend = HttpBackend::new(config.base_url(), config.api_key.clone(), config.request_timeout);
        Self::with_backend(config, Arc::new(backend), handle)
    }

    pub fn with_backend(
        config: ClientConfig,
        backend: Arc<dyn Backend>,
        handle: Handle,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let registry = Arc::new(BreakpointRegistry::new());
        let poller = Arc::new(Poller::new(
            Arc::clone(&backend),
            Arc::clone(&registry),
            config.service_name.clone(),
            config.poll_interval,
        ));
        let registrar = AutoRegistrar::new(
            Arc::clone(&backend),
            Arc::clone(&poller),
            handle.clone(),
            config.service_name.clone(),
            config.registration_refresh_delay,
        );
        let dispatcher = SnapshotDispatcher::new(backend, handle.clone());
        let capture_options = CaptureOptions {
            skip_prefixes: OWN_FRAMES,
            ..CaptureOptions::default()
        }
        .with_max_frames(config.stack_trace_max_frames);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                handle,
                registry,
                poller,
                registrar,
                dispatcher,
                scanner: SecurityScanner,
                capture_options,
                stop: Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Starts background polling: one poll right away, then one per
    /// interval. Calling it on a running client does nothing.
    pub fn start(&self) {
        let mut stop = self.inner.stop.lock();
        if stop.is_some() {
            warn!(service = %self.inner.config.service_name, "snapshot client already started");
            return;
        }
        let (tx, rx) = watch::channel(false);
        Arc::clone(&self.inner.poller).spawn(&self.inner.handle, rx);
        *stop = Some(tx);
        info!(
            service = %self.inner.config.service_name,
            interval_ms = self.inner.config.poll_interval.as_millis() as u64,
            "snapshot client started"
        );
    }

    /// Signals the poller to exit. In-flight registrations and submissions
    /// are left to finish on their own. Idempotent.
    pub fn stop(&self) {
        if let Some(tx) = self.inner.stop.lock().take() {
            let _ = tx.send(true);
            info!(service = %self.inner.config.service_name, "snapshot client stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.stop.lock().is_some()
    }

    /// Polls once, outside the regular schedule.
    pub async fn refresh_now(&self) -> Result<usize, BackendError> {
        self.inner.poller.refresh().await
    }

    /// When the breakpoint cache was last replaced by a successful poll.
    pub fn last_refresh(&self) -> Option<Instant> {
        self.inner.registry.last_refresh()
    }

    pub fn active_breakpoints(&self) -> usize {
        self.inner.registry.len()
    }

    /// Captures at an explicit location if a breakpoint there allows it.
    /// Never registers the location and never attaches trace context.
    pub fn check_and_capture(&self, file_path: &str, line_number: u32, variables: Variables) {
        if !self.inner.config.enabled {
            return;
        }
        let Some(breakpoint) = self.inner.registry.lookup(&location_key(file_path, line_number), None)
        else {
            return;
        };
        self.capture(&breakpoint, file_path, line_number, variables, None);
    }

    /// Captures at `site`, matching by `(function, label)` first and by
    /// location second. Unseen sites are auto-registered once. `label`
    /// defaults to the last segment of the function path.
    pub fn check_and_capture_with_context(
        &self,
        context: &CaptureContext,
        site: CallSite,
        label: Option<&str>,
        variables: Variables,
    ) {
        if !self.inner.config.enabled {
            return;
        }
        let label = label
            .filter(|label| !label.is_empty())
            .unwrap_or_else(|| site.default_label());

        self.inner.registrar.register(Site {
            file_path: site.file,
            line_number: site.line,
            function_name: site.function,
            label,
        });

        let by_label = (!site.function.is_empty()).then(|| label_key(site.function, label));
        let Some(breakpoint) = self
            .inner
            .registry
            .lookup(&location_key(site.file, site.line), by_label.as_deref())
        else {
            return;
        };
        self.capture(&breakpoint, site.file, site.line, variables, Some(context));
    }

    fn capture(
        &self,
        breakpoint: &ActiveBreakpoint,
        file_path: &str,
        line_number: u32,
        variables: Variables,
        context: Option<&CaptureContext>,
    ) {
        let now = Utc::now();
        match breakpoint.gate(now) {
            Gate::Capture => {}
            gate => {
                trace!(breakpoint = %breakpoint.config.id, ?gate, "capture suppressed");
                return;
            }
        }

        let ScanResult { variables, flags } = self.inner.scanner.scan(variables.as_map());
        if !flags.is_empty() {
            debug!(breakpoint = %breakpoint.config.id, flags = flags.len(), "redacted sensitive variables");
        }

        let mut snapshot = Snapshot {
            breakpoint_id: breakpoint.config.id.clone(),
            service_name: self.inner.config.service_name.clone(),
            file_path: file_path.to_string(),
            line_number,
            variables,
            security_flags: flags,
            captured_at: format_timestamp(now),
            ..Snapshot::default()
        };
        if let Some(context) = context {
            snapshot.trace_id = context.trace_id.clone();
            snapshot.span_id = context.span_id.clone();
            snapshot.request_context = context.request_context.clone();
        }

        // Symbolization happens on the blocking pool, not here.
        let stack = sightline_trace_capture::capture_unresolved(self.inner.capture_options);
        self.inner.dispatcher.send(snapshot, Some(stack));
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(tx) = self.stop.get_mut().take() {
            let _ = tx.send(true);
        }
    }
}
