//! Background refresh of the breakpoint registry.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::registry::{ActiveBreakpoint, BreakpointRegistry};
use crate::{Backend, BackendError};

pub struct Poller {
    backend: Arc<dyn Backend>,
    registry: Arc<BreakpointRegistry>,
    service_name: String,
    interval: Duration,
}

impl Poller {
    pub fn new(
        backend: Arc<dyn Backend>,
        registry: Arc<BreakpointRegistry>,
        service_name: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            backend,
            registry,
            service_name: service_name.into(),
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub fn registry(&self) -> &Arc<BreakpointRegistry> {
        &self.registry
    }

    /// Runs one poll. On any failure the registry is left untouched.
    pub async fn refresh(&self) -> Result<usize, BackendError> {
        let backend = Arc::clone(&self.backend);
        let service_name = self.service_name.clone();
        let configs = tokio::task::spawn_blocking(move || backend.fetch_active(&service_name))
            .await
            .map_err(|e| BackendError::TaskFailed {
                message: e.to_string(),
            })??;

        let breakpoints = configs
            .into_iter()
            .map(|config| {
                let id = config.id.clone();
                ActiveBreakpoint::from_config(config)
                    .map_err(|source| BackendError::InvalidBreakpoint { id, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let count = self.registry.replace_all(breakpoints);
        if count > 0 {
            info!(service = %self.service_name, breakpoints = count, "updated breakpoint cache");
        } else {
            debug!(service = %self.service_name, "no active breakpoints");
        }
        Ok(count)
    }

    /// Polls immediately, then once per interval until `stop` flips to true
    /// (or its sender is dropped). A stop never triggers a final poll.
    pub fn spawn(self: Arc<Self>, handle: &Handle, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
        handle.spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut first = true;

            loop {
                if *stop.borrow_and_update() {
                    break;
                }
                tokio::select! {
                    biased;
                    _ = stop.changed() => break,
                    _ = ticker.tick() => {}
                }

                if let Err(e) = self.refresh().await {
                    if first {
                        warn!(service = %self.service_name, %e, "failed to fetch initial breakpoints");
                    } else {
                        warn!(service = %self.service_name, %e, "failed to fetch breakpoints");
                    }
                }
                first = false;
            }

            debug!(service = %self.service_name, "breakpoint poller stopped");
        })
    }
}
