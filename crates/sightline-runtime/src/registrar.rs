//! One-shot auto-registration of capture sites with the control plane.

use parking_lot::RwLock;
use sightline_types::{AutoRegistration, label_key, location_key};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};

use crate::poller::Poller;
use crate::{Backend, BackendError};

/// A capture site as reported to the control plane.
#[derive(Debug, Clone, Copy)]
pub struct Site<'a> {
    pub file_path: &'a str,
    pub line_number: u32,
    pub function_name: &'a str,
    pub label: &'a str,
}

impl Site<'_> {
    /// Dedup key: the label key when the site carries a label, otherwise its
    /// location.
    pub fn key(&self) -> String {
        if self.label.is_empty() {
            location_key(self.file_path, self.line_number)
        } else {
            label_key(self.function_name, self.label)
        }
    }
}

pub struct AutoRegistrar {
    registered: RwLock<HashSet<String>>,
    backend: Arc<dyn Backend>,
    poller: Arc<Poller>,
    handle: Handle,
    service_name: String,
    refresh_delay: Duration,
}

impl AutoRegistrar {
    pub fn new(
        backend: Arc<dyn Backend>,
        poller: Arc<Poller>,
        handle: Handle,
        service_name: impl Into<String>,
        refresh_delay: Duration,
    ) -> Self {
        Self {
            registered: RwLock::new(HashSet::new()),
            backend,
            poller,
            handle,
            service_name: service_name.into(),
            refresh_delay,
        }
    }

    /// Marks the site as registered and, if this call was the first to do
    /// so, fires the registration in the background. Returns whether a
    /// registration was sent.
    ///
    /// The mark is taken before the request goes out and is never rolled
    /// back, so a failed registration is not retried for the life of the
    /// process.
    pub fn register(&self, site: Site<'_>) -> bool {
        if !self.mark(site.key()) {
            return false;
        }

        let registration = AutoRegistration {
            service_name: self.service_name.clone(),
            file_path: site.file_path.to_string(),
            line_number: site.line_number,
            function_name: site.function_name.to_string(),
            label: site.label.to_string(),
        };
        let backend = Arc::clone(&self.backend);
        let poller = Arc::clone(&self.poller);
        let delay = self.refresh_delay;

        self.handle.spawn(async move {
            let sent = tokio::task::spawn_blocking({
                let registration = registration.clone();
                move || backend.auto_register(&registration)
            })
            .await
            .map_err(|e| BackendError::TaskFailed {
                message: e.to_string(),
            })
            .and_then(|result| result);

            match sent {
                Ok(()) => {
                    info!(
                        file = %registration.file_path,
                        line = registration.line_number,
                        label = %registration.label,
                        "auto-registered capture site"
                    );
                    tokio::time::sleep(delay).await;
                    if let Err(e) = poller.refresh().await {
                        warn!(%e, "refresh after auto-registration failed");
                    }
                }
                Err(e) => {
                    warn!(
                        file = %registration.file_path,
                        line = registration.line_number,
                        %e,
                        "auto-registration failed"
                    );
                }
            }
        });
        true
    }

    pub fn is_registered(&self, key: &str) -> bool {
        self.registered.read().contains(key)
    }

    fn mark(&self, key: String) -> bool {
        if self.registered.read().contains(&key) {
            trace!(%key, "capture site already registered");
            return false;
        }
        let inserted = self.registered.write().insert(key);
        if !inserted {
            debug!("capture site registered concurrently");
        }
        inserted
    }
}
