use sightline_runtime::{ClientConfig, ConfigError};
use tracing::info;

use crate::{CallSite, CaptureContext, SnapshotClient, Variables};

/// Process-level entry point: owns a snapshot client when code monitoring is
/// on, and turns every capture call into a no-op when it is off.
#[derive(Clone, Default)]
pub struct Agent {
    client: Option<SnapshotClient>,
}

impl Agent {
    /// Builds and starts the snapshot client. With code monitoring disabled
    /// nothing is validated or started.
    pub fn init(config: ClientConfig) -> Result<Self, ConfigError> {
        if !config.enabled {
            info!(service = %config.service_name, "code monitoring disabled");
            return Ok(Self::disabled());
        }
        let client = SnapshotClient::new(config)?;
        client.start();
        Ok(Self::from_client(client))
    }

    /// [`Agent::init`] with settings read from `SIGHTLINE_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// [`Agent::from_env`] over an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::init(ClientConfig::from_lookup(lookup)?)
    }

    pub fn disabled() -> Self {
        Self { client: None }
    }

    /// Wraps an existing client as is; the caller decides whether it runs.
    pub fn from_client(client: SnapshotClient) -> Self {
        Self {
            client: Some(client),
        }
    }

    pub fn snapshot_client(&self) -> Option<&SnapshotClient> {
        self.client.as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    pub fn check_and_capture(&self, file_path: &str, line_number: u32, variables: Variables) {
        if let Some(client) = &self.client {
            client.check_and_capture(file_path, line_number, variables);
        }
    }

    pub fn check_and_capture_with_context(
        &self,
        context: &CaptureContext,
        site: CallSite,
        label: Option<&str>,
        variables: Variables,
    ) {
        if let Some(client) = &self.client {
            client.check_and_capture_with_context(context, site, label, variables);
        }
    }

    pub fn shutdown(&self) {
        if let Some(client) = &self.client {
            client.stop();
        }
    }
}
