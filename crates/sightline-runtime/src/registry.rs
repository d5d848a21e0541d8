//! Local view of the control plane's active breakpoints.
//!
//! The whole index is rebuilt on every poll and swapped in under the write
//! lock; readers hold the read lock only for the duration of a map lookup.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sightline_types::{BreakpointConfig, TimestampError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Outcome of the gating policy for a matched breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Capture,
    Disabled,
    Expired,
    Exhausted,
}

/// A breakpoint config with its expiry already parsed.
#[derive(Debug, Clone)]
pub struct ActiveBreakpoint {
    pub config: BreakpointConfig,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ActiveBreakpoint {
    pub fn from_config(config: BreakpointConfig) -> Result<Self, TimestampError> {
        let expires_at = config.expires_at()?;
        Ok(Self { config, expires_at })
    }

    /// Applies enable, expiry, and count-limit checks using the last polled
    /// capture count.
    pub fn gate(&self, now: DateTime<Utc>) -> Gate {
        if !self.config.enabled {
            return Gate::Disabled;
        }
        if self.expires_at.is_some_and(|at| now > at) {
            return Gate::Expired;
        }
        let max = self.config.max_captures;
        if max > 0 && self.config.capture_count >= max {
            return Gate::Exhausted;
        }
        Gate::Capture
    }
}

#[derive(Default)]
struct Index {
    by_label: HashMap<String, Arc<ActiveBreakpoint>>,
    by_location: HashMap<String, Arc<ActiveBreakpoint>>,
    breakpoints: usize,
    refreshed_at: Option<Instant>,
}

#[derive(Default)]
pub struct BreakpointRegistry {
    index: RwLock<Index>,
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up by label key first, then by location key.
    pub fn lookup(&self, location_key: &str, label_key: Option<&str>) -> Option<Arc<ActiveBreakpoint>> {
        let index = self.index.read();
        if let Some(key) = label_key
            && let Some(found) = index.by_label.get(key)
        {
            return Some(Arc::clone(found));
        }
        index.by_location.get(location_key).cloned()
    }

    /// Replaces the whole cache. Returns the number of breakpoints installed.
    pub fn replace_all(&self, breakpoints: Vec<ActiveBreakpoint>) -> usize {
        let mut next = Index {
            breakpoints: breakpoints.len(),
            refreshed_at: Some(Instant::now()),
            ..Index::default()
        };

        for breakpoint in breakpoints {
            let breakpoint = Arc::new(breakpoint);
            if let Some(key) = breakpoint.config.label_key() {
                next.by_label.insert(key, Arc::clone(&breakpoint));
            }
            next.by_location
                .insert(breakpoint.config.location_key(), breakpoint);
        }

        let count = next.breakpoints;
        let previous = std::mem::replace(&mut *self.index.write(), next);
        // Dropped outside the lock.
        drop(previous);
        count
    }

    /// Number of breakpoints installed by the last replacement.
    pub fn len(&self) -> usize {
        self.index.read().breakpoints
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// When the cache was last replaced, if ever.
    pub fn last_refresh(&self) -> Option<Instant> {
        self.index.read().refreshed_at
    }
}
