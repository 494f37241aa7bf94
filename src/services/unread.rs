//! Unread badge, always derived from the server.
//!
//! DESIGN
//! ======
//! The engine never adjusts the count locally. Every trigger (session start,
//! a read, an inbound message, archive/delete/leave) asks the backend for
//! the total. A failed refresh keeps the last known value.
//!
//! An optional background task refreshes on a fixed interval so the badge
//! recovers even when push delivery is interrupted.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::ChatApi;
use crate::error::ApiError;
use crate::state::SharedState;

#[derive(Clone)]
pub struct UnreadCounter {
    api: Arc<dyn ChatApi>,
    state: SharedState,
}

impl UnreadCounter {
    #[must_use]
    pub fn new(api: Arc<dyn ChatApi>, state: SharedState) -> Self {
        Self { api, state }
    }

    /// Replace the cached count with the server's.
    ///
    /// # Errors
    ///
    /// Returns the API error; the cached count is left unchanged.
    pub async fn refresh(&self) -> Result<u64, ApiError> {
        let count = self.api.get_unread_count().await?;
        self.state.write().await.unread_count = count;
        debug!(count, "unread: refreshed");
        Ok(count)
    }

    /// Refresh, logging failure instead of returning it.
    pub async fn refresh_logged(&self) {
        if let Err(e) = self.refresh().await {
            warn!(error = %e, "unread: refresh failed");
        }
    }

    pub async fn count(&self) -> u64 {
        self.state.read().await.unread_count
    }

    /// Spawn the periodic refresh. Returns `None` when `interval` is zero.
    #[must_use]
    pub fn spawn_poll_task(&self, interval: Duration) -> Option<JoinHandle<()>> {
        if interval.is_zero() {
            return None;
        }
        let counter = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; the session already
            // refreshed on start.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                counter.refresh_logged().await;
            }
        }))
    }
}

#[cfg(test)]
#[path = "unread_test.rs"]
mod tests;
