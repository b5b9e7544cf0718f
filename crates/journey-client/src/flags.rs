//! Process-local feature flag cache.
//!
//! The cached set lives in a `watch` channel: readers take a copy, a refresh
//! swaps the whole value, and nobody ever holds a reference into it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use journey_protocol::FeatureFlagSet;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::fleet::FleetClient;

/// Where the authoritative flag set comes from.
#[async_trait]
pub trait FlagSource: Send + Sync {
    async fn fetch(&self) -> Result<FeatureFlagSet, ClientError>;
}

#[async_trait]
impl FlagSource for FleetClient {
    async fn fetch(&self) -> Result<FeatureFlagSet, ClientError> {
        self.feature_flags().await
    }
}

#[derive(Debug, Error)]
#[error("feature flag refresh failed: {0}")]
pub struct ConfigRefreshFailed(pub String);

#[derive(Debug, Clone)]
pub struct FeatureFlagStore {
    sender: Arc<watch::Sender<FeatureFlagSet>>,
}

impl Default for FeatureFlagStore {
    fn default() -> Self {
        Self::new(FeatureFlagSet::default())
    }
}

impl FeatureFlagStore {
    pub fn new(initial: FeatureFlagSet) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn snapshot(&self) -> FeatureFlagSet {
        *self.sender.borrow()
    }

    /// Swap in a new set; returns the one it replaced.
    pub fn replace(&self, next: FeatureFlagSet) -> FeatureFlagSet {
        self.sender.send_replace(next)
    }

    pub fn subscribe(&self) -> watch::Receiver<FeatureFlagSet> {
        self.sender.subscribe()
    }

    /// Fetch once from `source`. Returns whether the cached set changed; on
    /// error the cached set is left as it was.
    pub async fn refresh(&self, source: &dyn FlagSource) -> Result<bool, ConfigRefreshFailed> {
        let next = source
            .fetch()
            .await
            .map_err(|e| ConfigRefreshFailed(e.to_string()))?;
        next.validate()
            .map_err(|e| ConfigRefreshFailed(format!("rejected flag set: {e}")))?;
        Ok(self.sender.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        }))
    }

    /// Poll `source` every `interval` until `shutdown` fires. Failures are
    /// logged and never surface to readers.
    pub fn spawn_refresh(
        &self,
        source: Arc<dyn FlagSource>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = ticker.tick() => match store.refresh(source.as_ref()).await {
                        Ok(true) => debug!(flags = ?store.snapshot(), "feature flags updated"),
                        Ok(false) => {}
                        Err(err) => warn!(%err, "keeping previous feature flags"),
                    },
                }
            }
        })
    }
}
