//! Authoritative feature flags for the fleet. Workers poll these over HTTP;
//! in-process readers take snapshots from the same store.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use journey_client::{ClientError, FeatureFlagStore, FlagSource};
use journey_protocol::{FeatureFlagSet, FlagUpdateRequest, ValidationError};
use tracing::info;

#[derive(Debug)]
pub struct FlagRegistry {
    store: FeatureFlagStore,
    /// Serializes read-modify-write updates; readers never take it.
    writer: Mutex<()>,
}

impl FlagRegistry {
    pub fn new(initial: FeatureFlagSet) -> Result<Self, ValidationError> {
        initial.validate()?;
        Ok(Self {
            store: FeatureFlagStore::new(initial),
            writer: Mutex::new(()),
        })
    }

    pub fn store(&self) -> &FeatureFlagStore {
        &self.store
    }

    pub fn snapshot(&self) -> FeatureFlagSet {
        self.store.snapshot()
    }

    /// Apply a partial or full update. Invalid results leave the set unchanged.
    /// Returns `(previous, new)`.
    pub fn update(
        &self,
        request: &FlagUpdateRequest,
    ) -> Result<(FeatureFlagSet, FeatureFlagSet), ValidationError> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.store.snapshot();
        let next = request.resolve(&current);
        next.validate()?;
        let previous = self.store.replace(next);
        info!(?previous, new = ?next, "feature flags updated");
        Ok((previous, next))
    }

    /// Set `errorsPerTransaction` to `rate` when `enabled`, else to zero.
    /// Idempotent, so concurrent writers asking for the same state agree.
    pub fn set_error_injection(
        &self,
        enabled: bool,
        rate: f64,
    ) -> (FeatureFlagSet, FeatureFlagSet) {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.store.snapshot();
        let next = FeatureFlagSet {
            errors_per_transaction: if enabled { rate.clamp(0.0, 1.0) } else { 0.0 },
            ..current
        };
        let previous = self.store.replace(next);
        (previous, next)
    }
}

#[async_trait]
impl FlagSource for FlagRegistry {
    async fn fetch(&self) -> Result<FeatureFlagSet, ClientError> {
        Ok(self.snapshot())
    }
}
