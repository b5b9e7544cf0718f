use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::ValidationError;

/// Process-wide fault-injection settings. Consumers always hold a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlagSet {
    /// Probability in [0, 1] that a worker injects a failure into one step.
    pub errors_per_transaction: f64,
    /// Probability in [0, 1] that a generated visit is error-eligible.
    pub errors_per_visit: f64,
    /// Cap on injected failures per worker per rolling minute; 0 disables the cap.
    pub errors_per_minute: u32,
    /// The load generator toggles error injection every N iterations.
    pub regenerate_every_n_transactions: u64,
}

impl Default for FeatureFlagSet {
    fn default() -> Self {
        Self {
            errors_per_transaction: 0.0,
            errors_per_visit: 1.0,
            errors_per_minute: 0,
            regenerate_every_n_transactions: 100,
        }
    }
}

impl FeatureFlagSet {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_rate("errorsPerTransaction", self.errors_per_transaction)?;
        check_rate("errorsPerVisit", self.errors_per_visit)?;
        if self.regenerate_every_n_transactions < 1 {
            return Err(ValidationError::TooSmall {
                field: "regenerateEveryNTransactions",
                min: 1,
            });
        }
        Ok(())
    }

    pub fn apply(&self, patch: &FeatureFlagPatch) -> FeatureFlagSet {
        FeatureFlagSet {
            errors_per_transaction: patch
                .errors_per_transaction
                .unwrap_or(self.errors_per_transaction),
            errors_per_visit: patch.errors_per_visit.unwrap_or(self.errors_per_visit),
            errors_per_minute: patch.errors_per_minute.unwrap_or(self.errors_per_minute),
            regenerate_every_n_transactions: patch
                .regenerate_every_n_transactions
                .unwrap_or(self.regenerate_every_n_transactions),
        }
    }

    pub fn error_injection_enabled(&self) -> bool {
        self.errors_per_transaction > 0.0
    }
}

fn check_rate(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange { field, value })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlagPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors_per_transaction: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors_per_visit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors_per_minute: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regenerate_every_n_transactions: Option<u64>,
}

/// Either `{ "flags": { ...partial } }` or a complete flag set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum FlagUpdateRequest {
    Patch { flags: FeatureFlagPatch },
    Full(FeatureFlagSet),
}

impl FlagUpdateRequest {
    pub fn resolve(&self, current: &FeatureFlagSet) -> FeatureFlagSet {
        match self {
            FlagUpdateRequest::Patch { flags } => current.apply(flags),
            FlagUpdateRequest::Full(set) => *set,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FlagUpdateResponse {
    pub previous: FeatureFlagSet,
    pub new: FeatureFlagSet,
    pub applied_to: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_and_full_updates_both_parse() {
        let current = FeatureFlagSet::default();

        let patch: FlagUpdateRequest =
            serde_json::from_value(serde_json::json!({"flags": {"errorsPerTransaction": 0.5}}))
                .unwrap();
        let next = patch.resolve(&current);
        assert_eq!(next.errors_per_transaction, 0.5);
        assert_eq!(
            next.regenerate_every_n_transactions,
            current.regenerate_every_n_transactions
        );

        let full: FlagUpdateRequest = serde_json::from_value(serde_json::json!({
            "errorsPerTransaction": 0.2,
            "errorsPerVisit": 0.5,
            "errorsPerMinute": 10,
            "regenerateEveryNTransactions": 7
        }))
        .unwrap();
        let next = full.resolve(&current);
        assert_eq!(next.errors_per_minute, 10);
        assert_eq!(next.regenerate_every_n_transactions, 7);
    }

    #[test]
    fn validation_bounds_rates_and_period() {
        let mut set = FeatureFlagSet::default();
        assert!(set.validate().is_ok());
        set.errors_per_transaction = 1.5;
        assert!(set.validate().is_err());
        set.errors_per_transaction = 0.1;
        set.regenerate_every_n_transactions = 0;
        assert_eq!(
            set.validate(),
            Err(ValidationError::TooSmall {
                field: "regenerateEveryNTransactions",
                min: 1
            })
        );
    }
}
