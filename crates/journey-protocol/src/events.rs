//! Outbound notifications to the external telemetry collaborator.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::flags::FeatureFlagSet;
use crate::journey::{JourneyContext, StepError, StepStatus};

pub const STEP_COMPLETED: &str = "step_completed";
pub const STEP_FAILED: &str = "step_failed";
pub const FLAG_CHANGED: &str = "feature_flag_change";

/// One event per processed step. Every field is populated before emission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BusinessEvent {
    pub event_type: String,
    pub journey_id: String,
    pub correlation_id: String,
    pub company_name: String,
    pub step_name: String,
    pub service_name: String,
    pub step_index: u32,
    pub instance_id: String,
    pub status: StepStatus,
    pub processing_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
    pub context: JourneyContext,
    pub emitted_at: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FlagChangeNotice {
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_test_id: Option<String>,
    pub iteration: u64,
    pub previous: FeatureFlagSet,
    pub new: FeatureFlagSet,
    pub emitted_at: u64,
}
