use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::journey::JourneyDefinition;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoadStartRequest {
    pub journey: JourneyDefinition,
    pub rate_per_minute: u32,
    /// Auto-stop after this many seconds; runs until stopped when absent.
    #[serde(default, alias = "duration", skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
    #[serde(default)]
    pub chained: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoadStartResponse {
    pub load_test_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoadStopRequest {
    pub load_test_id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoadStats {
    pub iterations: u64,
    pub successes: u64,
    pub errors: u64,
    pub flag_toggles: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LoadTestState {
    Running,
    /// Duration elapsed; stats kept until stopped.
    Finished,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoadTest {
    pub id: String,
    pub company_name: String,
    pub rate_per_minute: u32,
    pub chained: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
    pub started_at: u64,
    pub state: LoadTestState,
    pub stats: LoadStats,
}
