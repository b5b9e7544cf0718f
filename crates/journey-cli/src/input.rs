//! Journey definition files.

use std::path::Path;

use anyhow::{Context, Result};
use journey_protocol::{JourneyDefinition, SimulateRequest};
use serde_json::Value;

/// Read a journey from `path` (or stdin for `-`).
///
/// Accepts a bare definition or a full simulate request with a `journey` key;
/// in the latter case the request-level fields are kept.
pub fn load_request(path: &Path) -> Result<SimulateRequest> {
    let raw = if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin()).context("read journey from stdin")?
    } else {
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?
    };
    parse_request(&raw).with_context(|| format!("parse journey {}", path.display()))
}

pub fn parse_request(raw: &str) -> Result<SimulateRequest> {
    let value: Value = serde_json::from_str(raw)?;
    let request = if value.get("journey").is_some() {
        serde_json::from_value(value)?
    } else {
        SimulateRequest::new(serde_json::from_value::<JourneyDefinition>(value)?)
    };
    request.journey.validate()?;
    Ok(request)
}
