//! Global CLI options.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use journey_client::FleetClient;

/// Options shared by every command. Each can also be set via env vars.
#[derive(Args, Debug, Clone)]
pub struct FleetOpts {
    /// Control plane base URL (env: JOURNEY_URL)
    #[arg(
        long,
        global = true,
        env = "JOURNEY_URL",
        default_value = "http://127.0.0.1:8080"
    )]
    pub url: String,

    /// Client-side request timeout in milliseconds (env: JOURNEY_TIMEOUT_MS)
    #[arg(long, global = true, env = "JOURNEY_TIMEOUT_MS", default_value_t = 60_000)]
    pub timeout_ms: u64,

    /// JSON output envelope
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output (implies --json)
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Suppress notices
    #[arg(long, global = true)]
    pub quiet: bool,
}

impl FleetOpts {
    pub fn client(&self) -> Result<FleetClient> {
        FleetClient::new(self.url.clone(), Duration::from_millis(self.timeout_ms))
            .with_context(|| format!("build client for {}", self.url))
    }
}
