//! `journey flags` commands.

use anyhow::{Result, bail};
use clap::Args;
use journey_protocol::{FeatureFlagPatch, FlagUpdateRequest};

use crate::opts::FleetOpts;
use crate::output::print_success;

#[derive(Args, Debug)]
pub struct FlagSetArgs {
    /// Probability a worker fails an error-eligible step
    #[arg(long)]
    pub errors_per_transaction: Option<f64>,

    /// Probability a generated visit is error-eligible
    #[arg(long)]
    pub errors_per_visit: Option<f64>,

    /// Cap on injected failures per worker per minute (0 = no cap)
    #[arg(long)]
    pub errors_per_minute: Option<u32>,

    /// Toggle injection every N load iterations
    #[arg(long)]
    pub regenerate_every: Option<u64>,
}

impl FlagSetArgs {
    fn patch(&self) -> FeatureFlagPatch {
        FeatureFlagPatch {
            errors_per_transaction: self.errors_per_transaction,
            errors_per_visit: self.errors_per_visit,
            errors_per_minute: self.errors_per_minute,
            regenerate_every_n_transactions: self.regenerate_every,
        }
    }
}

pub async fn cmd_get(opts: &FleetOpts) -> Result<()> {
    let flags = opts.client()?.feature_flags().await?;
    print_success(opts, serde_json::to_value(flags)?, vec![])
}

pub async fn cmd_set(opts: &FleetOpts, args: &FlagSetArgs) -> Result<()> {
    let patch = args.patch();
    if patch == FeatureFlagPatch::default() {
        bail!("nothing to set; pass at least one flag");
    }
    let update = FlagUpdateRequest::Patch { flags: patch };
    let resp = opts.client()?.update_feature_flags(&update).await?;
    let warnings = vec![format!("applied to {}", resp.applied_to.join(", "))];
    print_success(opts, serde_json::to_value(resp.new)?, warnings)
}
