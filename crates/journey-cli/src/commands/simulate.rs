//! `journey simulate` command.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use journey_protocol::{FailurePolicy, RunStatus};

use crate::input::load_request;
use crate::opts::FleetOpts;
use crate::output::print_success;

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Journey JSON file, or `-` for stdin
    pub file: PathBuf,

    /// Let each worker forward the remaining steps
    #[arg(long)]
    pub chained: bool,

    /// Keep executing steps after a failure
    #[arg(long)]
    pub continue_on_failure: bool,

    /// Pause each worker this long before its step
    #[arg(long)]
    pub think_time_ms: Option<u64>,

    /// Run without fault injection
    #[arg(long)]
    pub no_errors: bool,

    /// Exit non-zero unless the run completed
    #[arg(long)]
    pub strict: bool,
}

pub async fn cmd_simulate(opts: &FleetOpts, args: &SimulateArgs) -> Result<()> {
    let mut request = load_request(&args.file)?;
    if args.chained {
        request.chained = true;
    }
    if args.continue_on_failure {
        request.failure_policy = Some(FailurePolicy::ContinueOnFailure);
    }
    if let Some(ms) = args.think_time_ms {
        request.think_time_ms = ms;
    }
    if args.no_errors {
        request.error_simulation_enabled = false;
    }

    let run = opts.client()?.simulate(&request).await?;
    let mut warnings = Vec::new();
    if let Some(failure) = &run.failure {
        warnings.push(format!(
            "step {} ({}) failed: {}",
            failure.step_name, failure.service_name, failure.error.message
        ));
    }
    let completed = run.status == RunStatus::Completed;
    let status = run.status;
    print_success(opts, serde_json::to_value(run)?, warnings)?;
    if args.strict && !completed {
        anyhow::bail!("journey finished with status {status:?}");
    }
    Ok(())
}
