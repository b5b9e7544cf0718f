//! `journey load` commands.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use journey_protocol::{LoadStartRequest, LoadTest};
use serde_json::json;

use crate::input::load_request;
use crate::opts::FleetOpts;
use crate::output::{print_success, table};

#[derive(Args, Debug)]
pub struct LoadStartArgs {
    /// Journey JSON file, or `-` for stdin
    pub file: PathBuf,

    /// Journeys per minute
    #[arg(long, default_value_t = 60)]
    pub rate: u32,

    /// Stop automatically after this many seconds
    #[arg(long)]
    pub duration: Option<u64>,

    /// Run journeys in chained mode
    #[arg(long)]
    pub chained: bool,
}

#[derive(Args, Debug)]
pub struct LoadStopArgs {
    /// Load test id returned by `load start`
    pub id: String,
}

pub async fn cmd_start(opts: &FleetOpts, args: &LoadStartArgs) -> Result<()> {
    let request = load_request(&args.file)?;
    let body = LoadStartRequest {
        journey: request.journey,
        rate_per_minute: args.rate,
        duration_secs: args.duration,
        chained: args.chained || request.chained,
    };
    let started = opts.client()?.load_start(&body).await?;
    let data = if opts.json || opts.pretty {
        serde_json::to_value(started)?
    } else {
        json!(started.load_test_id)
    };
    print_success(opts, data, vec![])
}

pub async fn cmd_stop(opts: &FleetOpts, args: &LoadStopArgs) -> Result<()> {
    let stopped = opts.client()?.load_stop(&args.id).await?;
    print_success(opts, serde_json::to_value(stopped)?, vec![])
}

pub async fn cmd_status(opts: &FleetOpts) -> Result<()> {
    let tests = opts.client()?.load_status().await?;
    print_tests(opts, tests)
}

pub async fn cmd_stop_all(opts: &FleetOpts) -> Result<()> {
    let tests = opts.client()?.load_stop_all().await?;
    print_tests(opts, tests)
}

fn print_tests(opts: &FleetOpts, tests: Vec<LoadTest>) -> Result<()> {
    if opts.json || opts.pretty {
        return print_success(opts, serde_json::to_value(tests)?, vec![]);
    }
    let rows = tests.iter().map(|t| {
        vec![
            t.id.clone(),
            format!("{:?}", t.state).to_lowercase(),
            format!("{}/min", t.rate_per_minute),
            format!(
                "iterations={} ok={} errors={} toggles={}",
                t.stats.iterations, t.stats.successes, t.stats.errors, t.stats.flag_toggles
            ),
        ]
    });
    print_success(opts, table(rows), vec![])
}
