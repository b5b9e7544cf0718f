//! `journey services` commands.

use anyhow::Result;
use clap::Args;

use crate::opts::FleetOpts;
use crate::output::{print_success, table};

#[derive(Args, Debug)]
pub struct ServiceArgs {
    /// Service name
    pub name: String,
}

pub async fn cmd_list(opts: &FleetOpts) -> Result<()> {
    let services = opts.client()?.list_services().await?;
    if opts.json || opts.pretty {
        return print_success(opts, serde_json::to_value(services)?, vec![]);
    }
    let rows = services.iter().map(|s| {
        vec![
            s.service_name.clone(),
            serde_json::to_value(s.state)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
            s.port.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
            s.pid.map(|p| format!("pid {p}")).unwrap_or_default(),
        ]
    });
    print_success(opts, table(rows), vec![])
}

pub async fn cmd_ensure(opts: &FleetOpts, args: &ServiceArgs) -> Result<()> {
    let ensured = opts.client()?.ensure_service(&args.name).await?;
    print_success(opts, serde_json::to_value(ensured)?, vec![])
}

pub async fn cmd_terminate(opts: &FleetOpts, args: &ServiceArgs) -> Result<()> {
    let info = opts.client()?.terminate_service(&args.name).await?;
    print_success(opts, serde_json::to_value(info)?, vec![])
}

pub async fn cmd_breakers(opts: &FleetOpts) -> Result<()> {
    let breakers = opts.client()?.circuit_breakers().await?;
    print_success(opts, serde_json::to_value(breakers)?, vec![])
}
