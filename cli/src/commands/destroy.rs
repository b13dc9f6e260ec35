//! destroy command

use sase_orchestrator::GroupDeletion;
use std::process::ExitCode;

use super::DestroyArgs;
use crate::config::Config;
use crate::output::{DestroyReport, OutputFormat};

pub async fn handle(args: DestroyArgs, settings: &Config, format: OutputFormat) -> anyhow::Result<ExitCode> {
    let provisioner = super::provisioner(settings)?;
    let outcome = provisioner.destroy(&args.resource_group).await;

    println!("{}", DestroyReport::new(&outcome).render(format)?);

    // Engine cleanup failures are reported but tolerated
    Ok(match outcome.group {
        GroupDeletion::Failed(_) => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}
