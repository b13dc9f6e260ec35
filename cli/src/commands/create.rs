//! create command

use anyhow::Context;
use sase_orchestrator::{default_ssh_key_path, read_ssh_public_key, CreateRequest, TemplateLocation};
use std::process::ExitCode;
use tracing::info;

use super::CreateArgs;
use crate::config::Config;
use crate::output::{CreateReport, OutputFormat};

pub async fn handle(args: CreateArgs, settings: &Config, format: OutputFormat) -> anyhow::Result<ExitCode> {
    let template = TemplateLocation::from_args(args.template_path, args.template_link)?;

    let key_path = match args.ssh_key {
        Some(path) => path,
        None => default_ssh_key_path().context("Cannot find home directory for the default SSH key")?,
    };
    let ssh_key = read_ssh_public_key(&key_path).await?;

    let provisioner = super::provisioner(settings)?;

    let mut request = CreateRequest::new(args.resource_group, args.engine_username, template, ssh_key);
    request.location = args.location;
    request.deployment_name = args.deployment_name;
    request.tag_value = args.tag_value;
    request.engine_location = args.engine_location;
    request = request.with_force_remove(args.force_remove);
    if !args.no_policy {
        request = request.with_policy(args.policy);
    }

    info!("Creating NGFW {} in {}", request.resource_group, request.location);
    let outcome = provisioner.create(request).await?;

    println!("{}", CreateReport::new(&outcome).render(format)?);
    Ok(ExitCode::SUCCESS)
}
