//! CLI Commands

pub mod create;
pub mod destroy;
pub mod list;

use anyhow::Context;
use clap::{ArgGroup, Args};
use sase_cloud_connector::{ArmConfig, AzureClient, CloudOrchestrator, CredentialChain, Environment};
use sase_orchestrator::{
    Provisioner, DEFAULT_DEPLOYMENT_NAME, DEFAULT_LOCATION, DEFAULT_POLICY, DEFAULT_TAG_VALUE,
};
use sase_smc::{SmcClient, SmcConfig};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("template").required(true).args(["template_path", "template_link"])))]
pub struct CreateArgs {
    /// Login name for the engine VM
    #[arg(long)]
    pub engine_username: String,

    /// Resource group to create; also the engine name in the SMC
    #[arg(long)]
    pub resource_group: String,

    /// Local deployment template (JSON)
    #[arg(long)]
    pub template_path: Option<PathBuf>,

    /// URL of a deployment template
    #[arg(long)]
    pub template_link: Option<String>,

    /// Azure region
    #[arg(long, default_value = DEFAULT_LOCATION)]
    pub location: String,

    #[arg(long, default_value = DEFAULT_DEPLOYMENT_NAME)]
    pub deployment_name: String,

    /// Value of the provenance tag on the resource group
    #[arg(long, default_value = DEFAULT_TAG_VALUE)]
    pub tag_value: String,

    /// Firewall policy to upload once the engine is deployed
    #[arg(long, default_value = DEFAULT_POLICY)]
    pub policy: String,

    /// Leave the engine without a policy
    #[arg(long, conflicts_with = "policy")]
    pub no_policy: bool,

    /// SMC location element for the engine
    #[arg(long)]
    pub engine_location: Option<String>,

    /// Delete an existing engine of the same name first
    #[arg(long)]
    pub force_remove: bool,

    /// SSH public key file (defaults to ~/.ssh/id_rsa.pub)
    #[arg(long)]
    pub ssh_key: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DestroyArgs {
    #[arg(long)]
    pub resource_group: String,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("mode").required(true).args(["by_tag", "all", "group", "locations"])))]
pub struct ListArgs {
    /// Resource groups carrying a tag key
    #[arg(long, num_args = 0..=1, default_missing_value = sase_cloud_connector::DEFAULT_DISCOVERY_TAG)]
    pub by_tag: Option<String>,

    /// Every resource group in the subscription
    #[arg(long)]
    pub all: bool,

    /// Resources inside a resource group
    #[arg(long)]
    pub group: Option<String>,

    /// Regions available to the subscription
    #[arg(long)]
    pub locations: bool,
}

/// Resource Manager client from the environment. Fails before any remote
/// call when no credentials can be resolved.
pub fn azure_client(settings: &Config) -> anyhow::Result<AzureClient> {
    let env = Environment::capture();
    let credentials = CredentialChain::default().resolve(&env)?;
    let mut config = ArmConfig::from_environment(&env)?;
    config.poll_interval = settings.orchestrator.poll_interval();
    tracing::debug!(kind = credentials.kind(), subscription = %config.subscription_id, "Azure credentials resolved");
    Ok(AzureClient::new(config, credentials)?)
}

pub fn smc_client() -> anyhow::Result<SmcClient> {
    let config = SmcConfig::from_env().context("SMC connection settings")?;
    Ok(SmcClient::new(config)?)
}

pub fn provisioner(settings: &Config) -> anyhow::Result<Provisioner<SmcClient, AzureClient>> {
    let cloud = CloudOrchestrator::new(Arc::new(azure_client(settings)?));
    let smc = Arc::new(smc_client()?);
    Ok(Provisioner::new(smc, cloud, settings.orchestrator.clone()))
}
