//! list command

use futures::TryStreamExt;
use sase_cloud_connector::{CloudOrchestrator, Discovered, Discovery, ListMode};
use std::process::ExitCode;
use std::sync::Arc;

use super::ListArgs;
use crate::config::Config;
use crate::output::{render_discovered, OutputFormat};

pub fn list_mode(args: ListArgs) -> anyhow::Result<ListMode> {
    Ok(ListMode::from_selection(args.by_tag, args.all, args.group, args.locations)?)
}

pub async fn handle(args: ListArgs, settings: &Config, format: OutputFormat) -> anyhow::Result<ExitCode> {
    let mode = list_mode(args)?;
    let client = super::azure_client(settings)?;
    let subscription_id = client.subscription_id().to_string();
    let discovery = Discovery::new(CloudOrchestrator::new(Arc::new(client)), subscription_id);

    let items: Vec<Discovered> = discovery.discover(&mode).try_collect().await?;
    println!("{}", render_discovered(&items, format)?);
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(by_tag: Option<&str>, all: bool, group: Option<&str>, locations: bool) -> ListArgs {
        ListArgs {
            by_tag: by_tag.map(String::from),
            all,
            group: group.map(String::from),
            locations,
        }
    }

    #[test]
    fn test_list_mode() {
        assert_eq!(list_mode(args(Some("stonesoft"), false, None, false)).unwrap(), ListMode::ByTag("stonesoft".into()));
        assert_eq!(
            list_mode(args(None, false, Some("rg1"), false)).unwrap(),
            ListMode::ResourcesInGroup("rg1".into())
        );
        assert!(list_mode(args(None, true, None, true)).is_err());
    }
}
