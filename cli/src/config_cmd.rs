use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use forumsync_core::ForumSyncConfig;
use serde::Serialize;

#[derive(Debug, Parser)]
pub struct CheckConfigArgs {
    #[arg(value_name = "FILE")]
    config: PathBuf,

    /// Only check the watcher and feed sections.
    #[arg(long = "watchers-only", default_value_t = false)]
    watchers_only: bool,
}

#[derive(Debug, Serialize, PartialEq)]
struct ConfigSummary {
    categories: usize,
    watchers: usize,
    feeds: usize,
    read_only: bool,
    greenlit_tag: String,
    greenlit_threshold: u32,
    greenlit_ratio: f64,
}

impl From<&ForumSyncConfig> for ConfigSummary {
    fn from(config: &ForumSyncConfig) -> Self {
        Self {
            categories: config.categories.len(),
            watchers: config.watchers.len(),
            feeds: config.feeds.len(),
            read_only: config.read_only,
            greenlit_tag: config.suggestion.greenlit_tag.clone(),
            greenlit_threshold: config.suggestion.greenlit_threshold,
            greenlit_ratio: config.suggestion.greenlit_ratio,
        }
    }
}

pub fn run(args: CheckConfigArgs) -> Result<()> {
    let config = ForumSyncConfig::load(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;
    if args.watchers_only {
        check_intervals(&config)?;
    } else {
        config
            .validate()
            .with_context(|| format!("{} is not a valid config", args.config.display()))?;
    }
    crate::emit_json_line(&ConfigSummary::from(&config))
}

fn check_intervals(config: &ForumSyncConfig) -> Result<()> {
    let zero = config
        .watchers
        .iter()
        .map(|watcher| (watcher.url.as_str(), watcher.interval_secs))
        .chain(config.feeds.iter().map(|feed| (feed.url.as_str(), feed.interval_secs)))
        .find(|(_, secs)| *secs == 0);
    if let Some((url, _)) = zero {
        anyhow::bail!("{url} polls every 0 seconds");
    }
    Ok(())
}
