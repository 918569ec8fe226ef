use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use clap::Parser;
use clap::ValueEnum;
use forumsync_core::ContentWatcher;
use forumsync_core::DiffStrategy;
use forumsync_core::FeedWatermarkWatcher;
use forumsync_core::ForumSyncConfig;
use forumsync_core::HttpFetcher;
use forumsync_core::ReqwestFetcher;
use forumsync_core::config::FeedConfig;
use forumsync_core::config::FeedFormat;
use forumsync_core::config::WatcherConfig;
use forumsync_core::watcher::ContentChange;
use forumsync_core::watcher::DEFAULT_STOP_GRACE;
use forumsync_core::watcher::FeedHandler;
use forumsync_core::watcher::FeedItem;
use forumsync_core::watcher::FeedParser;
use forumsync_core::watcher::JsonFeedParser;
use forumsync_core::watcher::RssFeedParser;
use forumsync_core::watcher::WatchSource;
use serde::Serialize;
use tracing::info;
use tracing::warn;

use crate::emit_json_line;
use crate::parse_headers;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DiffArg {
    Structural,
    None,
}

impl From<DiffArg> for DiffStrategy {
    fn from(value: DiffArg) -> Self {
        match value {
            DiffArg::Structural => DiffStrategy::Structural,
            DiffArg::None => DiffStrategy::None,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Rss,
    Json,
}

impl From<FormatArg> for FeedFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Rss => FeedFormat::Rss,
            FormatArg::Json => FeedFormat::Json,
        }
    }
}

#[derive(Debug, Parser)]
pub struct WatchUrlArgs {
    #[arg(value_name = "URL")]
    url: String,

    #[arg(long = "interval-secs", value_name = "SECS", default_value_t = 60)]
    interval_secs: u64,

    /// Extra request header, repeatable.
    #[arg(long = "header", value_name = "KEY=VALUE")]
    headers: Vec<String>,

    #[arg(long = "diff", value_enum, default_value = "structural")]
    diff: DiffArg,

    /// Fetch once up front so only later changes are printed.
    #[arg(long = "baseline", default_value_t = false)]
    baseline: bool,

    /// Run a single poll and exit.
    #[arg(long = "once", default_value_t = false)]
    once: bool,
}

#[derive(Debug, Parser)]
pub struct WatchFeedArgs {
    #[arg(value_name = "URL")]
    url: String,

    #[arg(long = "interval-secs", value_name = "SECS", default_value_t = 60)]
    interval_secs: u64,

    #[arg(long = "header", value_name = "KEY=VALUE")]
    headers: Vec<String>,

    #[arg(long = "format", value_enum, default_value = "rss")]
    format: FormatArg,

    /// Treat every item at or below this sequence as already seen.
    #[arg(long = "initial-sequence", value_name = "N", default_value_t = 0)]
    initial_sequence: u64,

    /// Seed the baseline, run a single poll and exit.
    #[arg(long = "once", default_value_t = false)]
    once: bool,
}

#[derive(Debug, Parser)]
pub struct WatchArgs {
    #[arg(long = "config", value_name = "FILE")]
    config: PathBuf,
}

#[derive(Serialize)]
struct FeedLine<'a> {
    source: &'a str,
    #[serde(flatten)]
    item: &'a FeedItem,
}

fn fetcher() -> Result<Arc<dyn HttpFetcher>> {
    let fetcher = ReqwestFetcher::new().context("failed to build http client")?;
    Ok(Arc::new(fetcher))
}

fn print_change(change: &ContentChange) {
    if let Err(err) = emit_json_line(change) {
        warn!(source = %change.source, error = %err, "failed to print change");
    }
}

fn feed_printer(source: String) -> Arc<dyn FeedHandler> {
    Arc::new(move |item: &FeedItem| {
        let line = FeedLine {
            source: &source,
            item,
        };
        if let Err(err) = emit_json_line(&line) {
            warn!(%source, sequence = item.sequence, error = %err, "failed to print feed item");
        }
    })
}

fn parser_for(format: FeedFormat) -> Arc<dyn FeedParser> {
    match format {
        FeedFormat::Rss => Arc::new(RssFeedParser),
        FeedFormat::Json => Arc::new(JsonFeedParser),
    }
}

fn interval(secs: u64) -> Result<Duration> {
    if secs == 0 {
        bail!("--interval-secs must be greater than zero");
    }
    Ok(Duration::from_secs(secs))
}

pub async fn run_watch_url(args: WatchUrlArgs) -> Result<()> {
    let source = WatchSource::new(args.url).with_headers(parse_headers(&args.headers)?);
    let strategy = DiffStrategy::from(args.diff);
    let fetcher = fetcher()?;
    let watcher = if args.baseline {
        ContentWatcher::with_baseline(source, fetcher, strategy).await
    } else {
        ContentWatcher::new(source, fetcher, strategy)
    };

    if args.once {
        watcher.watch_once(&print_change).await?;
        return Ok(());
    }

    let period = interval(args.interval_secs)?;
    watcher.start_polling(period, Arc::new(print_change))?;
    wait_for_shutdown().await?;
    watcher.stop(DEFAULT_STOP_GRACE).await;
    Ok(())
}

pub async fn run_watch_feed(args: WatchFeedArgs) -> Result<()> {
    let source = WatchSource::new(args.url.clone()).with_headers(parse_headers(&args.headers)?);
    let watcher = FeedWatermarkWatcher::new(
        source,
        fetcher()?,
        parser_for(args.format.into()),
        feed_printer(args.url),
        args.initial_sequence,
    );

    if args.once {
        let dispatched = watcher.watch_once().await?;
        info!(dispatched, watermark = watcher.watermark(), "feed poll finished");
        return Ok(());
    }

    watcher.start_watching(interval(args.interval_secs)?)?;
    wait_for_shutdown().await?;
    watcher.stop(DEFAULT_STOP_GRACE).await;
    Ok(())
}

pub async fn run_watch(args: WatchArgs) -> Result<()> {
    let config = ForumSyncConfig::load(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;
    if config.watchers.is_empty() && config.feeds.is_empty() {
        bail!("{} declares no watchers or feeds", args.config.display());
    }
    let fetcher = fetcher()?;

    let mut content_watchers = Vec::with_capacity(config.watchers.len());
    for watcher_config in &config.watchers {
        content_watchers.push(start_content_watcher(watcher_config, &fetcher)?);
    }
    let mut feed_watchers = Vec::with_capacity(config.feeds.len());
    for feed_config in &config.feeds {
        feed_watchers.push(start_feed_watcher(feed_config, &fetcher)?);
    }
    info!(
        watchers = content_watchers.len(),
        feeds = feed_watchers.len(),
        "watching; press Ctrl-C to stop"
    );

    wait_for_shutdown().await?;
    for watcher in &content_watchers {
        watcher.stop(DEFAULT_STOP_GRACE).await;
    }
    for watcher in &feed_watchers {
        watcher.stop(DEFAULT_STOP_GRACE).await;
    }
    Ok(())
}

fn start_content_watcher(
    config: &WatcherConfig,
    fetcher: &Arc<dyn HttpFetcher>,
) -> Result<ContentWatcher> {
    let source = WatchSource::new(config.url.clone()).with_headers(config.headers.clone());
    let watcher = ContentWatcher::new(source, Arc::clone(fetcher), config.diff);
    watcher
        .start_polling(config.interval(), Arc::new(print_change))
        .with_context(|| format!("failed to start watcher for {}", config.url))?;
    Ok(watcher)
}

fn start_feed_watcher(
    config: &FeedConfig,
    fetcher: &Arc<dyn HttpFetcher>,
) -> Result<FeedWatermarkWatcher> {
    let source = WatchSource::new(config.url.clone()).with_headers(config.headers.clone());
    let watcher = FeedWatermarkWatcher::new(
        source,
        Arc::clone(fetcher),
        parser_for(config.format),
        feed_printer(config.url.clone()),
        config.initial_sequence,
    );
    watcher
        .start_watching(config.interval())
        .with_context(|| format!("failed to start feed watcher for {}", config.url))?;
    Ok(watcher)
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("shutting down");
    Ok(())
}
