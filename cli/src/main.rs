use clap::Parser;
use clap::Subcommand;
use forumsync_cli::config_cmd::CheckConfigArgs;
use forumsync_cli::watch_cmd::WatchArgs;
use forumsync_cli::watch_cmd::WatchFeedArgs;
use forumsync_cli::watch_cmd::WatchUrlArgs;
use tracing_subscriber::EnvFilter;

/// Polls remote content and feeds, printing every change as one JSON line.
#[derive(Debug, Parser)]
#[command(name = "forumsync", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poll a URL and print structural changes between successive bodies.
    WatchUrl(WatchUrlArgs),

    /// Poll an RSS or JSON feed and print items above the watermark.
    WatchFeed(WatchFeedArgs),

    /// Run every watcher and feed declared in a config file until Ctrl-C.
    Watch(WatchArgs),

    /// Load and validate a config file, printing a summary.
    CheckConfig(CheckConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::WatchUrl(args) => forumsync_cli::watch_cmd::run_watch_url(args).await,
        Command::WatchFeed(args) => forumsync_cli::watch_cmd::run_watch_feed(args).await,
        Command::Watch(args) => forumsync_cli::watch_cmd::run_watch(args).await,
        Command::CheckConfig(args) => forumsync_cli::config_cmd::run(args),
    }
}
