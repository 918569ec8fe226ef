use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::Weak;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use forumsync_utils_readiness::Readiness;
use forumsync_utils_readiness::ReadinessFlag;
use serde::Deserialize;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::ContentChange;
use super::ContentHandler;
use super::ContentWatcher;
use super::WatchError;
use super::WatchSource;
use crate::diff::DiffStrategy;
use crate::http::HttpFetcher;

/// Highest sequence number processed for one source. Never decreases.
#[derive(Debug)]
pub struct Watermark {
    source_key: String,
    highest: AtomicU64,
}

impl Watermark {
    pub fn new(source_key: impl Into<String>, initial: u64) -> Self {
        Self {
            source_key: source_key.into(),
            highest: AtomicU64::new(initial),
        }
    }

    pub fn source_key(&self) -> &str {
        &self.source_key
    }

    pub fn current(&self) -> u64 {
        self.highest.load(Ordering::Acquire)
    }

    /// Moves the mark to `candidate` if it is strictly higher. Returns `true`
    /// only for the caller whose compare-and-set installed `candidate`.
    pub fn advance(&self, candidate: u64) -> bool {
        let mut current = self.highest.load(Ordering::Acquire);
        loop {
            if candidate <= current {
                return false;
            }
            match self.highest.compare_exchange_weak(
                current,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Raises the mark to at least `value` without dispatch semantics.
    pub fn seed(&self, value: u64) -> u64 {
        self.highest.fetch_max(value, Ordering::AcqRel).max(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    #[serde(alias = "guid")]
    pub sequence: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub published: Option<String>,
    #[serde(default)]
    pub creator: Option<String>,
    #[serde(default)]
    pub forum: Option<String>,
}

/// Turns a raw feed body into items. Unparsable input yields no items.
pub trait FeedParser: Send + Sync {
    fn parse(&self, raw: &str) -> Vec<FeedItem>;
}

pub trait FeedHandler: Send + Sync {
    fn on_item(&self, item: &FeedItem);
}

impl<F> FeedHandler for F
where
    F: Fn(&FeedItem) + Send + Sync,
{
    fn on_item(&self, item: &FeedItem) {
        self(item)
    }
}

/// Polls a sequenced feed and dispatches each item newer than the watermark
/// exactly once, in ascending sequence order.
///
/// Unless an initial sequence is supplied, construction spawns a baseline
/// fetch whose maximum sequence seeds the watermark. If that fetch fails,
/// the next successful poll becomes the baseline instead and dispatches
/// nothing. Must be constructed inside a tokio runtime.
pub struct FeedWatermarkWatcher {
    shared: Arc<FeedShared>,
    start_scheduled: AtomicBool,
    start_task: StdMutex<Option<JoinHandle<()>>>,
}

struct FeedShared {
    watcher: ContentWatcher,
    parser: Arc<dyn FeedParser>,
    handler: Arc<dyn FeedHandler>,
    watermark: Watermark,
    initialised: AtomicBool,
    baseline: ReadinessFlag,
}

impl FeedWatermarkWatcher {
    pub fn new(
        source: WatchSource,
        fetcher: Arc<dyn HttpFetcher>,
        parser: Arc<dyn FeedParser>,
        handler: Arc<dyn FeedHandler>,
        initial_sequence: u64,
    ) -> Self {
        let url = source.url.clone();
        let initialised = initial_sequence > 0;
        let shared = Arc::new(FeedShared {
            watcher: ContentWatcher::new(source, fetcher, DiffStrategy::None),
            parser,
            handler,
            watermark: Watermark::new(url, initial_sequence),
            initialised: AtomicBool::new(initialised),
            baseline: if initialised {
                ReadinessFlag::ready()
            } else {
                ReadinessFlag::new()
            },
        });
        if !initialised {
            let seeding = Arc::clone(&shared);
            tokio::spawn(async move { seeding.seed_baseline().await });
        }
        Self {
            shared,
            start_scheduled: AtomicBool::new(false),
            start_task: StdMutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        self.shared.watermark.source_key()
    }

    pub fn watermark(&self) -> u64 {
        self.shared.watermark.current()
    }

    pub fn is_initialised(&self) -> bool {
        self.shared.initialised.load(Ordering::Acquire)
    }

    pub fn is_active(&self) -> bool {
        self.shared.watcher.is_active()
    }

    /// Resolves once baseline seeding has finished, successfully or not.
    pub async fn wait_baseline(&self) {
        self.shared.baseline.wait_ready().await;
    }

    /// Schedules polling to begin once baseline seeding has finished.
    /// May be called at most once.
    pub fn start_watching(&self, interval: Duration) -> Result<(), WatchError> {
        if interval.is_zero() {
            return Err(WatchError::InvalidInterval);
        }
        if self.shared.watcher.is_stopped() {
            return Err(WatchError::Stopped(self.url().to_string()));
        }
        if self.start_scheduled.swap(true, Ordering::AcqRel) {
            return Err(WatchError::AlreadyStarted(self.url().to_string()));
        }

        let shared = Arc::clone(&self.shared);
        let handler = content_handler(Arc::downgrade(&self.shared));
        let handle = tokio::spawn(async move {
            shared.baseline.wait_ready().await;
            if let Err(err) = shared.watcher.start_polling(interval, handler) {
                warn!(url = %shared.watermark.source_key(), error = %err, "feed polling did not start");
            }
        });
        *lock_task(&self.start_task) = Some(handle);
        Ok(())
    }

    /// Waits for the baseline, then runs one poll. Returns how many items
    /// were dispatched.
    pub async fn watch_once(&self) -> Result<usize, WatchError> {
        self.shared.baseline.wait_ready().await;
        let dispatched = AtomicUsize::new(0);
        let handler = |change: &ContentChange| {
            let count = self.shared.handle_content(&change.new_content);
            dispatched.fetch_add(count, Ordering::Relaxed);
        };
        self.shared.watcher.watch_once(&handler).await?;
        Ok(dispatched.load(Ordering::Relaxed))
    }

    /// Runs `raw` through the same path a poll would. Returns how many items
    /// were dispatched.
    pub fn ingest(&self, raw: &str) -> usize {
        self.shared.handle_content(raw)
    }

    pub async fn stop(&self, grace: Duration) {
        if let Some(handle) = lock_task(&self.start_task).take() {
            handle.abort();
        }
        self.shared.watcher.stop(grace).await;
    }
}

impl FeedShared {
    async fn seed_baseline(&self) {
        let url = self.watermark.source_key();
        match self.watcher.fetch().await {
            Some(content) => {
                let highest = self.parser.parse(&content).iter().map(|item| item.sequence).max();
                match highest {
                    Some(highest) => {
                        let watermark = self.watermark.seed(highest);
                        self.initialised.store(true, Ordering::Release);
                        info!(url, watermark, "seeded feed baseline");
                    }
                    None => warn!(url, "baseline feed had no items; next poll becomes the baseline"),
                }
            }
            None => warn!(url, "failed to seed feed baseline; next poll becomes the baseline"),
        }
        self.baseline.mark_ready();
    }

    fn handle_content(&self, raw: &str) -> usize {
        let mut items = self.parser.parse(raw);
        if items.is_empty() {
            return 0;
        }
        let url = self.watermark.source_key();

        if !self.initialised.load(Ordering::Acquire) {
            if let Some(highest) = items.iter().map(|item| item.sequence).max() {
                let watermark = self.watermark.seed(highest);
                info!(url, watermark, "first successful poll seeded the watermark");
            }
            self.initialised.store(true, Ordering::Release);
            return 0;
        }

        items.sort_by_key(|item| item.sequence);
        let mut dispatched = 0;
        for item in &items {
            let previous = self.watermark.current();
            if !self.watermark.advance(item.sequence) {
                continue;
            }
            debug!(url, previous, sequence = item.sequence, "dispatching new feed item");
            let outcome =
                std::panic::catch_unwind(AssertUnwindSafe(|| self.handler.on_item(item)));
            if outcome.is_err() {
                error!(url, sequence = item.sequence, "feed handler panicked");
            }
            dispatched += 1;
        }
        dispatched
    }
}

fn content_handler(shared: Weak<FeedShared>) -> Arc<dyn ContentHandler> {
    Arc::new(move |change: &ContentChange| {
        if let Some(shared) = shared.upgrade() {
            shared.handle_content(&change.new_content);
        }
    })
}

fn lock_task(
    task: &StdMutex<Option<JoinHandle<()>>>,
) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
    match task.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
