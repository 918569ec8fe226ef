use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::RwLock;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::WatchError;
use crate::diff::ChangeRecord;
use crate::diff::DiffStrategy;
use crate::http::Headers;
use crate::http::HttpFetcher;

/// How long `stop` waits for the poll task before aborting it.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

const IDLE: u8 = 0;
const ACTIVE: u8 = 1;
const STOPPED: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSource {
    pub url: String,
    pub headers: Headers,
}

impl WatchSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Headers::new(),
        }
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// One detected change, as handed to a [`ContentHandler`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentChange {
    pub source: String,
    /// `None` on the first dispatch for a watcher without a baseline.
    pub old_content: Option<String>,
    pub new_content: String,
    pub changes: Vec<ChangeRecord>,
}

pub trait ContentHandler: Send + Sync {
    fn on_change(&self, change: &ContentChange);
}

impl<F> ContentHandler for F
where
    F: Fn(&ContentChange) + Send + Sync,
{
    fn on_change(&self, change: &ContentChange) {
        self(change)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentSnapshot {
    pub source_key: String,
    pub last_raw_content: Option<String>,
    pub last_fetch_time: Option<DateTime<Utc>>,
}

/// Polls one URL and dispatches changes between successive bodies.
///
/// Lifecycle: idle until [`ContentWatcher::start_polling`], then active
/// until [`ContentWatcher::stop`]. A stopped watcher cannot be restarted.
pub struct ContentWatcher {
    inner: Arc<WatcherInner>,
    cancel: CancellationToken,
    task: StdMutex<Option<JoinHandle<()>>>,
}

struct WatcherInner {
    source: WatchSource,
    fetcher: Arc<dyn HttpFetcher>,
    strategy: DiffStrategy,
    state: AtomicU8,
    /// Held for the whole fetch + diff + dispatch cycle.
    cycle: Mutex<()>,
    snapshot: RwLock<ContentSnapshot>,
}

impl ContentWatcher {
    pub fn new(source: WatchSource, fetcher: Arc<dyn HttpFetcher>, strategy: DiffStrategy) -> Self {
        let snapshot = ContentSnapshot {
            source_key: source.url.clone(),
            ..ContentSnapshot::default()
        };
        Self {
            inner: Arc::new(WatcherInner {
                source,
                fetcher,
                strategy,
                state: AtomicU8::new(IDLE),
                cycle: Mutex::new(()),
                snapshot: RwLock::new(snapshot),
            }),
            cancel: CancellationToken::new(),
            task: StdMutex::new(None),
        }
    }

    /// Builds a watcher whose last content is seeded from one fetch, so the
    /// first poll only dispatches if the source changed since construction.
    pub async fn with_baseline(
        source: WatchSource,
        fetcher: Arc<dyn HttpFetcher>,
        strategy: DiffStrategy,
    ) -> Self {
        let watcher = Self::new(source, fetcher, strategy);
        watcher.inner.seed_baseline().await;
        watcher
    }

    pub fn url(&self) -> &str {
        &self.inner.source.url
    }

    pub fn strategy(&self) -> DiffStrategy {
        self.inner.strategy
    }

    pub fn is_active(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == ACTIVE
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == STOPPED
    }

    pub fn last_content(&self) -> Option<String> {
        self.inner.read_snapshot().last_raw_content
    }

    pub fn snapshot(&self) -> ContentSnapshot {
        self.inner.read_snapshot()
    }

    /// Fetches the source once. Failures are logged and yield `None`.
    pub async fn fetch(&self) -> Option<String> {
        self.inner.fetch().await
    }

    /// Fetches on a separate task; the caller decides whether to await it.
    pub fn spawn_fetch(&self) -> JoinHandle<Option<String>> {
        self.inner.spawn_fetch()
    }

    /// Re-seeds the last known content. Only allowed before polling starts.
    pub async fn load_baseline(&self) -> Result<bool, WatchError> {
        match self.inner.state.load(Ordering::Acquire) {
            IDLE => Ok(self.inner.seed_baseline().await),
            ACTIVE => Err(WatchError::AlreadyActive(self.inner.source.url.clone())),
            _ => Err(WatchError::Stopped(self.inner.source.url.clone())),
        }
    }

    /// Starts the poll loop. The first cycle runs immediately.
    pub fn start_polling(
        &self,
        interval: Duration,
        handler: Arc<dyn ContentHandler>,
    ) -> Result<(), WatchError> {
        if interval.is_zero() {
            return Err(WatchError::InvalidInterval);
        }
        match self
            .inner
            .state
            .compare_exchange(IDLE, ACTIVE, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {}
            Err(ACTIVE) => return Err(WatchError::AlreadyActive(self.inner.source.url.clone())),
            Err(_) => return Err(WatchError::Stopped(self.inner.source.url.clone())),
        }

        let inner = Arc::clone(&self.inner);
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(poll_loop(inner, interval, handler, cancel));
        *lock_task(&self.task) = Some(handle);
        info!(url = %self.inner.source.url, ?interval, "started watching");
        Ok(())
    }

    /// Runs a single fetch + diff + dispatch cycle. Returns whether the
    /// handler was invoked.
    pub async fn watch_once(&self, handler: &dyn ContentHandler) -> Result<bool, WatchError> {
        if self.is_stopped() {
            return Err(WatchError::Stopped(self.inner.source.url.clone()));
        }
        Ok(self.inner.run_cycle(handler, &self.cancel).await)
    }

    /// Dispatches a synthetic change from `old` to `new` and records `new`
    /// as the last content.
    pub async fn simulate_change(&self, old: &str, new: &str, handler: &dyn ContentHandler) {
        let _cycle = self.inner.cycle.lock().await;
        let change = ContentChange {
            source: self.inner.source.url.clone(),
            old_content: Some(old.to_string()),
            new_content: new.to_string(),
            changes: self.inner.strategy.diff(old, new),
        };
        dispatch(handler, &change);
        self.inner.replace_content(change.new_content);
        debug!(url = %self.inner.source.url, "dispatched simulated change");
    }

    /// Cancels polling and waits up to `grace` for the poll task to finish
    /// before aborting it. An in-flight fetch is left to complete on its
    /// own; its result is discarded. Calling `stop` again is a no-op.
    pub async fn stop(&self, grace: Duration) {
        let previous = self.inner.state.swap(STOPPED, Ordering::AcqRel);
        if previous == STOPPED {
            return;
        }
        self.cancel.cancel();
        let handle = lock_task(&self.task).take();
        if let Some(mut handle) = handle
            && tokio::time::timeout(grace, &mut handle).await.is_err()
        {
            warn!(url = %self.inner.source.url, "poll task did not stop within {grace:?}; aborting");
            handle.abort();
        }
        info!(url = %self.inner.source.url, "stopped watching");
    }
}

impl Drop for ContentWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl WatcherInner {
    fn read_snapshot(&self) -> ContentSnapshot {
        match self.snapshot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn update_snapshot(&self, update: impl FnOnce(&mut ContentSnapshot)) {
        let mut guard = match self.snapshot.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        update(&mut guard);
    }

    fn replace_content(&self, content: String) {
        let now = Utc::now();
        self.update_snapshot(|snapshot| {
            snapshot.last_raw_content = Some(content);
            snapshot.last_fetch_time = Some(now);
        });
    }

    async fn fetch(&self) -> Option<String> {
        match self
            .fetcher
            .get(&self.source.url, &self.source.headers)
            .await
        {
            Ok(body) => Some(body),
            Err(err) => {
                warn!(url = %self.source.url, error = %err, "failed to fetch content");
                None
            }
        }
    }

    fn spawn_fetch(self: &Arc<Self>) -> JoinHandle<Option<String>> {
        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.fetch().await })
    }

    async fn seed_baseline(&self) -> bool {
        let _cycle = self.cycle.lock().await;
        match self.fetch().await {
            Some(content) => {
                self.replace_content(content);
                true
            }
            None => false,
        }
    }

    async fn run_cycle(
        self: &Arc<Self>,
        handler: &dyn ContentHandler,
        cancel: &CancellationToken,
    ) -> bool {
        let _cycle = self.cycle.lock().await;
        let fetch = self.spawn_fetch();
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(url = %self.source.url, "cycle cancelled; discarding in-flight fetch");
                return false;
            }
            joined = fetch => joined,
        };
        match fetched {
            Ok(Some(content)) => self.apply(content, handler),
            Ok(None) => false,
            Err(err) => {
                warn!(url = %self.source.url, error = %err, "fetch task failed");
                false
            }
        }
    }

    /// Must be called with the cycle lock held.
    fn apply(&self, new_content: String, handler: &dyn ContentHandler) -> bool {
        let old_content = self.read_snapshot().last_raw_content;
        if old_content.as_deref() == Some(new_content.as_str()) {
            let now = Utc::now();
            self.update_snapshot(|snapshot| snapshot.last_fetch_time = Some(now));
            return false;
        }

        let changes = match old_content.as_deref() {
            Some(old) => self.strategy.diff(old, &new_content),
            None => Vec::new(),
        };
        debug!(url = %self.source.url, changes = changes.len(), "content changed");
        let change = ContentChange {
            source: self.source.url.clone(),
            old_content,
            new_content,
            changes,
        };
        dispatch(handler, &change);
        self.replace_content(change.new_content);
        true
    }
}

async fn poll_loop(
    inner: Arc<WatcherInner>,
    period: Duration,
    handler: Arc<dyn ContentHandler>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                inner.run_cycle(handler.as_ref(), &cancel).await;
            }
        }
    }
    debug!(url = %inner.source.url, "poll loop exited");
}

fn dispatch(handler: &dyn ContentHandler, change: &ContentChange) {
    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| handler.on_change(change)));
    if outcome.is_err() {
        error!(url = %change.source, "content handler panicked");
    }
}

fn lock_task(
    task: &StdMutex<Option<JoinHandle<()>>>,
) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
    match task.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
