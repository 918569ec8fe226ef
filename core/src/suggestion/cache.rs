use std::collections::HashMap;
use std::collections::HashSet;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tracing::debug;
use tracing::info;

use super::SuggestionRecord;
use crate::platform::CategoryId;
use crate::platform::ThreadId;

const COMMAND_CAPACITY: usize = 128;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("suggestion cache has shut down")]
    Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatus {
    /// At least one reconciliation pass has completed.
    pub initialized: bool,
    /// A reconciliation pass is in progress.
    pub updating: bool,
    pub len: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: Vec<ThreadId>,
    /// Expired records kept because their category could not be enumerated.
    pub retained: usize,
}

enum Command {
    Upsert {
        record: Box<SuggestionRecord>,
        reply: oneshot::Sender<()>,
    },
    Touch {
        thread_id: ThreadId,
        reply: oneshot::Sender<bool>,
    },
    Remove {
        thread_id: ThreadId,
        reply: oneshot::Sender<Option<SuggestionRecord>>,
    },
    Get {
        thread_id: ThreadId,
        reply: oneshot::Sender<Option<SuggestionRecord>>,
    },
    List {
        reply: oneshot::Sender<Vec<SuggestionRecord>>,
    },
    BeginRefresh {
        reply: oneshot::Sender<usize>,
    },
    FinishRefresh {
        failed_categories: HashSet<CategoryId>,
        reply: oneshot::Sender<SweepReport>,
    },
    Status {
        reply: oneshot::Sender<CacheStatus>,
    },
}

/// Handle to the single task that owns every cached [`SuggestionRecord`].
///
/// Live platform events and the periodic reconciliation both go through
/// this handle, so a sweep can never interleave with a half-applied update.
/// Cloning is cheap; the owning task exits once every handle is dropped.
#[derive(Debug, Clone)]
pub struct SuggestionCache {
    tx: mpsc::Sender<Command>,
}

impl SuggestionCache {
    /// Spawns the owning task. Must be called inside a tokio runtime.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        tokio::spawn(run(rx));
        Self { tx }
    }

    pub async fn get(&self, thread_id: ThreadId) -> Result<Option<SuggestionRecord>, CacheError> {
        self.request(|reply| Command::Get { thread_id, reply }).await
    }

    /// All records, most recently created first.
    pub async fn list(&self) -> Result<Vec<SuggestionRecord>, CacheError> {
        self.request(|reply| Command::List { reply }).await
    }

    /// Inserts or replaces the record for its thread and clears its expired flag.
    pub async fn upsert(&self, record: SuggestionRecord) -> Result<(), CacheError> {
        let record = Box::new(record);
        self.request(|reply| Command::Upsert { record, reply }).await
    }

    /// Live event: a new thread was created.
    pub async fn add(&self, record: SuggestionRecord) -> Result<(), CacheError> {
        debug!(thread_id = record.thread_id, "adding suggestion to cache");
        self.upsert(record).await
    }

    /// Live event: an existing thread changed.
    pub async fn update(&self, record: SuggestionRecord) -> Result<(), CacheError> {
        debug!(thread_id = record.thread_id, "updating cached suggestion");
        self.upsert(record).await
    }

    /// Clears the expired flag without replacing the record. Returns `false`
    /// when no record exists for the thread.
    pub async fn touch(&self, thread_id: ThreadId) -> Result<bool, CacheError> {
        self.request(|reply| Command::Touch { thread_id, reply }).await
    }

    pub async fn remove(
        &self,
        thread_id: ThreadId,
    ) -> Result<Option<SuggestionRecord>, CacheError> {
        self.request(|reply| Command::Remove { thread_id, reply }).await
    }

    /// Marks every record as tentatively expired. Returns how many were marked.
    pub async fn begin_refresh(&self) -> Result<usize, CacheError> {
        self.request(|reply| Command::BeginRefresh { reply }).await
    }

    /// Deletes every record still marked expired, except those belonging to
    /// `failed_categories`, whose flags are cleared instead.
    pub async fn finish_refresh(
        &self,
        failed_categories: HashSet<CategoryId>,
    ) -> Result<SweepReport, CacheError> {
        self.request(|reply| Command::FinishRefresh {
            failed_categories,
            reply,
        })
        .await
    }

    pub async fn status(&self) -> Result<CacheStatus, CacheError> {
        self.request(|reply| Command::Status { reply }).await
    }

    async fn request<R>(
        &self,
        command: impl FnOnce(oneshot::Sender<R>) -> Command,
    ) -> Result<R, CacheError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| CacheError::Closed)?;
        rx.await.map_err(|_| CacheError::Closed)
    }
}

#[derive(Default)]
struct CacheState {
    records: HashMap<ThreadId, SuggestionRecord>,
    initialized: bool,
    updating: bool,
}

async fn run(mut rx: mpsc::Receiver<Command>) {
    let mut state = CacheState::default();
    while let Some(command) = rx.recv().await {
        state.handle(command);
    }
    debug!("suggestion cache task exited");
}

impl CacheState {
    fn handle(&mut self, command: Command) {
        match command {
            Command::Upsert { record, reply } => {
                let mut record = *record;
                record.is_expired = false;
                self.records.insert(record.thread_id, record);
                let _ = reply.send(());
            }
            Command::Touch { thread_id, reply } => {
                let found = match self.records.get_mut(&thread_id) {
                    Some(record) => {
                        record.is_expired = false;
                        true
                    }
                    None => false,
                };
                let _ = reply.send(found);
            }
            Command::Remove { thread_id, reply } => {
                let removed = self.records.remove(&thread_id);
                if removed.is_some() {
                    debug!(thread_id, "removed suggestion from cache");
                }
                let _ = reply.send(removed);
            }
            Command::Get { thread_id, reply } => {
                let _ = reply.send(self.records.get(&thread_id).cloned());
            }
            Command::List { reply } => {
                let mut records: Vec<SuggestionRecord> = self.records.values().cloned().collect();
                records.sort_by(|a, b| {
                    b.created_at
                        .cmp(&a.created_at)
                        .then(b.thread_id.cmp(&a.thread_id))
                });
                let _ = reply.send(records);
            }
            Command::BeginRefresh { reply } => {
                self.updating = true;
                for record in self.records.values_mut() {
                    record.is_expired = true;
                }
                let _ = reply.send(self.records.len());
            }
            Command::FinishRefresh {
                failed_categories,
                reply,
            } => {
                let _ = reply.send(self.sweep(&failed_categories));
            }
            Command::Status { reply } => {
                let _ = reply.send(CacheStatus {
                    initialized: self.initialized,
                    updating: self.updating,
                    len: self.records.len(),
                });
            }
        }
    }

    fn sweep(&mut self, failed_categories: &HashSet<CategoryId>) -> SweepReport {
        let mut report = SweepReport::default();
        self.records.retain(|thread_id, record| {
            if !record.is_expired {
                return true;
            }
            if failed_categories.contains(&record.parent_category_id) {
                record.is_expired = false;
                report.retained += 1;
                return true;
            }
            report.removed.push(*thread_id);
            false
        });
        report.removed.sort_unstable();
        self.initialized = true;
        self.updating = false;
        info!(
            removed = report.removed.len(),
            retained = report.retained,
            remaining = self.records.len(),
            "swept expired suggestions"
        );
        report
    }
}
