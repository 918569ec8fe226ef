use std::collections::HashSet;
use std::sync::Arc;

use chrono::DateTime;
use chrono::TimeDelta;
use chrono::Utc;
use thiserror::Error;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::CacheError;
use super::CategoryKind;
use super::SuggestionCache;
use super::SuggestionRecord;
use crate::config::CategoryConfig;
use crate::config::ForumSyncConfig;
use crate::platform::CategoryId;
use crate::platform::ForumCategory;
use crate::platform::ForumPlatform;
use crate::platform::ForumThread;
use crate::platform::PlatformError;
use crate::platform::ThreadEdit;
use crate::platform::ThreadId;
use crate::platform::dedupe_threads;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub categories: usize,
    pub failed_categories: Vec<CategoryId>,
    pub threads_seen: usize,
    pub thread_failures: usize,
    pub archived: usize,
    pub locked: usize,
    pub mutation_failures: usize,
    pub removed: Vec<ThreadId>,
}

/// Periodic mark-and-sweep resync of the suggestion cache.
pub struct SuggestionReconciler {
    platform: Arc<dyn ForumPlatform>,
    cache: SuggestionCache,
    config: Arc<ForumSyncConfig>,
}

impl SuggestionReconciler {
    pub fn new(
        platform: Arc<dyn ForumPlatform>,
        cache: SuggestionCache,
        config: Arc<ForumSyncConfig>,
    ) -> Self {
        Self {
            platform,
            cache,
            config,
        }
    }

    pub fn cache(&self) -> &SuggestionCache {
        &self.cache
    }

    /// Marks every cached record expired, re-observes every thread in every
    /// configured category, then sweeps what was not re-observed.
    ///
    /// Records in a category that could not be enumerated are kept.
    pub async fn run_reconciliation(&self) -> Result<ReconcileReport, ReconcileError> {
        let now = Utc::now();
        let mut report = ReconcileReport::default();
        let marked = self.cache.begin_refresh().await?;
        info!(marked, "started suggestion reconciliation");

        let mut failed = HashSet::new();
        for category_config in &self.config.categories {
            report.categories += 1;
            match self.load_category(category_config).await {
                Ok((category, threads)) => {
                    for thread in threads {
                        report.threads_seen += 1;
                        self.reconcile_thread(&thread, &category, category_config, now, &mut report)
                            .await?;
                    }
                }
                Err(err) => {
                    warn!(
                        category_id = category_config.id,
                        error = %err,
                        "failed to enumerate category; keeping its cached suggestions"
                    );
                    failed.insert(category_config.id);
                }
            }
        }

        let sweep = self.cache.finish_refresh(failed.clone()).await?;
        report.removed = sweep.removed;
        report.failed_categories = failed.into_iter().collect();
        report.failed_categories.sort_unstable();
        info!(
            categories = report.categories,
            threads = report.threads_seen,
            removed = report.removed.len(),
            archived = report.archived,
            locked = report.locked,
            "finished suggestion reconciliation"
        );
        Ok(report)
    }

    /// Live event: a thread was created or changed.
    pub async fn observe_thread(&self, thread: &ForumThread) -> Result<(), ReconcileError> {
        let category = self.platform.category(thread.parent_id).await?;
        let kind = self
            .config
            .category(thread.parent_id)
            .map_or(CategoryKind::Unknown, |c| c.kind.into());
        let message = self.platform.first_message(thread.id).await?;
        let record = SuggestionRecord::from_thread(
            thread,
            &category,
            kind,
            message.as_ref(),
            &self.config.emoji,
            &self.config.suggestion,
        );
        self.cache.update(record).await?;
        Ok(())
    }

    /// Live event: a thread was deleted.
    pub async fn forget_thread(&self, thread_id: ThreadId) -> Result<bool, ReconcileError> {
        Ok(self.cache.remove(thread_id).await?.is_some())
    }

    async fn load_category(
        &self,
        config: &CategoryConfig,
    ) -> Result<(ForumCategory, Vec<ForumThread>), PlatformError> {
        let category = self.platform.category(config.id).await?;
        let threads = dedupe_threads(self.platform.list_threads(config.id).await?);
        debug!(
            category_id = config.id,
            threads = threads.len(),
            "enumerated category"
        );
        Ok((category, threads))
    }

    async fn reconcile_thread(
        &self,
        thread: &ForumThread,
        category: &ForumCategory,
        config: &CategoryConfig,
        now: DateTime<Utc>,
        report: &mut ReconcileReport,
    ) -> Result<(), CacheError> {
        let message = match self.platform.first_message(thread.id).await {
            Ok(message) => message,
            Err(err) => {
                warn!(thread_id = thread.id, error = %err, "failed to read starter message");
                report.thread_failures += 1;
                self.cache.touch(thread.id).await?;
                return Ok(());
            }
        };
        let record = SuggestionRecord::from_thread(
            thread,
            category,
            config.kind.into(),
            message.as_ref(),
            &self.config.emoji,
            &self.config.suggestion,
        );
        self.cache.upsert(record).await?;

        if self.config.read_only {
            return Ok(());
        }
        let defaults = &self.config.suggestion;
        let Some(edit) = inactivity_edit(
            thread,
            now,
            config.archive_threshold_hours(defaults),
            config.lock_threshold_hours(defaults),
        ) else {
            return Ok(());
        };
        let archiving = edit.archived == Some(true);
        let locking = edit.locked == Some(true);
        match self.platform.edit_thread(thread.id, edit).await {
            Ok(_) => {
                info!(thread_id = thread.id, archiving, locking, "applied inactivity mutation");
                report.archived += usize::from(archiving);
                report.locked += usize::from(locking);
            }
            Err(err) => {
                warn!(thread_id = thread.id, error = %err, "inactivity mutation failed");
                report.mutation_failures += 1;
            }
        }
        Ok(())
    }
}

/// The archive/lock edit due for `thread` at `now`, if any. A mutation is
/// due once the idle time exceeds its threshold. A threshold of `None`
/// disables that mutation; a thread already in the target state is left
/// alone.
pub fn inactivity_edit(
    thread: &ForumThread,
    now: DateTime<Utc>,
    archive_after_hours: Option<u64>,
    lock_after_hours: Option<u64>,
) -> Option<ThreadEdit> {
    let idle = now - thread.last_activity();
    let exceeds = |limit: Option<u64>| {
        limit
            .and_then(|hours| i64::try_from(hours).ok())
            .and_then(TimeDelta::try_hours)
            .is_some_and(|threshold| idle > threshold)
    };
    let archive = !thread.archived && exceeds(archive_after_hours);
    let lock = !thread.locked && exceeds(lock_after_hours);
    if !archive && !lock {
        return None;
    }
    Some(ThreadEdit {
        applied_tags: None,
        archived: archive.then_some(true),
        locked: lock.then_some(true),
    })
}
