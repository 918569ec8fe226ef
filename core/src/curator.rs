//! Threshold-driven promotion of suggestion threads.

use std::sync::Arc;
use std::sync::RwLock;

use chrono::DateTime;
use chrono::Utc;
use thiserror::Error;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::config::CategoryConfig;
use crate::config::ForumSyncConfig;
use crate::greenlit::GreenlitRecord;
use crate::platform::CategoryId;
use crate::platform::ForumCategory;
use crate::platform::ForumPlatform;
use crate::platform::ForumTag;
use crate::platform::ForumThread;
use crate::platform::MAX_APPLIED_TAGS;
use crate::platform::Notification;
use crate::platform::PlatformError;
use crate::platform::ThreadEdit;
use crate::platform::ThreadId;
use crate::platform::ThreadMessage;
use crate::platform::UserId;
use crate::platform::dedupe_threads;
use crate::store::DocumentStore;
use crate::store::StoreError;
use crate::suggestion::CacheError;
use crate::suggestion::CategoryKind;
use crate::suggestion::SuggestionCache;
use crate::suggestion::SuggestionRecord;
use crate::tally::VoteTally;

const CAPACITY_TITLE: &str = "Error";
const CAPACITY_DESCRIPTION: &str = "This suggestion could not be automatically greenlit because the thread already has the maximum number of tags (5). Please remove a tag to allow the greenlit tag to be applied.";

#[derive(Debug, Error)]
pub enum CurateError {
    #[error("missing configuration: {0}")]
    ConfigurationMissing(String),
    #[error("document store is not connected")]
    StoreDisconnected,
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Snapshot of the current or most recent run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CuratorProgress {
    pub category_id: Option<CategoryId>,
    /// 1-based position of the thread being processed.
    pub index: usize,
    pub total: usize,
    pub current_thread: Option<ThreadId>,
    pub failures: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub completed: bool,
}

pub struct GreenlightCurator {
    platform: Arc<dyn ForumPlatform>,
    store: Arc<dyn DocumentStore<GreenlitRecord>>,
    cache: SuggestionCache,
    config: Arc<ForumSyncConfig>,
    progress: RwLock<CuratorProgress>,
}

impl GreenlightCurator {
    pub fn new(
        platform: Arc<dyn ForumPlatform>,
        store: Arc<dyn DocumentStore<GreenlitRecord>>,
        cache: SuggestionCache,
        config: Arc<ForumSyncConfig>,
    ) -> Self {
        Self {
            platform,
            store,
            cache,
            config,
            progress: RwLock::new(CuratorProgress::default()),
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.config.read_only
    }

    pub fn progress(&self) -> CuratorProgress {
        match self.progress.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Curates every configured category. A category that fails is logged
    /// and skipped.
    pub async fn curate_all(&self) -> Vec<GreenlitRecord> {
        let mut promoted = Vec::new();
        for category in &self.config.categories {
            match self.curate(category.id).await {
                Ok(records) => promoted.extend(records),
                Err(err) => error!(category_id = category.id, error = %err, "curation aborted"),
            }
        }
        promoted
    }

    /// Evaluates every unlocked thread in `category_id` and returns the
    /// records of threads promoted by this run.
    ///
    /// Threads that are already greenlit have their record re-persisted with
    /// current tallies. One thread failing does not stop the others.
    pub async fn curate(&self, category_id: CategoryId) -> Result<Vec<GreenlitRecord>, CurateError> {
        self.update_progress(|progress| {
            *progress = CuratorProgress {
                category_id: Some(category_id),
                started_at: Some(Utc::now()),
                ..CuratorProgress::default()
            };
        });
        let result = self.run(category_id).await;
        let completed = result.is_ok();
        self.update_progress(|progress| {
            progress.current_thread = None;
            progress.finished_at = Some(Utc::now());
            progress.completed = completed;
        });
        if let Err(err) = &result {
            error!(category_id, error = %err, "failed to curate category");
        }
        result
    }

    async fn run(&self, category_id: CategoryId) -> Result<Vec<GreenlitRecord>, CurateError> {
        if !self.store.is_connected() {
            return Err(CurateError::StoreDisconnected);
        }
        self.config
            .emoji
            .require_votes()
            .map_err(|err| CurateError::ConfigurationMissing(err.to_string()))?;

        let category = self.platform.category(category_id).await?;
        let greenlit_name = &self.config.suggestion.greenlit_tag;
        let Some(greenlit_tag) = category.tag_by_name(greenlit_name).cloned() else {
            return Err(CurateError::ConfigurationMissing(format!(
                "greenlit tag '{greenlit_name}' in category {category_id}"
            )));
        };
        let category_config = self.config.category(category_id);

        info!(category_id, name = %category.name, "curating category");
        let threads: Vec<ForumThread> = dedupe_threads(self.platform.list_threads(category_id).await?)
            .into_iter()
            .filter(|thread| !thread.locked)
            .collect();
        let total = threads.len();
        self.update_progress(|progress| progress.total = total);

        let mut promoted = Vec::new();
        for (position, thread) in threads.iter().enumerate() {
            self.update_progress(|progress| {
                progress.index = position + 1;
                progress.current_thread = Some(thread.id);
            });
            debug!(
                "[{}/{total}] curating thread '{}' ({})",
                position + 1,
                thread.name,
                thread.id
            );
            match self
                .curate_thread(thread, &category, &greenlit_tag, category_config)
                .await
            {
                Ok(Some(record)) => promoted.push(record),
                Ok(None) => {}
                Err(err) => {
                    error!(thread_id = thread.id, error = %err, "failed to curate thread");
                    self.update_progress(|progress| progress.failures += 1);
                }
            }
        }

        info!(category_id, total, promoted = promoted.len(), "finished curating category");
        Ok(promoted)
    }

    async fn curate_thread(
        &self,
        thread: &ForumThread,
        category: &ForumCategory,
        greenlit_tag: &ForumTag,
        category_config: Option<&CategoryConfig>,
    ) -> Result<Option<GreenlitRecord>, CurateError> {
        let Some(message) = self.platform.first_message(thread.id).await? else {
            warn!(thread_id = thread.id, "thread has no starter message");
            return Ok(None);
        };
        let tally = VoteTally::from_reactions(&message.reactions, &self.config.emoji);
        let settings = &self.config.suggestion;

        let reviewed = category
            .tag_by_name(&settings.reviewed_tag)
            .is_some_and(|tag| thread.has_tag(tag.id));
        if reviewed || thread.has_tag(greenlit_tag.id) {
            debug!(thread_id = thread.id, reviewed, "thread is already greenlit");
            if !self.config.read_only {
                let record = self.build_record(thread, category, &message, tally).await?;
                self.store.upsert(&record.store_key(), &record).await?;
            }
            return Ok(None);
        }

        if !tally.qualifies(settings.greenlit_threshold, settings.greenlit_ratio) {
            debug!(
                thread_id = thread.id,
                agree = tally.agree,
                neutral = tally.neutral,
                disagree = tally.disagree,
                ratio = tally.ratio(),
                "thread does not meet the greenlit threshold"
            );
            return Ok(None);
        }
        info!(thread_id = thread.id, ratio = tally.ratio(), "thread meets the greenlit threshold");

        if self.config.read_only {
            info!(thread_id = thread.id, "read-only mode; not greenlighting");
            return Ok(None);
        }

        if thread.applied_tags.len() >= MAX_APPLIED_TAGS {
            warn!(thread_id = thread.id, "thread already has the maximum number of tags");
            self.platform
                .send_notification(thread.id, capacity_notification(thread.owner_id))
                .await?;
            return Ok(None);
        }

        let default_tag = category_config
            .and_then(|config| config.auto_tag.as_ref())
            .filter(|auto_tag| auto_tag.review_tag.eq_ignore_ascii_case(&settings.greenlit_tag))
            .and_then(|auto_tag| category.tag_by_name(&auto_tag.default_tag))
            .map(|tag| tag.id);
        let tags = promoted_tags(&thread.applied_tags, greenlit_tag.id, default_tag);

        let was_archived = thread.archived;
        if was_archived {
            self.platform
                .edit_thread(
                    thread.id,
                    ThreadEdit {
                        archived: Some(false),
                        ..ThreadEdit::default()
                    },
                )
                .await?;
        }
        let edit = ThreadEdit {
            applied_tags: Some(tags),
            archived: (was_archived || settings.archive_on_greenlit).then_some(true),
            locked: settings.lock_on_greenlit.then_some(true),
        };
        let updated = match self.platform.edit_thread(thread.id, edit).await {
            Ok(updated) => updated,
            Err(err) => {
                if was_archived {
                    self.restore_archived(thread.id).await;
                }
                return Err(err.into());
            }
        };

        let record = self.build_record(&updated, category, &message, tally).await?;
        self.store.upsert(&record.store_key(), &record).await?;

        let kind = category_config.map_or(CategoryKind::Unknown, |config| config.kind.into());
        self.cache
            .update(SuggestionRecord::from_thread(
                &updated,
                category,
                kind,
                Some(&message),
                &self.config.emoji,
                settings,
            ))
            .await?;

        info!(thread_id = thread.id, name = %thread.name, "thread has been greenlit");
        Ok(Some(record))
    }

    /// Puts a thread that was reopened for tagging back into the archive.
    async fn restore_archived(&self, thread_id: ThreadId) {
        let edit = ThreadEdit {
            archived: Some(true),
            ..ThreadEdit::default()
        };
        if let Err(err) = self.platform.edit_thread(thread_id, edit).await {
            error!(thread_id, error = %err, "failed to re-archive thread after a failed promotion");
        }
    }

    async fn build_record(
        &self,
        thread: &ForumThread,
        category: &ForumCategory,
        message: &ThreadMessage,
        tally: VoteTally,
    ) -> Result<GreenlitRecord, CurateError> {
        let positive_voter_ids = self
            .platform
            .reaction_users(thread.id, message.id, &self.config.emoji.agree)
            .await?;
        Ok(GreenlitRecord {
            message_id: message.id,
            author_id: message.author_id,
            suggestion_url: message.jump_url.clone(),
            title: thread.name.clone(),
            created_at: thread.created_at,
            body_text: message.content.clone(),
            applied_tags: thread
                .applied_tags
                .iter()
                .filter_map(|id| category.tag_by_id(*id))
                .map(|tag| tag.name.clone())
                .collect(),
            positive_voter_ids,
            agree: tally.agree,
            neutral: tally.neutral,
            disagree: tally.disagree,
        })
    }

    fn update_progress(&self, update: impl FnOnce(&mut CuratorProgress)) {
        let mut guard = match self.progress.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        update(&mut guard);
    }
}

/// Tags after promotion: the greenlit tag appended if absent and the
/// superseded default tag dropped.
fn promoted_tags(current: &[u64], greenlit_tag: u64, default_tag: Option<u64>) -> Vec<u64> {
    let mut tags: Vec<u64> = current
        .iter()
        .copied()
        .filter(|id| Some(*id) != default_tag || *id == greenlit_tag)
        .collect();
    if !tags.contains(&greenlit_tag) {
        tags.push(greenlit_tag);
    }
    tags
}

fn capacity_notification(owner_id: UserId) -> Notification {
    Notification {
        mention_user_id: Some(owner_id),
        title: CAPACITY_TITLE.to_string(),
        description: CAPACITY_DESCRIPTION.to_string(),
    }
}
