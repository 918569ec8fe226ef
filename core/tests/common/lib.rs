//! In-memory collaborators shared by the `forumsync-core` integration tests.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use forumsync_core::config::AutoTagConfig;
use forumsync_core::config::CategoryConfig;
use forumsync_core::config::CategoryKindConfig;
use forumsync_core::config::EmojiConfig;
use forumsync_core::config::ForumSyncConfig;
use forumsync_core::http::FetchError;
use forumsync_core::http::Headers;
use forumsync_core::http::HttpFetcher;
use forumsync_core::platform::CategoryId;
use forumsync_core::platform::Emoji;
use forumsync_core::platform::ForumCategory;
use forumsync_core::platform::ForumPlatform;
use forumsync_core::platform::ForumTag;
use forumsync_core::platform::ForumThread;
use forumsync_core::platform::MAX_APPLIED_TAGS;
use forumsync_core::platform::Notification;
use forumsync_core::platform::PlatformError;
use forumsync_core::platform::Reaction;
use forumsync_core::platform::ThreadEdit;
use forumsync_core::platform::ThreadId;
use forumsync_core::platform::ThreadMessage;
use forumsync_core::platform::UserId;
use tokio::sync::Notify;

pub const SUGGESTIONS: CategoryId = 100;
pub const ALPHA: CategoryId = 200;

pub const GREENLIT_TAG: u64 = 1;
pub const PENDING_TAG: u64 = 2;
pub const FILLER_TAGS: [u64; 5] = [3, 4, 5, 6, 7];
pub const REVIEWED_TAG: u64 = 8;

pub const AGREE: &str = "1001";
pub const NEUTRAL: &str = "1002";
pub const DISAGREE: &str = "1003";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Config with one normal and one alpha category and greenlit at 20 / 75%.
pub fn test_config() -> ForumSyncConfig {
    let mut config = ForumSyncConfig {
        emoji: EmojiConfig {
            agree: AGREE.to_string(),
            neutral: NEUTRAL.to_string(),
            disagree: DISAGREE.to_string(),
        },
        categories: vec![
            CategoryConfig {
                id: SUGGESTIONS,
                kind: CategoryKindConfig::Normal,
                auto_tag: Some(AutoTagConfig {
                    default_tag: "Pending".to_string(),
                    review_tag: "Greenlit".to_string(),
                }),
                ..CategoryConfig::default()
            },
            CategoryConfig {
                id: ALPHA,
                kind: CategoryKindConfig::Alpha,
                ..CategoryConfig::default()
            },
        ],
        ..ForumSyncConfig::default()
    };
    config.suggestion.auto_archive_threshold_hours = Some(168);
    config.suggestion.auto_lock_threshold_hours = Some(720);
    config
}

pub fn forum_category(id: CategoryId) -> ForumCategory {
    let mut available_tags = vec![
        ForumTag {
            id: GREENLIT_TAG,
            name: "Greenlit".to_string(),
        },
        ForumTag {
            id: PENDING_TAG,
            name: "Pending".to_string(),
        },
    ];
    available_tags.extend(FILLER_TAGS.iter().map(|id| ForumTag {
        id: *id,
        name: format!("Topic {id}"),
    }));
    available_tags.push(ForumTag {
        id: REVIEWED_TAG,
        name: "Reviewed".to_string(),
    });
    ForumCategory {
        id,
        name: format!("forum-{id}"),
        available_tags,
    }
}

/// An open thread with recent activity and no tags.
pub fn forum_thread(id: ThreadId, category: CategoryId) -> ForumThread {
    let now = Utc::now();
    ForumThread {
        id,
        parent_id: category,
        name: format!("Suggestion {id}"),
        owner_id: id + 10_000,
        guild_id: 1,
        created_at: now - Duration::hours(2),
        last_activity_at: Some(now - Duration::hours(1)),
        applied_tags: Vec::new(),
        archived: false,
        locked: false,
    }
}

pub fn idle_for(mut thread: ForumThread, hours: i64) -> ForumThread {
    let now = Utc::now();
    thread.created_at = now - Duration::hours(hours + 1);
    thread.last_activity_at = Some(now - Duration::hours(hours));
    thread
}

pub fn vote(id: &str, count: u32) -> Reaction {
    Reaction {
        emoji: Emoji::Custom {
            id: id.to_string(),
            name: format!("vote_{id}"),
        },
        count,
    }
}

/// The starter message of `thread_id` with the given vote counts.
pub fn starter_message(thread_id: ThreadId, agree: u32, neutral: u32, disagree: u32) -> ThreadMessage {
    ThreadMessage {
        id: thread_id,
        author_id: thread_id + 10_000,
        content: format!("Please add feature {thread_id}"),
        created_at: DateTime::<Utc>::UNIX_EPOCH,
        jump_url: format!("https://discord.com/channels/1/{thread_id}/{thread_id}"),
        reactions: vec![
            vote(AGREE, agree),
            vote(NEUTRAL, neutral),
            vote(DISAGREE, disagree),
        ],
    }
}

#[derive(Default)]
struct FakeState {
    categories: HashMap<CategoryId, ForumCategory>,
    threads: BTreeMap<ThreadId, ForumThread>,
    messages: HashMap<ThreadId, ThreadMessage>,
    voters: HashMap<ThreadId, Vec<UserId>>,
    failing_categories: HashSet<CategoryId>,
    failing_messages: HashSet<ThreadId>,
    failing_edits: HashSet<ThreadId>,
    failing_tag_edits: HashSet<ThreadId>,
    edits: Vec<(ThreadId, ThreadEdit)>,
    notifications: Vec<(ThreadId, Notification)>,
}

/// Blocks `list_threads` for one category until released.
#[derive(Clone, Default)]
pub struct ListingGate {
    reached: Arc<Notify>,
    release: Arc<Notify>,
}

impl ListingGate {
    /// Resolves once a listing call is parked at the gate.
    pub async fn wait_reached(&self) {
        self.reached.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// Chat platform backed by plain maps. Thread edits are applied to the
/// stored thread and recorded; the 5-tag cap is enforced like the real one.
#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<FakeState>,
    gates: Mutex<HashMap<CategoryId, ListingGate>>,
    list_calls: Mutex<Vec<CategoryId>>,
}

impl FakePlatform {
    pub fn new() -> Arc<Self> {
        let platform = Self::default();
        {
            let mut state = lock(&platform.state);
            for id in [SUGGESTIONS, ALPHA] {
                state.categories.insert(id, forum_category(id));
            }
        }
        Arc::new(platform)
    }

    pub fn add_thread(&self, thread: ForumThread, message: Option<ThreadMessage>) {
        let mut state = lock(&self.state);
        if let Some(message) = message {
            state.messages.insert(thread.id, message);
        }
        state.threads.insert(thread.id, thread);
    }

    pub fn remove_thread(&self, thread_id: ThreadId) {
        let mut state = lock(&self.state);
        state.threads.remove(&thread_id);
        state.messages.remove(&thread_id);
    }

    pub fn set_voters(&self, thread_id: ThreadId, voters: Vec<UserId>) {
        lock(&self.state).voters.insert(thread_id, voters);
    }

    pub fn fail_category(&self, category_id: CategoryId) {
        lock(&self.state).failing_categories.insert(category_id);
    }

    pub fn fail_first_message(&self, thread_id: ThreadId) {
        lock(&self.state).failing_messages.insert(thread_id);
    }

    pub fn fail_edits(&self, thread_id: ThreadId) {
        lock(&self.state).failing_edits.insert(thread_id);
    }

    /// Fails only the edits of `thread_id` that change its tags.
    pub fn fail_tag_edits(&self, thread_id: ThreadId) {
        lock(&self.state).failing_tag_edits.insert(thread_id);
    }

    pub fn gate_listing(&self, category_id: CategoryId) -> ListingGate {
        let gate = ListingGate::default();
        lock(&self.gates).insert(category_id, gate.clone());
        gate
    }

    pub fn thread(&self, thread_id: ThreadId) -> Option<ForumThread> {
        lock(&self.state).threads.get(&thread_id).cloned()
    }

    pub fn edits(&self) -> Vec<(ThreadId, ThreadEdit)> {
        lock(&self.state).edits.clone()
    }

    pub fn edits_for(&self, thread_id: ThreadId) -> Vec<ThreadEdit> {
        lock(&self.state)
            .edits
            .iter()
            .filter(|(id, _)| *id == thread_id)
            .map(|(_, edit)| edit.clone())
            .collect()
    }

    pub fn notifications(&self) -> Vec<(ThreadId, Notification)> {
        lock(&self.state).notifications.clone()
    }

    pub fn list_calls(&self) -> Vec<CategoryId> {
        lock(&self.list_calls).clone()
    }
}

#[async_trait]
impl ForumPlatform for FakePlatform {
    async fn category(&self, category_id: CategoryId) -> Result<ForumCategory, PlatformError> {
        lock(&self.state)
            .categories
            .get(&category_id)
            .cloned()
            .ok_or(PlatformError::CategoryNotFound(category_id))
    }

    async fn list_threads(
        &self,
        category_id: CategoryId,
    ) -> Result<Vec<ForumThread>, PlatformError> {
        lock(&self.list_calls).push(category_id);
        let gate = lock(&self.gates).remove(&category_id);
        if let Some(gate) = gate {
            gate.reached.notify_one();
            gate.release.notified().await;
        }

        let state = lock(&self.state);
        if state.failing_categories.contains(&category_id) {
            return Err(PlatformError::Request(format!(
                "listing category {category_id} failed"
            )));
        }
        let mut threads: Vec<ForumThread> = state
            .threads
            .values()
            .filter(|thread| thread.parent_id == category_id)
            .cloned()
            .collect();
        // Archived threads are listed a second time, like a separate archive query would.
        let archived: Vec<ForumThread> = threads
            .iter()
            .filter(|thread| thread.archived)
            .cloned()
            .collect();
        threads.extend(archived);
        Ok(threads)
    }

    async fn first_message(
        &self,
        thread_id: ThreadId,
    ) -> Result<Option<ThreadMessage>, PlatformError> {
        let state = lock(&self.state);
        if state.failing_messages.contains(&thread_id) {
            return Err(PlatformError::Request(format!(
                "history for thread {thread_id} unavailable"
            )));
        }
        if !state.threads.contains_key(&thread_id) {
            return Err(PlatformError::ThreadNotFound(thread_id));
        }
        Ok(state.messages.get(&thread_id).cloned())
    }

    async fn reaction_users(
        &self,
        thread_id: ThreadId,
        _message_id: u64,
        emoji_id: &str,
    ) -> Result<Vec<UserId>, PlatformError> {
        if emoji_id != AGREE {
            return Ok(Vec::new());
        }
        Ok(lock(&self.state)
            .voters
            .get(&thread_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn edit_thread(
        &self,
        thread_id: ThreadId,
        edit: ThreadEdit,
    ) -> Result<ForumThread, PlatformError> {
        let mut state = lock(&self.state);
        if state.failing_edits.contains(&thread_id)
            || (edit.applied_tags.is_some() && state.failing_tag_edits.contains(&thread_id))
        {
            return Err(PlatformError::Request(format!(
                "edit of thread {thread_id} failed"
            )));
        }
        if let Some(tags) = &edit.applied_tags
            && tags.len() > MAX_APPLIED_TAGS
        {
            return Err(PlatformError::EditRejected {
                thread_id,
                reason: format!("{} tags exceeds the limit", tags.len()),
            });
        }
        let Some(thread) = state.threads.get_mut(&thread_id) else {
            return Err(PlatformError::ThreadNotFound(thread_id));
        };
        if let Some(tags) = &edit.applied_tags {
            thread.applied_tags = tags.clone();
        }
        if let Some(archived) = edit.archived {
            thread.archived = archived;
        }
        if let Some(locked) = edit.locked {
            thread.locked = locked;
        }
        let updated = thread.clone();
        state.edits.push((thread_id, edit));
        Ok(updated)
    }

    async fn send_notification(
        &self,
        thread_id: ThreadId,
        notification: Notification,
    ) -> Result<(), PlatformError> {
        lock(&self.state)
            .notifications
            .push((thread_id, notification));
        Ok(())
    }
}

/// Serves scripted responses in order, then repeats the last one.
#[derive(Default)]
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<Result<String, u16>>>,
    last: Mutex<Option<Result<String, u16>>>,
    calls: Mutex<usize>,
}

impl ScriptedFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_body(&self, body: impl Into<String>) {
        lock(&self.script).push_back(Ok(body.into()));
    }

    /// Queues a failed fetch reported with `status`.
    pub fn push_failure(&self, status: u16) {
        lock(&self.script).push_back(Err(status));
    }

    pub fn calls(&self) -> usize {
        *lock(&self.calls)
    }
}

#[async_trait]
impl HttpFetcher for ScriptedFetcher {
    async fn get(&self, url: &str, _headers: &Headers) -> Result<String, FetchError> {
        *lock(&self.calls) += 1;
        let next = lock(&self.script).pop_front();
        let response = match next {
            Some(response) => {
                *lock(&self.last) = Some(response.clone());
                response
            }
            None => lock(&self.last).clone().unwrap_or(Err(404)),
        };
        response.map_err(|status| FetchError::Status {
            url: url.to_string(),
            status,
        })
    }
}

/// Renders `sequences` as a minimal RSS document.
pub fn rss_feed(sequences: &[u64]) -> String {
    let items: String = sequences
        .iter()
        .map(|sequence| {
            format!(
                "<item><title>Update {sequence}</title><link>https://forum.example.com/threads/{sequence}/</link><guid>{sequence}</guid></item>"
            )
        })
        .collect();
    format!("<rss><channel><title>Patch Notes</title>{items}</channel></rss>")
}
