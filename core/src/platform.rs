//! Chat-platform collaborator: the forum threads this crate reads and mutates.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

pub type ThreadId = u64;
pub type UserId = u64;
pub type CategoryId = u64;

/// Upper bound the platform enforces on tags applied to one thread.
pub const MAX_APPLIED_TAGS: usize = 5;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("category {0} not found")]
    CategoryNotFound(CategoryId),
    #[error("thread {0} not found")]
    ThreadNotFound(ThreadId),
    #[error("thread {thread_id} rejected edit: {reason}")]
    EditRejected { thread_id: ThreadId, reason: String },
    #[error("platform request failed: {0}")]
    Request(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForumTag {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForumCategory {
    pub id: CategoryId,
    pub name: String,
    pub available_tags: Vec<ForumTag>,
}

impl ForumCategory {
    pub fn tag_by_name(&self, name: &str) -> Option<&ForumTag> {
        self.available_tags
            .iter()
            .find(|tag| tag.name.eq_ignore_ascii_case(name))
    }

    pub fn tag_by_id(&self, id: u64) -> Option<&ForumTag> {
        self.available_tags.iter().find(|tag| tag.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForumThread {
    pub id: ThreadId,
    pub parent_id: CategoryId,
    pub name: String,
    pub owner_id: UserId,
    pub guild_id: u64,
    pub created_at: DateTime<Utc>,
    /// `None` when the platform reports no activity beyond creation.
    pub last_activity_at: Option<DateTime<Utc>>,
    /// Tag ids, in the order the platform returns them.
    pub applied_tags: Vec<u64>,
    pub archived: bool,
    pub locked: bool,
}

impl ForumThread {
    pub fn has_tag(&self, tag_id: u64) -> bool {
        self.applied_tags.contains(&tag_id)
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity_at.unwrap_or(self.created_at)
    }

    pub fn jump_url(&self) -> String {
        format!(
            "https://discord.com/channels/{}/{}",
            self.guild_id, self.id
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Emoji {
    Custom { id: String, name: String },
    Unicode(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub emoji: Emoji,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadMessage {
    pub id: u64,
    pub author_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub jump_url: String,
    pub reactions: Vec<Reaction>,
}

/// Partial thread mutation; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadEdit {
    pub applied_tags: Option<Vec<u64>>,
    pub archived: Option<bool>,
    pub locked: Option<bool>,
}

impl ThreadEdit {
    pub fn is_empty(&self) -> bool {
        self.applied_tags.is_none() && self.archived.is_none() && self.locked.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub mention_user_id: Option<UserId>,
    pub title: String,
    pub description: String,
}

#[async_trait]
pub trait ForumPlatform: Send + Sync {
    async fn category(&self, category_id: CategoryId) -> Result<ForumCategory, PlatformError>;

    /// Active and archived threads. The result may repeat a thread.
    async fn list_threads(&self, category_id: CategoryId)
    -> Result<Vec<ForumThread>, PlatformError>;

    /// The thread's starter message, if it still exists.
    async fn first_message(
        &self,
        thread_id: ThreadId,
    ) -> Result<Option<ThreadMessage>, PlatformError>;

    async fn reaction_users(
        &self,
        thread_id: ThreadId,
        message_id: u64,
        emoji_id: &str,
    ) -> Result<Vec<UserId>, PlatformError>;

    async fn edit_thread(
        &self,
        thread_id: ThreadId,
        edit: ThreadEdit,
    ) -> Result<ForumThread, PlatformError>;

    async fn send_notification(
        &self,
        thread_id: ThreadId,
        notification: Notification,
    ) -> Result<(), PlatformError>;
}

/// Drops repeated thread ids, keeping the first occurrence.
pub fn dedupe_threads(threads: Vec<ForumThread>) -> Vec<ForumThread> {
    let mut seen = HashSet::new();
    threads
        .into_iter()
        .filter(|thread| seen.insert(thread.id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn thread(id: ThreadId) -> ForumThread {
        ForumThread {
            id,
            parent_id: 1,
            name: format!("thread {id}"),
            owner_id: 7,
            guild_id: 99,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            last_activity_at: None,
            applied_tags: Vec::new(),
            archived: false,
            locked: false,
        }
    }

    #[test]
    fn dedupe_keeps_first_occurrence_in_order() {
        let mut archived = thread(2);
        archived.archived = true;
        let threads = vec![thread(1), thread(2), archived, thread(3), thread(1)];
        let ids: Vec<_> = dedupe_threads(threads).iter().map(|t| (t.id, t.archived)).collect();
        assert_eq!(ids, vec![(1, false), (2, false), (3, false)]);
    }

    #[test]
    fn tag_lookup_ignores_case() {
        let category = ForumCategory {
            id: 1,
            name: "suggestions".to_string(),
            available_tags: vec![ForumTag {
                id: 10,
                name: "Greenlit".to_string(),
            }],
        };
        assert_eq!(category.tag_by_name("greenlit").map(|t| t.id), Some(10));
        assert_eq!(category.tag_by_name("reviewed"), None);
    }

    #[test]
    fn last_activity_falls_back_to_creation() {
        let t = thread(5);
        assert_eq!(t.last_activity(), t.created_at);
        assert_eq!(t.jump_url(), "https://discord.com/channels/99/5");
    }
}
