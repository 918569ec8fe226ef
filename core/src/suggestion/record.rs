use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::config::CategoryKindConfig;
use crate::config::EmojiConfig;
use crate::config::SuggestionSettings;
use crate::platform::ForumCategory;
use crate::platform::ForumThread;
use crate::platform::ThreadId;
use crate::platform::ThreadMessage;
use crate::platform::UserId;
use crate::tally::VoteTally;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryKind {
    #[default]
    Unknown,
    Normal,
    Alpha,
    Project,
}

impl From<CategoryKindConfig> for CategoryKind {
    fn from(kind: CategoryKindConfig) -> Self {
        match kind {
            CategoryKindConfig::Normal => CategoryKind::Normal,
            CategoryKindConfig::Alpha => CategoryKind::Alpha,
            CategoryKindConfig::Project => CategoryKind::Project,
        }
    }
}

/// Cached projection of one suggestion thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionRecord {
    pub thread_id: ThreadId,
    pub parent_category_id: u64,
    pub display_name: String,
    pub owner_id: UserId,
    pub jump_url: String,
    pub created_at: DateTime<Utc>,
    pub agree_count: u32,
    pub neutral_count: u32,
    pub disagree_count: u32,
    /// Applied tag names.
    pub tags: Vec<String>,
    pub is_greenlit: bool,
    /// The starter message is gone or is not the thread's own message.
    pub is_deleted: bool,
    /// Set at the start of a reconciliation pass and cleared on re-observation.
    pub is_expired: bool,
    pub category_kind: CategoryKind,
    pub last_activity_time: DateTime<Utc>,
}

impl SuggestionRecord {
    /// Builds a fresh record. `first_message` is `None` when the starter
    /// message could not be found. A reviewed thread counts as greenlit.
    pub fn from_thread(
        thread: &ForumThread,
        category: &ForumCategory,
        kind: CategoryKind,
        first_message: Option<&ThreadMessage>,
        emoji: &EmojiConfig,
        settings: &SuggestionSettings,
    ) -> Self {
        let tags: Vec<String> = thread
            .applied_tags
            .iter()
            .filter_map(|id| category.tag_by_id(*id))
            .map(|tag| tag.name.clone())
            .collect();
        let is_greenlit = kind == CategoryKind::Normal
            && tags.iter().any(|name| {
                name.eq_ignore_ascii_case(&settings.greenlit_tag)
                    || name.eq_ignore_ascii_case(&settings.reviewed_tag)
            });
        let (tally, is_deleted) = match first_message {
            Some(message) => (
                VoteTally::from_reactions(&message.reactions, emoji),
                message.id != thread.id,
            ),
            None => (VoteTally::default(), true),
        };

        Self {
            thread_id: thread.id,
            parent_category_id: thread.parent_id,
            display_name: thread.name.clone(),
            owner_id: thread.owner_id,
            jump_url: thread.jump_url(),
            created_at: thread.created_at,
            agree_count: tally.agree,
            neutral_count: tally.neutral,
            disagree_count: tally.disagree,
            tags,
            is_greenlit,
            is_deleted,
            is_expired: false,
            category_kind: kind,
            last_activity_time: thread.last_activity(),
        }
    }

    pub fn tally(&self) -> VoteTally {
        VoteTally::new(self.agree_count, self.neutral_count, self.disagree_count)
    }

    pub fn ratio(&self) -> f64 {
        self.tally().ratio()
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|tag| tag.eq_ignore_ascii_case(name))
    }
}
