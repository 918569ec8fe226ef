use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::tally::VoteTally;

/// Persisted outcome of a promotion, keyed by the starter message id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GreenlitRecord {
    pub message_id: u64,
    pub author_id: u64,
    pub suggestion_url: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub body_text: String,
    pub applied_tags: Vec<String>,
    pub positive_voter_ids: Vec<u64>,
    pub agree: u32,
    pub neutral: u32,
    pub disagree: u32,
}

impl GreenlitRecord {
    pub fn store_key(&self) -> String {
        self.message_id.to_string()
    }

    pub fn tally(&self) -> VoteTally {
        VoteTally::new(self.agree, self.neutral, self.disagree)
    }
}
