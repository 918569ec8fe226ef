//! Vote counting shared by reconciliation and curation.

use serde::Deserialize;
use serde::Serialize;

use crate::config::EmojiConfig;
use crate::platform::Emoji;
use crate::platform::Reaction;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub agree: u32,
    pub neutral: u32,
    pub disagree: u32,
}

impl VoteTally {
    pub fn new(agree: u32, neutral: u32, disagree: u32) -> Self {
        Self {
            agree,
            neutral,
            disagree,
        }
    }

    /// Counts the custom-emoji reactions matching the configured vote ids.
    /// Unicode reactions and other custom emoji are ignored.
    pub fn from_reactions(reactions: &[Reaction], emoji: &EmojiConfig) -> Self {
        let mut tally = Self::default();
        for reaction in reactions {
            let Emoji::Custom { id, .. } = &reaction.emoji else {
                continue;
            };
            if id.eq_ignore_ascii_case(&emoji.agree) {
                tally.agree += reaction.count;
            } else if id.eq_ignore_ascii_case(&emoji.neutral) {
                tally.neutral += reaction.count;
            } else if id.eq_ignore_ascii_case(&emoji.disagree) {
                tally.disagree += reaction.count;
            }
        }
        tally
    }

    pub fn ratio(&self) -> f64 {
        ratio(self.agree, self.disagree)
    }

    pub fn qualifies(&self, threshold: u32, min_ratio: f64) -> bool {
        self.agree >= threshold && self.ratio() >= min_ratio
    }
}

/// Share of agree votes among agree + disagree, in percent.
pub fn ratio(agree: u32, disagree: u32) -> f64 {
    if agree == 0 && disagree == 0 {
        return 0.0;
    }
    f64::from(agree) / (f64::from(agree) + f64::from(disagree)) * 100.0
}
