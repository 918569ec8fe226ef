//! Interval pollers over remote content.
//!
//! [`ContentWatcher`] diffs successive versions of one blob and hands the
//! changes to a handler. [`FeedWatermarkWatcher`] layers a monotonic
//! high-water mark on top so that only never-seen feed items are dispatched.

mod content;
mod feed;
mod feed_parser;

use thiserror::Error;

pub use content::ContentChange;
pub use content::ContentHandler;
pub use content::ContentSnapshot;
pub use content::ContentWatcher;
pub use content::DEFAULT_STOP_GRACE;
pub use content::WatchSource;
pub use feed::FeedHandler;
pub use feed::FeedItem;
pub use feed::FeedParser;
pub use feed::FeedWatermarkWatcher;
pub use feed::Watermark;
pub use feed_parser::JsonFeedParser;
pub use feed_parser::RssFeedParser;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WatchError {
    #[error("watcher for {0} is already active")]
    AlreadyActive(String),
    #[error("watcher for {0} has been stopped")]
    Stopped(String),
    #[error("watcher for {0} has already been started")]
    AlreadyStarted(String),
    #[error("poll interval must be greater than zero")]
    InvalidInterval,
}
