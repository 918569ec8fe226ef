//! Root of the `forumsync-core` library.
//!
//! Keeps local state in sync with append-mostly upstream sources: polled
//! content blobs, sequenced item feeds and suggestion forum threads.

// Prevent accidental direct writes to stdout/stderr in library code. All
// operator-visible output goes through `tracing`.
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod config;
pub mod curator;
pub mod diff;
pub mod greenlit;
pub mod http;
pub mod platform;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod suggestion;
pub mod tally;
pub mod watcher;

pub use config::ConfigError;
pub use config::ForumSyncConfig;
pub use curator::CurateError;
pub use curator::CuratorProgress;
pub use curator::GreenlightCurator;
pub use diff::ChangeRecord;
pub use diff::DiffStrategy;
pub use greenlit::GreenlitRecord;
pub use http::FetchError;
pub use http::HttpFetcher;
pub use http::ReqwestFetcher;
pub use platform::ForumPlatform;
pub use platform::PlatformError;
pub use scheduler::PeriodicJob;
pub use scheduler::ScheduleError;
pub use service::SyncServices;
pub use store::DocumentStore;
pub use store::MemoryDocumentStore;
pub use store::SledDocumentStore;
pub use store::StoreError;
pub use suggestion::SuggestionCache;
pub use suggestion::SuggestionReconciler;
pub use suggestion::SuggestionRecord;
pub use tally::VoteTally;
pub use watcher::ContentWatcher;
pub use watcher::FeedWatermarkWatcher;
pub use watcher::WatchError;
