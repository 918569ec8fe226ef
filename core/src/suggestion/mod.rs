//! Suggestion-thread cache and the reconciliation job that rebuilds it.

mod cache;
mod reconciler;
mod record;

pub use cache::CacheError;
pub use cache::CacheStatus;
pub use cache::SuggestionCache;
pub use cache::SweepReport;
pub use reconciler::ReconcileError;
pub use reconciler::ReconcileReport;
pub use reconciler::SuggestionReconciler;
pub use reconciler::inactivity_edit;
pub use record::CategoryKind;
pub use record::SuggestionRecord;
