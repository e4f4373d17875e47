//! querybench workspace - the normalized entity store
//!
//! One `WorkspaceStore` holds every worksheet, query tab and connection
//! record, plus the active-entity pointers, per-worksheet connection phase
//! and error state, preferences, query history and the transient memory
//! state cache. Services (`qb-connection`, `qb-query`, `qb-schema`) share it
//! behind an `Arc` and mutate it through its methods; each method takes one
//! lock at a time so state is consistent between awaits.

mod history;
mod mem_state;
mod persistence;
mod prefs;
mod store;

pub use history::{HistoryCategory, QueryHistory, QueryHistoryEntry, QuerySnippets, Snippet};
pub use mem_state::{MemStateCache, PreviewMode, QueryResultState};
pub use persistence::WorkspaceSnapshot;
pub use prefs::Preferences;
pub use store::WorkspaceStore;
