//! Transient per-entity memory state
//!
//! Everything in here lives only for the lifetime of its owning entity and
//! is never persisted: in-flight query state with its abort handle, preview
//! results, per-connection busy flags and lost-connection errors. Entries
//! are created on first patch and removed, not zeroed, when the owning
//! entity is deleted.

use chrono::{DateTime, Utc};
use futures::future::AbortHandle;
use parking_lot::RwLock;
use qb_core::{ConnId, QueryAttributes, QueryResultSet, QueryTabId, WorksheetId};
use std::collections::HashMap;

/// Which preview query a result belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreviewMode {
    /// `SELECT * FROM <tbl> LIMIT 1000`
    Data,
    /// `DESCRIBE <tbl>`
    DataDetails,
}

/// State of one query slot: the latest editor run of a tab, or one of its
/// preview slots
#[derive(Debug, Clone, Default)]
pub struct QueryResultState {
    pub request_sent_time: Option<DateTime<Utc>>,
    /// Wall-clock seconds from request to stored result
    pub total_duration: f64,
    pub is_loading: bool,
    pub data: Option<QueryAttributes>,
    /// Aborts the in-flight client request; the server-side query is
    /// unaffected and must be killed separately
    pub abort: Option<AbortHandle>,
    /// Set by stop-query before the KILL is confirmed
    pub kill_requested: bool,
}

#[derive(Debug, Default)]
pub struct MemStateCache {
    query_results: RwLock<HashMap<QueryTabId, QueryResultState>>,
    previews: RwLock<HashMap<(QueryTabId, PreviewMode), QueryResultState>>,
    conn_busy: RwLock<HashMap<ConnId, bool>>,
    lost_conn_errors: RwLock<HashMap<WorksheetId, QueryResultSet>>,
}

impl MemStateCache {
    pub fn query_result(&self, tab_id: QueryTabId) -> Option<QueryResultState> {
        self.query_results.read().get(&tab_id).cloned()
    }

    /// Patch the tab's query slot, creating it if absent
    pub fn with_query_result_mut<R>(
        &self,
        tab_id: QueryTabId,
        f: impl FnOnce(&mut QueryResultState) -> R,
    ) -> R {
        f(self.query_results.write().entry(tab_id).or_default())
    }

    pub fn preview(&self, tab_id: QueryTabId, mode: PreviewMode) -> Option<QueryResultState> {
        self.previews.read().get(&(tab_id, mode)).cloned()
    }

    pub fn with_preview_mut<R>(
        &self,
        tab_id: QueryTabId,
        mode: PreviewMode,
        f: impl FnOnce(&mut QueryResultState) -> R,
    ) -> R {
        f(self.previews.write().entry((tab_id, mode)).or_default())
    }

    pub fn set_conn_busy(&self, conn_id: ConnId, busy: bool) {
        self.conn_busy.write().insert(conn_id, busy);
    }

    pub fn is_conn_busy(&self, conn_id: &ConnId) -> bool {
        self.conn_busy.read().get(conn_id).copied().unwrap_or(false)
    }

    pub fn set_lost_conn_error(&self, wke_id: WorksheetId, error: QueryResultSet) {
        self.lost_conn_errors.write().insert(wke_id, error);
    }

    pub fn take_lost_conn_error(&self, wke_id: WorksheetId) -> Option<QueryResultSet> {
        self.lost_conn_errors.write().remove(&wke_id)
    }

    /// Drop every entry keyed by the tab
    pub fn release_tab(&self, tab_id: QueryTabId) {
        self.query_results.write().remove(&tab_id);
        self.previews.write().retain(|(id, _), _| *id != tab_id);
    }

    /// Drop every entry keyed by the worksheet
    pub fn release_worksheet(&self, wke_id: WorksheetId) {
        self.lost_conn_errors.write().remove(&wke_id);
    }

    /// Drop every entry keyed by the connection
    pub fn release_conn(&self, conn_id: &ConnId) {
        self.conn_busy.write().remove(conn_id);
    }

    /// True if any namespace still holds an entry for the tab
    pub fn holds_tab(&self, tab_id: QueryTabId) -> bool {
        self.query_results.read().contains_key(&tab_id)
            || self.previews.read().keys().any(|(id, _)| *id == tab_id)
    }
}
