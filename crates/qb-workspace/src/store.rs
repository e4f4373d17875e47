//! The normalized workspace store
//!
//! Entities live in one place each, keyed by id; everything else points at
//! them. Setters write through to the owning record and selectors read the
//! same record, so a written value always reads back. A missing id is a
//! `NotFound` error, never a silent no-op.

use crate::{
    MemStateCache, Preferences, QueryHistory, QueryHistoryEntry, QuerySnippets, WorkspaceSnapshot,
};
use indexmap::IndexMap;
use parking_lot::RwLock;
use qb_core::{
    BlobFile, ConnBindingType, ConnectionPhase, ConnId, EditorMode, QbError, QueryConn, QueryTab,
    QueryTabId, ResourceRef, Result, Worksheet, WorksheetId,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct WorkspaceStore {
    worksheets: RwLock<IndexMap<WorksheetId, Worksheet>>,
    query_tabs: RwLock<IndexMap<QueryTabId, QueryTab>>,
    tab_counters: RwLock<HashMap<WorksheetId, u32>>,
    conns: RwLock<HashMap<ConnId, QueryConn>>,
    active_worksheet: RwLock<Option<WorksheetId>>,
    active_tabs: RwLock<HashMap<WorksheetId, QueryTabId>>,
    phases: RwLock<HashMap<WorksheetId, ConnectionPhase>>,
    conn_errors: RwLock<HashMap<WorksheetId, String>>,
    validating: AtomicBool,
    resource_targets: RwLock<HashMap<String, Vec<ResourceRef>>>,
    pub mem: MemStateCache,
    pub prefs: RwLock<Preferences>,
    pub history: RwLock<QueryHistory>,
    pub snippets: RwLock<QuerySnippets>,
}

impl Default for WorkspaceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkspaceStore {
    pub fn new() -> Self {
        Self {
            worksheets: RwLock::new(IndexMap::new()),
            query_tabs: RwLock::new(IndexMap::new()),
            tab_counters: RwLock::new(HashMap::new()),
            conns: RwLock::new(HashMap::new()),
            active_worksheet: RwLock::new(None),
            active_tabs: RwLock::new(HashMap::new()),
            phases: RwLock::new(HashMap::new()),
            conn_errors: RwLock::new(HashMap::new()),
            validating: AtomicBool::new(false),
            resource_targets: RwLock::new(HashMap::new()),
            mem: MemStateCache::default(),
            prefs: RwLock::new(Preferences::default()),
            history: RwLock::new(QueryHistory::default()),
            snippets: RwLock::new(QuerySnippets::default()),
        }
    }

    // ---- worksheets ----

    /// Create a worksheet with its first query tab; both become active
    pub fn add_worksheet(&self) -> WorksheetId {
        let wke = Worksheet::new();
        let wke_id = wke.id;
        self.worksheets.write().insert(wke_id, wke);
        let tab = QueryTab::new(wke_id, self.next_tab_count(wke_id));
        let tab_id = tab.id;
        self.query_tabs.write().insert(tab_id, tab);
        *self.active_worksheet.write() = Some(wke_id);
        self.active_tabs.write().insert(wke_id, tab_id);
        tracing::debug!(%wke_id, %tab_id, "worksheet added");
        wke_id
    }

    /// Remove the worksheet, its tabs, their memory state and every
    /// connection record referencing them. Returns the removed connection
    /// ids so the caller can close them server-side.
    pub fn delete_worksheet(&self, wke_id: WorksheetId) -> Result<Vec<ConnId>> {
        self.worksheets
            .write()
            .shift_remove(&wke_id)
            .ok_or_else(|| QbError::NotFound(format!("worksheet {wke_id}")))?;
        let tab_ids: Vec<QueryTabId> = {
            let mut tabs = self.query_tabs.write();
            let ids: Vec<_> = tabs
                .values()
                .filter(|t| t.worksheet_id == wke_id)
                .map(|t| t.id)
                .collect();
            tabs.retain(|_, t| t.worksheet_id != wke_id);
            ids
        };
        let removed: Vec<ConnId> = {
            let mut conns = self.conns.write();
            let ids: Vec<_> = conns
                .values()
                .filter(|c| {
                    c.worksheet_id == Some(wke_id)
                        || c.query_tab_id.is_some_and(|t| tab_ids.contains(&t))
                })
                .map(|c| c.id.clone())
                .collect();
            for id in &ids {
                conns.remove(id);
            }
            ids
        };
        for tab_id in &tab_ids {
            self.mem.release_tab(*tab_id);
        }
        for conn_id in &removed {
            self.mem.release_conn(conn_id);
        }
        self.mem.release_worksheet(wke_id);
        self.active_tabs.write().remove(&wke_id);
        self.tab_counters.write().remove(&wke_id);
        self.phases.write().remove(&wke_id);
        self.conn_errors.write().remove(&wke_id);
        let fallback = self.worksheets.read().keys().next().copied();
        let mut active = self.active_worksheet.write();
        if *active == Some(wke_id) {
            *active = fallback;
        }
        drop(active);
        tracing::debug!(%wke_id, conns = removed.len(), "worksheet deleted");
        Ok(removed)
    }

    pub fn worksheet(&self, wke_id: WorksheetId) -> Result<Worksheet> {
        self.worksheets
            .read()
            .get(&wke_id)
            .cloned()
            .ok_or_else(|| QbError::NotFound(format!("worksheet {wke_id}")))
    }

    pub fn worksheets(&self) -> Vec<Worksheet> {
        self.worksheets.read().values().cloned().collect()
    }

    pub fn worksheet_ids(&self) -> Vec<WorksheetId> {
        self.worksheets.read().keys().copied().collect()
    }

    pub fn set_worksheet_name(&self, wke_id: WorksheetId, name: impl Into<String>) -> Result<()> {
        self.with_worksheet_mut(wke_id, |wke| wke.name = name.into())
    }

    pub fn set_search_schema(&self, wke_id: WorksheetId, search: impl Into<String>) -> Result<()> {
        self.with_worksheet_mut(wke_id, |wke| wke.search_schema = search.into())
    }

    pub fn set_expanded_nodes(&self, wke_id: WorksheetId, nodes: Vec<String>) -> Result<()> {
        self.with_worksheet_mut(wke_id, |wke| wke.expanded_nodes = nodes)
    }

    /// Reset a worksheet's sidebar state to its initial values
    pub fn refresh_worksheet(&self, wke_id: WorksheetId) -> Result<()> {
        self.with_worksheet_mut(wke_id, Worksheet::refresh)
    }

    fn with_worksheet_mut<R>(
        &self,
        wke_id: WorksheetId,
        f: impl FnOnce(&mut Worksheet) -> R,
    ) -> Result<R> {
        self.worksheets
            .write()
            .get_mut(&wke_id)
            .map(f)
            .ok_or_else(|| QbError::NotFound(format!("worksheet {wke_id}")))
    }

    pub fn active_worksheet(&self) -> Option<WorksheetId> {
        *self.active_worksheet.read()
    }

    pub fn set_active_worksheet(&self, wke_id: WorksheetId) -> Result<()> {
        if !self.worksheets.read().contains_key(&wke_id) {
            return Err(QbError::NotFound(format!("worksheet {wke_id}")));
        }
        *self.active_worksheet.write() = Some(wke_id);
        Ok(())
    }

    // ---- query tabs ----

    /// Add a tab to the worksheet and make it active. Ordinals come from a
    /// per-worksheet counter that only ever moves forward, so names never
    /// repeat within a session even after deletions.
    pub fn add_query_tab(&self, wke_id: WorksheetId) -> Result<QueryTabId> {
        if !self.worksheets.read().contains_key(&wke_id) {
            return Err(QbError::NotFound(format!("worksheet {wke_id}")));
        }
        let count = self.next_tab_count(wke_id);
        let tab = QueryTab::new(wke_id, count);
        let tab_id = tab.id;
        self.query_tabs.write().insert(tab_id, tab);
        self.active_tabs.write().insert(wke_id, tab_id);
        tracing::debug!(%wke_id, %tab_id, count, "query tab added");
        Ok(tab_id)
    }

    /// Remove the tab, its memory state and its connection record (returned
    /// for server-side teardown). A worksheet always keeps at least one tab:
    /// deleting the last one creates a fresh blank tab in its place.
    pub fn delete_query_tab(&self, tab_id: QueryTabId) -> Result<Option<ConnId>> {
        let tab = self
            .query_tabs
            .write()
            .shift_remove(&tab_id)
            .ok_or_else(|| QbError::NotFound(format!("query tab {tab_id}")))?;
        let wke_id = tab.worksheet_id;
        let conn_id = {
            let mut conns = self.conns.write();
            let id = conns
                .values()
                .find(|c| c.query_tab_id == Some(tab_id))
                .map(|c| c.id.clone());
            if let Some(id) = &id {
                conns.remove(id);
            }
            id
        };
        self.mem.release_tab(tab_id);
        if let Some(id) = &conn_id {
            self.mem.release_conn(id);
        }
        let remaining: Vec<QueryTabId> = self
            .query_tabs
            .read()
            .values()
            .filter(|t| t.worksheet_id == wke_id)
            .map(|t| t.id)
            .collect();
        let next_active = match remaining.last() {
            Some(id) => *id,
            None => {
                let fresh = QueryTab::new(wke_id, self.next_tab_count(wke_id));
                let fresh_id = fresh.id;
                self.query_tabs.write().insert(fresh_id, fresh);
                fresh_id
            }
        };
        let mut active = self.active_tabs.write();
        if active.get(&wke_id) == Some(&tab_id) || !remaining.contains(&next_active) {
            active.insert(wke_id, next_active);
        }
        tracing::debug!(%tab_id, conn = ?conn_id, "query tab deleted");
        Ok(conn_id)
    }

    pub fn query_tab(&self, tab_id: QueryTabId) -> Result<QueryTab> {
        self.query_tabs
            .read()
            .get(&tab_id)
            .cloned()
            .ok_or_else(|| QbError::NotFound(format!("query tab {tab_id}")))
    }

    pub fn tabs_of(&self, wke_id: WorksheetId) -> Vec<QueryTab> {
        self.query_tabs
            .read()
            .values()
            .filter(|t| t.worksheet_id == wke_id)
            .cloned()
            .collect()
    }

    pub fn set_query_txt(&self, tab_id: QueryTabId, txt: impl Into<String>) -> Result<()> {
        self.with_tab_mut(tab_id, |tab| tab.query_txt = txt.into())
    }

    pub fn set_blob_file(&self, tab_id: QueryTabId, blob_file: BlobFile) -> Result<()> {
        self.with_tab_mut(tab_id, |tab| tab.blob_file = blob_file)
    }

    pub fn set_editor_mode(&self, tab_id: QueryTabId, mode: EditorMode) -> Result<()> {
        self.with_tab_mut(tab_id, |tab| tab.editor_mode = mode)
    }

    pub fn set_tab_name(&self, tab_id: QueryTabId, name: impl Into<String>) -> Result<()> {
        self.with_tab_mut(tab_id, |tab| tab.name = name.into())
    }

    pub fn set_tbl_creation_info(&self, tab_id: QueryTabId, info: serde_json::Value) -> Result<()> {
        self.with_tab_mut(tab_id, |tab| tab.tbl_creation_info = info)
    }

    fn next_tab_count(&self, wke_id: WorksheetId) -> u32 {
        let mut counters = self.tab_counters.write();
        let count = counters.entry(wke_id).or_insert(0);
        *count += 1;
        *count
    }

    fn with_tab_mut<R>(&self, tab_id: QueryTabId, f: impl FnOnce(&mut QueryTab) -> R) -> Result<R> {
        self.query_tabs
            .write()
            .get_mut(&tab_id)
            .map(f)
            .ok_or_else(|| QbError::NotFound(format!("query tab {tab_id}")))
    }

    pub fn active_tab(&self, wke_id: WorksheetId) -> Option<QueryTabId> {
        self.active_tabs.read().get(&wke_id).copied()
    }

    pub fn set_active_tab(&self, wke_id: WorksheetId, tab_id: QueryTabId) -> Result<()> {
        let tabs = self.query_tabs.read();
        match tabs.get(&tab_id) {
            Some(tab) if tab.worksheet_id == wke_id => {
                drop(tabs);
                self.active_tabs.write().insert(wke_id, tab_id);
                Ok(())
            }
            Some(_) => Err(QbError::InvalidState(format!(
                "query tab {tab_id} belongs to another worksheet"
            ))),
            None => Err(QbError::NotFound(format!("query tab {tab_id}"))),
        }
    }

    // ---- connection registry ----

    /// Insert a connection record. At most one worksheet-bound connection
    /// may exist per worksheet, and a tab holds at most one connection.
    pub fn insert_conn(&self, conn: QueryConn) -> Result<()> {
        let mut conns = self.conns.write();
        match conn.binding_type {
            ConnBindingType::Worksheet => {
                let wke_id = conn.worksheet_id.ok_or_else(|| {
                    QbError::InvalidState("worksheet-bound connection without worksheet id".into())
                })?;
                if conns.values().any(|c| {
                    c.binding_type == ConnBindingType::Worksheet
                        && c.worksheet_id == Some(wke_id)
                }) {
                    return Err(QbError::InvalidState(format!(
                        "worksheet {wke_id} already has a connection"
                    )));
                }
            }
            ConnBindingType::QueryTab => {
                let tab_id = conn.query_tab_id.ok_or_else(|| {
                    QbError::InvalidState("tab-bound connection without tab id".into())
                })?;
                if conns
                    .values()
                    .any(|c| c.query_tab_id == Some(tab_id))
                {
                    return Err(QbError::InvalidState(format!(
                        "query tab {tab_id} already has a connection"
                    )));
                }
            }
        }
        conns.insert(conn.id.clone(), conn);
        Ok(())
    }

    pub fn remove_conn(&self, conn_id: &ConnId) -> Option<QueryConn> {
        let removed = self.conns.write().remove(conn_id);
        if removed.is_some() {
            self.mem.release_conn(conn_id);
        }
        removed
    }

    pub fn conn(&self, conn_id: &ConnId) -> Result<QueryConn> {
        self.conns
            .read()
            .get(conn_id)
            .cloned()
            .ok_or_else(|| QbError::NotFound(format!("connection {conn_id}")))
    }

    pub fn conns(&self) -> Vec<QueryConn> {
        self.conns.read().values().cloned().collect()
    }

    /// The worksheet-bound connection of a worksheet, if any
    pub fn worksheet_conn(&self, wke_id: WorksheetId) -> Option<QueryConn> {
        self.conns
            .read()
            .values()
            .find(|c| {
                c.binding_type == ConnBindingType::Worksheet && c.worksheet_id == Some(wke_id)
            })
            .cloned()
    }

    pub fn conn_for_tab(&self, tab_id: QueryTabId) -> Option<QueryConn> {
        self.conns
            .read()
            .values()
            .find(|c| c.query_tab_id == Some(tab_id))
            .cloned()
    }

    /// Connections cloned from the given one
    pub fn clones_of(&self, conn_id: &ConnId) -> Vec<QueryConn> {
        self.conns
            .read()
            .values()
            .filter(|c| c.clone_of_conn_id.as_ref() == Some(conn_id))
            .cloned()
            .collect()
    }

    pub fn set_conn_attributes(&self, conn_id: &ConnId, attributes: serde_json::Value) -> Result<()> {
        self.with_conn_mut(conn_id, |c| c.attributes = attributes)
    }

    pub fn set_conn_active_db(&self, conn_id: &ConnId, db: impl Into<String>) -> Result<()> {
        self.with_conn_mut(conn_id, |c| c.active_db = db.into())
    }

    /// Detach the connection from whatever it is bound to
    pub fn unbind_conn(&self, conn_id: &ConnId) -> Result<()> {
        self.with_conn_mut(conn_id, |c| {
            c.worksheet_id = None;
            c.query_tab_id = None;
        })
    }

    pub fn bind_conn_to_worksheet(&self, conn_id: &ConnId, wke_id: WorksheetId) -> Result<()> {
        self.with_conn_mut(conn_id, |c| {
            c.binding_type = ConnBindingType::Worksheet;
            c.worksheet_id = Some(wke_id);
            c.query_tab_id = None;
        })
    }

    pub fn bind_conn_to_tab(&self, conn_id: &ConnId, tab_id: QueryTabId) -> Result<()> {
        self.with_conn_mut(conn_id, |c| {
            c.binding_type = ConnBindingType::QueryTab;
            c.query_tab_id = Some(tab_id);
            c.worksheet_id = None;
        })
    }

    fn with_conn_mut<R>(&self, conn_id: &ConnId, f: impl FnOnce(&mut QueryConn) -> R) -> Result<R> {
        self.conns
            .write()
            .get_mut(conn_id)
            .map(f)
            .ok_or_else(|| QbError::NotFound(format!("connection {conn_id}")))
    }

    // ---- per-worksheet connection state ----

    pub fn phase(&self, wke_id: WorksheetId) -> ConnectionPhase {
        self.phases
            .read()
            .get(&wke_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn set_phase(&self, wke_id: WorksheetId, phase: ConnectionPhase) {
        tracing::debug!(%wke_id, ?phase, "connection phase");
        self.phases.write().insert(wke_id, phase);
    }

    pub fn set_conn_error(&self, wke_id: WorksheetId, error: Option<String>) {
        let mut errors = self.conn_errors.write();
        match error {
            Some(e) => {
                errors.insert(wke_id, e);
            }
            None => {
                errors.remove(&wke_id);
            }
        }
    }

    pub fn conn_error(&self, wke_id: WorksheetId) -> Option<String> {
        self.conn_errors.read().get(&wke_id).cloned()
    }

    // ---- validation guard ----

    /// Claim the validation slot; false if a validation pass is running
    pub fn begin_validation(&self) -> bool {
        self.validating
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn end_validation(&self) {
        self.validating.store(false, Ordering::SeqCst);
    }

    // ---- resource target cache ----

    pub fn set_resource_targets(&self, resource_type: impl Into<String>, targets: Vec<ResourceRef>) {
        self.resource_targets
            .write()
            .insert(resource_type.into(), targets);
    }

    pub fn resource_targets(&self, resource_type: &str) -> Vec<ResourceRef> {
        self.resource_targets
            .read()
            .get(resource_type)
            .cloned()
            .unwrap_or_default()
    }

    // ---- history convenience ----

    pub fn log_history(&self, entry: QueryHistoryEntry) {
        self.history.write().push(entry);
    }

    // ---- persistence ----

    pub fn snapshot(&self) -> WorkspaceSnapshot {
        WorkspaceSnapshot {
            worksheets: self.worksheets(),
            query_tabs: self.query_tabs.read().values().cloned().collect(),
            conns: self.conns(),
            active_worksheet: self.active_worksheet(),
            active_tabs: self.active_tabs.read().clone(),
            prefs: self.prefs.read().clone(),
            history: self.history.read().clone(),
            snippets: self.snippets.read().clone(),
        }
    }

    /// Rebuild a store from a snapshot. Connection records come back
    /// unverified; a validation pass reconciles them against the server.
    pub fn restore(snapshot: WorkspaceSnapshot) -> Self {
        let store = Self::new();
        {
            let mut worksheets = store.worksheets.write();
            for wke in snapshot.worksheets {
                worksheets.insert(wke.id, wke);
            }
        }
        {
            let mut tabs = store.query_tabs.write();
            let mut counters = store.tab_counters.write();
            for tab in snapshot.query_tabs {
                let counter = counters.entry(tab.worksheet_id).or_insert(0);
                *counter = (*counter).max(tab.count);
                tabs.insert(tab.id, tab);
            }
        }
        {
            let mut conns = store.conns.write();
            for conn in snapshot.conns {
                conns.insert(conn.id.clone(), conn);
            }
        }
        *store.active_worksheet.write() = snapshot.active_worksheet;
        *store.active_tabs.write() = snapshot.active_tabs;
        *store.prefs.write() = snapshot.prefs;
        *store.history.write() = snapshot.history;
        *store.snippets.write() = snapshot.snippets;
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn tab_conn(id: &str, tab_id: QueryTabId, parent: &ConnId) -> QueryConn {
        QueryConn {
            id: ConnId::new(id),
            name: "server_0".to_string(),
            resource_type: "servers".to_string(),
            attributes: json!({ "thread_id": 1 }),
            binding_type: ConnBindingType::QueryTab,
            worksheet_id: None,
            query_tab_id: Some(tab_id),
            clone_of_conn_id: Some(parent.clone()),
            active_db: String::new(),
        }
    }

    fn wke_conn(id: &str, wke_id: WorksheetId) -> QueryConn {
        QueryConn {
            id: ConnId::new(id),
            name: "server_0".to_string(),
            resource_type: "servers".to_string(),
            attributes: json!({ "thread_id": 1 }),
            binding_type: ConnBindingType::Worksheet,
            worksheet_id: Some(wke_id),
            query_tab_id: None,
            clone_of_conn_id: None,
            active_db: String::new(),
        }
    }

    #[test]
    fn add_worksheet_creates_default_tab() {
        let store = WorkspaceStore::new();
        let wke_id = store.add_worksheet();
        let tabs = store.tabs_of(wke_id);
        assert_eq!(tabs.len(), 1);
        assert_eq!(tabs[0].name, "Query Tab 1");
        assert_eq!(store.active_worksheet(), Some(wke_id));
        assert_eq!(store.active_tab(wke_id), Some(tabs[0].id));
    }

    #[test]
    fn tab_ordinals_continue_past_deleted_tabs() {
        let store = WorkspaceStore::new();
        let wke_id = store.add_worksheet();
        let second = store.add_query_tab(wke_id).unwrap();
        store.delete_query_tab(second).unwrap();
        let third = store.add_query_tab(wke_id).unwrap();
        assert_eq!(store.query_tab(third).unwrap().name, "Query Tab 3");
    }

    #[test]
    fn restore_continues_tab_ordinals() {
        let store = WorkspaceStore::new();
        let wke_id = store.add_worksheet();
        store.add_query_tab(wke_id).unwrap();

        let restored = WorkspaceStore::restore(store.snapshot());
        let third = restored.add_query_tab(wke_id).unwrap();
        assert_eq!(restored.query_tab(third).unwrap().name, "Query Tab 3");
    }

    #[test]
    fn setter_selector_round_trip() {
        let store = WorkspaceStore::new();
        let wke_id = store.add_worksheet();
        let tab_id = store.tabs_of(wke_id)[0].id;
        store.set_query_txt(tab_id, "SELECT 1").unwrap();
        store.set_editor_mode(tab_id, EditorMode::DdlEditor).unwrap();
        store.set_search_schema(wke_id, "emp").unwrap();
        let tab = store.query_tab(tab_id).unwrap();
        assert_eq!(tab.query_txt, "SELECT 1");
        assert_eq!(tab.editor_mode, EditorMode::DdlEditor);
        assert_eq!(store.worksheet(wke_id).unwrap().search_schema, "emp");
    }

    #[test]
    fn setters_on_missing_ids_are_not_found() {
        let store = WorkspaceStore::new();
        assert!(matches!(
            store.set_query_txt(QueryTabId::new(), "x"),
            Err(QbError::NotFound(_))
        ));
        assert!(matches!(
            store.set_search_schema(WorksheetId::new(), "x"),
            Err(QbError::NotFound(_))
        ));
    }

    #[test]
    fn second_worksheet_conn_is_rejected() {
        let store = WorkspaceStore::new();
        let wke_id = store.add_worksheet();
        store.insert_conn(wke_conn("conn-1", wke_id)).unwrap();
        assert!(matches!(
            store.insert_conn(wke_conn("conn-2", wke_id)),
            Err(QbError::InvalidState(_))
        ));
    }

    #[test]
    fn second_conn_on_one_tab_is_rejected() {
        let store = WorkspaceStore::new();
        let wke_id = store.add_worksheet();
        let tab_id = store.tabs_of(wke_id)[0].id;
        let parent = ConnId::new("conn-1");
        store.insert_conn(tab_conn("conn-2", tab_id, &parent)).unwrap();
        assert!(matches!(
            store.insert_conn(tab_conn("conn-3", tab_id, &parent)),
            Err(QbError::InvalidState(_))
        ));
    }

    #[test]
    fn delete_tab_clears_mem_state_and_conn() {
        let store = WorkspaceStore::new();
        let wke_id = store.add_worksheet();
        let tab_id = store.add_query_tab(wke_id).unwrap();
        let parent = ConnId::new("conn-1");
        store.insert_conn(tab_conn("conn-2", tab_id, &parent)).unwrap();
        store.mem.with_query_result_mut(tab_id, |s| s.is_loading = true);

        let removed = store.delete_query_tab(tab_id).unwrap();
        assert_eq!(removed, Some(ConnId::new("conn-2")));
        assert!(!store.mem.holds_tab(tab_id));
        assert!(store.conn_for_tab(tab_id).is_none());
        assert!(store.conns().iter().all(|c| c.query_tab_id != Some(tab_id)));
    }

    #[test]
    fn deleting_last_tab_leaves_a_fresh_one() {
        let store = WorkspaceStore::new();
        let wke_id = store.add_worksheet();
        let only = store.tabs_of(wke_id)[0].id;
        store.delete_query_tab(only).unwrap();
        let tabs = store.tabs_of(wke_id);
        assert_eq!(tabs.len(), 1);
        assert_ne!(tabs[0].id, only);
        assert_eq!(store.active_tab(wke_id), Some(tabs[0].id));
    }

    #[test]
    fn delete_worksheet_returns_all_its_conn_ids() {
        let store = WorkspaceStore::new();
        let wke_id = store.add_worksheet();
        let tab_id = store.tabs_of(wke_id)[0].id;
        store.insert_conn(wke_conn("conn-1", wke_id)).unwrap();
        store
            .insert_conn(tab_conn("conn-2", tab_id, &ConnId::new("conn-1")))
            .unwrap();

        let mut removed = store.delete_worksheet(wke_id).unwrap();
        removed.sort();
        assert_eq!(removed, vec![ConnId::new("conn-1"), ConnId::new("conn-2")]);
        assert!(store.conns().is_empty());
        assert!(store.worksheet(wke_id).is_err());
        assert_eq!(store.active_worksheet(), None);
    }

    #[test]
    fn rebinding_moves_a_conn_between_tabs() {
        let store = WorkspaceStore::new();
        let wke_id = store.add_worksheet();
        let tab_a = store.tabs_of(wke_id)[0].id;
        let tab_b = store.add_query_tab(wke_id).unwrap();
        let parent = ConnId::new("conn-1");
        let conn = tab_conn("conn-2", tab_a, &parent);
        let conn_id = conn.id.clone();
        store.insert_conn(conn).unwrap();

        store.unbind_conn(&conn_id).unwrap();
        assert!(store.conn_for_tab(tab_a).is_none());
        store.bind_conn_to_tab(&conn_id, tab_b).unwrap();
        assert_eq!(store.conn_for_tab(tab_b).unwrap().id, conn_id);
    }

    #[test]
    fn clones_of_filters_by_parent() {
        let store = WorkspaceStore::new();
        let wke_id = store.add_worksheet();
        let tab_id = store.tabs_of(wke_id)[0].id;
        store.insert_conn(wke_conn("conn-1", wke_id)).unwrap();
        store
            .insert_conn(tab_conn("conn-2", tab_id, &ConnId::new("conn-1")))
            .unwrap();
        let clones = store.clones_of(&ConnId::new("conn-1"));
        assert_eq!(clones.len(), 1);
        assert_eq!(clones[0].id, ConnId::new("conn-2"));
        assert!(store.clones_of(&ConnId::new("conn-2")).is_empty());
    }

    #[test]
    fn validation_guard_is_exclusive() {
        let store = WorkspaceStore::new();
        assert!(store.begin_validation());
        assert!(!store.begin_validation());
        store.end_validation();
        assert!(store.begin_validation());
    }

    #[test]
    fn phase_defaults_to_unconnected() {
        let store = WorkspaceStore::new();
        let wke_id = store.add_worksheet();
        assert_eq!(store.phase(wke_id), ConnectionPhase::Unconnected);
        store.set_phase(wke_id, ConnectionPhase::Connected);
        assert_eq!(store.phase(wke_id), ConnectionPhase::Connected);
    }
}
