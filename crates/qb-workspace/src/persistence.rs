//! Workspace persistence
//!
//! The snapshot carries everything worth keeping across sessions, including
//! connection records: on startup a validation pass reconciles them against
//! the server's alive-set, so a still-valid session survives a restart.
//! Memory state is transient and never serialized.

use crate::{Preferences, QueryHistory, QuerySnippets};
use qb_core::{QueryConn, QueryTab, QueryTabId, Result, Worksheet, WorksheetId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceSnapshot {
    #[serde(default)]
    pub worksheets: Vec<Worksheet>,
    #[serde(default)]
    pub query_tabs: Vec<QueryTab>,
    #[serde(default)]
    pub conns: Vec<QueryConn>,
    #[serde(default)]
    pub active_worksheet: Option<WorksheetId>,
    #[serde(default)]
    pub active_tabs: HashMap<WorksheetId, QueryTabId>,
    #[serde(default)]
    pub prefs: Preferences,
    #[serde(default)]
    pub history: QueryHistory,
    #[serde(default)]
    pub snippets: QuerySnippets,
}

impl WorkspaceSnapshot {
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path.as_ref(), json).await?;
        tracing::debug!(path = %path.as_ref().display(), "workspace saved");
        Ok(())
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = tokio::fs::read_to_string(path.as_ref()).await?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use crate::WorkspaceStore;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn snapshot_survives_a_file_round_trip() {
        let store = WorkspaceStore::new();
        let wke_id = store.add_worksheet();
        let tab_id = store.tabs_of(wke_id)[0].id;
        store.set_query_txt(tab_id, "SELECT * FROM t").unwrap();
        store.set_worksheet_name(wke_id, "reports").unwrap();
        store.prefs.write().query_row_limit = 500;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workspace.json");
        store.snapshot().save(&path).await.unwrap();

        let restored =
            WorkspaceStore::restore(crate::WorkspaceSnapshot::load(&path).await.unwrap());
        assert_eq!(restored.worksheet(wke_id).unwrap().name, "reports");
        assert_eq!(
            restored.query_tab(tab_id).unwrap().query_txt,
            "SELECT * FROM t"
        );
        assert_eq!(restored.active_worksheet(), Some(wke_id));
        assert_eq!(restored.active_tab(wke_id), Some(tab_id));
        assert_eq!(restored.prefs.read().query_row_limit, 500);
    }

    #[tokio::test]
    async fn loading_a_missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = crate::WorkspaceSnapshot::load(dir.path().join("nope.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, qb_core::QbError::Io(_)));
    }
}
