//! Abortable query execution

use chrono::Utc;
use futures::future::AbortHandle;
use qb_api::ManagementApi;
use qb_core::{
    QbError, QueryAttributes, QueryConn, QueryResultSet, QueryTabId, Result,
};
use qb_workspace::{PreviewMode, QueryHistoryEntry, WorkspaceStore};
use regex::Regex;
use std::sync::Arc;
use std::sync::LazyLock;

/// Statements that can change the connection's default schema
static USE_OR_DROP_DB: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(use|drop\s+database)\s").unwrap());

pub struct QueryRunner {
    store: Arc<WorkspaceStore>,
    api: Arc<dyn ManagementApi>,
}

impl QueryRunner {
    pub fn new(store: Arc<WorkspaceStore>, api: Arc<dyn ManagementApi>) -> Self {
        Self { store, api }
    }

    fn tab_conn(&self, tab_id: QueryTabId) -> Result<QueryConn> {
        self.store
            .conn_for_tab(tab_id)
            .ok_or_else(|| QbError::NotFound(format!("no connection for query tab {tab_id}")))
    }

    /// Execute editor text over the tab's connection.
    ///
    /// The result (or its SQL error) lands in the tab's query slot; only
    /// transport failures return `Err`. A query stopped through
    /// [`stop`](Self::stop) is replaced by a "Query canceled" placeholder.
    #[tracing::instrument(skip(self, sql), fields(%tab_id))]
    pub async fn run(&self, tab_id: QueryTabId, sql: &str) -> Result<()> {
        let conn = self.tab_conn(tab_id)?;
        let (abort, reg) = AbortHandle::new_pair();
        let sent = Utc::now();
        self.store.mem.with_query_result_mut(tab_id, |state| {
            state.request_sent_time = Some(sent);
            state.is_loading = true;
            state.data = None;
            state.abort = Some(abort);
            state.kill_requested = false;
        });
        self.store.mem.set_conn_busy(conn.id.clone(), true);
        let max_rows = self.store.prefs.read().query_row_limit;

        let result = self
            .api
            .execute_abortable(&conn.id, sql, max_rows, reg)
            .await;

        self.store.mem.set_conn_busy(conn.id.clone(), false);
        let duration = (Utc::now() - sent).num_milliseconds() as f64 / 1000.0;
        let killed = self.store.mem.with_query_result_mut(tab_id, |state| {
            state.is_loading = false;
            state.abort = None;
            state.total_duration = duration;
            std::mem::take(&mut state.kill_requested)
        });

        match result {
            Ok(attrs) if !killed => {
                match attrs.first_error() {
                    Some(err) => self.store.log_history(QueryHistoryEntry::failed_user_log(
                        &conn.name,
                        sql,
                        err.message.clone().unwrap_or_default(),
                    )),
                    None => self
                        .store
                        .log_history(QueryHistoryEntry::user_log(&conn.name, sql)),
                }
                self.store.mem.with_query_result_mut(tab_id, |state| {
                    state.data = Some(attrs);
                });
                if USE_OR_DROP_DB.is_match(sql) {
                    self.refresh_active_db(&conn).await;
                }
                Ok(())
            }
            Ok(_) | Err(QbError::Cancelled) => {
                tracing::info!(%tab_id, "query canceled");
                self.store.mem.with_query_result_mut(tab_id, |state| {
                    state.data = Some(QueryAttributes {
                        sql: sql.to_string(),
                        results: vec![QueryResultSet::from_message("Query canceled")],
                    });
                });
                Ok(())
            }
            Err(e) => {
                self.store.log_history(QueryHistoryEntry::failed_user_log(
                    &conn.name,
                    sql,
                    e.to_string(),
                ));
                Err(e)
            }
        }
    }

    /// Stop the tab's running query.
    ///
    /// Sets the kill flag, then issues `KILL QUERY <thread_id>` over the
    /// worksheet connection. The client request is aborted only when the
    /// KILL reports no SQL error; otherwise the query is genuinely still
    /// running and the flag is cleared again.
    #[tracing::instrument(skip(self), fields(%tab_id))]
    pub async fn stop(&self, tab_id: QueryTabId) -> Result<()> {
        let conn = self.tab_conn(tab_id)?;
        let parent_id = conn.clone_of_conn_id.clone().ok_or_else(|| {
            QbError::InvalidState(format!("connection {} has no parent", conn.id))
        })?;
        let wke_conn = self.store.conn(&parent_id)?;
        let thread_id = conn.thread_id().ok_or_else(|| {
            QbError::InvalidState(format!("connection {} has no thread id", conn.id))
        })?;

        self.store.mem.with_query_result_mut(tab_id, |state| {
            state.kill_requested = true;
        });
        let sql = format!("KILL QUERY {thread_id}");
        let max_rows = self.store.prefs.read().query_row_limit;
        match self.api.execute(&wke_conn.id, &sql, max_rows).await {
            Ok(attrs) => match attrs.first_error() {
                Some(err) => {
                    self.store.mem.with_query_result_mut(tab_id, |state| {
                        state.kill_requested = false;
                    });
                    self.store.log_history(QueryHistoryEntry::failed_action_log(
                        "Stop query",
                        &sql,
                        err.message.clone().unwrap_or_default(),
                    ));
                    Ok(())
                }
                None => {
                    let abort = self
                        .store
                        .mem
                        .with_query_result_mut(tab_id, |state| state.abort.clone());
                    if let Some(abort) = abort {
                        abort.abort();
                    }
                    self.store
                        .log_history(QueryHistoryEntry::action_log("Stop query", &sql));
                    Ok(())
                }
            },
            Err(e) => {
                // the query may still complete; leave it running
                self.store.mem.with_query_result_mut(tab_id, |state| {
                    state.kill_requested = false;
                });
                tracing::warn!(%tab_id, error = %e, "KILL QUERY failed");
                Ok(())
            }
        }
    }

    /// Preview a table's data or definition into the tab's preview slot
    #[tracing::instrument(skip(self), fields(%tab_id, qualified_name))]
    pub async fn preview(
        &self,
        tab_id: QueryTabId,
        qualified_name: &str,
        mode: PreviewMode,
    ) -> Result<()> {
        let conn = self.tab_conn(tab_id)?;
        let sql = match mode {
            PreviewMode::Data => format!("SELECT * FROM {qualified_name} LIMIT 1000;"),
            PreviewMode::DataDetails => format!("DESCRIBE {qualified_name};"),
        };
        let sent = Utc::now();
        self.store.mem.with_preview_mut(tab_id, mode, |state| {
            state.request_sent_time = Some(sent);
            state.is_loading = true;
            state.data = None;
        });
        let max_rows = self.store.prefs.read().query_row_limit;
        let result = self.api.execute(&conn.id, &sql, max_rows).await;
        let duration = (Utc::now() - sent).num_milliseconds() as f64 / 1000.0;

        match result {
            Ok(attrs) => {
                match attrs.first_error() {
                    Some(err) => self.store.log_history(QueryHistoryEntry::failed_action_log(
                        "Preview",
                        &sql,
                        err.message.clone().unwrap_or_default(),
                    )),
                    None => self
                        .store
                        .log_history(QueryHistoryEntry::action_log("Preview", &sql)),
                }
                self.store.mem.with_preview_mut(tab_id, mode, |state| {
                    state.is_loading = false;
                    state.total_duration = duration;
                    state.data = Some(attrs);
                });
                Ok(())
            }
            Err(e) => {
                self.store.mem.with_preview_mut(tab_id, mode, |state| {
                    state.is_loading = false;
                });
                Err(e)
            }
        }
    }

    /// Re-read the connection's default schema after a USE or DROP DATABASE
    async fn refresh_active_db(&self, conn: &QueryConn) {
        match self.api.execute(&conn.id, "SELECT DATABASE()", 1).await {
            Ok(attrs) => {
                let db = attrs
                    .results
                    .first()
                    .and_then(|r| r.first_cell())
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                if let Err(e) = self.store.set_conn_active_db(&conn.id, db) {
                    tracing::warn!(conn_id = %conn.id, error = %e, "active db not updated");
                }
            }
            Err(e) => tracing::warn!(conn_id = %conn.id, error = %e, "SELECT DATABASE() failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use qb_api::{MockApi, OpenConnRequest};
    use qb_core::{ConnBindingType, ConnId};
    use qb_workspace::HistoryCategory;
    use serde_json::json;

    struct Fixture {
        store: Arc<WorkspaceStore>,
        api: Arc<MockApi>,
        tab_id: QueryTabId,
        tab_conn_id: ConnId,
        wke_conn_id: ConnId,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(WorkspaceStore::new());
        let api = Arc::new(MockApi::new());
        let wke_id = store.add_worksheet();
        let tab_id = store.tabs_of(wke_id)[0].id;
        let wke_handle = api
            .open_conn(&OpenConnRequest {
                target: "server_0".to_string(),
                user: "u".to_string(),
                password: "p".to_string(),
                db: None,
                timeout: None,
            })
            .await
            .unwrap();
        let tab_handle = api.clone_conn(&wke_handle.id).await.unwrap();
        store
            .insert_conn(QueryConn {
                id: wke_handle.id.clone(),
                name: "server_0".to_string(),
                resource_type: "servers".to_string(),
                attributes: wke_handle.attributes,
                binding_type: ConnBindingType::Worksheet,
                worksheet_id: Some(wke_id),
                query_tab_id: None,
                clone_of_conn_id: None,
                active_db: String::new(),
            })
            .unwrap();
        store
            .insert_conn(QueryConn {
                id: tab_handle.id.clone(),
                name: "server_0".to_string(),
                resource_type: "servers".to_string(),
                attributes: tab_handle.attributes,
                binding_type: ConnBindingType::QueryTab,
                worksheet_id: None,
                query_tab_id: Some(tab_id),
                clone_of_conn_id: Some(wke_handle.id.clone()),
                active_db: String::new(),
            })
            .unwrap();
        Fixture {
            store,
            api,
            tab_id,
            tab_conn_id: tab_handle.id,
            wke_conn_id: wke_handle.id,
        }
    }

    #[tokio::test]
    async fn run_stores_result_and_logs_history() {
        let f = fixture().await;
        let runner = QueryRunner::new(f.store.clone(), f.api.clone());
        f.api.push_result(QueryAttributes {
            sql: String::new(),
            results: vec![QueryResultSet {
                fields: Some(vec!["1".to_string()]),
                data: Some(vec![vec![json!(1)]]),
                ..Default::default()
            }],
        });

        runner.run(f.tab_id, "SELECT 1").await.unwrap();
        let state = f.store.mem.query_result(f.tab_id).unwrap();
        assert!(!state.is_loading);
        assert!(state.abort.is_none());
        assert_eq!(state.data.unwrap().sql, "SELECT 1");
        assert!(!f.store.mem.is_conn_busy(&f.tab_conn_id));
        let history = f.store.history.read();
        let entry = history.entries().next().unwrap();
        assert_eq!(entry.category, HistoryCategory::UserLogs);
        assert!(entry.success);
    }

    #[tokio::test]
    async fn sql_error_lands_in_result_and_failed_history() {
        let f = fixture().await;
        let runner = QueryRunner::new(f.store.clone(), f.api.clone());
        f.api.push_error_result(1054, "Unknown column 'bogus'");

        runner.run(f.tab_id, "SELECT bogus").await.unwrap();
        let state = f.store.mem.query_result(f.tab_id).unwrap();
        assert!(state.data.unwrap().first_error().is_some());
        let history = f.store.history.read();
        assert!(!history.entries().next().unwrap().success);
    }

    #[tokio::test]
    async fn use_statement_refreshes_active_db() {
        let f = fixture().await;
        let runner = QueryRunner::new(f.store.clone(), f.api.clone());
        f.api.push_result(QueryAttributes::default());
        f.api.push_result(QueryAttributes {
            sql: String::new(),
            results: vec![QueryResultSet {
                fields: Some(vec!["DATABASE()".to_string()]),
                data: Some(vec![vec![json!("test")]]),
                ..Default::default()
            }],
        });

        runner.run(f.tab_id, "USE `test`").await.unwrap();
        assert_eq!(f.store.conn(&f.tab_conn_id).unwrap().active_db, "test");
        assert_eq!(f.api.executed_sql()[1], "SELECT DATABASE()");
    }

    #[tokio::test]
    async fn plain_select_does_not_refresh_active_db() {
        let f = fixture().await;
        let runner = QueryRunner::new(f.store.clone(), f.api.clone());
        runner.run(f.tab_id, "SELECT * FROM users").await.unwrap();
        assert_eq!(f.api.executed_sql().len(), 1);
    }

    #[tokio::test]
    async fn stop_kills_then_aborts_and_leaves_placeholder() {
        let f = fixture().await;
        let runner = Arc::new(QueryRunner::new(f.store.clone(), f.api.clone()));
        let gate = f.api.gate_next_execute();

        let run = tokio::spawn({
            let runner = runner.clone();
            let tab_id = f.tab_id;
            async move { runner.run(tab_id, "SELECT SLEEP(100)").await }
        });
        while !f
            .store
            .mem
            .query_result(f.tab_id)
            .is_some_and(|s| s.is_loading)
        {
            tokio::task::yield_now().await;
        }

        runner.stop(f.tab_id).await.unwrap();
        run.await.unwrap().unwrap();
        drop(gate);

        let state = f.store.mem.query_result(f.tab_id).unwrap();
        assert!(!state.kill_requested);
        let data = state.data.unwrap();
        assert_eq!(
            data.results[0].message.as_deref(),
            Some("Query canceled")
        );
        // the KILL went over the worksheet connection with the clone's thread id
        let thread_id = f
            .store
            .conn(&f.tab_conn_id)
            .unwrap()
            .thread_id()
            .unwrap();
        let executed = f.api.executed.lock();
        let kill = executed
            .iter()
            .find(|(_, sql)| sql.starts_with("KILL QUERY"))
            .unwrap();
        assert_eq!(kill.0, f.wke_conn_id);
        assert_eq!(kill.1, format!("KILL QUERY {thread_id}"));
    }

    #[tokio::test]
    async fn failed_kill_does_not_abort_the_query() {
        let f = fixture().await;
        let runner = Arc::new(QueryRunner::new(f.store.clone(), f.api.clone()));
        let gate = f.api.gate_next_execute();
        // the KILL answers with an SQL error
        f.api.push_error_result(1095, "not owner of thread");

        let run = tokio::spawn({
            let runner = runner.clone();
            let tab_id = f.tab_id;
            async move { runner.run(tab_id, "SELECT SLEEP(100)").await }
        });
        while !f
            .store
            .mem
            .query_result(f.tab_id)
            .is_some_and(|s| s.is_loading)
        {
            tokio::task::yield_now().await;
        }

        runner.stop(f.tab_id).await.unwrap();
        assert!(
            f.store
                .mem
                .query_result(f.tab_id)
                .is_some_and(|s| s.is_loading)
        );
        // release the gated query; it completes normally
        gate.send(()).unwrap();
        run.await.unwrap().unwrap();
        let state = f.store.mem.query_result(f.tab_id).unwrap();
        assert!(!state.kill_requested);
        assert_ne!(
            state.data.unwrap().results[0].message.as_deref(),
            Some("Query canceled")
        );
    }

    #[tokio::test]
    async fn preview_modes_issue_expected_sql() {
        let f = fixture().await;
        let runner = QueryRunner::new(f.store.clone(), f.api.clone());
        runner
            .preview(f.tab_id, "`test`.`employees`", PreviewMode::Data)
            .await
            .unwrap();
        runner
            .preview(f.tab_id, "`test`.`employees`", PreviewMode::DataDetails)
            .await
            .unwrap();
        assert_eq!(
            f.api.executed_sql(),
            vec![
                "SELECT * FROM `test`.`employees` LIMIT 1000;".to_string(),
                "DESCRIBE `test`.`employees`;".to_string(),
            ]
        );
        assert!(
            f.store
                .mem
                .preview(f.tab_id, PreviewMode::Data)
                .unwrap()
                .data
                .is_some()
        );
    }
}
