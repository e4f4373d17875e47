//! The connection lifecycle controller

use crate::categorize;
use futures::future::join_all;
use qb_api::{ManagementApi, OpenConnRequest};
use qb_core::sql_util::quote_identifier;
use qb_core::{
    ConnBindingType, ConnectionPhase, ConnId, QbError, QueryConn, QueryResultSet, QueryTabId,
    ResourceRef, Result, WorksheetId,
};
use qb_schema::SchemaTreeService;
use qb_workspace::{QueryHistoryEntry, WorkspaceStore};
use std::sync::Arc;

/// What to connect a worksheet to
#[derive(Debug, Clone)]
pub struct OpenTarget {
    /// Resource name, e.g. `server_0`
    pub name: String,
    /// servers, services or listeners
    pub resource_type: String,
    pub user: String,
    pub password: String,
    /// Default schema selected right after connecting
    pub db: Option<String>,
    pub timeout: Option<u64>,
}

pub struct ConnectionController {
    store: Arc<WorkspaceStore>,
    api: Arc<dyn ManagementApi>,
    schema: Arc<SchemaTreeService>,
}

impl ConnectionController {
    pub fn new(
        store: Arc<WorkspaceStore>,
        api: Arc<dyn ManagementApi>,
        schema: Arc<SchemaTreeService>,
    ) -> Self {
        Self { store, api, schema }
    }

    /// Open a worksheet connection and clone it to every query tab.
    ///
    /// The worksheet is `Connected` only once all tabs are bound. On any
    /// failure every connection opened so far is closed again: no partial
    /// records survive.
    #[tracing::instrument(skip(self, target), fields(%wke_id, target = %target.name))]
    pub async fn open(&self, wke_id: WorksheetId, target: OpenTarget) -> Result<ConnId> {
        self.store.worksheet(wke_id)?;
        self.store.set_phase(wke_id, ConnectionPhase::Connecting);
        self.store.set_conn_error(wke_id, None);

        let body = OpenConnRequest {
            target: target.name.clone(),
            user: target.user.clone(),
            password: target.password.clone(),
            db: target.db.clone(),
            timeout: target.timeout,
        };
        let handle = match self.api.open_conn(&body).await {
            Ok(handle) => handle,
            Err(e) => {
                self.store.set_conn_error(wke_id, Some(e.to_string()));
                self.store.set_phase(wke_id, ConnectionPhase::Unconnected);
                tracing::error!(error = %e, "open failed");
                return Err(e);
            }
        };

        // a previous connection stays usable elsewhere, it just loses the
        // worksheet seat; its tab clones vacate their seats the same way
        if let Some(previous) = self.store.worksheet_conn(wke_id) {
            for clone in self.store.clones_of(&previous.id) {
                self.store.unbind_conn(&clone.id)?;
            }
            self.store.unbind_conn(&previous.id)?;
        }

        let conn_id = handle.id.clone();
        self.store.insert_conn(QueryConn {
            id: conn_id.clone(),
            name: target.name.clone(),
            resource_type: target.resource_type.clone(),
            attributes: handle.attributes,
            binding_type: ConnBindingType::Worksheet,
            worksheet_id: Some(wke_id),
            query_tab_id: None,
            clone_of_conn_id: None,
            active_db: target.db.clone().unwrap_or_default(),
        })?;
        self.set_session_variables(&conn_id).await;

        let tabs = self.store.tabs_of(wke_id);
        let clones = join_all(tabs.iter().map(|_| self.api.clone_conn(&conn_id))).await;
        if clones.iter().any(|c| c.is_err()) {
            let opened: Vec<ConnId> = std::iter::once(conn_id.clone())
                .chain(clones.iter().flatten().map(|h| h.id.clone()))
                .collect();
            join_all(opened.iter().map(|id| self.delete_quietly(id))).await;
            self.store.remove_conn(&conn_id);
            let e = clones
                .into_iter()
                .find_map(|c| c.err())
                .unwrap_or_else(|| QbError::Api("clone failed".to_string()));
            self.store.set_conn_error(wke_id, Some(e.to_string()));
            self.store.set_phase(wke_id, ConnectionPhase::Unconnected);
            tracing::error!(error = %e, "tab clone failed, rolled back");
            return Err(e);
        }

        // bind the active tab last so every sibling is ready before the
        // worksheet reports itself connected
        let active = self.store.active_tab(wke_id);
        let mut bindings: Vec<(QueryTabId, qb_core::ConnHandle)> = tabs
            .iter()
            .map(|t| t.id)
            .zip(clones.into_iter().flatten())
            .collect();
        bindings.sort_by_key(|(tab_id, _)| active == Some(*tab_id));
        let opened: Vec<ConnId> = std::iter::once(conn_id.clone())
            .chain(bindings.iter().map(|(_, h)| h.id.clone()))
            .collect();
        for (tab_id, clone) in bindings {
            self.set_session_variables(&clone.id).await;
            if let Err(e) = self.store.insert_conn(QueryConn {
                id: clone.id,
                name: target.name.clone(),
                resource_type: target.resource_type.clone(),
                attributes: clone.attributes,
                binding_type: ConnBindingType::QueryTab,
                worksheet_id: None,
                query_tab_id: Some(tab_id),
                clone_of_conn_id: Some(conn_id.clone()),
                active_db: target.db.clone().unwrap_or_default(),
            }) {
                join_all(opened.iter().map(|id| self.delete_quietly(id))).await;
                for id in &opened {
                    self.store.remove_conn(id);
                }
                self.store.set_conn_error(wke_id, Some(e.to_string()));
                self.store.set_phase(wke_id, ConnectionPhase::Unconnected);
                tracing::error!(error = %e, "tab bind failed, rolled back");
                return Err(e);
            }
        }

        self.store.set_phase(wke_id, ConnectionPhase::Connected);
        if let Some(db) = &target.db {
            self.use_db(&conn_id, db).await?;
        }
        tracing::info!(%conn_id, tabs = self.store.tabs_of(wke_id).len(), "connected");
        Ok(conn_id)
    }

    /// Switch the worksheet to another already-open connection.
    ///
    /// Phase 1 unbinds the current connection and its tab clones; phase 2
    /// reuses existing clones of the chosen connection for the tabs, clones
    /// fresh ones for the rest and binds the chosen connection to the
    /// worksheet last.
    #[tracing::instrument(skip(self), fields(%wke_id, conn_id = %chosen_id))]
    pub async fn change_connection(&self, wke_id: WorksheetId, chosen_id: &ConnId) -> Result<()> {
        let chosen = self.store.conn(chosen_id)?;
        if chosen.is_clone() {
            return Err(QbError::InvalidState(format!(
                "connection {chosen_id} is a tab clone and cannot back a worksheet"
            )));
        }
        if let Some(current) = self.store.worksheet_conn(wke_id) {
            if current.id == *chosen_id {
                return Ok(());
            }
            for clone in self.store.clones_of(&current.id) {
                self.store.unbind_conn(&clone.id)?;
            }
            self.store.unbind_conn(&current.id)?;
        }
        self.store.unbind_conn(chosen_id)?;

        // the old bindings are already gone; a half-done rebind must not
        // leave the worksheet looking connected
        if let Err(e) = self.rebind_tabs(wke_id, &chosen).await {
            self.store.set_conn_error(wke_id, Some(e.to_string()));
            self.store.set_phase(wke_id, ConnectionPhase::Unconnected);
            tracing::error!(error = %e, "rebind failed, worksheet left unconnected");
            return Err(e);
        }
        self.store.set_phase(wke_id, ConnectionPhase::Connected);
        Ok(())
    }

    /// Seat the chosen connection's clones on the worksheet's tabs, cloning
    /// fresh ones where none are free, then seat the chosen connection itself
    async fn rebind_tabs(&self, wke_id: WorksheetId, chosen: &QueryConn) -> Result<()> {
        let tabs = self.store.tabs_of(wke_id);
        let mut free_clones: Vec<QueryConn> = self
            .store
            .clones_of(&chosen.id)
            .into_iter()
            .filter(|c| c.query_tab_id.is_none())
            .collect();
        for tab in &tabs {
            match free_clones.pop() {
                Some(clone) => self.store.bind_conn_to_tab(&clone.id, tab.id)?,
                None => {
                    let handle = self.api.clone_conn(&chosen.id).await?;
                    self.set_session_variables(&handle.id).await;
                    self.store.insert_conn(QueryConn {
                        id: handle.id,
                        name: chosen.name.clone(),
                        resource_type: chosen.resource_type.clone(),
                        attributes: handle.attributes,
                        binding_type: ConnBindingType::QueryTab,
                        worksheet_id: None,
                        query_tab_id: Some(tab.id),
                        clone_of_conn_id: Some(chosen.id.clone()),
                        active_db: chosen.active_db.clone(),
                    })?;
                }
            }
        }
        self.store.bind_conn_to_worksheet(&chosen.id, wke_id)
    }

    /// Close a worksheet connection and every clone of it, concurrently
    #[tracing::instrument(skip(self), fields(conn_id = %wke_conn_id))]
    pub async fn cascade_disconnect(&self, wke_conn_id: &ConnId) -> Result<()> {
        let conn = self.store.conn(wke_conn_id)?;
        let wke_id = conn.worksheet_id;
        if let Some(wke_id) = wke_id {
            self.store.set_phase(wke_id, ConnectionPhase::Disconnecting);
        }

        let targets: Vec<ConnId> = std::iter::once(conn.id.clone())
            .chain(self.store.clones_of(&conn.id).into_iter().map(|c| c.id))
            .collect();
        join_all(targets.iter().map(|id| self.delete_quietly(id))).await;
        for id in &targets {
            if let Some(record) = self.store.remove_conn(id) {
                if let Some(tab_id) = record.query_tab_id {
                    self.store.mem.release_tab(tab_id);
                }
            }
        }
        if let Some(wke_id) = wke_id {
            self.store.mem.release_worksheet(wke_id);
            self.store.set_phase(wke_id, ConnectionPhase::Unconnected);
            self.schema.invalidate(wke_id);
        }
        self.store
            .log_history(QueryHistoryEntry::action_log("Disconnect", ""));
        tracing::info!(closed = targets.len(), "cascade disconnect done");
        Ok(())
    }

    /// Close every worksheet connection
    pub async fn disconnect_all(&self) -> Result<()> {
        for wke_id in self.store.worksheet_ids() {
            if let Some(conn) = self.store.worksheet_conn(wke_id) {
                self.cascade_disconnect(&conn.id).await?;
            }
        }
        Ok(())
    }

    /// Reconcile local records against the server's alive-set.
    ///
    /// Alive records get fresh attributes, expired ones are dropped along
    /// with their owner's transient state, and orphaned clones (parent gone)
    /// are explicitly closed. Runs are mutually exclusive; an overlapping
    /// call is a no-op. A server set with nothing in it resets everything.
    #[tracing::instrument(skip(self))]
    pub async fn validate_connections(&self) -> Result<()> {
        if !self.store.begin_validation() {
            return Ok(());
        }
        let result = self.validate_inner().await;
        self.store.end_validation();
        result
    }

    async fn validate_inner(&self) -> Result<()> {
        let server = self.api.list_conns().await?;
        let known = self.store.conns();
        if known.is_empty() {
            return Ok(());
        }
        if server.is_empty() {
            tracing::warn!("server reports no connections, resetting local state");
            for conn in known {
                self.drop_record(&conn);
            }
            return Ok(());
        }

        let cat = categorize(&known, &server);
        tracing::debug!(
            alive = cat.alive.len(),
            expired = cat.expired.len(),
            orphaned = cat.orphaned.len(),
            "connections validated"
        );
        for (id, attributes) in cat.alive {
            self.store.set_conn_attributes(&id, attributes)?;
        }
        for id in cat.expired {
            if let Ok(conn) = self.store.conn(&id) {
                self.drop_record(&conn);
            }
        }
        join_all(cat.orphaned.iter().map(|id| self.delete_quietly(id))).await;
        for id in cat.orphaned {
            if let Ok(conn) = self.store.conn(&id) {
                self.drop_record(&conn);
            }
        }
        Ok(())
    }

    /// Remove a record and reset the transient state of whatever owned it
    fn drop_record(&self, conn: &QueryConn) {
        self.store.remove_conn(&conn.id);
        if let Some(tab_id) = conn.query_tab_id {
            self.store.mem.release_tab(tab_id);
        }
        if let Some(wke_id) = conn.worksheet_id {
            self.store.mem.release_worksheet(wke_id);
            self.store.mem.set_lost_conn_error(
                wke_id,
                QueryResultSet::from_message(format!("Connection {} expired", conn.id)),
            );
            self.store.set_phase(wke_id, ConnectionPhase::Unconnected);
            self.schema.invalidate(wke_id);
        }
    }

    /// Re-establish the worksheet's connection and its active tab's clone.
    ///
    /// The server resets session state on reconnect, so session variables
    /// are re-applied and the schema tree refetched afterwards; a silent
    /// validation pass mops up anything that did not come back.
    #[tracing::instrument(skip(self), fields(%wke_id))]
    pub async fn reconnect(&self, wke_id: WorksheetId) -> Result<()> {
        let wke_conn = self
            .store
            .worksheet_conn(wke_id)
            .ok_or_else(|| QbError::NotFound(format!("no connection for worksheet {wke_id}")))?;
        self.api.reconnect_conn(&wke_conn.id).await?;
        self.set_session_variables(&wke_conn.id).await;

        if let Some(tab_conn) = self
            .store
            .active_tab(wke_id)
            .and_then(|tab_id| self.store.conn_for_tab(tab_id))
        {
            match self.api.reconnect_conn(&tab_conn.id).await {
                Ok(()) => self.set_session_variables(&tab_conn.id).await,
                Err(e) => tracing::warn!(conn_id = %tab_conn.id, error = %e, "tab reconnect failed"),
            }
        }

        if let Err(e) = self.schema.fetch_schemas(wke_id).await {
            tracing::warn!(error = %e, "schema refetch after reconnect failed");
        }
        if let Err(e) = self.validate_connections().await {
            tracing::warn!(error = %e, "validation after reconnect failed");
        }
        Ok(())
    }

    /// Select a default schema on the connection. An SQL error becomes a
    /// failed action-log entry, not a hard error.
    #[tracing::instrument(skip(self), fields(conn_id = %conn_id, db))]
    pub async fn use_db(&self, conn_id: &ConnId, db: &str) -> Result<()> {
        let sql = format!("USE {};", quote_identifier(db));
        let max_rows = self.store.prefs.read().query_row_limit;
        let attrs = self.api.execute(conn_id, &sql, max_rows).await?;
        match attrs.first_error() {
            Some(err) => self.store.log_history(QueryHistoryEntry::failed_action_log(
                "Use database",
                &sql,
                err.message.clone().unwrap_or_default(),
            )),
            None => {
                self.store.set_conn_active_db(conn_id, db)?;
                self.store
                    .log_history(QueryHistoryEntry::action_log("Use database", &sql));
            }
        }
        Ok(())
    }

    /// Re-read the connection's default schema from the server
    pub async fn update_active_db(&self, conn_id: &ConnId) -> Result<()> {
        let attrs = self.api.execute(conn_id, "SELECT DATABASE()", 1).await?;
        let db = attrs
            .results
            .first()
            .and_then(|r| r.first_cell())
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        self.store.set_conn_active_db(conn_id, db)
    }

    /// Apply the preferred session timeouts; failures are logged only
    pub async fn set_session_variables(&self, conn_id: &ConnId) {
        let (stmts, max_rows) = {
            let prefs = self.store.prefs.read();
            (prefs.session_variable_stmts(), prefs.query_row_limit)
        };
        for sql in stmts {
            match self.api.execute(conn_id, &sql, max_rows).await {
                Ok(attrs) => {
                    if let Some(err) = attrs.first_error() {
                        self.store.log_history(QueryHistoryEntry::failed_action_log(
                            "Set session variable",
                            &sql,
                            err.message.clone().unwrap_or_default(),
                        ));
                    }
                }
                Err(e) => tracing::warn!(%conn_id, error = %e, "session variable not applied"),
            }
        }
    }

    /// Fetch and cache the connectable resources of a type
    pub async fn list_resource_targets(&self, resource_type: &str) -> Result<Vec<ResourceRef>> {
        let targets = self.api.list_resources(resource_type).await?;
        self.store
            .set_resource_targets(resource_type, targets.clone());
        Ok(targets)
    }

    /// Add a query tab; while connected, the new tab gets its own clone
    pub async fn add_query_tab(&self, wke_id: WorksheetId) -> Result<QueryTabId> {
        let tab_id = self.store.add_query_tab(wke_id)?;
        if let Some(wke_conn) = self.store.worksheet_conn(wke_id) {
            let handle = self.api.clone_conn(&wke_conn.id).await?;
            self.set_session_variables(&handle.id).await;
            self.store.insert_conn(QueryConn {
                id: handle.id,
                name: wke_conn.name.clone(),
                resource_type: wke_conn.resource_type.clone(),
                attributes: handle.attributes,
                binding_type: ConnBindingType::QueryTab,
                worksheet_id: None,
                query_tab_id: Some(tab_id),
                clone_of_conn_id: Some(wke_conn.id.clone()),
                active_db: wke_conn.active_db.clone(),
            })?;
        }
        Ok(tab_id)
    }

    /// Delete a query tab and close its connection
    pub async fn delete_query_tab(&self, tab_id: QueryTabId) -> Result<()> {
        if let Some(conn_id) = self.store.delete_query_tab(tab_id)? {
            self.delete_quietly(&conn_id).await;
        }
        Ok(())
    }

    /// Disconnect and delete a worksheet with everything it owns
    pub async fn delete_worksheet(&self, wke_id: WorksheetId) -> Result<()> {
        if let Some(conn) = self.store.worksheet_conn(wke_id) {
            self.cascade_disconnect(&conn.id).await?;
        }
        let leftovers = self.store.delete_worksheet(wke_id)?;
        join_all(leftovers.iter().map(|id| self.delete_quietly(id))).await;
        self.schema.invalidate(wke_id);
        Ok(())
    }

    /// DELETE a server-side connection, logging instead of failing; an
    /// already-expired connection answers 404 and that is fine here
    async fn delete_quietly(&self, conn_id: &ConnId) {
        if let Err(e) = self.api.delete_conn(conn_id).await {
            tracing::warn!(%conn_id, error = %e, "delete failed");
        }
    }
}
