//! Schema tree service
//!
//! Holds the per-worksheet tree cache and loads it over the worksheet's
//! connection. Trees are fetched shallow (schemas with empty groups) and
//! group children are loaded on expansion; previously expanded groups are
//! re-loaded after a refetch so the visible tree comes back.

use crate::{
    CompletionItem, NodeGenResult, SchemaNode, deep_replace_children, find_node,
    gen_group_child_nodes, gen_schema_nodes, node_group_sql, schemata_sql,
};
use parking_lot::RwLock;
use qb_api::ManagementApi;
use qb_core::{QbError, QueryAttributes, QueryConn, QueryResultSet, Result, WorksheetId};
use qb_workspace::WorkspaceStore;
use std::collections::HashMap;
use std::sync::Arc;

/// Cached sidebar tree of one worksheet
#[derive(Debug, Clone, Default)]
pub struct DbTreeState {
    pub loading: bool,
    pub nodes: Vec<SchemaNode>,
    pub completions: Vec<CompletionItem>,
    /// Name of the connection the tree was fetched over
    pub data_of_conn: Option<String>,
}

pub struct SchemaTreeService {
    store: Arc<WorkspaceStore>,
    api: Arc<dyn ManagementApi>,
    trees: RwLock<HashMap<WorksheetId, DbTreeState>>,
}

impl SchemaTreeService {
    pub fn new(store: Arc<WorkspaceStore>, api: Arc<dyn ManagementApi>) -> Self {
        Self {
            store,
            api,
            trees: RwLock::new(HashMap::new()),
        }
    }

    pub fn tree(&self, wke_id: WorksheetId) -> Option<DbTreeState> {
        self.trees.read().get(&wke_id).cloned()
    }

    /// Drop the cached tree, e.g. after a disconnect
    pub fn invalidate(&self, wke_id: WorksheetId) {
        self.trees.write().remove(&wke_id);
    }

    /// Fetch the schema list over the worksheet's connection and rebuild the
    /// tree, re-loading every group the user had expanded
    #[tracing::instrument(skip(self), fields(%wke_id))]
    pub async fn fetch_schemas(&self, wke_id: WorksheetId) -> Result<()> {
        let conn = self
            .store
            .worksheet_conn(wke_id)
            .ok_or_else(|| QbError::NotFound(format!("no connection for worksheet {wke_id}")))?;
        self.trees.write().entry(wke_id).or_default().loading = true;

        let result = self.fetch_tree(wke_id, &conn).await;
        let mut trees = self.trees.write();
        let state = trees.entry(wke_id).or_default();
        state.loading = false;
        match result {
            Ok(generated) => {
                state.nodes = generated.nodes;
                state.completions = generated.completions;
                state.data_of_conn = Some(conn.name.clone());
                tracing::debug!(schemas = state.nodes.len(), "schema tree loaded");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_tree(&self, wke_id: WorksheetId, conn: &QueryConn) -> Result<NodeGenResult> {
        let (sql, max_rows) = {
            let prefs = self.store.prefs.read();
            (schemata_sql(prefs.show_sys_schemas), prefs.query_row_limit)
        };
        let attrs = self.api.execute(&conn.id, &sql, max_rows).await?;
        let mut generated = gen_schema_nodes(first_result(&attrs)?);

        // bring back what the user had open
        let expanded = self.store.worksheet(wke_id)?.expanded_nodes;
        for node_id in expanded {
            let Some(group) = find_node(&generated.nodes, &node_id).filter(|n| n.is_group()) else {
                continue;
            };
            let group = group.clone();
            match self.load_group(&group, conn, max_rows).await {
                Ok(children) => {
                    generated.completions.extend(children.completions);
                    deep_replace_children(&mut generated.nodes, &node_id, children.nodes);
                }
                Err(e) => {
                    tracing::warn!(node = %node_id, error = %e, "re-expansion failed");
                }
            }
        }
        Ok(generated)
    }

    /// Load the children of a group node into the cached tree
    #[tracing::instrument(skip(self), fields(%wke_id, node_id))]
    pub async fn load_children(&self, wke_id: WorksheetId, node_id: &str) -> Result<()> {
        let group = {
            let trees = self.trees.read();
            let state = trees
                .get(&wke_id)
                .ok_or_else(|| QbError::NotFound(format!("no tree for worksheet {wke_id}")))?;
            find_node(&state.nodes, node_id)
                .filter(|n| n.is_group())
                .cloned()
                .ok_or_else(|| QbError::NotFound(format!("group node {node_id}")))?
        };
        let conn = self
            .store
            .worksheet_conn(wke_id)
            .ok_or_else(|| QbError::NotFound(format!("no connection for worksheet {wke_id}")))?;
        let max_rows = self.store.prefs.read().query_row_limit;
        let children = self.load_group(&group, &conn, max_rows).await?;

        let mut trees = self.trees.write();
        if let Some(state) = trees.get_mut(&wke_id) {
            state.completions.extend(children.completions);
            deep_replace_children(&mut state.nodes, node_id, children.nodes);
        }
        Ok(())
    }

    async fn load_group(
        &self,
        group: &SchemaNode,
        conn: &QueryConn,
        max_rows: u64,
    ) -> Result<NodeGenResult> {
        let sql = node_group_sql(group)?;
        let attrs = self.api.execute(&conn.id, &sql, max_rows).await?;
        Ok(gen_group_child_nodes(group, first_result(&attrs)?))
    }

    /// Load a group's children and remember the expansion
    pub async fn expand_node(&self, wke_id: WorksheetId, node_id: &str) -> Result<()> {
        self.load_children(wke_id, node_id).await?;
        let mut expanded = self.store.worksheet(wke_id)?.expanded_nodes;
        if !expanded.iter().any(|id| id == node_id) {
            expanded.push(node_id.to_string());
            self.store.set_expanded_nodes(wke_id, expanded)?;
        }
        Ok(())
    }

    pub fn collapse_node(&self, wke_id: WorksheetId, node_id: &str) -> Result<()> {
        let mut expanded = self.store.worksheet(wke_id)?.expanded_nodes;
        expanded.retain(|id| id != node_id);
        self.store.set_expanded_nodes(wke_id, expanded)
    }
}

fn first_result(attrs: &QueryAttributes) -> Result<&QueryResultSet> {
    if let Some(err) = attrs.first_error() {
        return Err(QbError::Sql {
            errno: err.errno.unwrap_or(0),
            message: err.message.clone().unwrap_or_default(),
        });
    }
    attrs
        .results
        .first()
        .ok_or_else(|| QbError::Api("response carried no results".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use qb_api::{MockApi, OpenConnRequest};
    use qb_core::{ConnBindingType, ConnId};
    use serde_json::json;

    async fn connected_fixture() -> (Arc<WorkspaceStore>, Arc<MockApi>, WorksheetId, ConnId) {
        let store = Arc::new(WorkspaceStore::new());
        let api = Arc::new(MockApi::new());
        let wke_id = store.add_worksheet();
        let handle = api
            .open_conn(&OpenConnRequest {
                target: "server_0".to_string(),
                user: "u".to_string(),
                password: "p".to_string(),
                db: None,
                timeout: None,
            })
            .await
            .unwrap();
        let conn_id = handle.id.clone();
        store
            .insert_conn(QueryConn {
                id: handle.id,
                name: "server_0".to_string(),
                resource_type: "servers".to_string(),
                attributes: handle.attributes,
                binding_type: ConnBindingType::Worksheet,
                worksheet_id: Some(wke_id),
                query_tab_id: None,
                clone_of_conn_id: None,
                active_db: String::new(),
            })
            .unwrap();
        (store, api, wke_id, conn_id)
    }

    fn schemata_result() -> QueryAttributes {
        QueryAttributes {
            sql: String::new(),
            results: vec![QueryResultSet {
                fields: Some(vec!["SCHEMA_NAME".to_string()]),
                data: Some(vec![vec![json!("test")]]),
                ..Default::default()
            }],
        }
    }

    fn tables_result() -> QueryAttributes {
        QueryAttributes {
            sql: String::new(),
            results: vec![QueryResultSet {
                fields: Some(vec!["TABLE_NAME".to_string()]),
                data: Some(vec![vec![json!("employees")]]),
                ..Default::default()
            }],
        }
    }

    #[tokio::test]
    async fn fetch_builds_tree_over_worksheet_conn() {
        let (store, api, wke_id, conn_id) = connected_fixture().await;
        api.push_result(schemata_result());
        let service = SchemaTreeService::new(store, api.clone());

        service.fetch_schemas(wke_id).await.unwrap();
        let tree = service.tree(wke_id).unwrap();
        assert!(!tree.loading);
        assert_eq!(tree.data_of_conn.as_deref(), Some("server_0"));
        assert_eq!(tree.nodes[0].id, "test");
        assert_eq!(tree.completions[0].label, "test");
        assert_eq!(api.executed.lock()[0].0, conn_id);
    }

    #[tokio::test]
    async fn load_children_fills_the_group_in_place() {
        let (store, api, wke_id, _) = connected_fixture().await;
        api.push_result(schemata_result());
        let service = SchemaTreeService::new(store, api.clone());
        service.fetch_schemas(wke_id).await.unwrap();

        api.push_result(tables_result());
        service.load_children(wke_id, "test.TBL_G").await.unwrap();
        let tree = service.tree(wke_id).unwrap();
        assert_eq!(
            find_node(&tree.nodes, "test.employees").unwrap().name,
            "employees"
        );
        assert!(
            tree.completions
                .iter()
                .any(|c| c.label == "employees")
        );
        let group_sql = &api.executed_sql()[1];
        assert!(group_sql.contains("TABLE_SCHEMA = 'test'"));
    }

    #[tokio::test]
    async fn refetch_reloads_expanded_groups() {
        let (store, api, wke_id, _) = connected_fixture().await;
        store
            .set_expanded_nodes(wke_id, vec!["test.TBL_G".to_string()])
            .unwrap();
        api.push_result(schemata_result());
        api.push_result(tables_result());
        let service = SchemaTreeService::new(store, api.clone());

        service.fetch_schemas(wke_id).await.unwrap();
        let tree = service.tree(wke_id).unwrap();
        assert!(find_node(&tree.nodes, "test.employees").is_some());
    }

    #[tokio::test]
    async fn sql_error_surfaces_and_clears_loading() {
        let (store, api, wke_id, _) = connected_fixture().await;
        api.push_error_result(1045, "Access denied");
        let service = SchemaTreeService::new(store, api);

        let err = service.fetch_schemas(wke_id).await.unwrap_err();
        assert!(matches!(err, QbError::Sql { errno: 1045, .. }));
        assert!(!service.tree(wke_id).unwrap().loading);
    }

    #[tokio::test]
    async fn expand_node_records_expansion_once() {
        let (store, api, wke_id, _) = connected_fixture().await;
        api.push_result(schemata_result());
        let service = SchemaTreeService::new(store.clone(), api.clone());
        service.fetch_schemas(wke_id).await.unwrap();

        api.push_result(tables_result());
        service.expand_node(wke_id, "test.TBL_G").await.unwrap();
        api.push_result(tables_result());
        service.expand_node(wke_id, "test.TBL_G").await.unwrap();
        assert_eq!(
            store.worksheet(wke_id).unwrap().expanded_nodes,
            vec!["test.TBL_G".to_string()]
        );
        service.collapse_node(wke_id, "test.TBL_G").unwrap();
        assert!(store.worksheet(wke_id).unwrap().expanded_nodes.is_empty());
    }
}
