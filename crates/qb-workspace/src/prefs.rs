//! User preferences affecting query execution and the sidebar

use serde::{Deserialize, Serialize};

/// Workbench preferences. Persisted alongside the workspace snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// `max_rows` sent with every query
    pub query_row_limit: u64,
    /// Maximum number of statements executed from one editor run
    pub max_statements: u64,
    /// Ask before running queries that modify data
    pub query_confirm_flag: bool,
    /// Show `information_schema` and friends in the sidebar
    pub show_sys_schemas: bool,
    /// Ask before closing a tab with unsaved changes
    pub del_all_conns_before_leave: bool,
    /// `SET SESSION interactive_timeout` applied to every connection
    pub interactive_timeout: u64,
    /// `SET SESSION wait_timeout` applied to every connection
    pub wait_timeout: u64,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            query_row_limit: 10_000,
            max_statements: 1_000,
            query_confirm_flag: true,
            show_sys_schemas: false,
            del_all_conns_before_leave: true,
            interactive_timeout: 28_800,
            wait_timeout: 28_800,
        }
    }
}

impl Preferences {
    /// Statements applied to a connection right after it is established
    pub fn session_variable_stmts(&self) -> Vec<String> {
        vec![
            format!("SET SESSION interactive_timeout = {}", self.interactive_timeout),
            format!("SET SESSION wait_timeout = {}", self.wait_timeout),
        ]
    }
}
