//! Query history and snippets
//!
//! Two categories of entries: user logs record every query the user ran
//! (success or failure), action logs record operations the workbench issued
//! on the user's behalf (USE, KILL QUERY, previews).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const DEFAULT_CAPACITY: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryCategory {
    UserLogs,
    ActionLogs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHistoryEntry {
    pub date: DateTime<Utc>,
    pub category: HistoryCategory,
    /// Connection name for user logs, action name for action logs
    pub name: String,
    pub sql: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryHistoryEntry {
    pub fn user_log(conn_name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            date: Utc::now(),
            category: HistoryCategory::UserLogs,
            name: conn_name.into(),
            sql: sql.into(),
            success: true,
            error: None,
        }
    }

    pub fn failed_user_log(
        conn_name: impl Into<String>,
        sql: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::user_log(conn_name, sql)
        }
    }

    pub fn action_log(action: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            date: Utc::now(),
            category: HistoryCategory::ActionLogs,
            name: action.into(),
            sql: sql.into(),
            success: true,
            error: None,
        }
    }

    pub fn failed_action_log(
        action: impl Into<String>,
        sql: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::action_log(action, sql)
        }
    }
}

/// Bounded history; oldest entries fall off the front
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryHistory {
    entries: VecDeque<QueryHistoryEntry>,
    capacity: usize,
}

impl Default for QueryHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl QueryHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    pub fn push(&mut self, entry: QueryHistoryEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn entries(&self) -> impl Iterator<Item = &QueryHistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// A saved SQL snippet, expanded by name in the editor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub date: DateTime<Utc>,
    pub name: String,
    pub sql: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuerySnippets {
    snippets: Vec<Snippet>,
}

impl QuerySnippets {
    /// Add or replace the snippet with the given name
    pub fn upsert(&mut self, name: impl Into<String>, sql: impl Into<String>) {
        let name = name.into();
        let snippet = Snippet {
            date: Utc::now(),
            name: name.clone(),
            sql: sql.into(),
        };
        match self.snippets.iter_mut().find(|s| s.name == name) {
            Some(existing) => *existing = snippet,
            None => self.snippets.push(snippet),
        }
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.snippets.len();
        self.snippets.retain(|s| s.name != name);
        self.snippets.len() != before
    }

    pub fn get(&self, name: &str) -> Option<&Snippet> {
        self.snippets.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Snippet> {
        self.snippets.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn history_drops_oldest_at_capacity() {
        let mut history = QueryHistory::with_capacity(2);
        history.push(QueryHistoryEntry::user_log("server_0", "SELECT 1"));
        history.push(QueryHistoryEntry::user_log("server_0", "SELECT 2"));
        history.push(QueryHistoryEntry::user_log("server_0", "SELECT 3"));
        let sqls: Vec<_> = history.entries().map(|e| e.sql.as_str()).collect();
        assert_eq!(sqls, vec!["SELECT 2", "SELECT 3"]);
    }

    #[test]
    fn failed_user_log_carries_error() {
        let entry =
            QueryHistoryEntry::failed_user_log("server_0", "SELECT bogus", "Unknown column");
        assert!(!entry.success);
        assert_eq!(entry.error.as_deref(), Some("Unknown column"));
        assert_eq!(entry.category, HistoryCategory::UserLogs);
    }

    #[test]
    fn snippet_upsert_replaces_by_name() {
        let mut snippets = QuerySnippets::default();
        snippets.upsert("sel", "SELECT 1");
        snippets.upsert("sel", "SELECT 2");
        assert_eq!(snippets.iter().count(), 1);
        assert_eq!(snippets.get("sel").unwrap().sql, "SELECT 2");
        assert!(snippets.remove("sel"));
        assert!(!snippets.remove("sel"));
    }
}
