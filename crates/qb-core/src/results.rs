//! Wire types for the management API
//!
//! The `/sql/{id}/queries` endpoint answers with a JSON:API envelope whose
//! `data.attributes` carries the executed `sql` and an array of result
//! objects. A result object is either a result set (`fields` + `data`), an
//! OK packet (`affected_rows`) or an error (`errno` + `message`).

use crate::ConnId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A connection as reported by the management API (`GET /sql/`,
/// `POST /sql`, `POST /sql/{id}/clone`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnHandle {
    pub id: ConnId,
    #[serde(default)]
    pub attributes: Value,
}

/// A `{id, type}` reference from a resource collection endpoint, used to
/// populate connection target pickers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
}

/// One entry of `data.attributes.results`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryResultSet {
    /// Column names of a result set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    /// Row data of a result set, positionally matching `fields`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Vec<Value>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errno: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_rows: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
}

impl QueryResultSet {
    pub fn is_error(&self) -> bool {
        self.errno.is_some()
    }

    /// Message-only result, e.g. the placeholder stored for a killed query
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// First cell of the first row, if any. `SELECT DATABASE()` and similar
    /// single-value queries are read through this.
    pub fn first_cell(&self) -> Option<&Value> {
        self.data.as_ref()?.first()?.first()
    }

    /// View rows as field-name → value maps
    pub fn object_rows(&self) -> Vec<HashMap<String, Value>> {
        let (Some(fields), Some(data)) = (&self.fields, &self.data) else {
            return Vec::new();
        };
        data.iter()
            .map(|row| {
                fields
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect::<HashMap<_, _>>()
            })
            .collect()
    }
}

/// `data.attributes` of a query response
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryAttributes {
    #[serde(default)]
    pub sql: String,
    #[serde(default)]
    pub results: Vec<QueryResultSet>,
}

impl QueryAttributes {
    /// First error among the results, if any. Multi-statement execution
    /// reports at most one error object.
    pub fn first_error(&self) -> Option<&QueryResultSet> {
        self.results.iter().find(|r| r.is_error())
    }
}
