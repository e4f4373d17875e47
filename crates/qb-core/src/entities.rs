//! Entity records for the workbench

use crate::{ConnId, QueryTabId, WorksheetId};
use serde::{Deserialize, Serialize};

/// System schemas hidden from the sidebar unless the user opts in
pub const SYS_SCHEMAS: [&str; 4] = ["information_schema", "performance_schema", "mysql", "sys"];

/// What a server-side connection is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnBindingType {
    /// The primary connection a user opened for a worksheet
    Worksheet,
    /// A connection cloned from a worksheet connection, owned by one query tab
    QueryTab,
}

/// Editor mode of a query tab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditorMode {
    #[default]
    TxtEditor,
    DdlEditor,
}

/// Connection state of a worksheet.
///
/// The transitions are driven by the connection controller: a worksheet is
/// `Unconnected` until the user opens a connection, `Connecting` while the
/// open request and tab clones are in flight, `Connected` once every tab is
/// bound, and `Disconnecting` while a cascade teardown runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    #[default]
    Unconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// A top-level worksheet. Owns query tabs and at most one worksheet-bound
/// connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worksheet {
    pub id: WorksheetId,
    pub name: String,
    /// Sidebar filter text, persisted per worksheet
    #[serde(default)]
    pub search_schema: String,
    /// Ids of tree nodes the user expanded, re-loaded on schema refetch
    #[serde(default)]
    pub expanded_nodes: Vec<String>,
}

impl Worksheet {
    pub fn new() -> Self {
        Self {
            id: WorksheetId::new(),
            name: "WORKSHEET".to_string(),
            search_schema: String::new(),
            expanded_nodes: Vec::new(),
        }
    }

    /// Reset sidebar state to its initial values, keeping identity
    pub fn refresh(&mut self) {
        self.name = "WORKSHEET".to_string();
        self.search_schema.clear();
        self.expanded_nodes.clear();
    }
}

impl Default for Worksheet {
    fn default() -> Self {
        Self::new()
    }
}

/// Metadata of a file opened into a query tab, used to detect unsaved changes
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlobFile {
    /// File name, empty when no file is opened
    #[serde(default)]
    pub name: String,
    /// Original text of the file at open time
    #[serde(default)]
    pub txt: String,
}

impl BlobFile {
    pub fn is_opened(&self) -> bool {
        !self.name.is_empty()
    }
}

/// A query tab inside a worksheet. Holds its own editor buffer and is bound
/// 1:1 to a cloned connection while the worksheet is connected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryTab {
    pub id: QueryTabId,
    pub worksheet_id: WorksheetId,
    /// Ordinal used for default naming ("Query Tab N")
    pub count: u32,
    pub name: String,
    #[serde(default)]
    pub query_txt: String,
    #[serde(default)]
    pub blob_file: BlobFile,
    #[serde(default)]
    pub editor_mode: EditorMode,
    /// DDL editor metadata cache, opaque to the engine
    #[serde(default)]
    pub tbl_creation_info: serde_json::Value,
}

impl QueryTab {
    pub fn new(worksheet_id: WorksheetId, count: u32) -> Self {
        Self {
            id: QueryTabId::new(),
            worksheet_id,
            count,
            name: format!("Query Tab {count}"),
            query_txt: String::new(),
            blob_file: BlobFile::default(),
            editor_mode: EditorMode::default(),
            tbl_creation_info: serde_json::Value::Null,
        }
    }

    pub fn has_unsaved_changes(&self) -> bool {
        detect_unsaved_changes(&self.query_txt, &self.blob_file)
    }
}

/// A server-side connection handle known to the client.
///
/// Exactly one of `worksheet_id` / `query_tab_id` is set, matching
/// `binding_type`. A `QueryTab`-bound record always carries
/// `clone_of_conn_id`, pointing at the worksheet connection it was cloned
/// from; that is a lookup key, not an ownership edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConn {
    pub id: ConnId,
    /// Name of the target resource, e.g. `server_0`
    pub name: String,
    /// Resource type of the target: servers, services or listeners
    pub resource_type: String,
    /// Server-reported attributes, including `thread_id`
    pub attributes: serde_json::Value,
    pub binding_type: ConnBindingType,
    #[serde(default)]
    pub worksheet_id: Option<WorksheetId>,
    #[serde(default)]
    pub query_tab_id: Option<QueryTabId>,
    #[serde(default)]
    pub clone_of_conn_id: Option<ConnId>,
    #[serde(default)]
    pub active_db: String,
}

impl QueryConn {
    /// Server-side thread id of this connection, used for `KILL QUERY`
    pub fn thread_id(&self) -> Option<u64> {
        self.attributes.get("thread_id").and_then(|v| v.as_u64())
    }

    pub fn is_clone(&self) -> bool {
        self.clone_of_conn_id.is_some()
    }
}

/// Detect unsaved changes of an opened file or an unsaved query tab.
///
/// A blank tab with no opened file has nothing to save. With no file opened,
/// any text counts as unsaved. With a file opened, the buffer is compared
/// against the file's original text.
pub fn detect_unsaved_changes(query_txt: &str, blob_file: &BlobFile) -> bool {
    if query_txt.is_empty() && !blob_file.is_opened() {
        return false;
    }
    blob_file.txt != query_txt
}
