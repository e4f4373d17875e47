//! Schema tree nodes and node generation
//!
//! The id scheme: a schema node's id is its name, a schema-level group
//! appends its segment (`test.TBL_G`), entities under a schema-level group
//! drop the group segment (`test.employees`), table-level groups and their
//! children keep it (`test.employees.COL_G.id`). Index names may repeat
//! within a table, so index ids get the node's unique key as a suffix.
//! `level` is the number of dots in the id.

use nanoid::nanoid;
use qb_core::sql_util::quote_identifier;
use qb_core::{QueryResultSet, SYS_SCHEMAS};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Entity node types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Schema,
    Tbl,
    View,
    Sp,
    Fn,
    Trigger,
    Col,
    Idx,
}

impl NodeType {
    /// Column of the generating result set holding the node name
    pub fn name_column(self) -> &'static str {
        match self {
            NodeType::Schema => "SCHEMA_NAME",
            NodeType::Tbl | NodeType::View => "TABLE_NAME",
            NodeType::Sp | NodeType::Fn => "ROUTINE_NAME",
            NodeType::Trigger => "TRIGGER_NAME",
            NodeType::Col => "COLUMN_NAME",
            NodeType::Idx => "INDEX_NAME",
        }
    }
}

/// Group node types, each holding children of one entity type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeGroupType {
    TblG,
    ViewG,
    SpG,
    FnG,
    TriggerG,
    ColG,
    IdxG,
}

impl NodeGroupType {
    pub fn child_type(self) -> NodeType {
        match self {
            NodeGroupType::TblG => NodeType::Tbl,
            NodeGroupType::ViewG => NodeType::View,
            NodeGroupType::SpG => NodeType::Sp,
            NodeGroupType::FnG => NodeType::Fn,
            NodeGroupType::TriggerG => NodeType::Trigger,
            NodeGroupType::ColG => NodeType::Col,
            NodeGroupType::IdxG => NodeType::Idx,
        }
    }

    /// Display name of the group node
    pub fn label(self) -> &'static str {
        match self {
            NodeGroupType::TblG => "Tables",
            NodeGroupType::ViewG => "Views",
            NodeGroupType::SpG => "Stored Procedures",
            NodeGroupType::FnG => "Functions",
            NodeGroupType::TriggerG => "Triggers",
            NodeGroupType::ColG => "Columns",
            NodeGroupType::IdxG => "Indexes",
        }
    }

    /// Segment used in node ids
    pub fn id_segment(self) -> &'static str {
        match self {
            NodeGroupType::TblG => "TBL_G",
            NodeGroupType::ViewG => "VIEW_G",
            NodeGroupType::SpG => "SP_G",
            NodeGroupType::FnG => "FN_G",
            NodeGroupType::TriggerG => "TRIGGER_G",
            NodeGroupType::ColG => "COL_G",
            NodeGroupType::IdxG => "IDX_G",
        }
    }

    /// Entities under these groups keep the group segment in their id;
    /// entities under schema-level groups drop it
    pub fn is_table_level(self) -> bool {
        matches!(
            self,
            NodeGroupType::TriggerG | NodeGroupType::ColG | NodeGroupType::IdxG
        )
    }

    /// Groups attached to a freshly generated entity node
    pub fn groups_of(node_type: NodeType) -> &'static [NodeGroupType] {
        match node_type {
            NodeType::Schema => &[
                NodeGroupType::TblG,
                NodeGroupType::ViewG,
                NodeGroupType::SpG,
                NodeGroupType::FnG,
            ],
            NodeType::Tbl => &[
                NodeGroupType::ColG,
                NodeGroupType::IdxG,
                NodeGroupType::TriggerG,
            ],
            NodeType::View => &[NodeGroupType::ColG],
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Entity(NodeType),
    Group(NodeGroupType),
}

/// One node of the sidebar tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaNode {
    /// Stable dot-joined path, the expansion key
    pub id: String,
    /// Unique per generated node, suffixes index ids
    pub key: String,
    pub kind: NodeKind,
    pub name: String,
    /// Backtick-quoted name usable in SQL
    pub qualified_name: String,
    /// Number of dots in `id`
    pub level: usize,
    pub is_sys: bool,
    /// Schema this node belongs to
    pub schema: String,
    /// Owning table or view, for table-level nodes
    pub table: Option<String>,
    /// Source row of the generating query
    pub data: Value,
    pub children: Vec<SchemaNode>,
}

impl SchemaNode {
    pub fn is_group(&self) -> bool {
        matches!(self.kind, NodeKind::Group(_))
    }

    pub fn group_type(&self) -> Option<NodeGroupType> {
        match self.kind {
            NodeKind::Group(g) => Some(g),
            NodeKind::Entity(_) => None,
        }
    }

    fn level_of(id: &str) -> usize {
        id.matches('.').count()
    }

    /// Build the group child of an entity node
    fn group_child(parent: &SchemaNode, group: NodeGroupType) -> SchemaNode {
        let id = format!("{}.{}", parent.id, group.id_segment());
        SchemaNode {
            level: Self::level_of(&id),
            id,
            key: nanoid!(8),
            kind: NodeKind::Group(group),
            name: group.label().to_string(),
            qualified_name: parent.qualified_name.clone(),
            is_sys: parent.is_sys,
            schema: parent.schema.clone(),
            table: parent.table.clone().or_else(|| match parent.kind {
                NodeKind::Entity(NodeType::Tbl) | NodeKind::Entity(NodeType::View) => {
                    Some(parent.name.clone())
                }
                _ => None,
            }),
            data: Value::Null,
            children: Vec::new(),
        }
    }
}

/// A completion entry for the SQL editor, produced alongside tree nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionItem {
    pub label: String,
    /// Entity type, shown as the completion detail
    pub node_type: NodeType,
    pub insert_text: String,
}

#[derive(Debug, Clone, Default)]
pub struct NodeGenResult {
    pub nodes: Vec<SchemaNode>,
    pub completions: Vec<CompletionItem>,
}

/// Generate top-level schema nodes from a `SCHEMATA` result set
pub fn gen_schema_nodes(result: &QueryResultSet) -> NodeGenResult {
    let mut out = NodeGenResult::default();
    for row in result.object_rows() {
        let Some(name) = row.get("SCHEMA_NAME").and_then(|v| v.as_str()) else {
            continue;
        };
        let mut node = SchemaNode {
            id: name.to_string(),
            key: nanoid!(8),
            kind: NodeKind::Entity(NodeType::Schema),
            name: name.to_string(),
            qualified_name: quote_identifier(name),
            level: 0,
            is_sys: SYS_SCHEMAS.contains(&name),
            schema: name.to_string(),
            table: None,
            data: serde_json::to_value(&row).unwrap_or(Value::Null),
            children: Vec::new(),
        };
        node.children = NodeGroupType::groups_of(NodeType::Schema)
            .iter()
            .map(|g| SchemaNode::group_child(&node, *g))
            .collect();
        out.completions.push(CompletionItem {
            label: name.to_string(),
            node_type: NodeType::Schema,
            insert_text: quote_identifier(name),
        });
        out.nodes.push(node);
    }
    out
}

/// Generate the children of a group node from its group query's result set
pub fn gen_group_child_nodes(group: &SchemaNode, result: &QueryResultSet) -> NodeGenResult {
    let Some(group_type) = group.group_type() else {
        return NodeGenResult::default();
    };
    let child_type = group_type.child_type();
    let name_col = child_type.name_column();
    // schema-level groups: strip the group segment from child ids
    let id_base = if group_type.is_table_level() {
        group.id.clone()
    } else {
        group
            .id
            .strip_suffix(&format!(".{}", group_type.id_segment()))
            .unwrap_or(&group.id)
            .to_string()
    };

    let mut out = NodeGenResult::default();
    for row in result.object_rows() {
        let Some(name) = row.get(name_col).and_then(|v| v.as_str()) else {
            continue;
        };
        let key = nanoid!(8);
        let id = if child_type == NodeType::Idx {
            format!("{id_base}.{name}-{key}")
        } else {
            format!("{id_base}.{name}")
        };
        let qualified_name = match child_type {
            NodeType::Tbl | NodeType::View | NodeType::Sp | NodeType::Fn => {
                format!("{}.{}", quote_identifier(&group.schema), quote_identifier(name))
            }
            _ => match &group.table {
                Some(table) => {
                    format!("{}.{}", quote_identifier(table), quote_identifier(name))
                }
                None => quote_identifier(name),
            },
        };
        let mut node = SchemaNode {
            level: id.matches('.').count(),
            id,
            key,
            kind: NodeKind::Entity(child_type),
            name: name.to_string(),
            qualified_name,
            is_sys: group.is_sys,
            schema: group.schema.clone(),
            table: match child_type {
                NodeType::Tbl | NodeType::View => Some(name.to_string()),
                _ => group.table.clone(),
            },
            data: serde_json::to_value(&row).unwrap_or(Value::Null),
            children: Vec::new(),
        };
        node.children = NodeGroupType::groups_of(child_type)
            .iter()
            .map(|g| SchemaNode::group_child(&node, *g))
            .collect();
        out.completions.push(CompletionItem {
            label: name.to_string(),
            node_type: child_type,
            insert_text: quote_identifier(name),
        });
        out.nodes.push(node);
    }
    out
}
