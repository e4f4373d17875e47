//! querybench schema - the sidebar schema tree
//!
//! Builds the lazily-loaded tree of schemas, tables, views, routines,
//! triggers, columns and indexes from `information_schema` queries. Node ids
//! are stable dot-joined paths so expansion state survives a refetch;
//! completion items for the editor are produced alongside the nodes.

mod node;
mod service;
mod sql;
mod tree;

pub use node::{
    CompletionItem, NodeGenResult, NodeGroupType, NodeKind, NodeType, SchemaNode,
    gen_group_child_nodes, gen_schema_nodes,
};
pub use service::{DbTreeState, SchemaTreeService};
pub use sql::{alter_cols_opts_sql, alter_table_opts_sql, node_group_sql, schemata_sql};
pub use tree::{deep_replace_children, find_node};
