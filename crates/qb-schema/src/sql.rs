//! information_schema query builders
//!
//! All queries are deterministic: fixed column lists and an ORDER BY on the
//! name column, so regenerated trees are stable.

use crate::{NodeGroupType, SchemaNode};
use qb_core::sql_util::escape_string_literal;
use qb_core::{QbError, Result, SYS_SCHEMAS};

/// Query for top-level schema nodes
pub fn schemata_sql(show_sys_schemas: bool) -> String {
    let mut sql = String::from("SELECT * FROM information_schema.SCHEMATA");
    if !show_sys_schemas {
        let hidden = SYS_SCHEMAS
            .iter()
            .map(|s| format!("'{s}'"))
            .collect::<Vec<_>>()
            .join(",");
        sql.push_str(&format!(" WHERE SCHEMA_NAME NOT IN({hidden})"));
    }
    sql.push_str(" ORDER BY SCHEMA_NAME;");
    sql
}

/// Query for the children of a group node
pub fn node_group_sql(group: &SchemaNode) -> Result<String> {
    let group_type = group
        .group_type()
        .ok_or_else(|| QbError::InvalidState(format!("{} is not a group node", group.id)))?;
    let schema = escape_string_literal(&group.schema);
    let table = || -> Result<String> {
        group
            .table
            .as_deref()
            .map(escape_string_literal)
            .ok_or_else(|| QbError::InvalidState(format!("{} has no owning table", group.id)))
    };
    let sql = match group_type {
        NodeGroupType::TblG => format!(
            "SELECT TABLE_NAME, CREATE_TIME, TABLE_ROWS, ENGINE FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = '{schema}' AND TABLE_TYPE = 'BASE TABLE' \
             ORDER BY TABLE_NAME;"
        ),
        NodeGroupType::ViewG => format!(
            "SELECT TABLE_NAME, CREATE_TIME, TABLE_ROWS, ENGINE FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = '{schema}' AND TABLE_TYPE != 'BASE TABLE' \
             ORDER BY TABLE_NAME;"
        ),
        NodeGroupType::SpG => format!(
            "SELECT ROUTINE_NAME, CREATED FROM information_schema.ROUTINES \
             WHERE ROUTINE_TYPE = 'PROCEDURE' AND ROUTINE_SCHEMA = '{schema}' \
             ORDER BY ROUTINE_NAME;"
        ),
        NodeGroupType::FnG => format!(
            "SELECT ROUTINE_NAME, CREATED FROM information_schema.ROUTINES \
             WHERE ROUTINE_TYPE = 'FUNCTION' AND ROUTINE_SCHEMA = '{schema}' \
             ORDER BY ROUTINE_NAME;"
        ),
        NodeGroupType::TriggerG => format!(
            "SELECT TRIGGER_NAME, CREATED, EVENT_MANIPULATION, ACTION_STATEMENT, ACTION_TIMING \
             FROM information_schema.TRIGGERS \
             WHERE TRIGGER_SCHEMA = '{schema}' AND EVENT_OBJECT_TABLE = '{}' \
             ORDER BY TRIGGER_NAME;",
            table()?
        ),
        NodeGroupType::ColG => format!(
            "SELECT COLUMN_NAME, COLUMN_TYPE, COLUMN_KEY, PRIVILEGES \
             FROM information_schema.COLUMNS \
             WHERE TABLE_SCHEMA = '{schema}' AND TABLE_NAME = '{}' \
             ORDER BY COLUMN_NAME;",
            table()?
        ),
        NodeGroupType::IdxG => format!(
            "SELECT INDEX_NAME, COLUMN_NAME, NON_UNIQUE, SEQ_IN_INDEX, CARDINALITY, NULLABLE, \
             INDEX_TYPE FROM information_schema.STATISTICS \
             WHERE TABLE_SCHEMA = '{schema}' AND TABLE_NAME = '{}' \
             ORDER BY INDEX_NAME;",
            table()?
        ),
    };
    Ok(sql)
}

/// Table options shown in the DDL editor
pub fn alter_table_opts_sql(schema: &str, table: &str) -> String {
    format!(
        "SELECT TABLE_NAME, ENGINE, CHARACTER_SET_NAME, TABLE_COLLATION, TABLE_COMMENT \
         FROM information_schema.TABLES t \
         JOIN information_schema.COLLATIONS c ON t.TABLE_COLLATION = c.COLLATION_NAME \
         WHERE TABLE_SCHEMA = '{}' AND TABLE_NAME = '{}';",
        escape_string_literal(schema),
        escape_string_literal(table)
    )
}

/// Column definitions shown in the DDL editor
pub fn alter_cols_opts_sql(schema: &str, table: &str) -> String {
    format!(
        "SELECT COLUMN_NAME, COLUMN_TYPE, IS_NULLABLE, COLUMN_DEFAULT, EXTRA, COLUMN_KEY, \
         CHARACTER_SET_NAME, COLLATION_NAME, COLUMN_COMMENT \
         FROM information_schema.COLUMNS \
         WHERE TABLE_SCHEMA = '{}' AND TABLE_NAME = '{}' \
         ORDER BY ORDINAL_POSITION;",
        escape_string_literal(schema),
        escape_string_literal(table)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NodeKind, SchemaNode};
    use pretty_assertions::assert_eq;

    fn group(group_type: NodeGroupType, schema: &str, table: Option<&str>) -> SchemaNode {
        SchemaNode {
            id: format!("{schema}.{}", group_type.id_segment()),
            key: "k".to_string(),
            kind: NodeKind::Group(group_type),
            name: group_type.label().to_string(),
            qualified_name: String::new(),
            level: 1,
            is_sys: false,
            schema: schema.to_string(),
            table: table.map(str::to_string),
            data: serde_json::Value::Null,
            children: Vec::new(),
        }
    }

    #[test]
    fn schemata_sql_hides_sys_schemas_by_default() {
        assert_eq!(
            schemata_sql(false),
            "SELECT * FROM information_schema.SCHEMATA WHERE SCHEMA_NAME \
             NOT IN('information_schema','performance_schema','mysql','sys') \
             ORDER BY SCHEMA_NAME;"
        );
        assert_eq!(
            schemata_sql(true),
            "SELECT * FROM information_schema.SCHEMATA ORDER BY SCHEMA_NAME;"
        );
    }

    #[test]
    fn tables_and_views_split_on_table_type() {
        let tbl = node_group_sql(&group(NodeGroupType::TblG, "test", None)).unwrap();
        let view = node_group_sql(&group(NodeGroupType::ViewG, "test", None)).unwrap();
        assert!(tbl.contains("TABLE_TYPE = 'BASE TABLE'"));
        assert!(view.contains("TABLE_TYPE != 'BASE TABLE'"));
        assert!(tbl.ends_with("ORDER BY TABLE_NAME;"));
    }

    #[test]
    fn column_group_requires_owning_table() {
        let err = node_group_sql(&group(NodeGroupType::ColG, "test", None)).unwrap_err();
        assert!(matches!(err, QbError::InvalidState(_)));
        let sql =
            node_group_sql(&group(NodeGroupType::ColG, "test", Some("employees"))).unwrap();
        assert!(sql.contains("TABLE_NAME = 'employees'"));
    }

    #[test]
    fn string_values_are_escaped() {
        let sql =
            node_group_sql(&group(NodeGroupType::ColG, "we'ird", Some("ta'ble"))).unwrap();
        assert!(sql.contains("TABLE_SCHEMA = 'we''ird'"));
        assert!(sql.contains("TABLE_NAME = 'ta''ble'"));
    }
}
