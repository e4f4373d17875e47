//! Partitioning local connection records against the server's alive-set
//!
//! A record is expired when the server no longer reports its id. A clone
//! whose parent expired is orphaned: the server still holds it, but nothing
//! can reach it anymore, so it must be closed explicitly.

use qb_core::{ConnHandle, ConnId, QueryConn};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default, PartialEq)]
pub struct Categorized {
    /// Still alive, paired with their freshly reported attributes
    pub alive: Vec<(ConnId, Value)>,
    pub expired: Vec<ConnId>,
    pub orphaned: Vec<ConnId>,
}

pub fn categorize(known: &[QueryConn], server: &[ConnHandle]) -> Categorized {
    let alive_ids: HashSet<&ConnId> = server.iter().map(|h| &h.id).collect();
    let attributes: HashMap<&ConnId, &Value> =
        server.iter().map(|h| (&h.id, &h.attributes)).collect();

    let mut out = Categorized::default();
    for conn in known {
        if !alive_ids.contains(&conn.id) {
            out.expired.push(conn.id.clone());
        } else if conn
            .clone_of_conn_id
            .as_ref()
            .is_some_and(|parent| !alive_ids.contains(parent))
        {
            out.orphaned.push(conn.id.clone());
        } else {
            let attrs = attributes
                .get(&conn.id)
                .map(|v| (*v).clone())
                .unwrap_or(Value::Null);
            out.alive.push((conn.id.clone(), attrs));
        }
    }
    out
}
