//! Scripted in-memory management API for tests
//!
//! `MockApi` behaves like a tiny proxy: it issues connection ids, keeps the
//! authoritative alive-set that `GET /sql/` would report, and answers
//! queries from a scripted queue. Tests can expire connections behind the
//! client's back to exercise reconciliation.

use crate::api::{ManagementApi, OpenConnRequest};
use async_trait::async_trait;
use futures::channel::oneshot;
use parking_lot::Mutex;
use qb_core::{ConnHandle, ConnId, QbError, QueryAttributes, QueryResultSet, ResourceRef, Result};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Default)]
pub struct MockApi {
    next_id: AtomicU64,
    /// Server-side alive set: id -> attributes
    alive: Mutex<HashMap<ConnId, serde_json::Value>>,
    /// Every `DELETE /sql/{id}` the client issued
    pub deleted: Mutex<Vec<ConnId>>,
    /// Every `POST /sql/{id}/reconnect` the client issued
    pub reconnected: Mutex<Vec<ConnId>>,
    /// Every executed `(conn, sql)` pair, in order
    pub executed: Mutex<Vec<(ConnId, String)>>,
    /// Scripted query results, popped front-first; empty queue answers OK
    pub results: Mutex<VecDeque<QueryAttributes>>,
    /// Responses matched by SQL substring, checked before the queue and
    /// never consumed
    canned: Mutex<Vec<(String, QueryAttributes)>>,
    /// Gates awaited before answering a query, popped front-first
    gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    pub fail_open: AtomicBool,
    pub fail_clone: AtomicBool,
    pub fail_list: AtomicBool,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn issue_conn(&self) -> ConnHandle {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = ConnId::new(format!("conn-{n}"));
        let attributes = json!({ "thread_id": n, "seconds_idle": 0 });
        self.alive.lock().insert(id.clone(), attributes.clone());
        ConnHandle { id, attributes }
    }

    /// Simulate server-side expiry of a connection without telling the client
    pub fn expire_conn(&self, id: &ConnId) {
        self.alive.lock().remove(id);
    }

    pub fn is_alive(&self, id: &ConnId) -> bool {
        self.alive.lock().contains_key(id)
    }

    pub fn alive_count(&self) -> usize {
        self.alive.lock().len()
    }

    pub fn push_result(&self, attrs: QueryAttributes) {
        self.results.lock().push_back(attrs);
    }

    /// Queue an error result for the next query
    pub fn push_error_result(&self, errno: i64, message: &str) {
        self.push_result(QueryAttributes {
            sql: String::new(),
            results: vec![QueryResultSet {
                errno: Some(errno),
                message: Some(message.to_string()),
                ..Default::default()
            }],
        });
    }

    /// Answer every query containing `substr` with the given result
    pub fn respond_to(&self, substr: impl Into<String>, attrs: QueryAttributes) {
        self.canned.lock().push((substr.into(), attrs));
    }

    /// Hold the next query open until the returned sender fires (or drops)
    pub fn gate_next_execute(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().push_back(rx);
        tx
    }

    pub fn executed_sql(&self) -> Vec<String> {
        self.executed.lock().iter().map(|(_, sql)| sql.clone()).collect()
    }
}

#[async_trait]
impl ManagementApi for MockApi {
    async fn open_conn(&self, body: &OpenConnRequest) -> Result<ConnHandle> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(QbError::Api(format!(
                "HTTP 400: failed to connect to {}",
                body.target
            )));
        }
        Ok(self.issue_conn())
    }

    async fn clone_conn(&self, id: &ConnId) -> Result<ConnHandle> {
        if self.fail_clone.load(Ordering::SeqCst) {
            return Err(QbError::Api("HTTP 503: clone failed".to_string()));
        }
        if !self.is_alive(id) {
            return Err(QbError::Api(format!("HTTP 404: no connection {id}")));
        }
        Ok(self.issue_conn())
    }

    async fn delete_conn(&self, id: &ConnId) -> Result<()> {
        self.deleted.lock().push(id.clone());
        // deleting an already-expired connection answers 404, which the
        // lifecycle layer treats as an error it merely logs
        match self.alive.lock().remove(id) {
            Some(_) => Ok(()),
            None => Err(QbError::Api(format!("HTTP 404: no connection {id}"))),
        }
    }

    async fn reconnect_conn(&self, id: &ConnId) -> Result<()> {
        self.reconnected.lock().push(id.clone());
        if self.is_alive(id) {
            Ok(())
        } else {
            Err(QbError::Api(format!("HTTP 404: no connection {id}")))
        }
    }

    async fn list_conns(&self) -> Result<Vec<ConnHandle>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(QbError::Api("HTTP 503: unavailable".to_string()));
        }
        Ok(self
            .alive
            .lock()
            .iter()
            .map(|(id, attributes)| ConnHandle {
                id: id.clone(),
                attributes: attributes.clone(),
            })
            .collect())
    }

    async fn execute(&self, id: &ConnId, sql: &str, _max_rows: u64) -> Result<QueryAttributes> {
        if !self.is_alive(id) {
            return Err(QbError::Api(format!("HTTP 404: no connection {id}")));
        }
        self.executed.lock().push((id.clone(), sql.to_string()));
        let gate = self.gates.lock().pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        let canned = self
            .canned
            .lock()
            .iter()
            .find(|(substr, _)| sql.contains(substr.as_str()))
            .map(|(_, attrs)| attrs.clone());
        if let Some(mut attrs) = canned {
            attrs.sql = sql.to_string();
            return Ok(attrs);
        }
        if let Some(mut attrs) = self.results.lock().pop_front() {
            attrs.sql = sql.to_string();
            return Ok(attrs);
        }
        Ok(QueryAttributes {
            sql: sql.to_string(),
            results: vec![QueryResultSet {
                affected_rows: Some(0),
                execution_time: Some(0.0),
                ..Default::default()
            }],
        })
    }

    async fn list_resources(&self, resource_type: &str) -> Result<Vec<ResourceRef>> {
        Ok(vec![
            ResourceRef {
                id: format!("{}_0", resource_type.trim_end_matches('s')),
                resource_type: resource_type.to_string(),
            },
            ResourceRef {
                id: format!("{}_1", resource_type.trim_end_matches('s')),
                resource_type: resource_type.to_string(),
            },
        ])
    }
}
