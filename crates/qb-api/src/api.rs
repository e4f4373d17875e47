//! The management API seam

use async_trait::async_trait;
use futures::future::{AbortRegistration, Abortable};
use qb_core::{ConnHandle, ConnId, QbError, QueryAttributes, ResourceRef, Result};
use serde::Serialize;

/// Request body for `POST /sql`
#[derive(Debug, Clone, Serialize)]
pub struct OpenConnRequest {
    /// Name of the target resource (server, service or listener)
    pub target: String,
    pub user: String,
    pub password: String,
    /// Default schema, selected server-side at open time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db: Option<String>,
    /// Connection timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

/// Operations of the proxy's `/sql` management endpoint.
///
/// Every method maps 1:1 to an HTTP call; implementations translate non-2xx
/// statuses and transport failures into [`QbError::Api`].
#[async_trait]
pub trait ManagementApi: Send + Sync {
    /// `POST /sql?persist=yes&max-age=<secs>` - open a connection
    async fn open_conn(&self, body: &OpenConnRequest) -> Result<ConnHandle>;

    /// `POST /sql/{id}/clone?persist=yes&max-age=<secs>` - clone a connection
    async fn clone_conn(&self, id: &ConnId) -> Result<ConnHandle>;

    /// `DELETE /sql/{id}` - close a connection
    async fn delete_conn(&self, id: &ConnId) -> Result<()>;

    /// `POST /sql/{id}/reconnect` - re-establish a dropped connection,
    /// resetting its server-side session state
    async fn reconnect_conn(&self, id: &ConnId) -> Result<()>;

    /// `GET /sql/` - the authoritative set of live connections
    async fn list_conns(&self) -> Result<Vec<ConnHandle>>;

    /// `POST /sql/{id}/queries` - execute SQL on a connection
    async fn execute(&self, id: &ConnId, sql: &str, max_rows: u64) -> Result<QueryAttributes>;

    /// `GET /{type}?fields[{type}]=id` - list resources of a type
    async fn list_resources(&self, resource_type: &str) -> Result<Vec<ResourceRef>>;

    /// Like [`execute`](Self::execute) but cancellable through the paired
    /// [`AbortHandle`](futures::future::AbortHandle). Aborting maps to
    /// [`QbError::Cancelled`]; the server-side query keeps running and must
    /// be killed separately.
    async fn execute_abortable(
        &self,
        id: &ConnId,
        sql: &str,
        max_rows: u64,
        reg: AbortRegistration,
    ) -> Result<QueryAttributes> {
        match Abortable::new(self.execute(id, sql, max_rows), reg).await {
            Ok(res) => res,
            Err(_aborted) => Err(QbError::Cancelled),
        }
    }
}
