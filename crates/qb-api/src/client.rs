//! reqwest-backed management API client

use crate::api::{ManagementApi, OpenConnRequest};
use async_trait::async_trait;
use qb_core::{ConnHandle, ConnId, QbError, QueryAttributes, ResourceRef, Result};
use serde::Deserialize;
use serde_json::json;
use url::Url;

/// JSON:API envelope for a single resource
#[derive(Debug, Deserialize)]
struct OneDocument<T> {
    data: T,
}

/// JSON:API envelope for a resource collection
#[derive(Debug, Deserialize)]
struct ManyDocument<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct QueryDocument {
    data: QueryData,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    attributes: QueryAttributes,
}

/// Configuration for [`HttpManagementApi`]
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL of the management API, e.g. `http://127.0.0.1:8989/v1/`
    pub base_url: Url,
    /// TTL in seconds requested for persisted connections
    pub conn_max_age: u64,
}

impl ApiConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            conn_max_age: 86_400,
        }
    }
}

/// Management API client over HTTP
pub struct HttpManagementApi {
    http: reqwest::Client,
    config: ApiConfig,
}

impl HttpManagementApi {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.config
            .base_url
            .join(path)
            .map_err(|e| QbError::Api(format!("invalid endpoint {path}: {e}")))
    }

    fn persist_params(&self) -> [(&'static str, String); 2] {
        [
            ("persist", "yes".to_string()),
            ("max-age", self.config.conn_max_age.to_string()),
        ]
    }

    async fn check(&self, res: reqwest::Response) -> Result<reqwest::Response> {
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }
        let body = res.text().await.unwrap_or_default();
        Err(QbError::Api(format!("HTTP {status}: {body}")))
    }
}

fn http_err(e: reqwest::Error) -> QbError {
    QbError::Api(e.to_string())
}

#[async_trait]
impl ManagementApi for HttpManagementApi {
    #[tracing::instrument(skip(self, body), fields(target = %body.target))]
    async fn open_conn(&self, body: &OpenConnRequest) -> Result<ConnHandle> {
        let res = self
            .http
            .post(self.endpoint("sql")?)
            .query(&self.persist_params())
            .json(body)
            .send()
            .await
            .map_err(http_err)?;
        let doc: OneDocument<ConnHandle> = self.check(res).await?.json().await.map_err(http_err)?;
        tracing::info!(conn_id = %doc.data.id, "connection opened");
        Ok(doc.data)
    }

    #[tracing::instrument(skip(self), fields(conn_id = %id))]
    async fn clone_conn(&self, id: &ConnId) -> Result<ConnHandle> {
        let res = self
            .http
            .post(self.endpoint(&format!("sql/{id}/clone"))?)
            .query(&self.persist_params())
            .send()
            .await
            .map_err(http_err)?;
        let doc: OneDocument<ConnHandle> = self.check(res).await?.json().await.map_err(http_err)?;
        tracing::info!(clone_id = %doc.data.id, "connection cloned");
        Ok(doc.data)
    }

    #[tracing::instrument(skip(self), fields(conn_id = %id))]
    async fn delete_conn(&self, id: &ConnId) -> Result<()> {
        let res = self
            .http
            .delete(self.endpoint(&format!("sql/{id}"))?)
            .send()
            .await
            .map_err(http_err)?;
        self.check(res).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(conn_id = %id))]
    async fn reconnect_conn(&self, id: &ConnId) -> Result<()> {
        let res = self
            .http
            .post(self.endpoint(&format!("sql/{id}/reconnect"))?)
            .send()
            .await
            .map_err(http_err)?;
        self.check(res).await?;
        Ok(())
    }

    async fn list_conns(&self) -> Result<Vec<ConnHandle>> {
        let res = self
            .http
            .get(self.endpoint("sql/")?)
            .send()
            .await
            .map_err(http_err)?;
        let doc: ManyDocument<ConnHandle> = self.check(res).await?.json().await.map_err(http_err)?;
        Ok(doc.data)
    }

    #[tracing::instrument(skip(self, sql), fields(conn_id = %id, sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, id: &ConnId, sql: &str, max_rows: u64) -> Result<QueryAttributes> {
        let res = self
            .http
            .post(self.endpoint(&format!("sql/{id}/queries"))?)
            .json(&json!({ "sql": sql, "max_rows": max_rows }))
            .send()
            .await
            .map_err(http_err)?;
        let doc: QueryDocument = self.check(res).await?.json().await.map_err(http_err)?;
        tracing::debug!(results = doc.data.attributes.results.len(), "query executed");
        Ok(doc.data.attributes)
    }

    async fn list_resources(&self, resource_type: &str) -> Result<Vec<ResourceRef>> {
        let res = self
            .http
            .get(self.endpoint(resource_type)?)
            .query(&[(format!("fields[{resource_type}]"), "id")])
            .send()
            .await
            .map_err(http_err)?;
        let doc: ManyDocument<ResourceRef> = self.check(res).await?.json().await.map_err(http_err)?;
        Ok(doc.data)
    }
}
