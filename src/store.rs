use async_trait::async_trait;
use log::info;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::time::Duration;

use crate::error::{EngineError, EngineResult};
use crate::schema::{Record, Schema, SchemaPatch};

/// The external request/response store the engine persists through.
///
/// Transport details (paths, verbs) belong to the implementation; the
/// engine only depends on these logical operations. Every mutating call
/// may fail with a backend error, in which case the caller's local
/// working state is left unchanged.
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn create_schema(&self, schema_name: &str, schema_document: &str)
        -> EngineResult<Schema>;

    async fn get_schema(&self, uuid: &str) -> EngineResult<Schema>;

    async fn get_all_schemas(&self) -> EngineResult<Vec<Schema>>;

    async fn update_schema(&self, uuid: &str, patch: SchemaPatch) -> EngineResult<Schema>;

    async fn delete_schema(&self, uuid: &str) -> EngineResult<()>;

    /// Provisions backing storage for the schema; on success the backend
    /// flips `is_table_initialized`.
    async fn create_table(&self, schema_id: &str) -> EngineResult<()>;

    /// Persists a record; the backend assigns its uuid.
    async fn create_data(&self, schema_id: &str, record: &Map<String, Value>)
        -> EngineResult<Record>;

    async fn get_data(&self, schema_id: &str, uuid: &str) -> EngineResult<Record>;

    async fn get_all_data(&self, schema_id: &str) -> EngineResult<Vec<Record>>;

    async fn update_data(
        &self,
        schema_id: &str,
        uuid: &str,
        record: &Map<String, Value>,
    ) -> EngineResult<Record>;

    async fn delete_data(&self, schema_id: &str, uuid: &str) -> EngineResult<()>;

    /// Records of a child schema referenced from `parent_schema_id`.
    async fn get_child_schema_data(
        &self,
        parent_schema_id: &str,
        child_schema_id: &str,
    ) -> EngineResult<Vec<Record>>;
}

/// HTTP implementation of [`DataStore`].
#[derive(Debug, Clone)]
pub struct HttpDataStore {
    client: Client,
    base_url: String,
}

impl HttpDataStore {
    /// Creates a store speaking to `base_url` (e.g.
    /// `http://localhost:3000`) with a 30 second request timeout.
    pub fn new(base_url: &str) -> EngineResult<Self> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Backend(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, route: &str) -> String {
        format!("{}/api/{}", self.base_url, route)
    }

    /// Decodes a response body, mapping failures to the engine taxonomy.
    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
        context: &str,
    ) -> EngineResult<T> {
        if response.status().is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| EngineError::Backend(format!("{context}: invalid response body: {e}")));
        }
        Err(Self::failure(response, context).await)
    }

    /// Success bodies of void operations are ignored.
    async fn expect_success(response: reqwest::Response, context: &str) -> EngineResult<()> {
        if response.status().is_success() {
            return Ok(());
        }
        Err(Self::failure(response, context).await)
    }

    /// A non-success status surfaces the backend's `error` body field
    /// verbatim when present, else a generic category message; 404
    /// becomes `NotFound`.
    async fn failure(response: reqwest::Response, context: &str) -> EngineError {
        let status = response.status();
        let detail = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|body| body.get("error").and_then(Value::as_str).map(str::to_string));

        if status == StatusCode::NOT_FOUND {
            EngineError::NotFound(detail.unwrap_or_else(|| context.to_string()))
        } else {
            EngineError::Backend(detail.unwrap_or_else(|| {
                format!("{context} failed with status {status}")
            }))
        }
    }
}

#[async_trait]
impl DataStore for HttpDataStore {
    async fn create_schema(
        &self,
        schema_name: &str,
        schema_document: &str,
    ) -> EngineResult<Schema> {
        info!("creating schema '{schema_name}'");
        let response = self
            .client
            .post(self.url("createSchema"))
            .json(&json!({ "schemaName": schema_name, "schema": schema_document }))
            .send()
            .await?;
        Self::decode(response, "createSchema").await
    }

    async fn get_schema(&self, uuid: &str) -> EngineResult<Schema> {
        let response = self
            .client
            .post(self.url("getSchema"))
            .json(&json!({ "uuid": uuid }))
            .send()
            .await?;
        Self::decode(response, "getSchema").await
    }

    async fn get_all_schemas(&self) -> EngineResult<Vec<Schema>> {
        let response = self.client.get(self.url("getAllSchemas")).send().await?;
        Self::decode(response, "getAllSchemas").await
    }

    async fn update_schema(&self, uuid: &str, patch: SchemaPatch) -> EngineResult<Schema> {
        info!("updating schema {uuid}");
        let mut body = serde_json::to_value(&patch)?;
        body.as_object_mut()
            .ok_or_else(|| EngineError::Client("schema patch must serialize to an object".into()))?
            .insert("uuid".to_string(), Value::String(uuid.to_string()));
        let response = self
            .client
            .put(self.url("updateSchema"))
            .json(&body)
            .send()
            .await?;
        Self::decode(response, "updateSchema").await
    }

    async fn delete_schema(&self, uuid: &str) -> EngineResult<()> {
        info!("deleting schema {uuid}");
        let response = self
            .client
            .delete(self.url("deleteSchema"))
            .json(&json!({ "uuid": uuid }))
            .send()
            .await?;
        Self::expect_success(response, "deleteSchema").await
    }

    async fn create_table(&self, schema_id: &str) -> EngineResult<()> {
        info!("initializing table for schema {schema_id}");
        let response = self
            .client
            .post(self.url("createTable"))
            .json(&json!({ "schemaId": schema_id }))
            .send()
            .await?;
        Self::expect_success(response, "createTable").await
    }

    async fn create_data(
        &self,
        schema_id: &str,
        record: &Map<String, Value>,
    ) -> EngineResult<Record> {
        let response = self
            .client
            .post(self.url("createData"))
            .json(&json!({ "schemaId": schema_id, "data": record }))
            .send()
            .await?;
        Self::decode(response, "createData").await
    }

    async fn get_data(&self, schema_id: &str, uuid: &str) -> EngineResult<Record> {
        let response = self
            .client
            .post(self.url("getData"))
            .json(&json!({ "schemaId": schema_id, "uuid": uuid }))
            .send()
            .await?;
        Self::decode(response, "getData").await
    }

    async fn get_all_data(&self, schema_id: &str) -> EngineResult<Vec<Record>> {
        let response = self
            .client
            .post(self.url("getAllData"))
            .json(&json!({ "schemaId": schema_id }))
            .send()
            .await?;
        Self::decode(response, "getAllData").await
    }

    async fn update_data(
        &self,
        schema_id: &str,
        uuid: &str,
        record: &Map<String, Value>,
    ) -> EngineResult<Record> {
        let response = self
            .client
            .put(self.url("updateData"))
            .json(&json!({ "schemaId": schema_id, "uuid": uuid, "data": record }))
            .send()
            .await?;
        Self::decode(response, "updateData").await
    }

    async fn delete_data(&self, schema_id: &str, uuid: &str) -> EngineResult<()> {
        let response = self
            .client
            .delete(self.url("deleteData"))
            .json(&json!({ "schemaId": schema_id, "uuid": uuid }))
            .send()
            .await?;
        Self::expect_success(response, "deleteData").await
    }

    async fn get_child_schema_data(
        &self,
        parent_schema_id: &str,
        child_schema_id: &str,
    ) -> EngineResult<Vec<Record>> {
        let response = self
            .client
            .post(self.url("getChildSchemaData"))
            .json(&json!({ "schemaId": parent_schema_id, "childSchemaId": child_schema_id }))
            .send()
            .await?;
        Self::decode(response, "getChildSchemaData").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let store = HttpDataStore::new("http://localhost:3000/").unwrap();
        assert_eq!(store.url("createSchema"), "http://localhost:3000/api/createSchema");
    }
}
