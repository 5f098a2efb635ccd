use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::schema::{Record, Schema, SchemaPatch};
use crate::store::DataStore;

/// In-memory [`DataStore`] implementation for tests.
///
/// Assigns v4 uuids the way the real backend does, enforces table
/// initialization before record writes, and keeps a call log so tests
/// can assert operation ordering (e.g. refetch strictly after a
/// mutation). A failure can be injected to exercise error paths.
#[derive(Default)]
pub struct MockDataStore {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    schemas: Vec<Schema>,
    records: HashMap<String, Vec<Record>>,
    fail_next: Option<String>,
    calls: Vec<String>,
}

impl MockDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next store call fail with a backend error carrying
    /// `message`.
    pub async fn inject_failure(&self, message: &str) {
        self.state.lock().await.fail_next = Some(message.to_string());
    }

    /// Operations invoked so far, in order.
    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }

    pub async fn schema_count(&self) -> usize {
        self.state.lock().await.schemas.len()
    }
}

impl MockState {
    fn enter(&mut self, op: &str) -> EngineResult<()> {
        self.calls.push(op.to_string());
        match self.fail_next.take() {
            Some(message) => Err(EngineError::Backend(message)),
            None => Ok(()),
        }
    }

    fn schema_mut(&mut self, uuid: &str) -> EngineResult<&mut Schema> {
        self.schemas
            .iter_mut()
            .find(|s| s.uuid == uuid)
            .ok_or_else(|| EngineError::NotFound(format!("schema '{uuid}'")))
    }

    fn schema(&self, uuid: &str) -> EngineResult<&Schema> {
        self.schemas
            .iter()
            .find(|s| s.uuid == uuid)
            .ok_or_else(|| EngineError::NotFound(format!("schema '{uuid}'")))
    }
}

#[async_trait]
impl DataStore for MockDataStore {
    async fn create_schema(
        &self,
        schema_name: &str,
        schema_document: &str,
    ) -> EngineResult<Schema> {
        let mut state = self.state.lock().await;
        state.enter("createSchema")?;
        let schema = Schema {
            uuid: Uuid::new_v4().to_string(),
            schema_name: schema_name.to_string(),
            schema: schema_document.to_string(),
            table_ref: None,
            is_table_initialized: false,
        };
        state.schemas.push(schema.clone());
        Ok(schema)
    }

    async fn get_schema(&self, uuid: &str) -> EngineResult<Schema> {
        let mut state = self.state.lock().await;
        state.enter("getSchema")?;
        state.schema(uuid).cloned()
    }

    async fn get_all_schemas(&self) -> EngineResult<Vec<Schema>> {
        let mut state = self.state.lock().await;
        state.enter("getAllSchemas")?;
        Ok(state.schemas.clone())
    }

    async fn update_schema(&self, uuid: &str, patch: SchemaPatch) -> EngineResult<Schema> {
        let mut state = self.state.lock().await;
        state.enter("updateSchema")?;
        let schema = state.schema_mut(uuid)?;
        if let Some(name) = patch.schema_name {
            schema.schema_name = name;
        }
        if let Some(document) = patch.schema {
            schema.schema = document;
        }
        if let Some(table_ref) = patch.table_ref {
            schema.table_ref = Some(table_ref);
        }
        if let Some(initialized) = patch.is_table_initialized {
            schema.is_table_initialized = initialized;
        }
        Ok(schema.clone())
    }

    async fn delete_schema(&self, uuid: &str) -> EngineResult<()> {
        let mut state = self.state.lock().await;
        state.enter("deleteSchema")?;
        state.schema(uuid)?;
        state.schemas.retain(|s| s.uuid != uuid);
        // No cascade: records of the deleted schema stay behind.
        Ok(())
    }

    async fn create_table(&self, schema_id: &str) -> EngineResult<()> {
        let mut state = self.state.lock().await;
        state.enter("createTable")?;
        let schema = state.schema_mut(schema_id)?;
        schema.is_table_initialized = true;
        if schema.table_ref.is_none() {
            schema.table_ref = Some(format!("tbl_{}", schema_id.replace('-', "")));
        }
        Ok(())
    }

    async fn create_data(
        &self,
        schema_id: &str,
        record: &Map<String, Value>,
    ) -> EngineResult<Record> {
        let mut state = self.state.lock().await;
        state.enter("createData")?;
        let schema = state.schema(schema_id)?;
        if !schema.is_table_initialized {
            return Err(EngineError::Backend(format!(
                "table not initialized for schema '{schema_id}'"
            )));
        }
        let stored = Record {
            uuid: Uuid::new_v4().to_string(),
            values: record.clone(),
        };
        state
            .records
            .entry(schema_id.to_string())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn get_data(&self, schema_id: &str, uuid: &str) -> EngineResult<Record> {
        let mut state = self.state.lock().await;
        state.enter("getData")?;
        state
            .records
            .get(schema_id)
            .and_then(|records| records.iter().find(|r| r.uuid == uuid))
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("record '{uuid}'")))
    }

    async fn get_all_data(&self, schema_id: &str) -> EngineResult<Vec<Record>> {
        let mut state = self.state.lock().await;
        state.enter("getAllData")?;
        state.schema(schema_id)?;
        Ok(state.records.get(schema_id).cloned().unwrap_or_default())
    }

    async fn update_data(
        &self,
        schema_id: &str,
        uuid: &str,
        record: &Map<String, Value>,
    ) -> EngineResult<Record> {
        let mut state = self.state.lock().await;
        state.enter("updateData")?;
        let stored = state
            .records
            .get_mut(schema_id)
            .and_then(|records| records.iter_mut().find(|r| r.uuid == uuid))
            .ok_or_else(|| EngineError::NotFound(format!("record '{uuid}'")))?;
        stored.values = record.clone();
        Ok(stored.clone())
    }

    async fn delete_data(&self, schema_id: &str, uuid: &str) -> EngineResult<()> {
        let mut state = self.state.lock().await;
        state.enter("deleteData")?;
        let records = state
            .records
            .get_mut(schema_id)
            .ok_or_else(|| EngineError::NotFound(format!("record '{uuid}'")))?;
        let before = records.len();
        records.retain(|r| r.uuid != uuid);
        if records.len() == before {
            return Err(EngineError::NotFound(format!("record '{uuid}'")));
        }
        Ok(())
    }

    async fn get_child_schema_data(
        &self,
        parent_schema_id: &str,
        child_schema_id: &str,
    ) -> EngineResult<Vec<Record>> {
        let mut state = self.state.lock().await;
        state.enter("getChildSchemaData")?;
        state.schema(parent_schema_id)?;
        // Dangling child references resolve to whatever records remain.
        Ok(state
            .records
            .get(child_schema_id)
            .cloned()
            .unwrap_or_default())
    }
}
