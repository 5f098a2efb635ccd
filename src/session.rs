use log::{debug, error, info};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::form::{project_form, FormProjection};
use crate::schema::{Record, Schema, SchemaDocument};
use crate::store::DataStore;
use crate::table::{project_columns, Column};
use crate::validator::RecordValidator;

/// Lifecycle of a session's working set.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// No fetch has run for the focused schema yet
    Idle,
    /// A list fetch is in flight
    Loading,
    /// The working set reflects the last successful fetch
    Ready,
    /// The last fetch failed; retry by loading again
    Error(String),
}

/// Orchestrates record CRUD for one selected schema.
///
/// The session is optimistic-free: a mutation is sent, and only on the
/// backend's success acknowledgment is the full list re-fetched — no
/// local merge or patch, so there is never partial state to reconcile
/// with backend-assigned fields. On any failure the working set and
/// state are left exactly as they were.
///
/// Every request carries the uuid of the schema it was issued for;
/// responses whose tag no longer matches the current focus are
/// discarded rather than applied, so a stale list arriving after the
/// operator navigated elsewhere cannot clobber the new working set.
pub struct DataSession<S: DataStore> {
    store: Arc<S>,
    schema: Option<Schema>,
    document: Option<SchemaDocument>,
    records: Vec<Record>,
    state: SessionState,
}

impl<S: DataStore> DataSession<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            schema: None,
            document: None,
            records: Vec::new(),
            state: SessionState::Idle,
        }
    }

    /// Focuses the session on a schema, clearing the previous working
    /// set. Call [`DataSession::load_records`] next.
    ///
    /// # Errors
    /// Returns `MalformedSchema` (focus unchanged) when the schema's
    /// document does not parse.
    pub fn focus(&mut self, schema: Schema) -> EngineResult<()> {
        let document = schema.document()?;
        info!(
            "focusing session on schema '{}' ({})",
            schema.schema_name, schema.uuid
        );
        self.schema = Some(schema);
        self.document = Some(document);
        self.records.clear();
        self.state = SessionState::Idle;
        Ok(())
    }

    /// Leaves the current schema; in-flight responses for it will be
    /// discarded on arrival.
    pub fn blur(&mut self) {
        self.schema = None;
        self.document = None;
        self.records.clear();
        self.state = SessionState::Idle;
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn is_table_initialized(&self) -> bool {
        self.schema
            .as_ref()
            .map(|s| s.is_table_initialized)
            .unwrap_or(false)
    }

    /// Column projection of the focused schema's document.
    pub fn columns(&self) -> Vec<Column> {
        self.document
            .as_ref()
            .map(project_columns)
            .unwrap_or_default()
    }

    /// Form projection of the focused schema's document.
    pub fn form(&self) -> Option<FormProjection> {
        self.document.as_ref().map(project_form)
    }

    /// Fetches the record list, replacing the working set wholesale on
    /// success.
    pub async fn load_records(&mut self) -> EngineResult<()> {
        let tag = self.focused_uuid()?;
        self.state = SessionState::Loading;
        let result = self.store.get_all_data(&tag).await;
        self.apply_list_response(&tag, result)
    }

    /// Applies a list response tagged with the schema it was fetched
    /// for. Responses that no longer match the focused schema are
    /// discarded — the accepted answer to stale in-flight fetches after
    /// navigation.
    pub fn apply_list_response(
        &mut self,
        tag: &str,
        result: EngineResult<Vec<Record>>,
    ) -> EngineResult<()> {
        if self.schema.as_ref().map(|s| s.uuid.as_str()) != Some(tag) {
            debug!("discarding stale record list for schema {tag}");
            return Ok(());
        }
        match result {
            Ok(records) => {
                debug!("loaded {} records for schema {tag}", records.len());
                self.records = records;
                self.state = SessionState::Ready;
                Ok(())
            }
            Err(e) => {
                error!("failed to load records for schema {tag}: {e}");
                self.state = SessionState::Error(e.to_string());
                Err(e)
            }
        }
    }

    /// Validates and persists a new record, then re-fetches the list.
    ///
    /// The payload sent to the backend is the normalized record with the
    /// reserved `schema-id` property injected. Returns the created
    /// record as acknowledged by the backend (uuid assigned there).
    pub async fn create_record(&mut self, values: &Map<String, Value>) -> EngineResult<Record> {
        let (tag, payload) = self.prepare_write(values)?;
        let created = self.store.create_data(&tag, &payload).await?;
        info!("created record {} in schema {tag}", created.uuid);
        self.refetch_after_mutation(&tag).await;
        Ok(created)
    }

    /// Validates and persists changes to an existing record, then
    /// re-fetches the list.
    pub async fn update_record(
        &mut self,
        uuid: &str,
        values: &Map<String, Value>,
    ) -> EngineResult<Record> {
        let (tag, payload) = self.prepare_write(values)?;
        let updated = self.store.update_data(&tag, uuid, &payload).await?;
        info!("updated record {uuid} in schema {tag}");
        self.refetch_after_mutation(&tag).await;
        Ok(updated)
    }

    /// Deletes a record, then re-fetches the list.
    pub async fn delete_record(&mut self, uuid: &str) -> EngineResult<()> {
        let tag = self.ready_uuid()?;
        self.store.delete_data(&tag, uuid).await?;
        info!("deleted record {uuid} from schema {tag}");
        self.refetch_after_mutation(&tag).await;
        Ok(())
    }

    /// Provisions backing storage for the focused schema and refreshes
    /// its metadata.
    pub async fn initialize_table(&mut self) -> EngineResult<()> {
        let tag = self.focused_uuid()?;
        self.store.create_table(&tag).await?;
        let refreshed = self.store.get_schema(&tag).await?;
        if self.schema.as_ref().map(|s| s.uuid.as_str()) == Some(tag.as_str()) {
            self.schema = Some(refreshed);
        }
        Ok(())
    }

    /// Records of a child schema referenced from the focused one.
    pub async fn child_records(&self, child_schema_id: &str) -> EngineResult<Vec<Record>> {
        let tag = self.focused_uuid()?;
        self.store
            .get_child_schema_data(&tag, child_schema_id)
            .await
    }

    fn focused_uuid(&self) -> EngineResult<String> {
        self.schema
            .as_ref()
            .map(|s| s.uuid.clone())
            .ok_or_else(|| EngineError::Client("no schema selected".to_string()))
    }

    /// Mutations are only valid once a record list has been loaded.
    fn ready_uuid(&self) -> EngineResult<String> {
        let tag = self.focused_uuid()?;
        if self.state != SessionState::Ready {
            return Err(EngineError::Client(
                "record list is not loaded".to_string(),
            ));
        }
        Ok(tag)
    }

    fn prepare_write(&self, values: &Map<String, Value>) -> EngineResult<(String, Map<String, Value>)> {
        let tag = self.ready_uuid()?;
        let document = self
            .document
            .as_ref()
            .ok_or_else(|| EngineError::Client("no schema selected".to_string()))?;
        let validator = RecordValidator::new(document);
        validator
            .validate(values)
            .map_err(EngineError::Validation)?;
        let payload = validator.normalize(values, &tag);
        Ok((tag, payload))
    }

    /// List refresh runs strictly after the mutation acknowledgment. A
    /// refresh failure moves the session to `Error` (visible through
    /// [`DataSession::state`]) without undoing the acknowledged write.
    async fn refetch_after_mutation(&mut self, tag: &str) {
        let result = self.store.get_all_data(tag).await;
        let _ = self.apply_list_response(tag, result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_mock::MockDataStore;
    use serde_json::json;

    const PERSON: &str = r#"{
        "type": "object",
        "properties": {
            "name": {"type": "string", "required": true},
            "age": {"type": "number"}
        }
    }"#;

    async fn ready_session() -> (Arc<MockDataStore>, DataSession<MockDataStore>) {
        let store = Arc::new(MockDataStore::new());
        let schema = store.create_schema("Person", PERSON).await.unwrap();
        store.create_table(&schema.uuid).await.unwrap();
        let schema = store.get_schema(&schema.uuid).await.unwrap();

        let mut session = DataSession::new(store.clone());
        session.focus(schema).unwrap();
        session.load_records().await.unwrap();
        (store, session)
    }

    fn values(value: serde_json::Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn load_moves_idle_to_ready() {
        let (_store, session) = ready_session().await;
        assert_eq!(*session.state(), SessionState::Ready);
        assert!(session.records().is_empty());
    }

    #[tokio::test]
    async fn failed_load_moves_to_error_and_retry_recovers() {
        let store = Arc::new(MockDataStore::new());
        let schema = store.create_schema("Person", PERSON).await.unwrap();
        let mut session = DataSession::new(store.clone());
        session.focus(schema).unwrap();

        store.inject_failure("backend down").await;
        let err = session.load_records().await.unwrap_err();
        assert!(matches!(err, EngineError::Backend(_)));
        assert!(matches!(session.state(), SessionState::Error(message) if message.contains("backend down")));

        session.load_records().await.unwrap();
        assert_eq!(*session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn create_validates_injects_schema_id_and_refetches() {
        let (store, mut session) = ready_session().await;
        let schema_uuid = session.schema().unwrap().uuid.clone();

        let err = session
            .create_record(&values(json!({"age": 30})))
            .await
            .unwrap_err();
        match err {
            EngineError::Validation(errors) => {
                assert_eq!(errors[0].field, "name");
            }
            other => panic!("expected validation error, got {other}"),
        }

        let created = session
            .create_record(&values(json!({"name": "Ada", "age": 30})))
            .await
            .unwrap();
        assert_eq!(
            created.values.get("schema-id"),
            Some(&json!(schema_uuid))
        );
        assert_eq!(session.records().len(), 1);

        // The mutation is acknowledged before the list is re-fetched.
        let calls = store.calls().await;
        let create_at = calls.iter().rposition(|c| c == "createData").unwrap();
        let refetch_at = calls.iter().rposition(|c| c == "getAllData").unwrap();
        assert!(create_at < refetch_at);
    }

    #[tokio::test]
    async fn failed_mutation_leaves_working_set_unchanged() {
        let (store, mut session) = ready_session().await;
        session
            .create_record(&values(json!({"name": "Ada"})))
            .await
            .unwrap();
        let before = session.records().to_vec();

        store.inject_failure("disk full").await;
        let err = session
            .create_record(&values(json!({"name": "Grace"})))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Backend(message) if message == "disk full"));
        assert_eq!(session.records(), &before[..]);
        assert_eq!(*session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn update_and_delete_round_trip() {
        let (_store, mut session) = ready_session().await;
        let created = session
            .create_record(&values(json!({"name": "Ada", "age": 30})))
            .await
            .unwrap();

        session
            .update_record(&created.uuid, &values(json!({"name": "Ada Lovelace", "age": 36})))
            .await
            .unwrap();
        assert_eq!(
            session.records()[0].values.get("name"),
            Some(&json!("Ada Lovelace"))
        );

        session.delete_record(&created.uuid).await.unwrap();
        assert!(session.records().is_empty());
    }

    #[tokio::test]
    async fn stale_list_response_is_discarded() {
        let store = Arc::new(MockDataStore::new());
        let first = store.create_schema("First", PERSON).await.unwrap();
        let second = store.create_schema("Second", PERSON).await.unwrap();

        let mut session = DataSession::new(store.clone());
        session.focus(second).unwrap();
        session.load_records().await.unwrap();

        // A response for the previously focused schema arrives late.
        let stale = vec![Record {
            uuid: "ghost".into(),
            values: Map::new(),
        }];
        session.apply_list_response(&first.uuid, Ok(stale)).unwrap();
        assert!(session.records().is_empty());
        assert_eq!(*session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn mutations_require_a_loaded_list() {
        let store = Arc::new(MockDataStore::new());
        let schema = store.create_schema("Person", PERSON).await.unwrap();
        let mut session = DataSession::new(store);
        session.focus(schema).unwrap();

        let err = session
            .create_record(&values(json!({"name": "Ada"})))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Client(_)));
    }

    #[tokio::test]
    async fn initialize_table_refreshes_the_flag() {
        let store = Arc::new(MockDataStore::new());
        let schema = store.create_schema("Person", PERSON).await.unwrap();
        let mut session = DataSession::new(store);
        session.focus(schema).unwrap();
        assert!(!session.is_table_initialized());

        session.initialize_table().await.unwrap();
        assert!(session.is_table_initialized());
    }

    #[tokio::test]
    async fn focus_rejects_malformed_documents() {
        let store = Arc::new(MockDataStore::new());
        let schema = store.create_schema("Broken", "not json").await.unwrap();
        let mut session = DataSession::new(store);
        assert!(matches!(
            session.focus(schema),
            Err(EngineError::MalformedSchema(_))
        ));
        assert!(session.schema().is_none());
    }
}
