use log::info;
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::resolver::ReferenceResolver;
use crate::schema::Schema;
use crate::schema_builder::SchemaBuilder;
use crate::session::{DataSession, SessionState};
use crate::store::DataStore;

/// Holds the operator's schema list and hands out editors and record
/// sessions.
///
/// The list is the backend's: every mutation re-fetches it wholesale
/// after the success acknowledgment, never merging locally.
pub struct SchemaWorkspace<S: DataStore> {
    store: Arc<S>,
    schemas: Vec<Schema>,
    state: SessionState,
}

impl<S: DataStore> SchemaWorkspace<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            schemas: Vec::new(),
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn schemas(&self) -> &[Schema] {
        &self.schemas
    }

    pub fn find(&self, uuid: &str) -> Option<&Schema> {
        self.schemas.iter().find(|s| s.uuid == uuid)
    }

    /// Resolver over the current schema list, for reference pickers and
    /// dangling-reference display.
    pub fn resolver(&self) -> ReferenceResolver<'_> {
        ReferenceResolver::new(&self.schemas)
    }

    /// Re-fetches the schema list, replacing it wholesale.
    pub async fn refresh(&mut self) -> EngineResult<()> {
        self.state = SessionState::Loading;
        match self.store.get_all_schemas().await {
            Ok(schemas) => {
                info!("loaded {} schemas", schemas.len());
                self.schemas = schemas;
                self.state = SessionState::Ready;
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Error(e.to_string());
                Err(e)
            }
        }
    }

    /// A builder for a brand new schema, seeded with the current list
    /// for reference candidates.
    pub fn builder_for_new(&self, schema_name: &str) -> SchemaBuilder {
        SchemaBuilder::new(schema_name).with_known_schemas(self.schemas.clone())
    }

    /// A builder editing an existing schema from the current list.
    pub fn builder_for(&self, uuid: &str) -> EngineResult<SchemaBuilder> {
        let schema = self
            .find(uuid)
            .ok_or_else(|| EngineError::NotFound(format!("schema '{uuid}'")))?;
        Ok(SchemaBuilder::edit(schema)?.with_known_schemas(self.schemas.clone()))
    }

    /// Deletes a schema. Its records are the backend's responsibility
    /// and are not cascaded; references from other schemas are left
    /// dangling and resolve to the unknown-schema sentinel.
    pub async fn delete_schema(&mut self, uuid: &str) -> EngineResult<()> {
        self.store.delete_schema(uuid).await?;
        self.refresh().await
    }

    /// Creates a copy of an existing schema under a "(Copy)" name,
    /// returning the persisted duplicate.
    pub async fn duplicate_schema(&mut self, uuid: &str) -> EngineResult<Schema> {
        let source = self
            .find(uuid)
            .ok_or_else(|| EngineError::NotFound(format!("schema '{uuid}'")))?;
        let name = format!("{} (Copy)", source.schema_name);
        let document = source.schema.clone();
        let duplicate = self.store.create_schema(&name, &document).await?;
        self.refresh().await?;
        Ok(duplicate)
    }

    /// Provisions backing storage for a schema.
    pub async fn initialize_table(&mut self, uuid: &str) -> EngineResult<()> {
        self.store.create_table(uuid).await?;
        self.refresh().await
    }

    /// A record session sharing this workspace's store.
    pub fn session(&self) -> DataSession<S> {
        DataSession::new(self.store.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::UNKNOWN_SCHEMA;
    use crate::store_mock::MockDataStore;

    const EMPTY: &str = r#"{"type":"object","properties":{}}"#;

    #[tokio::test]
    async fn refresh_replaces_the_list_wholesale() {
        let store = Arc::new(MockDataStore::new());
        store.create_schema("One", EMPTY).await.unwrap();
        store.create_schema("Two", EMPTY).await.unwrap();

        let mut workspace = SchemaWorkspace::new(store);
        workspace.refresh().await.unwrap();
        assert_eq!(workspace.schemas().len(), 2);
        assert_eq!(*workspace.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn duplicate_appends_copy_suffix() {
        let store = Arc::new(MockDataStore::new());
        let original = store.create_schema("People", EMPTY).await.unwrap();

        let mut workspace = SchemaWorkspace::new(store);
        workspace.refresh().await.unwrap();
        let copy = workspace.duplicate_schema(&original.uuid).await.unwrap();
        assert_eq!(copy.schema_name, "People (Copy)");
        assert_eq!(copy.schema, original.schema);
        assert_eq!(workspace.schemas().len(), 2);
    }

    #[tokio::test]
    async fn deleting_a_referenced_schema_leaves_a_dangling_ref() {
        let store = Arc::new(MockDataStore::new());
        let target = store.create_schema("Target", EMPTY).await.unwrap();
        let referencing = format!(
            r#"{{"type":"object","properties":{{"link":{{"type":"object","schemaRef":"{}"}}}}}}"#,
            target.uuid
        );
        store.create_schema("Source", &referencing).await.unwrap();

        let mut workspace = SchemaWorkspace::new(store);
        workspace.refresh().await.unwrap();
        workspace.delete_schema(&target.uuid).await.unwrap();

        // The referencing document is untouched and now dangles.
        let source = workspace.schemas().iter().find(|s| s.schema_name == "Source").unwrap();
        assert!(source.schema.contains(&target.uuid));
        assert_eq!(workspace.resolver().resolve_name(&target.uuid), UNKNOWN_SCHEMA);
    }

    #[tokio::test]
    async fn initialize_table_flips_the_flag_after_refresh() {
        let store = Arc::new(MockDataStore::new());
        let schema = store.create_schema("People", EMPTY).await.unwrap();

        let mut workspace = SchemaWorkspace::new(store);
        workspace.refresh().await.unwrap();
        workspace.initialize_table(&schema.uuid).await.unwrap();
        assert!(workspace.find(&schema.uuid).unwrap().is_table_initialized);
    }
}
