use log::{error, info};

use crate::error::{EngineError, EngineResult};
use crate::resolver::ReferenceResolver;
use crate::schema::{
    FieldDefinition, FieldKind, FieldType, Schema, SchemaDocument, SchemaPatch,
};
use crate::store::DataStore;

/// Interactive editor for a schema's working field set.
///
/// The builder mutates an in-memory copy only; nothing reaches the
/// backend until [`SchemaBuilder::save`]. Editing policies mirror a
/// validate-on-blur UI: rename collisions are silently rejected rather
/// than raised, and retyping a field discards nested data that no
/// longer applies.
///
/// # Examples
///
/// ```no_run
/// use schemakit::{FieldType, SchemaBuilder};
///
/// let mut builder = SchemaBuilder::new("Person");
/// let placeholder = builder.add_field();
/// builder.rename_field(&placeholder, "name");
/// let placeholder = builder.add_field();
/// builder.rename_field(&placeholder, "age");
/// builder.retype_field("age", FieldType::Number);
/// ```
pub struct SchemaBuilder {
    /// Uuid of the schema being edited; `None` while creating a new one
    uuid: Option<String>,
    schema_name: String,
    document: SchemaDocument,
    known_schemas: Vec<Schema>,
    placeholder_seq: usize,
}

impl SchemaBuilder {
    /// Starts a builder for a brand new schema with no fields.
    pub fn new(schema_name: &str) -> Self {
        Self {
            uuid: None,
            schema_name: schema_name.to_string(),
            document: SchemaDocument::new(),
            known_schemas: Vec::new(),
            placeholder_seq: 0,
        }
    }

    /// Starts a builder seeded from a template document.
    pub fn from_document(schema_name: &str, document: SchemaDocument) -> Self {
        Self {
            uuid: None,
            schema_name: schema_name.to_string(),
            document,
            known_schemas: Vec::new(),
            placeholder_seq: 0,
        }
    }

    /// Starts a builder editing an existing schema.
    ///
    /// # Errors
    /// Returns `MalformedSchema` when the stored document does not
    /// parse.
    pub fn edit(schema: &Schema) -> EngineResult<Self> {
        Ok(Self {
            uuid: Some(schema.uuid.clone()),
            schema_name: schema.schema_name.clone(),
            document: schema.document()?,
            known_schemas: Vec::new(),
            placeholder_seq: 0,
        })
    }

    /// Supplies the full known schema set, enabling reference
    /// candidates and cycle checks.
    pub fn with_known_schemas(mut self, schemas: Vec<Schema>) -> Self {
        self.known_schemas = schemas;
        self
    }

    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    pub fn set_schema_name(&mut self, name: &str) {
        self.schema_name = name.to_string();
    }

    pub fn document(&self) -> &SchemaDocument {
        &self.document
    }

    /// Inserts a new `string`-typed field under a generated placeholder
    /// name and returns that name. Successive calls never collide, even
    /// with fields the operator has since renamed.
    pub fn add_field(&mut self) -> String {
        let name = loop {
            self.placeholder_seq += 1;
            let candidate = format!("field_{}", self.placeholder_seq);
            if !self.document.properties.contains_key(&candidate) {
                break candidate;
            }
        };
        self.document
            .properties
            .insert(name.clone(), FieldDefinition::of_type(FieldType::String));
        name
    }

    /// Renames a field, keeping its position in document order.
    ///
    /// Returns false without touching the field set when `new_name` is
    /// empty, equal to `old_name`, already taken, or `old_name` does not
    /// exist. Last writer wins; collisions are silently rejected.
    pub fn rename_field(&mut self, old_name: &str, new_name: &str) -> bool {
        if new_name.is_empty()
            || new_name == old_name
            || self.document.properties.contains_key(new_name)
            || !self.document.properties.contains_key(old_name)
        {
            return false;
        }
        self.document.properties = std::mem::take(&mut self.document.properties)
            .into_iter()
            .map(|(name, field)| {
                if name == old_name {
                    (new_name.to_string(), field)
                } else {
                    (name, field)
                }
            })
            .collect();
        true
    }

    /// Replaces a field's type tag.
    ///
    /// Switching into `object` or `array` starts from that kind's empty
    /// shape; switching away discards nested properties, items, and
    /// constraints of the previous kind. Title, description, and the
    /// required flag survive. Returns false when the field is unknown.
    pub fn retype_field(&mut self, name: &str, new_type: FieldType) -> bool {
        let Some(field) = self.document.properties.get_mut(name) else {
            return false;
        };
        if field.field_type() != new_type {
            field.kind = FieldKind::default_of(new_type);
        }
        true
    }

    /// Replaces the item type of an array field, with the same
    /// destructive semantics as [`SchemaBuilder::retype_field`].
    /// Returns false when the field is unknown or not an array.
    pub fn retype_items(&mut self, name: &str, new_type: FieldType) -> bool {
        match self.document.properties.get_mut(name).map(|f| &mut f.kind) {
            Some(FieldKind::Array(shape)) => {
                if shape.items.field_type() != new_type {
                    shape.items.kind = FieldKind::default_of(new_type);
                }
                true
            }
            _ => false,
        }
    }

    /// Deletes a field unconditionally. Fields cannot reference other
    /// fields of the same schema, so there is no dangling-reference
    /// check to make.
    pub fn remove_field(&mut self, name: &str) -> bool {
        self.document.properties.shift_remove(name).is_some()
    }

    /// Attaches a `schema_ref` to an object field, or to the object
    /// items of an array field.
    ///
    /// # Errors
    /// - `NotFound` when the target uuid is not a known schema or the
    ///   field does not exist
    /// - `MalformedSchema` when the target is the schema being edited,
    ///   or the reference would close a cycle through other schemas
    /// - `Client` when the field's kind cannot carry a reference
    pub fn set_reference(&mut self, name: &str, target_uuid: &str) -> EngineResult<()> {
        if self.uuid.as_deref() == Some(target_uuid) {
            return Err(EngineError::MalformedSchema(
                "a schema cannot reference itself".to_string(),
            ));
        }
        if !self.known_schemas.iter().any(|s| s.uuid == target_uuid) {
            return Err(EngineError::NotFound(format!("schema '{target_uuid}'")));
        }
        if let Some(own_uuid) = &self.uuid {
            let resolver = ReferenceResolver::new(&self.known_schemas);
            if resolver.creates_cycle(own_uuid, target_uuid) {
                return Err(EngineError::MalformedSchema(format!(
                    "reference to schema '{target_uuid}' would create a cycle"
                )));
            }
        }

        let Some(field) = self.document.properties.get_mut(name) else {
            return Err(EngineError::NotFound(format!("field '{name}'")));
        };
        match &mut field.kind {
            FieldKind::Object(shape) => {
                shape.schema_ref = Some(target_uuid.to_string());
                Ok(())
            }
            FieldKind::Array(shape) => match &mut shape.items.kind {
                FieldKind::Object(inner) => {
                    inner.schema_ref = Some(target_uuid.to_string());
                    Ok(())
                }
                _ => Err(EngineError::Client(format!(
                    "items of field '{name}' are not objects"
                ))),
            },
            _ => Err(EngineError::Client(format!(
                "field '{name}' is not an object or array field"
            ))),
        }
    }

    /// Detaches the `schema_ref` of an object or array-of-object field.
    pub fn clear_reference(&mut self, name: &str) -> bool {
        match self.document.properties.get_mut(name).map(|f| &mut f.kind) {
            Some(FieldKind::Object(shape)) => {
                shape.schema_ref = None;
                true
            }
            Some(FieldKind::Array(shape)) => match &mut shape.items.kind {
                FieldKind::Object(inner) => {
                    inner.schema_ref = None;
                    true
                }
                _ => false,
            },
            _ => false,
        }
    }

    /// Candidate targets for reference pickers: every known schema
    /// except the one being edited.
    pub fn reference_candidates(&self) -> Vec<&Schema> {
        ReferenceResolver::new(&self.known_schemas).candidates(self.uuid.as_deref())
    }

    /// Serializes the working document and persists it, creating or
    /// updating depending on how the builder was started.
    ///
    /// On success returns the canonical persisted schema. On failure the
    /// backend message is surfaced and the working edit state is left
    /// intact, so the operator can retry.
    pub async fn save<S: DataStore + ?Sized>(&self, store: &S) -> EngineResult<Schema> {
        let serialized = self.document.serialize()?;
        let result = match &self.uuid {
            Some(uuid) => {
                store
                    .update_schema(
                        uuid,
                        SchemaPatch {
                            schema_name: Some(self.schema_name.clone()),
                            schema: Some(serialized),
                            ..SchemaPatch::default()
                        },
                    )
                    .await
            }
            None => store.create_schema(&self.schema_name, &serialized).await,
        };
        match &result {
            Ok(schema) => info!("saved schema '{}' ({})", schema.schema_name, schema.uuid),
            Err(e) => error!("failed to save schema '{}': {e}", self.schema_name),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(uuid: &str, name: &str, document: &str) -> Schema {
        Schema {
            uuid: uuid.into(),
            schema_name: name.into(),
            schema: document.into(),
            table_ref: None,
            is_table_initialized: false,
        }
    }

    #[test]
    fn successive_placeholders_do_not_collide() {
        let mut builder = SchemaBuilder::new("Person");
        let first = builder.add_field();
        let second = builder.add_field();
        assert_ne!(first, second);
        assert_eq!(builder.document().properties.len(), 2);
    }

    #[test]
    fn placeholders_skip_operator_chosen_names() {
        let mut builder = SchemaBuilder::new("Person");
        let first = builder.add_field();
        builder.rename_field(&first, "field_2");
        let second = builder.add_field();
        assert_ne!(second, "field_2");
        assert!(builder.document().properties.contains_key(&second));
    }

    #[test]
    fn rename_to_existing_name_is_a_silent_no_op() {
        let mut builder = SchemaBuilder::new("Person");
        let first = builder.add_field();
        let second = builder.add_field();
        builder.rename_field(&first, "name");

        assert!(!builder.rename_field(&second, "name"));
        let keys: Vec<_> = builder.document().properties.keys().cloned().collect();
        assert_eq!(keys, vec!["name".to_string(), second]);
    }

    #[test]
    fn rename_rejects_empty_and_identity() {
        let mut builder = SchemaBuilder::new("Person");
        let first = builder.add_field();
        assert!(!builder.rename_field(&first, ""));
        assert!(!builder.rename_field(&first, &first));
        assert!(builder.document().properties.contains_key(&first));
    }

    #[test]
    fn rename_preserves_document_order() {
        let mut builder = SchemaBuilder::new("Person");
        let a = builder.add_field();
        let b = builder.add_field();
        let c = builder.add_field();
        assert!(builder.rename_field(&b, "middle"));
        let keys: Vec<_> = builder.document().properties.keys().cloned().collect();
        assert_eq!(keys, vec![a, "middle".to_string(), c]);
    }

    #[test]
    fn retype_away_from_object_discards_nested_properties() {
        let mut builder = SchemaBuilder::new("Person");
        let name = builder.add_field();
        builder.retype_field(&name, FieldType::Object);
        if let FieldKind::Object(shape) = &mut builder
            .document
            .properties
            .get_mut(&name)
            .unwrap()
            .kind
        {
            shape
                .properties
                .insert("inner".into(), FieldDefinition::of_type(FieldType::String));
        }

        builder.retype_field(&name, FieldType::String);
        let serialized = builder.document().serialize().unwrap();
        assert!(!serialized.contains("inner"));
        let reparsed = SchemaDocument::parse(&serialized).unwrap();
        assert_eq!(reparsed.properties[&name].field_type(), FieldType::String);
    }

    #[test]
    fn retype_keeps_common_attributes() {
        let mut builder = SchemaBuilder::new("Person");
        let name = builder.add_field();
        {
            let field = builder.document.properties.get_mut(&name).unwrap();
            field.title = Some("Age".into());
            field.required = true;
        }
        builder.retype_field(&name, FieldType::Number);
        let field = &builder.document().properties[&name];
        assert_eq!(field.title.as_deref(), Some("Age"));
        assert!(field.required);
        assert_eq!(field.field_type(), FieldType::Number);
    }

    #[test]
    fn set_reference_rejects_self_and_unknown_targets() {
        let own = schema("self", "Self", r#"{"type":"object","properties":{}}"#);
        let mut builder = SchemaBuilder::edit(&own)
            .unwrap()
            .with_known_schemas(vec![own.clone()]);
        let field = builder.add_field();
        builder.retype_field(&field, FieldType::Object);

        assert!(matches!(
            builder.set_reference(&field, "self"),
            Err(EngineError::MalformedSchema(_))
        ));
        assert!(matches!(
            builder.set_reference(&field, "nowhere"),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn set_reference_rejects_cycles_through_other_schemas() {
        let own = schema("a", "A", r#"{"type":"object","properties":{}}"#);
        let other = schema(
            "b",
            "B",
            r#"{"type":"object","properties":{"back":{"type":"object","schemaRef":"a"}}}"#,
        );
        let mut builder = SchemaBuilder::edit(&own)
            .unwrap()
            .with_known_schemas(vec![own.clone(), other]);
        let field = builder.add_field();
        builder.retype_field(&field, FieldType::Object);

        assert!(matches!(
            builder.set_reference(&field, "b"),
            Err(EngineError::MalformedSchema(_))
        ));
    }

    #[test]
    fn set_reference_targets_array_items() {
        let other = schema("b", "B", r#"{"type":"object","properties":{}}"#);
        let mut builder = SchemaBuilder::new("A").with_known_schemas(vec![other]);
        let field = builder.add_field();
        builder.retype_field(&field, FieldType::Array);
        builder.retype_items(&field, FieldType::Object);

        builder.set_reference(&field, "b").unwrap();
        match &builder.document().properties[&field].kind {
            FieldKind::Array(shape) => match &shape.items.kind {
                FieldKind::Object(inner) => {
                    assert_eq!(inner.schema_ref.as_deref(), Some("b"))
                }
                other => panic!("expected object items, got {other:?}"),
            },
            other => panic!("expected array kind, got {other:?}"),
        }
    }

    #[test]
    fn candidates_exclude_the_edited_schema() {
        let own = schema("a", "A", r#"{"type":"object","properties":{}}"#);
        let other = schema("b", "B", r#"{"type":"object","properties":{}}"#);
        let builder = SchemaBuilder::edit(&own)
            .unwrap()
            .with_known_schemas(vec![own.clone(), other]);
        let candidates = builder.reference_candidates();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].uuid, "b");
    }
}
