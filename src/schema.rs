use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::{EngineError, EngineResult};

/// Reserved property key carrying the owning schema's uuid.
///
/// It is injected into outgoing record payloads and stripped from every
/// projected form and table; it is never an editable field.
pub const SCHEMA_ID_KEY: &str = "schema-id";

/// An operator-defined record shape plus its backend metadata.
///
/// A Schema is the unit of data organization in the engine. It carries:
/// - A stable unique identifier assigned by the backend
/// - A human label (`schema_name`, not required to be unique)
/// - The serialized JSON-Schema-like document describing its fields
/// - Provisioning state for the backing storage table
///
/// The document string is the source of truth; [`Schema::document`] parses
/// it into the structured [`SchemaDocument`] representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    /// Stable unique identifier, assigned by the backend on creation
    pub uuid: String,
    /// Human label shown to the operator
    pub schema_name: String,
    /// Serialized JSON-Schema-like document, see [`SchemaDocument`]
    pub schema: String,
    /// Identifier of the backing storage table once materialized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_ref: Option<String>,
    /// True once the backend has provisioned storage for this schema
    #[serde(default)]
    pub is_table_initialized: bool,
}

impl Schema {
    /// Parses this schema's document string into its structured form.
    ///
    /// # Errors
    /// Returns `MalformedSchema` when the stored string is not a valid
    /// schema document.
    pub fn document(&self) -> EngineResult<SchemaDocument> {
        SchemaDocument::parse(&self.schema)
    }
}

/// Partial update for [`Schema`] metadata, sent to `updateSchema`.
///
/// Absent fields are left untouched by the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_table_initialized: Option<bool>,
}

/// One stored data item, shaped by its schema at write time.
///
/// Conformance is checked when the record is written, never when it is
/// read, so records created before a schema edit may drift from the
/// current document. That is an accepted consequence of schema-on-write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Stable identifier, assigned by the backend on creation
    pub uuid: String,
    /// Property name to value mapping
    #[serde(flatten)]
    pub values: Map<String, Value>,
}

/// The five field type tags a document may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
            FieldType::Array => "array",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(FieldType::String),
            "number" => Ok(FieldType::Number),
            "boolean" => Ok(FieldType::Boolean),
            "object" => Ok(FieldType::Object),
            "array" => Ok(FieldType::Array),
            other => Err(EngineError::MalformedSchema(format!(
                "unknown field type '{other}'"
            ))),
        }
    }
}

/// Constraints carried by `string`-typed fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringConstraints {
    /// Semantic format hint: `date`, `date-time`, `email`, `uri`, `uuid`
    pub format: Option<String>,
    /// Regular expression the value must match
    pub pattern: Option<String>,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
}

/// Constraints carried by `number`-typed fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumberConstraints {
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

/// Shape of an `object`-typed field: nested properties, a reference to
/// another schema's shape, or both (the reference wins for rendering).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectShape {
    pub properties: IndexMap<String, FieldDefinition>,
    /// Uuid of the schema whose shape defines this field
    pub schema_ref: Option<String>,
}

/// Shape of an `array`-typed field.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayShape {
    pub items: Box<FieldDefinition>,
}

/// Kind-tagged payload of a field definition.
///
/// The tag drives everything downstream: which constraints apply, which
/// form widget is emitted, and which conditional editing surface is
/// visible. Switching the tag discards the payload of the previous kind.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    String(StringConstraints),
    Number(NumberConstraints),
    Boolean,
    Object(ObjectShape),
    Array(ArrayShape),
}

impl FieldKind {
    /// The default payload for a freshly selected type tag.
    pub fn default_of(field_type: FieldType) -> Self {
        match field_type {
            FieldType::String => FieldKind::String(StringConstraints::default()),
            FieldType::Number => FieldKind::Number(NumberConstraints::default()),
            FieldType::Boolean => FieldKind::Boolean,
            FieldType::Object => FieldKind::Object(ObjectShape::default()),
            FieldType::Array => FieldKind::Array(ArrayShape {
                items: Box::new(FieldDefinition::of_type(FieldType::String)),
            }),
        }
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            FieldKind::String(_) => FieldType::String,
            FieldKind::Number(_) => FieldType::Number,
            FieldKind::Boolean => FieldType::Boolean,
            FieldKind::Object(_) => FieldType::Object,
            FieldKind::Array(_) => FieldType::Array,
        }
    }
}

/// One property's type and constraints within a schema document.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    /// Display label; the raw property key is used when absent
    pub title: Option<String>,
    pub description: Option<String>,
    /// Field-local required flag; the document-level `required` array is
    /// derived from these on every serialize
    pub required: bool,
    pub kind: FieldKind,
}

impl FieldDefinition {
    /// A definition with the default payload for `field_type` and no
    /// title, description, or required flag.
    pub fn of_type(field_type: FieldType) -> Self {
        Self {
            title: None,
            description: None,
            required: false,
            kind: FieldKind::default_of(field_type),
        }
    }

    pub fn field_type(&self) -> FieldType {
        self.kind.field_type()
    }

    fn from_raw(raw: RawField) -> Self {
        let RawField {
            field_type,
            title,
            description,
            required,
            format,
            pattern,
            min_length,
            max_length,
            minimum,
            maximum,
            properties,
            schema_ref,
            items,
        } = raw;

        // The UI writes empty strings for "no format" / "no reference".
        let schema_ref = schema_ref.filter(|s| !s.is_empty());
        let kind = match field_type {
            FieldType::String => FieldKind::String(StringConstraints {
                format: format.filter(|s| !s.is_empty()),
                pattern,
                min_length,
                max_length,
            }),
            FieldType::Number => FieldKind::Number(NumberConstraints { minimum, maximum }),
            FieldType::Boolean => FieldKind::Boolean,
            FieldType::Object => FieldKind::Object(ObjectShape {
                properties: properties
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(name, field)| (name, Self::from_raw(field)))
                    .collect(),
                schema_ref,
            }),
            FieldType::Array => FieldKind::Array(ArrayShape {
                items: Box::new(
                    items
                        .map(|raw| Self::from_raw(*raw))
                        .unwrap_or_else(|| Self::of_type(FieldType::String)),
                ),
            }),
        };

        Self {
            title,
            description,
            required,
            kind,
        }
    }

    fn to_raw(&self) -> RawField {
        let mut raw = RawField {
            field_type: self.field_type(),
            title: self.title.clone(),
            description: self.description.clone(),
            required: self.required,
            format: None,
            pattern: None,
            min_length: None,
            max_length: None,
            minimum: None,
            maximum: None,
            properties: None,
            schema_ref: None,
            items: None,
        };
        match &self.kind {
            FieldKind::String(constraints) => {
                raw.format = constraints.format.clone();
                raw.pattern = constraints.pattern.clone();
                raw.min_length = constraints.min_length;
                raw.max_length = constraints.max_length;
            }
            FieldKind::Number(constraints) => {
                raw.minimum = constraints.minimum;
                raw.maximum = constraints.maximum;
            }
            FieldKind::Boolean => {}
            FieldKind::Object(shape) => {
                raw.schema_ref = shape.schema_ref.clone();
                if shape.schema_ref.is_none() || !shape.properties.is_empty() {
                    raw.properties = Some(
                        shape
                            .properties
                            .iter()
                            .map(|(name, field)| (name.clone(), field.to_raw()))
                            .collect(),
                    );
                }
            }
            FieldKind::Array(shape) => {
                raw.items = Some(Box::new(shape.items.to_raw()));
            }
        }
        raw
    }
}

/// The structured form of a schema's JSON-Schema-like document.
///
/// Properties keep their insertion order, so parse/serialize round trips
/// are stable and projections render fields in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDocument {
    pub properties: IndexMap<String, FieldDefinition>,
}

impl SchemaDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a serialized document.
    ///
    /// # Errors
    /// Returns `MalformedSchema` when the string is not valid JSON, the
    /// root is not `type: "object"`, or the `properties` mapping is
    /// missing.
    pub fn parse(raw: &str) -> EngineResult<Self> {
        let raw_document: RawDocument = serde_json::from_str(raw)
            .map_err(|e| EngineError::MalformedSchema(e.to_string()))?;
        if raw_document.document_type != "object" {
            return Err(EngineError::MalformedSchema(format!(
                "expected root type \"object\", got \"{}\"",
                raw_document.document_type
            )));
        }

        let mut properties: IndexMap<String, FieldDefinition> = raw_document
            .properties
            .into_iter()
            .map(|(name, field)| (name, FieldDefinition::from_raw(field)))
            .collect();

        // Merge the document-level required list back into field flags
        // so both encodings round-trip.
        for name in &raw_document.required {
            if let Some(field) = properties.get_mut(name) {
                field.required = true;
            }
        }

        Ok(Self { properties })
    }

    /// Serializes to the canonical JSON string: fields in insertion
    /// order, with the top-level `required` array recomputed from the
    /// field-local flags.
    pub fn serialize(&self) -> EngineResult<String> {
        let raw = RawDocument {
            document_type: "object".to_string(),
            properties: self
                .properties
                .iter()
                .map(|(name, field)| (name.clone(), field.to_raw()))
                .collect(),
            required: self
                .required_fields()
                .into_iter()
                .map(|name| name.to_string())
                .collect(),
        };
        Ok(serde_json::to_string(&raw)?)
    }

    /// Property names whose definition is flagged required, in document
    /// order.
    pub fn required_fields(&self) -> Vec<&str> {
        self.properties
            .iter()
            .filter(|(_, field)| field.required)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Visible properties: document order, reserved keys excluded.
    pub fn visible_properties(&self) -> impl Iterator<Item = (&str, &FieldDefinition)> {
        self.properties
            .iter()
            .filter(|(name, _)| name.as_str() != SCHEMA_ID_KEY)
            .map(|(name, field)| (name.as_str(), field))
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Flat wire representation of a field, mirroring the document syntax.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawField {
    #[serde(rename = "type")]
    field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pattern: Option<String>,
    #[serde(rename = "minLength", default, skip_serializing_if = "Option::is_none")]
    min_length: Option<u64>,
    #[serde(rename = "maxLength", default, skip_serializing_if = "Option::is_none")]
    max_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    properties: Option<IndexMap<String, RawField>>,
    #[serde(rename = "schemaRef", default, skip_serializing_if = "Option::is_none")]
    schema_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    items: Option<Box<RawField>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawDocument {
    #[serde(rename = "type")]
    document_type: String,
    properties: IndexMap<String, RawField>,
    #[serde(default)]
    required: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> &'static str {
        r#"{
            "type": "object",
            "properties": {
                "name": {"type": "string", "title": "Name", "required": true, "minLength": 1},
                "age": {"type": "number", "minimum": 0, "maximum": 150},
                "active": {"type": "boolean"},
                "contact": {
                    "type": "object",
                    "properties": {
                        "email": {"type": "string", "format": "email", "required": true}
                    }
                },
                "tags": {"type": "array", "items": {"type": "string"}}
            }
        }"#
    }

    #[test]
    fn parse_then_serialize_round_trips() {
        let document = SchemaDocument::parse(sample_document()).unwrap();
        let serialized = document.serialize().unwrap();
        let reparsed = SchemaDocument::parse(&serialized).unwrap();
        assert_eq!(document, reparsed);
        // Document order survives.
        let keys: Vec<_> = reparsed.properties.keys().cloned().collect();
        assert_eq!(keys, vec!["name", "age", "active", "contact", "tags"]);
    }

    #[test]
    fn required_list_is_derived_in_document_order() {
        let mut document = SchemaDocument::parse(sample_document()).unwrap();
        assert_eq!(document.required_fields(), vec!["name"]);

        document.properties.get_mut("active").unwrap().required = true;
        assert_eq!(document.required_fields(), vec!["name", "active"]);

        let serialized = document.serialize().unwrap();
        let value: Value = serde_json::from_str(&serialized).unwrap();
        assert_eq!(
            value["required"],
            serde_json::json!(["name", "active"]),
        );
    }

    #[test]
    fn top_level_required_array_merges_into_field_flags() {
        let raw = r#"{
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "age": {"type": "number"}
            },
            "required": ["name"]
        }"#;
        let document = SchemaDocument::parse(raw).unwrap();
        assert!(document.properties["name"].required);
        assert!(!document.properties["age"].required);
    }

    #[test]
    fn parse_rejects_invalid_json() {
        assert!(matches!(
            SchemaDocument::parse("not json"),
            Err(EngineError::MalformedSchema(_))
        ));
    }

    #[test]
    fn parse_rejects_missing_properties() {
        assert!(matches!(
            SchemaDocument::parse(r#"{"type": "object"}"#),
            Err(EngineError::MalformedSchema(_))
        ));
    }

    #[test]
    fn parse_rejects_non_object_root() {
        assert!(matches!(
            SchemaDocument::parse(r#"{"type": "array", "properties": {}}"#),
            Err(EngineError::MalformedSchema(_))
        ));
    }

    #[test]
    fn unknown_field_type_is_malformed() {
        let raw = r#"{"type": "object", "properties": {"x": {"type": "matrix"}}}"#;
        assert!(matches!(
            SchemaDocument::parse(raw),
            Err(EngineError::MalformedSchema(_))
        ));
    }

    #[test]
    fn empty_schema_ref_reads_as_none() {
        let raw = r#"{
            "type": "object",
            "properties": {
                "owner": {"type": "object", "schemaRef": ""}
            }
        }"#;
        let document = SchemaDocument::parse(raw).unwrap();
        match &document.properties["owner"].kind {
            FieldKind::Object(shape) => assert!(shape.schema_ref.is_none()),
            other => panic!("expected object kind, got {other:?}"),
        }
    }

    #[test]
    fn schema_wire_names_follow_the_backend() {
        let schema = Schema {
            uuid: "u-1".into(),
            schema_name: "People".into(),
            schema: r#"{"type":"object","properties":{}}"#.into(),
            table_ref: Some("tbl_people".into()),
            is_table_initialized: true,
        };
        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(value["schemaName"], "People");
        assert_eq!(value["tableRef"], "tbl_people");
        assert_eq!(value["isTableInitialized"], true);
    }
}
