use serde::Serialize;
use serde_json::Value;

use crate::schema::{FieldType, Record, SchemaDocument};

/// One display column derived from a schema document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    /// Raw property key, used to pick the value out of a record
    pub key: String,
    /// `title` when present, else the raw key
    pub label: String,
    /// Render hint for the cell
    pub type_tag: FieldType,
}

/// Compiles a document into its column list: one column per top-level
/// property excluding `schema-id`, in document order. Recomputed on
/// every schema change; layout is never persisted.
pub fn project_columns(document: &SchemaDocument) -> Vec<Column> {
    document
        .visible_properties()
        .map(|(name, field)| Column {
            key: name.to_string(),
            label: field
                .title
                .clone()
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| name.to_string()),
            type_tag: field.field_type(),
        })
        .collect()
}

/// Cell text for a record value: primitives render bare, objects and
/// arrays are stringified as JSON, absent values render empty.
pub fn render_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// A record's cells in column order.
pub fn render_row(columns: &[Column], record: &Record) -> Vec<String> {
    columns
        .iter()
        .map(|column| render_cell(record.values.get(&column.key)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(raw: &str) -> SchemaDocument {
        SchemaDocument::parse(raw).unwrap()
    }

    #[test]
    fn columns_follow_document_order_and_titles() {
        let doc = document(
            r#"{
                "type": "object",
                "properties": {
                    "name": {"type": "string", "title": "Full Name"},
                    "age": {"type": "number"}
                }
            }"#,
        );
        let columns = project_columns(&doc);
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].label, "Full Name");
        assert_eq!(columns[1].label, "age");
        assert_eq!(columns[1].type_tag, FieldType::Number);
    }

    #[test]
    fn schema_id_never_becomes_a_column() {
        let doc = document(
            r#"{
                "type": "object",
                "properties": {
                    "schema-id": {"type": "string"},
                    "name": {"type": "string"}
                }
            }"#,
        );
        let columns = project_columns(&doc);
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].key, "name");
    }

    #[test]
    fn cells_stringify_non_primitives() {
        let doc = document(
            r#"{
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "contact": {"type": "object", "properties": {}},
                    "age": {"type": "number"}
                }
            }"#,
        );
        let columns = project_columns(&doc);
        let record = Record {
            uuid: "r-1".into(),
            values: json!({"name": "Ada", "contact": {"city": "London"}})
                .as_object()
                .unwrap()
                .clone(),
        };
        let cells = render_row(&columns, &record);
        assert_eq!(cells[0], "Ada");
        assert_eq!(cells[1], r#"{"city":"London"}"#);
        // Missing value renders empty, not "null".
        assert_eq!(cells[2], "");
    }
}
