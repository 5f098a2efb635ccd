use std::collections::HashSet;

use crate::schema::{FieldDefinition, FieldKind, Schema};

/// Sentinel name rendered for a `schema_ref` whose target no longer
/// exists. Deleting a referenced schema neither cascades nor blocks, so
/// dangling references must display gracefully.
pub const UNKNOWN_SCHEMA: &str = "Unknown schema";

/// Resolves cross-schema references against the full set of known
/// schemas.
pub struct ReferenceResolver<'a> {
    schemas: &'a [Schema],
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(schemas: &'a [Schema]) -> Self {
        Self { schemas }
    }

    /// Candidate targets for a `schema_ref` picker: every known schema
    /// except the one currently being edited.
    pub fn candidates(&self, excluding_uuid: Option<&str>) -> Vec<&'a Schema> {
        self.schemas
            .iter()
            .filter(|schema| Some(schema.uuid.as_str()) != excluding_uuid)
            .collect()
    }

    /// The referenced schema's display name, or [`UNKNOWN_SCHEMA`] when
    /// the uuid is stale.
    pub fn resolve_name(&self, uuid: &str) -> &'a str {
        self.schemas
            .iter()
            .find(|schema| schema.uuid == uuid)
            .map(|schema| schema.schema_name.as_str())
            .unwrap_or(UNKNOWN_SCHEMA)
    }

    /// Whether pointing `editing_uuid` at `target_uuid` would close a
    /// reference cycle.
    ///
    /// Walks `schema_ref` edges outward from the target. Unparsable
    /// documents and dangling references terminate their branch of the
    /// walk rather than failing it.
    pub fn creates_cycle(&self, editing_uuid: &str, target_uuid: &str) -> bool {
        let mut pending = vec![target_uuid.to_string()];
        let mut visited: HashSet<String> = HashSet::new();

        while let Some(current) = pending.pop() {
            if current == editing_uuid {
                return true;
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            let Some(schema) = self.schemas.iter().find(|s| s.uuid == current) else {
                continue;
            };
            let Ok(document) = schema.document() else {
                continue;
            };
            for field in document.properties.values() {
                collect_refs(field, &mut pending);
            }
        }
        false
    }
}

fn collect_refs(field: &FieldDefinition, out: &mut Vec<String>) {
    match &field.kind {
        FieldKind::Object(shape) => {
            if let Some(reference) = &shape.schema_ref {
                out.push(reference.clone());
            }
            for child in shape.properties.values() {
                collect_refs(child, out);
            }
        }
        FieldKind::Array(shape) => collect_refs(&shape.items, out),
        _ => {}
    }
}
