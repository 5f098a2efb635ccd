use serde::Serialize;

use crate::schema::{FieldDefinition, FieldKind, SchemaDocument, SCHEMA_ID_KEY};

/// Widget to render for a field's input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WidgetKind {
    Text,
    Number,
    Checkbox,
    Date,
    NestedGroup,
    RepeatingGroup,
    ReferencePicker,
}

/// Declared constraints carried alongside a control for the renderer to
/// enforce as it sees fit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConstraintSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
}

/// The conditional editing surface of a control.
///
/// Exactly one surface exists per control and it is a pure function of
/// the field's current type tag: `format` for strings, `properties` for
/// objects, `items` for arrays, nothing for the remaining primitives.
/// Re-projecting after a type change swaps the surface live.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "surface", rename_all = "lowercase")]
pub enum ConditionalSurface {
    /// Visible only while the field's type is `string`
    Format {
        #[serde(skip_serializing_if = "Option::is_none")]
        format: Option<String>,
    },
    /// Visible only while the field's type is `object`
    Properties {
        children: Vec<FormControl>,
        #[serde(skip_serializing_if = "Option::is_none")]
        schema_ref: Option<String>,
    },
    /// Visible only while the field's type is `array`
    Items { item: Box<FormControl> },
    /// Primitive types without a conditional surface
    None,
}

/// One renderable input control.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormControl {
    pub name: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
    pub widget: WidgetKind,
    pub constraints: ConstraintSet,
    pub surface: ConditionalSurface,
}

/// A full form description derived from a schema document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormProjection {
    pub controls: Vec<FormControl>,
}

/// Compiles a document into its form description, in document order.
/// The reserved `schema-id` property is excluded at every level.
pub fn project_form(document: &SchemaDocument) -> FormProjection {
    FormProjection {
        controls: document
            .visible_properties()
            .map(|(name, field)| project_control(name, field))
            .collect(),
    }
}

/// Stateless projection of a single field definition.
pub fn project_control(name: &str, field: &FieldDefinition) -> FormControl {
    let label = field
        .title
        .clone()
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| name.to_string());

    let (widget, constraints, surface) = match &field.kind {
        FieldKind::String(c) => {
            let widget = match c.format.as_deref() {
                Some("date") | Some("date-time") => WidgetKind::Date,
                _ => WidgetKind::Text,
            };
            (
                widget,
                ConstraintSet {
                    format: c.format.clone(),
                    pattern: c.pattern.clone(),
                    min_length: c.min_length,
                    max_length: c.max_length,
                    ..ConstraintSet::default()
                },
                ConditionalSurface::Format {
                    format: c.format.clone(),
                },
            )
        }
        FieldKind::Number(c) => (
            WidgetKind::Number,
            ConstraintSet {
                minimum: c.minimum,
                maximum: c.maximum,
                ..ConstraintSet::default()
            },
            ConditionalSurface::None,
        ),
        FieldKind::Boolean => (
            WidgetKind::Checkbox,
            ConstraintSet::default(),
            ConditionalSurface::None,
        ),
        FieldKind::Object(shape) => {
            let widget = if shape.schema_ref.is_some() {
                WidgetKind::ReferencePicker
            } else {
                WidgetKind::NestedGroup
            };
            let children = shape
                .properties
                .iter()
                .filter(|(child, _)| child.as_str() != SCHEMA_ID_KEY)
                .map(|(child, definition)| project_control(child, definition))
                .collect();
            (
                widget,
                ConstraintSet::default(),
                ConditionalSurface::Properties {
                    children,
                    schema_ref: shape.schema_ref.clone(),
                },
            )
        }
        FieldKind::Array(shape) => (
            WidgetKind::RepeatingGroup,
            ConstraintSet::default(),
            ConditionalSurface::Items {
                item: Box::new(project_control("item", &shape.items)),
            },
        ),
    };

    FormControl {
        name: name.to_string(),
        label,
        description: field.description.clone(),
        required: field.required,
        widget,
        constraints,
        surface,
    }
}
