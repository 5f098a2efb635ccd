use chrono::{DateTime, NaiveDate};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Number, Value};

use crate::error::FieldError;
use crate::schema::{
    FieldDefinition, FieldKind, NumberConstraints, SchemaDocument, StringConstraints,
    SCHEMA_ID_KEY,
};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex"));
static URI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.\-]*://\S+$").expect("uri regex"));

/// Checks candidate records against a schema document before
/// persistence.
///
/// The validator is permissive where the schema is silent: properties
/// the record sets but the schema does not declare are tolerated, and
/// primitive values are matched by loose coercion (a numeric string in a
/// `number` field passes). It is strict about the derived required list
/// and about declared constraints. All field errors are aggregated so
/// the operator sees the complete defect list in one round trip.
pub struct RecordValidator<'a> {
    document: &'a SchemaDocument,
}

impl<'a> RecordValidator<'a> {
    pub fn new(document: &'a SchemaDocument) -> Self {
        Self { document }
    }

    /// Validates `record`, returning every field-level defect.
    pub fn validate(&self, record: &Map<String, Value>) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        validate_properties(&self.document.properties, record, "", &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Applies the loose coercions (`"42"` → `42` for number fields,
    /// `"true"` → `true` for booleans) and injects the reserved
    /// `schema-id` property, producing the outgoing payload.
    pub fn normalize(&self, record: &Map<String, Value>, schema_uuid: &str) -> Map<String, Value> {
        let mut payload = normalize_object(&self.document.properties, record);
        payload.insert(
            SCHEMA_ID_KEY.to_string(),
            Value::String(schema_uuid.to_string()),
        );
        payload
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn validate_properties(
    properties: &IndexMap<String, FieldDefinition>,
    object: &Map<String, Value>,
    prefix: &str,
    errors: &mut Vec<FieldError>,
) {
    for (name, field) in properties {
        if name == SCHEMA_ID_KEY {
            continue;
        }
        let path = join_path(prefix, name);
        match object.get(name) {
            None | Some(Value::Null) => {
                if field.required {
                    errors.push(FieldError::new(path, "required field is missing"));
                }
            }
            Some(value) => {
                if field.required && is_empty(value) {
                    errors.push(FieldError::new(path, "required field is empty"));
                    continue;
                }
                validate_value(&path, field, value, errors);
            }
        }
    }
}

fn validate_value(path: &str, field: &FieldDefinition, value: &Value, errors: &mut Vec<FieldError>) {
    match &field.kind {
        FieldKind::String(constraints) => validate_string(path, constraints, value, errors),
        FieldKind::Number(constraints) => validate_number(path, constraints, value, errors),
        FieldKind::Boolean => {
            if coerce_boolean(value).is_none() {
                errors.push(FieldError::new(path, "expected a boolean"));
            }
        }
        FieldKind::Object(shape) => match value {
            Value::Object(nested) => {
                // A schema_ref shape is defined elsewhere; only locally
                // declared properties can be checked here.
                if !shape.properties.is_empty() {
                    validate_properties(&shape.properties, nested, path, errors);
                }
            }
            _ => errors.push(FieldError::new(path, "expected an object")),
        },
        FieldKind::Array(shape) => match value {
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    let item_path = format!("{path}[{index}]");
                    validate_value(&item_path, &shape.items, item, errors);
                }
            }
            _ => errors.push(FieldError::new(path, "expected an array")),
        },
    }
}

fn validate_string(
    path: &str,
    constraints: &StringConstraints,
    value: &Value,
    errors: &mut Vec<FieldError>,
) {
    let Some(text) = coerce_string(value) else {
        errors.push(FieldError::new(path, "expected a string"));
        return;
    };

    if let Some(min) = constraints.min_length {
        if (text.chars().count() as u64) < min {
            errors.push(FieldError::new(
                path,
                format!("must be at least {min} characters"),
            ));
        }
    }
    if let Some(max) = constraints.max_length {
        if (text.chars().count() as u64) > max {
            errors.push(FieldError::new(
                path,
                format!("must be at most {max} characters"),
            ));
        }
    }
    if let Some(pattern) = &constraints.pattern {
        match Regex::new(pattern) {
            Ok(re) => {
                if !re.is_match(&text) {
                    errors.push(FieldError::new(
                        path,
                        format!("does not match pattern '{pattern}'"),
                    ));
                }
            }
            Err(_) => errors.push(FieldError::new(
                path,
                "schema pattern is not a valid regular expression",
            )),
        }
    }
    if let Some(format) = &constraints.format {
        validate_format(path, format, &text, errors);
    }
}

fn validate_format(path: &str, format: &str, text: &str, errors: &mut Vec<FieldError>) {
    let ok = match format {
        "date" => NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok(),
        "date-time" => DateTime::parse_from_rfc3339(text).is_ok(),
        "email" => EMAIL_RE.is_match(text),
        "uri" => URI_RE.is_match(text),
        "uuid" => uuid::Uuid::parse_str(text).is_ok(),
        // Unknown formats are tolerated, like unknown properties.
        _ => true,
    };
    if !ok {
        errors.push(FieldError::new(path, format!("is not a valid {format}")));
    }
}

fn validate_number(
    path: &str,
    constraints: &NumberConstraints,
    value: &Value,
    errors: &mut Vec<FieldError>,
) {
    let Some(number) = coerce_number(value) else {
        errors.push(FieldError::new(path, "expected a number"));
        return;
    };
    if let Some(min) = constraints.minimum {
        if number < min {
            errors.push(FieldError::new(path, format!("must be at least {min}")));
        }
    }
    if let Some(max) = constraints.maximum {
        if number > max {
            errors.push(FieldError::new(path, format!("must be at most {max}")));
        }
    }
}

fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn coerce_boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn normalize_object(
    properties: &IndexMap<String, FieldDefinition>,
    object: &Map<String, Value>,
) -> Map<String, Value> {
    let mut out = object.clone();
    for (name, field) in properties {
        if let Some(value) = object.get(name) {
            out.insert(name.clone(), normalize_value(field, value));
        }
    }
    out
}

fn normalize_value(field: &FieldDefinition, value: &Value) -> Value {
    match (&field.kind, value) {
        (FieldKind::Number(_), Value::String(s)) => {
            let trimmed = s.trim();
            if let Ok(integer) = trimmed.parse::<i64>() {
                Value::Number(Number::from(integer))
            } else if let Some(number) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
                Value::Number(number)
            } else {
                value.clone()
            }
        }
        (FieldKind::Boolean, Value::String(_)) => match coerce_boolean(value) {
            Some(flag) => Value::Bool(flag),
            None => value.clone(),
        },
        (FieldKind::String(_), Value::Number(n)) => Value::String(n.to_string()),
        (FieldKind::String(_), Value::Bool(b)) => Value::String(b.to_string()),
        (FieldKind::Object(shape), Value::Object(nested)) => {
            Value::Object(normalize_object(&shape.properties, nested))
        }
        (FieldKind::Array(shape), Value::Array(items)) => Value::Array(
            items
                .iter()
                .map(|item| normalize_value(&shape.items, item))
                .collect(),
        ),
        _ => value.clone(),
    }
}
