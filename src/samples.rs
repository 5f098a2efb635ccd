//! Built-in schema templates for seeding new schemas.

use crate::error::EngineResult;
use crate::schema::SchemaDocument;

const BASIC_PERSON: &str = r#"{
    "type": "object",
    "properties": {
        "name": {
            "type": "string",
            "title": "Name",
            "description": "Full name of the person",
            "required": true
        },
        "age": {
            "type": "number",
            "title": "Age",
            "minimum": 0,
            "maximum": 150
        },
        "email": {
            "type": "string",
            "title": "Email",
            "format": "email",
            "required": true
        }
    }
}"#;

const NESTED_PERSON: &str = r#"{
    "type": "object",
    "properties": {
        "personalInfo": {
            "type": "object",
            "title": "Personal Information",
            "properties": {
                "firstName": {"type": "string", "title": "First Name", "required": true},
                "lastName": {"type": "string", "title": "Last Name", "required": true},
                "contact": {
                    "type": "object",
                    "title": "Contact Details",
                    "properties": {
                        "email": {"type": "string", "title": "Email", "format": "email", "required": true},
                        "phone": {"type": "string", "title": "Phone", "pattern": "^[0-9]{10}$"}
                    }
                }
            }
        },
        "addresses": {
            "type": "array",
            "title": "Addresses",
            "items": {
                "type": "object",
                "properties": {
                    "street": {"type": "string", "title": "Street"},
                    "city": {"type": "string", "title": "City"},
                    "country": {"type": "string", "title": "Country"}
                }
            }
        }
    }
}"#;

/// A flat person schema: name, age, email.
pub fn basic_person() -> EngineResult<SchemaDocument> {
    SchemaDocument::parse(BASIC_PERSON)
}

/// A person schema with a nested contact object and an address array,
/// exercising the recursive field kinds.
pub fn nested_person() -> EngineResult<SchemaDocument> {
    SchemaDocument::parse(NESTED_PERSON)
}

/// Every built-in template with its display name.
pub fn templates() -> Vec<(&'static str, EngineResult<SchemaDocument>)> {
    vec![("basic", basic_person()), ("nested", nested_person())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;

    #[test]
    fn templates_parse_cleanly() {
        for (name, template) in templates() {
            assert!(template.is_ok(), "template '{name}' failed to parse");
        }
    }

    #[test]
    fn basic_template_keeps_authored_field_order() {
        let document = basic_person().unwrap();
        let keys: Vec<_> = document.properties.keys().cloned().collect();
        assert_eq!(keys, vec!["name", "age", "email"]);
        assert_eq!(document.required_fields(), vec!["name", "email"]);
    }

    #[test]
    fn nested_template_exercises_every_composite_kind() {
        let document = nested_person().unwrap();
        assert_eq!(
            document.properties["personalInfo"].field_type(),
            FieldType::Object
        );
        assert_eq!(
            document.properties["addresses"].field_type(),
            FieldType::Array
        );
    }
}
