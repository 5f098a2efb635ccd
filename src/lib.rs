//! Engine for schema-driven dynamic data management
//!
//! This crate lets an operator define arbitrary record schemas at runtime
//! as JSON-Schema-like documents and perform CRUD on records conforming
//! to them, against a remote store. It models schemas as first-class
//! mutable entities, derives form and table projections from them,
//! validates record payloads before persistence, and resolves
//! cross-schema references.

pub mod error;
pub mod form;
pub mod resolver;
pub mod samples;
pub mod schema;
pub mod schema_builder;
pub mod session;
pub mod store;
#[cfg(any(test, feature = "mock"))]
pub mod store_mock;
pub mod table;
pub mod validator;
pub mod workspace;

// Re-export main types for convenience
pub use error::{EngineError, EngineResult, FieldError};
pub use form::{
    project_form, ConditionalSurface, ConstraintSet, FormControl, FormProjection, WidgetKind,
};
pub use resolver::{ReferenceResolver, UNKNOWN_SCHEMA};
pub use schema::{
    FieldDefinition, FieldKind, FieldType, Record, Schema, SchemaDocument, SchemaPatch,
    SCHEMA_ID_KEY,
};
pub use schema_builder::SchemaBuilder;
pub use session::{DataSession, SessionState};
pub use store::{DataStore, HttpDataStore};
#[cfg(any(test, feature = "mock"))]
pub use store_mock::MockDataStore;
pub use table::{project_columns, render_cell, render_row, Column};
pub use validator::RecordValidator;
pub use workspace::SchemaWorkspace;
