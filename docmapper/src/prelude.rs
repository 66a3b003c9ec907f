//! Convenient re-exports of commonly used types from docmapper.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use docmapper::prelude::*;
//! ```
//!
//! This provides access to:
//! - Field specs and their builder trait
//! - Schema declaration and the mapper registry
//! - Records and schema types
//! - Hooks and store client traits
//! - Error types

pub use docmapper_core::{
    client::{DocumentCursor, FindOptions, StoreClient, StoreClientBuilder, UpdateOptions, UpdateResult},
    connection::{Connection, ConnectionBuilder},
    entity::{DocumentEntity, ID_KEY},
    error::{MapperError, MapperResult},
    field::{
        BoolField, ComplexField, DateTimeField, EnumField, FieldBuilder, FieldSpec, FloatField, IndexKind,
        IntegerField, NumericField, SequenceField, StringField, ValueKind,
    },
    hook::{Action, Hook, HookContext, HookRegistration, OperationArgs, Outcome, Phase},
    mapper::Mapper,
    model::Model,
    schema::{DocumentSchema, SchemaBuilder},
};
