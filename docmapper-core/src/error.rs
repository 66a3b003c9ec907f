//! Error types and result types for mapper operations.
//!
//! Every fallible operation in this crate returns [`MapperResult<T>`]. Validation
//! and before-hook failures surface through the same enum as store failures, so a
//! caller can match on exactly why a `save()` or `find_one()` was refused.

use bson::{Bson, Document, error::Error as BsonError};
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

use crate::field::ValueKind;

/// Represents all possible errors raised by the mapper or its store client.
#[derive(Error, Debug)]
pub enum MapperError {
    /// Serialization/deserialization error when converting between BSON, JSON and Rust types.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during connection or client setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// An operation was attempted while no connection is installed.
    #[error("No connection has been set on the mapper")]
    NotConnected,
    /// A schema type with this name has already been declared.
    #[error("Schema {0} is already registered")]
    SchemaAlreadyRegistered(String),
    /// The same attribute name was declared twice on one schema.
    /// The first argument is the attribute name, the second is the schema name.
    #[error("Attribute {0} is declared more than once on schema {1}")]
    DuplicateAttribute(String, String),
    /// A required field is absent from the record and has no default.
    #[error("Field <{field}> of {schema} is required")]
    RequiredFieldMissing {
        /// The missing field.
        field: String,
        /// The schema declaring the field.
        schema: String,
    },
    /// A declared field is present but refused by its field spec.
    #[error("Field <{field}> of {schema} must be {expected:?}, but {actual_kind:?}<{actual}> found")]
    FieldTypeMismatch {
        /// The offending field.
        field: String,
        /// The schema declaring the field.
        schema: String,
        /// The kinds the field spec accepts.
        expected: Vec<ValueKind>,
        /// The kind of the value that was found.
        actual_kind: ValueKind,
        /// The value that was found.
        actual: Bson,
    },
    /// No document in the collection matched the query.
    #[error("No document in collection {collection} matches {query}")]
    DocumentNotFound {
        /// The collection that was searched.
        collection: String,
        /// The filter that was used.
        query: Document,
    },
    /// A document with the given identity already exists in the collection.
    /// The first argument is the identity, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DuplicateKey(String, String),
    /// The document or update has an invalid structure.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// A lifecycle hook refused the operation.
    #[error("Hook error: {0}")]
    Hook(String),
    /// An error occurred in the underlying store client.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl MapperError {
    /// Builds a [`MapperError::Hook`] from any displayable message.
    pub fn hook(message: impl Into<String>) -> Self {
        MapperError::Hook(message.into())
    }
}

/// A specialized `Result` type for mapper operations.
pub type MapperResult<T> = Result<T, MapperError>;

impl From<BsonError> for MapperError {
    fn from(err: BsonError) -> Self {
        MapperError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for MapperError {
    fn from(err: SerdeJsonError) -> Self {
        MapperError::Serialization(err.to_string())
    }
}
