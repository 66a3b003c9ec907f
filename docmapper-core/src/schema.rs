//! Schema declaration and the immutable descriptor built from it.
//!
//! A schema type is declared once through a [`SchemaBuilder`]. Declared
//! attributes are partitioned when the builder is consumed: field specs end up
//! in the [`SchemaDescriptor`], plain values stay on the schema type as
//! class-level attributes. Records only ever address fields through their
//! document, never through the spec objects.
//!
//! # Example
//!
//! ```ignore
//! use docmapper::{field::*, schema::SchemaBuilder};
//!
//! let schema = SchemaBuilder::new("HotelBooking")
//!     .field("guest", StringField::new().required().index(IndexKind::Ascending))
//!     .field("nights", IntegerField::new().required().default_value(1))
//!     .attribute("max_nights", 30)
//!     .build()?;
//!
//! assert_eq!(schema.collection, "hotel_bookings");
//! ```

use bson::{Bson, Document};
use std::{collections::BTreeSet, sync::Arc};

use crate::{
    error::{MapperError, MapperResult},
    field::{FieldSpec, IndexKind, ValueKind},
    naming::collection_name,
};

/// A Rust type that declares a schema.
///
/// Registered on first use through [`Mapper::model_of`](crate::mapper::Mapper::model_of).
pub trait DocumentSchema: 'static {
    /// The schema type name, used for naming the collection.
    fn schema_name() -> &'static str;

    /// Declares the schema's fields and attributes.
    fn declare(schema: SchemaBuilder) -> SchemaBuilder;
}

/// One declared attribute of a schema type.
#[derive(Debug, Clone)]
pub enum Attribute {
    /// A field spec governing a record field.
    Field(Arc<dyn FieldSpec>),
    /// A plain class-level value.
    Value(Bson),
}

/// Collects the declaration of a schema type.
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    name: String,
    collection: Option<String>,
    attributes: Vec<(String, Attribute)>,
}

impl SchemaBuilder {
    /// Starts the declaration of the schema type `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection: None,
            attributes: Vec::new(),
        }
    }

    /// The schema type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declares a field.
    pub fn field(self, name: impl Into<String>, spec: impl FieldSpec + 'static) -> Self {
        self.declare(name, Attribute::Field(Arc::new(spec)))
    }

    /// Declares a plain class-level attribute.
    pub fn attribute(self, name: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.declare(name, Attribute::Value(value.into()))
    }

    /// Declares an attribute of either kind.
    pub fn declare(mut self, name: impl Into<String>, attribute: Attribute) -> Self {
        self.attributes.push((name.into(), attribute));
        self
    }

    /// Stores the schema in `name` instead of the derived collection name.
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }

    /// Partitions the declared attributes and builds the schema.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::DuplicateAttribute`] when a name was declared twice.
    pub fn build(self) -> MapperResult<Schema> {
        let mut fields: Vec<(String, Arc<dyn FieldSpec>)> = Vec::new();
        let mut indexes = BTreeSet::new();
        let mut attributes = Document::new();

        for (name, attribute) in self.attributes {
            if attributes.contains_key(&name) || fields.iter().any(|(n, _)| *n == name) {
                return Err(MapperError::DuplicateAttribute(name, self.name));
            }

            match attribute {
                Attribute::Field(spec) => {
                    if let Some(kind) = spec.options().index {
                        indexes.insert((name.clone(), kind));
                    }
                    fields.push((name, spec));
                }
                Attribute::Value(value) => {
                    attributes.insert(name, value);
                }
            }
        }

        let collection = self
            .collection
            .unwrap_or_else(|| collection_name(&self.name));

        Ok(Schema {
            descriptor: SchemaDescriptor { name: self.name, fields, indexes },
            attributes,
            collection,
        })
    }
}

/// The result of a schema declaration.
#[derive(Debug)]
pub struct Schema {
    /// Field specs and index hints.
    pub descriptor: SchemaDescriptor,
    /// Plain class-level attributes.
    pub attributes: Document,
    /// Storage collection name.
    pub collection: String,
}

/// The immutable set of field specs and index hints of a schema type.
#[derive(Debug)]
pub struct SchemaDescriptor {
    name: String,
    fields: Vec<(String, Arc<dyn FieldSpec>)>,
    indexes: BTreeSet<(String, IndexKind)>,
}

impl SchemaDescriptor {
    /// The schema type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &dyn FieldSpec)> {
        self.fields
            .iter()
            .map(|(name, spec)| (name.as_str(), spec.as_ref()))
    }

    /// Looks up a declared field.
    pub fn field(&self, name: &str) -> Option<&dyn FieldSpec> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, spec)| spec.as_ref())
    }

    /// Declared `(field, index)` pairs.
    pub fn indexes(&self) -> &BTreeSet<(String, IndexKind)> {
        &self.indexes
    }

    /// Fills defaults and validates declared fields of `record` before it is persisted.
    ///
    /// Absent fields receive their default when one exists; an absent required
    /// field without a default is fatal. Present fields must pass
    /// [`FieldSpec::validate`] and are stored exactly as given; an optional
    /// field of the wrong kind is kept unchanged. Undeclared keys are left alone.
    ///
    /// # Errors
    ///
    /// - [`MapperError::RequiredFieldMissing`] for an absent required field without default
    /// - [`MapperError::FieldTypeMismatch`] for a present field its spec refuses
    pub fn prepare_record(&self, record: &mut Document) -> MapperResult<()> {
        for (name, spec) in &self.fields {
            let prepared = match record.get(name) {
                None => match spec.options().default.resolve() {
                    Some(default) => default,
                    None if spec.options().is_required() => {
                        return Err(MapperError::RequiredFieldMissing {
                            field: name.clone(),
                            schema: self.name.clone(),
                        });
                    }
                    None => continue,
                },
                Some(value) if spec.validate(value) => continue,
                Some(value) => {
                    return Err(MapperError::FieldTypeMismatch {
                        field: name.clone(),
                        schema: self.name.clone(),
                        expected: spec.accepted_kinds(),
                        actual_kind: ValueKind::of(value),
                        actual: value.clone(),
                    });
                }
            };

            record.insert(name.clone(), prepared);
        }

        Ok(())
    }
}
