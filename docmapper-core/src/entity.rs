//! Records: one document of a registered schema type.
//!
//! A [`DocumentEntity`] is a schema-agnostic document bound to its [`Model`].
//! Fields are read and written by name; declared field specs only come into
//! play when the record is saved.
//!
//! # Example
//!
//! ```ignore
//! let mut booking = bookings.new_entity();
//! booking.set("guest", "Ada");
//! booking.save().await?;
//!
//! assert!(booking.id().is_some());
//!
//! booking.set("nights", 3);
//! booking.save().await?; // replaces the stored document by identity
//! ```

use bson::{Bson, Document, de::deserialize_from_bson};
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::{
    client::{UpdateOptions, UpdateResult},
    error::{MapperError, MapperResult},
    model::Model,
};

/// Key holding a record's identity.
pub const ID_KEY: &str = "_id";

/// One record of a schema type.
#[derive(Debug, Clone)]
pub struct DocumentEntity {
    model: Arc<Model>,
    record: Document,
}

impl DocumentEntity {
    pub(crate) fn new(model: Arc<Model>, record: Document) -> Self {
        Self { model, record }
    }

    /// The schema type of this record.
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// The record's identity, once it has one.
    pub fn id(&self) -> Option<&Bson> {
        self.record.get(ID_KEY).filter(|id| !matches!(id, Bson::Null))
    }

    pub fn get(&self, key: &str) -> Option<&Bson> {
        self.record.get(key)
    }

    /// Sets a field, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Bson>) -> Option<Bson> {
        self.record.insert(key, value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Bson> {
        self.record.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.record.contains_key(key)
    }

    pub fn as_document(&self) -> &Document {
        &self.record
    }

    pub fn into_document(self) -> Document {
        self.record
    }

    /// Overwrites the record's fields with those of `document`. Fields absent
    /// from `document` are kept.
    pub fn merge(&mut self, document: Document) {
        for (key, value) in document {
            self.record.insert(key, value);
        }
    }

    /// Converts the record to JSON.
    pub fn to_json(&self) -> MapperResult<serde_json::Value> {
        Ok(serde_json::to_value(&self.record)?)
    }

    /// Deserializes the record into `T`.
    pub fn to_typed<T: DeserializeOwned>(&self) -> MapperResult<T> {
        Ok(deserialize_from_bson(Bson::Document(self.record.clone()))?)
    }

    /// Persists the record.
    ///
    /// The before-save hooks run first, including the built-in field
    /// validation. A record without identity is inserted and receives the
    /// identity the store assigned; a record with identity replaces the stored
    /// document carrying it. On success the record holds exactly what was
    /// written, filled defaults included. On failure it is left
    /// untouched.
    ///
    /// # Errors
    ///
    /// - [`MapperError::NotConnected`] if the mapper has no connection
    /// - [`MapperError::RequiredFieldMissing`] / [`MapperError::FieldTypeMismatch`] from validation
    /// - any error returned by a before-save hook or the store client
    pub async fn save(&mut self) -> MapperResult<()> {
        self.record = self.model.dispatch_save(self.record.clone()).await?;
        Ok(())
    }

    /// Reloads the record from the store, using its current fields as the
    /// filter, and merges the stored document into it.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::DocumentNotFound`] when nothing matches.
    pub async fn refresh(&mut self) -> MapperResult<()> {
        let (filter, found) = self.model.dispatch_find_one(self.record.clone()).await?;

        match found {
            Some(document) => {
                self.merge(document);
                Ok(())
            }
            None => Err(self.not_found(filter)),
        }
    }

    /// Runs a single-document find on the record's collection and returns the
    /// raw result. The record itself is not modified.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::DocumentNotFound`] when nothing matches.
    pub async fn query(&self, filter: Document) -> MapperResult<Document> {
        let (filter, found) = self.model.dispatch_find_one(filter).await?;
        found.ok_or_else(|| self.not_found(filter))
    }

    /// Applies an operator update to the stored document matching this
    /// record's fields. The record itself is not modified.
    pub async fn update_one(&self, update: Document, options: UpdateOptions) -> MapperResult<UpdateResult> {
        let (_, _, result) = self
            .model
            .dispatch_update_one(self.record.clone(), update, options)
            .await?;

        Ok(result)
    }

    fn not_found(&self, query: Document) -> MapperError {
        MapperError::DocumentNotFound {
            collection: self.model.collection().to_string(),
            query,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        field::{FieldBuilder, IntegerField, StringField},
        hook::Hook,
        mapper::Mapper,
        schema::SchemaBuilder,
    };
    use bson::{doc, oid::ObjectId};
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Room {
        number: i32,
        kind: String,
    }

    fn rooms(mapper: &Mapper) -> Arc<Model> {
        mapper
            .register(
                SchemaBuilder::new("Room")
                    .field("number", IntegerField::new().required())
                    .field("kind", StringField::new()),
            )
            .unwrap()
    }

    #[test]
    fn accessors() {
        let mapper = Mapper::new();
        let mut room = rooms(&mapper).entity(doc! { "number": 12 });

        assert_eq!(room.get("number"), Some(&Bson::Int32(12)));
        assert!(!room.contains("kind"));
        assert_eq!(room.set("kind", "suite"), None);
        assert_eq!(room.set("kind", "double"), Some(Bson::from("suite")));
        assert_eq!(room.remove("kind"), Some(Bson::from("double")));
        assert_eq!(room.as_document(), &doc! { "number": 12 });
        assert_eq!(room.model().name(), "Room");
    }

    #[test]
    fn id_ignores_null() {
        let mapper = Mapper::new();
        let model = rooms(&mapper);
        let oid = ObjectId::new();

        assert_eq!(model.entity(doc! { "_id": Bson::Null }).id(), None);
        assert_eq!(model.entity(doc! { "_id": oid }).id(), Some(&Bson::ObjectId(oid)));
    }

    #[test]
    fn merge_keeps_absent_fields() {
        let mapper = Mapper::new();
        let mut room = rooms(&mapper).entity(doc! { "number": 1, "note": "local" });

        room.merge(doc! { "number": 2, "kind": "single" });

        assert_eq!(room.into_document(), doc! { "number": 2, "note": "local", "kind": "single" });
    }

    #[test]
    fn typed_conversions() {
        let mapper = Mapper::new();
        let model = rooms(&mapper);
        let room = Room { number: 7, kind: "twin".into() };

        let entity = model.entity_from_typed(&room).unwrap();

        assert_eq!(entity.as_document(), &doc! { "number": 7, "kind": "twin" });
        assert_eq!(entity.to_typed::<Room>().unwrap(), room);
        assert_eq!(
            entity.to_json().unwrap(),
            serde_json::json!({ "number": 7, "kind": "twin" })
        );
    }

    #[test]
    fn from_typed_rejects_non_documents() {
        let mapper = Mapper::new();
        let err = rooms(&mapper).entity_from_typed(&5).unwrap_err();

        assert!(matches!(err, MapperError::InvalidDocument(_)));
    }

    #[tokio::test]
    async fn operations_require_a_connection() {
        let mapper = Mapper::new();
        let model = rooms(&mapper);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        model.before_save_hook(Hook::sync(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        let mut room = model.entity(doc! { "number": 3 });

        assert!(matches!(room.save().await, Err(MapperError::NotConnected)));
        assert!(matches!(room.refresh().await, Err(MapperError::NotConnected)));
        assert!(matches!(room.query(doc! {}).await, Err(MapperError::NotConnected)));
        assert!(matches!(
            room.update_one(doc! { "$set": { "kind": "x" } }, UpdateOptions::default()).await,
            Err(MapperError::NotConnected)
        ));
        assert!(matches!(model.ensure_indexes().await, Err(MapperError::NotConnected)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(room.as_document(), &doc! { "number": 3 });
    }
}
