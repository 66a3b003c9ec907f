//! Registered schema types and their collection-level operations.
//!
//! A [`Model`] is what a [`Mapper`](crate::mapper::Mapper) hands out for every
//! registered schema. It owns the schema's descriptor, plain attributes and
//! hook lists, and reads the mapper's connection slot on every operation.
//!
//! Every operation follows the same dispatch:
//!
//! 1. resolve the connection, failing with [`MapperError::NotConnected`]
//! 2. run the before-hooks, which may rewrite the arguments or abort
//! 3. call the store client with the arguments the hooks left
//! 4. schedule the after-hooks with the store's result
//!
//! # Example
//!
//! ```ignore
//! let hotels = mapper.model("Hotel").unwrap();
//!
//! let grand = hotels.find_one(doc! { "name": "Grand" }).await?;
//!
//! let booked = hotels
//!     .update_one(
//!         doc! { "name": "Grand" },
//!         doc! { "$inc": { "bookings": 1 } },
//!         UpdateOptions::upsert(),
//!     )
//!     .await?;
//! ```

use bson::{Bson, Document, doc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    client::{DocumentCursor, FindOptions, UpdateOptions, UpdateResult},
    connection::Connection,
    entity::{DocumentEntity, ID_KEY},
    error::{MapperError, MapperResult},
    hook::{Action, HookContext, HookRegistration, HookRegistry, OperationArgs, Outcome, Phase},
    mapper::ConnectionSlot,
    schema::{Schema, SchemaDescriptor},
};

/// A registered schema type.
#[derive(Debug)]
pub struct Model {
    descriptor: Arc<SchemaDescriptor>,
    attributes: Document,
    collection: String,
    hooks: HookRegistry,
    connection: ConnectionSlot,
}

impl Model {
    pub(crate) fn new(schema: Schema, connection: ConnectionSlot) -> Self {
        Self {
            descriptor: Arc::new(schema.descriptor),
            attributes: schema.attributes,
            collection: schema.collection,
            hooks: HookRegistry::with_builtins(),
            connection,
        }
    }

    /// The schema type name.
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// The collection records of this type are stored in.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn descriptor(&self) -> &Arc<SchemaDescriptor> {
        &self.descriptor
    }

    /// Plain class-level attributes declared on the schema.
    pub fn attributes(&self) -> &Document {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Bson> {
        self.attributes.get(name)
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    /// The connection currently installed on the owning mapper.
    pub fn connection(&self) -> MapperResult<Connection> {
        self.connection
            .read()
            .clone()
            .ok_or(MapperError::NotConnected)
    }

    pub fn register_before_hook(&self, action: Action, registration: impl Into<HookRegistration>) -> &Self {
        self.hooks.register(Phase::Before, action, registration);
        self
    }

    pub fn register_after_hook(&self, action: Action, registration: impl Into<HookRegistration>) -> &Self {
        self.hooks.register(Phase::After, action, registration);
        self
    }

    pub fn before_save_hook(&self, registration: impl Into<HookRegistration>) -> &Self {
        self.register_before_hook(Action::Save, registration)
    }

    pub fn after_save_hook(&self, registration: impl Into<HookRegistration>) -> &Self {
        self.register_after_hook(Action::Save, registration)
    }

    pub fn before_update_hook(&self, registration: impl Into<HookRegistration>) -> &Self {
        self.register_before_hook(Action::Update, registration)
    }

    pub fn after_update_hook(&self, registration: impl Into<HookRegistration>) -> &Self {
        self.register_after_hook(Action::Update, registration)
    }

    pub fn before_find_hook(&self, registration: impl Into<HookRegistration>) -> &Self {
        self.register_before_hook(Action::Find, registration)
    }

    pub fn after_find_hook(&self, registration: impl Into<HookRegistration>) -> &Self {
        self.register_after_hook(Action::Find, registration)
    }

    /// Creates an empty record of this type. Nothing is persisted.
    pub fn new_entity(self: &Arc<Self>) -> DocumentEntity {
        DocumentEntity::new(self.clone(), Document::new())
    }

    /// Wraps an existing document as a record of this type.
    pub fn entity(self: &Arc<Self>, document: Document) -> DocumentEntity {
        DocumentEntity::new(self.clone(), document)
    }

    /// Serializes `value` into a record of this type.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::InvalidDocument`] when `value` does not serialize
    /// to a document.
    pub fn entity_from_typed<T: Serialize>(self: &Arc<Self>, value: &T) -> MapperResult<DocumentEntity> {
        match bson::ser::serialize_to_bson(value)? {
            Bson::Document(document) => Ok(self.entity(document)),
            other => Err(MapperError::InvalidDocument(format!(
                "expected a document, got {:?}",
                other.element_type()
            ))),
        }
    }

    /// Returns the first stored document matching `filter`, unwrapped.
    pub async fn find_one(&self, filter: Document) -> MapperResult<Option<Document>> {
        let (_, found) = self.dispatch_find_one(filter).await?;
        Ok(found)
    }

    /// Returns a cursor over the stored documents matching `filter`.
    pub async fn find(&self, filter: Document, options: FindOptions) -> MapperResult<DocumentCursor> {
        let connection = self.connection()?;

        let ctx = self
            .hooks
            .run_before(HookContext::new(
                Action::Find,
                self.descriptor.clone(),
                OperationArgs::Find { filter, options },
            ))
            .await?;
        let (filter, options) = find_args(&ctx)?;

        debug!(collection = %self.collection, %filter, "find");
        let cursor = connection
            .client()
            .find(&self.collection, filter, options)
            .await?;

        self.hooks
            .run_after(ctx.with_outcome(Outcome::Cursor), connection.runtime());

        Ok(cursor)
    }

    /// Applies `update` to the first document matching `filter` and returns
    /// the resulting record.
    ///
    /// The record is resolved by the upserted identity when the update
    /// inserted, otherwise by `filter` as the hooks left it. When the update
    /// changed the fields named in the filter the lookup misses; the returned
    /// record then only holds the filter.
    pub async fn update_one(
        self: &Arc<Self>,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> MapperResult<DocumentEntity> {
        let (connection, filter, result) = self.dispatch_update_one(filter, update, options).await?;

        let lookup = match &result.upserted_id {
            Some(id) => doc! { ID_KEY: id.clone() },
            None => filter.clone(),
        };

        let mut entity = self.entity(filter);

        match connection
            .client()
            .find_one(&self.collection, lookup.clone())
            .await?
        {
            Some(document) => entity.merge(document),
            None => warn!(
                collection = %self.collection,
                %lookup,
                "updated document not found, returning the filter only"
            ),
        }

        Ok(entity)
    }

    /// Creates every index declared on the schema's fields.
    pub async fn ensure_indexes(&self) -> MapperResult<()> {
        let connection = self.connection()?;

        for (field, kind) in self.descriptor.indexes() {
            info!(collection = %self.collection, %field, ?kind, "ensuring index");
            connection
                .client()
                .create_index(&self.collection, field, *kind)
                .await?;
        }

        Ok(())
    }

    /// Dispatches a single-document find. Returns the filter that was used and
    /// the raw result.
    pub(crate) async fn dispatch_find_one(&self, filter: Document) -> MapperResult<(Document, Option<Document>)> {
        let connection = self.connection()?;

        let ctx = self
            .hooks
            .run_before(HookContext::new(
                Action::Find,
                self.descriptor.clone(),
                OperationArgs::Find {
                    filter,
                    options: FindOptions::default(),
                },
            ))
            .await?;
        let (filter, _) = find_args(&ctx)?;

        debug!(collection = %self.collection, %filter, "find one");
        let found = connection
            .client()
            .find_one(&self.collection, filter.clone())
            .await?;

        self.hooks
            .run_after(ctx.with_outcome(Outcome::FindOne(found.clone())), connection.runtime());

        Ok((filter, found))
    }

    /// Dispatches an operator update. Returns the connection it ran on, the
    /// filter that was used and the store result.
    pub(crate) async fn dispatch_update_one(
        &self,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> MapperResult<(Connection, Document, UpdateResult)> {
        let connection = self.connection()?;

        let ctx = self
            .hooks
            .run_before(HookContext::new(
                Action::Update,
                self.descriptor.clone(),
                OperationArgs::Update { filter, update, options },
            ))
            .await?;
        let (filter, update, options) = update_args(&ctx)?;

        debug!(collection = %self.collection, %filter, %update, upsert = options.upsert, "update one");
        let result = connection
            .client()
            .update_one(&self.collection, filter.clone(), update, options)
            .await?;

        self.hooks
            .run_after(ctx.with_outcome(Outcome::Updated(result.clone())), connection.runtime());

        Ok((connection, filter, result))
    }

    /// Dispatches a save of `record`: insert when it has no identity, replace
    /// by identity otherwise. Returns the record as persisted. Replacing never
    /// upserts, so an identity unknown to the store writes nothing.
    pub(crate) async fn dispatch_save(&self, record: Document) -> MapperResult<Document> {
        let connection = self.connection()?;

        let ctx = self
            .hooks
            .run_before(HookContext::new(
                Action::Save,
                self.descriptor.clone(),
                OperationArgs::Save { record },
            ))
            .await?;
        let mut record = save_args(&ctx)?;

        match record.get(ID_KEY).filter(|id| !matches!(id, Bson::Null)).cloned() {
            Some(id) => {
                debug!(collection = %self.collection, %id, "replace one");
                let replaced = connection
                    .client()
                    .replace_one(&self.collection, doc! { ID_KEY: id.clone() }, record.clone())
                    .await?;
                if replaced.matched_count == 0 {
                    warn!(
                        collection = %self.collection,
                        %id,
                        "no stored document carries this identity, nothing was replaced"
                    );
                }
            }
            None => {
                debug!(collection = %self.collection, "insert one");
                record.remove(ID_KEY);
                let inserted = connection
                    .client()
                    .insert_one(&self.collection, record.clone())
                    .await?;
                record.insert(ID_KEY, inserted.inserted_id);
            }
        }

        self.hooks
            .run_after(ctx.with_outcome(Outcome::Saved(record.clone())), connection.runtime());

        Ok(record)
    }
}

fn find_args(ctx: &HookContext) -> MapperResult<(Document, FindOptions)> {
    match &ctx.args {
        OperationArgs::Find { filter, options } => Ok((filter.clone(), options.clone())),
        _ => Err(replaced_args(ctx)),
    }
}

fn update_args(ctx: &HookContext) -> MapperResult<(Document, Document, UpdateOptions)> {
    match &ctx.args {
        OperationArgs::Update { filter, update, options } => Ok((filter.clone(), update.clone(), *options)),
        _ => Err(replaced_args(ctx)),
    }
}

fn save_args(ctx: &HookContext) -> MapperResult<Document> {
    match &ctx.args {
        OperationArgs::Save { record } => Ok(record.clone()),
        _ => Err(replaced_args(ctx)),
    }
}

fn replaced_args(ctx: &HookContext) -> MapperError {
    MapperError::hook(format!("before-{} hooks replaced the operation arguments", ctx.action))
}
