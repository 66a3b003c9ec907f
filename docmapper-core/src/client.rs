//! Document-store client contract consumed by the mapper.
//!
//! The mapper never talks to a server itself. Every persistence call goes
//! through a [`StoreClient`], which addresses documents by collection name and
//! speaks plain BSON filters and updates. Implementations must be thread-safe;
//! their concurrency model, retries and timeouts are their own business and
//! failures pass through the mapper unmodified.
//!
//! # Example
//!
//! ```ignore
//! use docmapper::client::{StoreClient, UpdateOptions};
//! use bson::doc;
//!
//! let client = MyClient::new();
//! let inserted = client.insert_one("hotels", doc! { "name": "Grand" }).await?;
//! client
//!     .update_one(
//!         "hotels",
//!         doc! { "_id": inserted.inserted_id },
//!         doc! { "$set": { "stars": 5 } },
//!         UpdateOptions::default(),
//!     )
//!     .await?;
//! ```

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::stream::BoxStream;
use std::{fmt::Debug, sync::Arc};

use crate::{error::MapperResult, field::IndexKind};

/// A lazy stream of documents produced by [`StoreClient::find`].
///
/// Every call to `find` yields a fresh cursor.
pub type DocumentCursor = BoxStream<'static, MapperResult<Document>>;

/// Extra arguments to [`StoreClient::find`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Maximum number of documents to return.
    pub limit: Option<u64>,
    /// Number of documents to skip.
    pub skip: Option<u64>,
    /// Sort specification, `{ field: 1 | -1 }`.
    pub sort: Option<Document>,
}

impl FindOptions {
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }
}

/// Extra arguments to [`StoreClient::update_one`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Insert a new document when nothing matches the filter.
    pub upsert: bool,
}

impl UpdateOptions {
    /// Options with upsert enabled.
    pub fn upsert() -> Self {
        Self { upsert: true }
    }
}

/// Result of [`StoreClient::insert_one`].
#[derive(Debug, Clone, PartialEq)]
pub struct InsertOneResult {
    /// Identity assigned to (or carried by) the inserted document.
    pub inserted_id: Bson,
}

/// Result of [`StoreClient::update_one`] and [`StoreClient::replace_one`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
    /// Identity of the document created by an upsert, if any.
    pub upserted_id: Option<Bson>,
}

/// Abstract interface for document-store clients.
#[async_trait]
pub trait StoreClient: Send + Sync + Debug {
    /// Returns the first document matching `filter`, if any.
    async fn find_one(&self, collection: &str, filter: Document) -> MapperResult<Option<Document>>;

    /// Returns a cursor over every document matching `filter`.
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> MapperResult<DocumentCursor>;

    /// Inserts one document, assigning an `_id` when it has none.
    async fn insert_one(&self, collection: &str, document: Document) -> MapperResult<InsertOneResult>;

    /// Applies an operator update (`$set`, `$unset`, ...) to the first document matching `filter`.
    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> MapperResult<UpdateResult>;

    /// Replaces the body of the first document matching `filter`.
    async fn replace_one(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
    ) -> MapperResult<UpdateResult>;

    /// Creates an index on `field`.
    async fn create_index(&self, collection: &str, field: &str, kind: IndexKind) -> MapperResult<()>;
}

#[async_trait]
impl<C> StoreClient for &C
where
    C: StoreClient + ?Sized,
{
    async fn find_one(&self, collection: &str, filter: Document) -> MapperResult<Option<Document>> {
        (**self).find_one(collection, filter).await
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> MapperResult<DocumentCursor> {
        (**self).find(collection, filter, options).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> MapperResult<InsertOneResult> {
        (**self).insert_one(collection, document).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> MapperResult<UpdateResult> {
        (**self)
            .update_one(collection, filter, update, options)
            .await
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
    ) -> MapperResult<UpdateResult> {
        (**self)
            .replace_one(collection, filter, replacement)
            .await
    }

    async fn create_index(&self, collection: &str, field: &str, kind: IndexKind) -> MapperResult<()> {
        (**self).create_index(collection, field, kind).await
    }
}

#[async_trait]
impl<C> StoreClient for Arc<C>
where
    C: StoreClient + ?Sized,
{
    async fn find_one(&self, collection: &str, filter: Document) -> MapperResult<Option<Document>> {
        (**self).find_one(collection, filter).await
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> MapperResult<DocumentCursor> {
        (**self).find(collection, filter, options).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> MapperResult<InsertOneResult> {
        (**self).insert_one(collection, document).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> MapperResult<UpdateResult> {
        (**self)
            .update_one(collection, filter, update, options)
            .await
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
    ) -> MapperResult<UpdateResult> {
        (**self)
            .replace_one(collection, filter, replacement)
            .await
    }

    async fn create_index(&self, collection: &str, field: &str, kind: IndexKind) -> MapperResult<()> {
        (**self).create_index(collection, field, kind).await
    }
}

/// Factory for store clients that need asynchronous setup.
#[async_trait]
pub trait StoreClientBuilder {
    type Client: StoreClient;

    async fn build(self) -> MapperResult<Self::Client>;
}
