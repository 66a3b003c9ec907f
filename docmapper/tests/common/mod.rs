#![allow(dead_code)]

use async_trait::async_trait;
use bson::Document;
use docmapper::{memory::InMemoryStoreClient, prelude::*};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

/// In-memory client that records which operations reached the store.
#[derive(Debug, Clone, Default)]
pub struct SpyClient {
    pub inner: InMemoryStoreClient,
    calls: Arc<Mutex<HashMap<&'static str, usize>>>,
}

impl SpyClient {
    fn record(&self, operation: &'static str) {
        *self.calls.lock().unwrap().entry(operation).or_default() += 1;
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.calls.lock().unwrap().get(operation).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl StoreClient for SpyClient {
    async fn find_one(&self, collection: &str, filter: Document) -> MapperResult<Option<Document>> {
        self.record("find_one");
        self.inner.find_one(collection, filter).await
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> MapperResult<DocumentCursor> {
        self.record("find");
        self.inner.find(collection, filter, options).await
    }

    async fn insert_one(
        &self,
        collection: &str,
        document: Document,
    ) -> MapperResult<docmapper::client::InsertOneResult> {
        self.record("insert_one");
        self.inner.insert_one(collection, document).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> MapperResult<UpdateResult> {
        self.record("update_one");
        self.inner.update_one(collection, filter, update, options).await
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
    ) -> MapperResult<UpdateResult> {
        self.record("replace_one");
        self.inner.replace_one(collection, filter, replacement).await
    }

    async fn create_index(&self, collection: &str, field: &str, kind: IndexKind) -> MapperResult<()> {
        self.record("create_index");
        self.inner.create_index(collection, field, kind).await
    }
}

pub struct HotelBooking;

impl DocumentSchema for HotelBooking {
    fn schema_name() -> &'static str {
        "HotelBooking"
    }

    fn declare(schema: SchemaBuilder) -> SchemaBuilder {
        schema
            .field("guest", StringField::new().required().index(IndexKind::Ascending))
            .field("nights", IntegerField::new().required().default_value(1))
            .field("room", EnumField::new(["single", "double", "suite"]).required().default_value("single"))
            .field("paid", BoolField::new().index(IndexKind::Hashed))
            .field("extras", SequenceField::new())
            .attribute("max_nights", 30)
    }
}

/// A mapper connected to a fresh spy client.
pub fn connected() -> (Mapper, SpyClient) {
    let spy = SpyClient::default();
    let connection = Connection::builder(spy.clone())
        .build()
        .expect("tests run inside a tokio runtime");

    (Mapper::with_connection(connection), spy)
}
