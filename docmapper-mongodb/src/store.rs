use async_trait::async_trait;
use bson::{Document, doc};
use futures::{StreamExt, TryStreamExt};
use mongodb::{
    Client, Collection as MongoCollection, IndexModel,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{ClientOptions, FindOptions as MongoFindOptions, IndexOptions},
};
use tracing::{debug, info};

use docmapper_core::{
    client::{
        DocumentCursor, FindOptions, InsertOneResult, StoreClient, StoreClientBuilder, UpdateOptions,
        UpdateResult,
    },
    error::{MapperError, MapperResult},
    field::IndexKind,
};

const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Debug, Clone)]
pub struct MongoStoreClient {
    client: Client,
    database: String,
}

impl MongoStoreClient {
    pub fn new(client: Client, database: impl Into<String>) -> Self {
        Self {
            client,
            database: database.into(),
        }
    }

    pub fn builder(uri: &str) -> MongoStoreClientBuilder {
        MongoStoreClientBuilder::new(uri)
    }

    /// The database collections are resolved in.
    pub fn database(&self) -> &str {
        &self.database
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection_name)
    }

    pub async fn shutdown(self) {
        self.client.shutdown().await;
    }
}

fn backend_error(collection: &str, err: MongoError) -> MapperError {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY_CODE => {
            MapperError::DuplicateKey(write_error.message.clone(), collection.to_string())
        }
        _ => MapperError::Backend(err.to_string()),
    }
}

/// Index keys for `field` and whether the index is unique.
fn index_keys(field: &str, kind: IndexKind) -> (Document, bool) {
    match kind {
        IndexKind::Ascending => (doc! { field: 1 }, false),
        IndexKind::Descending => (doc! { field: -1 }, false),
        IndexKind::Unique => (doc! { field: 1 }, true),
        IndexKind::Hashed => (doc! { field: "hashed" }, false),
        IndexKind::Text => (doc! { field: "text" }, false),
    }
}

fn find_options(options: FindOptions) -> MongoFindOptions {
    let mut mongo = MongoFindOptions::default();

    // A negative limit means single-batch mode to the server.
    mongo.limit = options
        .limit
        .map(|limit| i64::try_from(limit).unwrap_or(i64::MAX));
    mongo.skip = options.skip;
    mongo.sort = options.sort;

    mongo
}

#[async_trait]
impl StoreClient for MongoStoreClient {
    async fn find_one(&self, collection: &str, filter: Document) -> MapperResult<Option<Document>> {
        self.get_collection(collection)
            .find_one(filter)
            .await
            .map_err(|e| backend_error(collection, e))
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> MapperResult<DocumentCursor> {
        let cursor = self
            .get_collection(collection)
            .find(filter)
            .with_options(find_options(options))
            .await
            .map_err(|e| backend_error(collection, e))?;

        let collection = collection.to_string();

        Ok(cursor
            .map_err(move |e| backend_error(&collection, e))
            .boxed())
    }

    async fn insert_one(&self, collection: &str, document: Document) -> MapperResult<InsertOneResult> {
        let result = self
            .get_collection(collection)
            .insert_one(document)
            .await
            .map_err(|e| backend_error(collection, e))?;

        debug!(collection, id = %result.inserted_id, "inserted document");

        Ok(InsertOneResult {
            inserted_id: result.inserted_id,
        })
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> MapperResult<UpdateResult> {
        let result = self
            .get_collection(collection)
            .update_one(filter, update)
            .upsert(options.upsert)
            .await
            .map_err(|e| backend_error(collection, e))?;

        Ok(UpdateResult {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
    ) -> MapperResult<UpdateResult> {
        let result = self
            .get_collection(collection)
            .replace_one(filter, replacement)
            .await
            .map_err(|e| backend_error(collection, e))?;

        Ok(UpdateResult {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn create_index(&self, collection: &str, field: &str, kind: IndexKind) -> MapperResult<()> {
        let (keys, unique) = index_keys(field, kind);

        self.get_collection(collection)
            .create_index(
                IndexModel::builder()
                    .keys(keys)
                    .options(IndexOptions::builder().unique(unique).build())
                    .build(),
            )
            .await
            .map_err(|e| backend_error(collection, e))?;

        info!(collection, field, ?kind, "created index");

        Ok(())
    }
}

pub struct MongoStoreClientBuilder {
    uri: String,
    database: Option<String>,
}

impl MongoStoreClientBuilder {
    pub fn new(uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
            database: None,
        }
    }

    /// Uses `database` instead of the default database named in the URI.
    pub fn database(mut self, database: &str) -> Self {
        self.database = Some(database.to_string());
        self
    }
}

#[async_trait]
impl StoreClientBuilder for MongoStoreClientBuilder {
    type Client = MongoStoreClient;

    async fn build(self) -> MapperResult<Self::Client> {
        let client = Client::with_options(
            ClientOptions::parse(&self.uri)
                .await
                .map_err(|e| MapperError::Initialization(e.to_string()))?,
        )
        .map_err(|e| MapperError::Initialization(e.to_string()))?;

        let database = match self.database {
            Some(database) => database,
            None => client
                .default_database()
                .map(|database| database.name().to_string())
                .ok_or_else(|| {
                    MapperError::Initialization("no database given and none named in the URI".to_string())
                })?,
        };

        info!(%database, "connected to MongoDB");

        Ok(MongoStoreClient::new(client, database))
    }
}
