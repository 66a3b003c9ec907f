//! In-memory store client implementation.
//!
//! Documents are kept per collection in insertion order behind an async-aware
//! read-write lock, so "the first matching document" is the oldest one.

use async_trait::async_trait;
use bson::{Bson, Document, doc, oid::ObjectId};
use futures::{StreamExt, stream};
use mea::rwlock::RwLock;
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, trace};

use docmapper_core::{
    client::{
        DocumentCursor, FindOptions, InsertOneResult, StoreClient, StoreClientBuilder, UpdateOptions,
        UpdateResult,
    },
    entity::ID_KEY,
    error::{MapperError, MapperResult},
    field::IndexKind,
};

use crate::evaluator::{DocumentEvaluator, apply_update, sort_order, upsert_base};

type CollectionMap = Vec<Document>;
type StoreMap = HashMap<String, CollectionMap>;

/// Thread-safe in-memory store client.
///
/// Supports the filter operators `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`,
/// `$in`, `$nin`, `$exists`, `$and`, `$or` and `$nor`, and the update operators
/// `$set`, `$unset` and `$inc`. Documents inserted without an `_id` receive a
/// fresh [`ObjectId`]. Indexes are accepted and ignored.
///
/// Clones share the same underlying data.
///
/// # Example
///
/// ```ignore
/// use docmapper_memory::InMemoryStoreClient;
/// use docmapper_core::client::StoreClient;
/// use bson::doc;
///
/// let client = InMemoryStoreClient::new();
/// let inserted = client.insert_one("hotels", doc! { "name": "Grand" }).await?;
/// let found = client.find_one("hotels", doc! { "_id": inserted.inserted_id }).await?;
/// assert!(found.is_some());
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStoreClient {
    /// collection name -> documents in insertion order
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStoreClient {
    /// Creates an empty client.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> InMemoryStoreClientBuilder {
        InMemoryStoreClientBuilder::default()
    }

    /// Number of documents stored in `collection`.
    pub async fn count(&self, collection: &str) -> usize {
        self.store
            .read()
            .await
            .get(collection)
            .map_or(0, Vec::len)
    }

    /// Names of every collection holding at least one document.
    pub async fn list_collections(&self) -> Vec<String> {
        let mut names = self
            .store
            .read()
            .await
            .iter()
            .filter(|(_, documents)| !documents.is_empty())
            .map(|(name, _)| name.clone())
            .collect::<Vec<_>>();
        names.sort();
        names
    }
}

fn position(documents: &[Document], filter: &Document) -> MapperResult<Option<usize>> {
    for (index, document) in documents.iter().enumerate() {
        if DocumentEvaluator::new(document).matches(filter)? {
            return Ok(Some(index));
        }
    }

    Ok(None)
}

fn contains_id(documents: &[Document], id: &Bson) -> bool {
    documents.iter().any(|document| document.get(ID_KEY) == Some(id))
}

/// Returns `document` with `id` as its leading `_id` field.
fn with_id(id: Bson, document: Document) -> Document {
    let mut stored = doc! { ID_KEY: id };
    for (key, value) in document {
        if key != ID_KEY {
            stored.insert(key, value);
        }
    }
    stored
}

fn immutable_id(collection: &str) -> MapperError {
    MapperError::InvalidDocument(format!("the {ID_KEY} field of documents in {collection} is immutable"))
}

#[async_trait]
impl StoreClient for InMemoryStoreClient {
    async fn find_one(&self, collection: &str, filter: Document) -> MapperResult<Option<Document>> {
        let store = self.store.read().await;
        let documents = match store.get(collection) {
            Some(documents) => documents,
            None => return Ok(None),
        };

        let found = position(documents, &filter)?.map(|index| documents[index].clone());
        trace!(collection, %filter, found = found.is_some(), "find one");

        Ok(found)
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> MapperResult<DocumentCursor> {
        let store = self.store.read().await;
        let mut matched = match store.get(collection) {
            Some(documents) => DocumentEvaluator::filter_documents(documents, &filter)?,
            None => vec![],
        };

        if let Some(sort) = &options.sort {
            matched.sort_by(|a, b| sort_order(a, b, sort));
        }

        let matched = matched
            .into_iter()
            .skip(options.skip.unwrap_or(0) as usize)
            .take(options.limit.map_or(usize::MAX, |limit| limit as usize))
            .map(Ok)
            .collect::<Vec<_>>();

        trace!(collection, %filter, count = matched.len(), "find");

        Ok(stream::iter(matched).boxed())
    }

    async fn insert_one(&self, collection: &str, document: Document) -> MapperResult<InsertOneResult> {
        let mut store = self.store.write().await;
        let documents = store.entry(collection.to_string()).or_default();

        let id = match document.get(ID_KEY) {
            Some(id) => id.clone(),
            None => Bson::ObjectId(ObjectId::new()),
        };

        if contains_id(documents, &id) {
            return Err(MapperError::DuplicateKey(id.to_string(), collection.to_string()));
        }

        debug!(collection, %id, "inserting document");
        documents.push(with_id(id.clone(), document));

        Ok(InsertOneResult { inserted_id: id })
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> MapperResult<UpdateResult> {
        let mut store = self.store.write().await;
        let documents = store.entry(collection.to_string()).or_default();

        match position(documents, &filter)? {
            Some(index) => {
                let mut updated = documents[index].clone();
                apply_update(&mut updated, &update)?;

                if updated.get(ID_KEY) != documents[index].get(ID_KEY) {
                    return Err(immutable_id(collection));
                }

                let modified = updated != documents[index];
                documents[index] = updated;

                debug!(collection, %filter, modified, "updated document");
                Ok(UpdateResult {
                    matched_count: 1,
                    modified_count: modified as u64,
                    upserted_id: None,
                })
            }
            None if options.upsert => {
                let mut created = upsert_base(&filter)?;
                apply_update(&mut created, &update)?;

                let id = match created.get(ID_KEY) {
                    Some(id) => id.clone(),
                    None => Bson::ObjectId(ObjectId::new()),
                };

                if contains_id(documents, &id) {
                    return Err(MapperError::DuplicateKey(id.to_string(), collection.to_string()));
                }

                debug!(collection, %id, "upserted document");
                documents.push(with_id(id.clone(), created));

                Ok(UpdateResult {
                    matched_count: 0,
                    modified_count: 0,
                    upserted_id: Some(id),
                })
            }
            None => {
                // Still validate the update so callers see malformed ones early.
                apply_update(&mut Document::new(), &update)?;
                Ok(UpdateResult::default())
            }
        }
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
    ) -> MapperResult<UpdateResult> {
        if replacement.keys().any(|key| key.starts_with('$')) {
            return Err(MapperError::InvalidDocument(
                "replacement documents may not contain operators".to_string(),
            ));
        }

        let mut store = self.store.write().await;
        let documents = match store.get_mut(collection) {
            Some(documents) => documents,
            None => return Ok(UpdateResult::default()),
        };

        let index = match position(documents, &filter)? {
            Some(index) => index,
            None => return Ok(UpdateResult::default()),
        };

        let id = documents[index].get(ID_KEY).cloned().unwrap_or(Bson::Null);
        if replacement.get(ID_KEY).is_some_and(|given| *given != id) {
            return Err(immutable_id(collection));
        }

        let replaced = with_id(id, replacement);
        let modified = replaced != documents[index];
        documents[index] = replaced;

        debug!(collection, %filter, modified, "replaced document");
        Ok(UpdateResult {
            matched_count: 1,
            modified_count: modified as u64,
            upserted_id: None,
        })
    }

    async fn create_index(&self, collection: &str, field: &str, kind: IndexKind) -> MapperResult<()> {
        // Lookups always scan, indexes have nothing to speed up.
        debug!(collection, field, ?kind, "ignoring index on in-memory collection");
        Ok(())
    }
}

/// Builder for [`InMemoryStoreClient`].
#[derive(Debug, Default)]
pub struct InMemoryStoreClientBuilder {
    seed: Vec<(String, Document)>,
}

impl InMemoryStoreClientBuilder {
    /// Inserts `document` into `collection` when the client is built.
    pub fn document(mut self, collection: impl Into<String>, document: Document) -> Self {
        self.seed.push((collection.into(), document));
        self
    }
}

#[async_trait]
impl StoreClientBuilder for InMemoryStoreClientBuilder {
    type Client = InMemoryStoreClient;

    async fn build(self) -> MapperResult<Self::Client> {
        let client = InMemoryStoreClient::new();

        for (collection, document) in self.seed {
            client.insert_one(&collection, document).await?;
        }

        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    async fn seeded() -> InMemoryStoreClient {
        InMemoryStoreClient::builder()
            .document("hotels", doc! { "_id": 1, "name": "Grand", "stars": 4 })
            .document("hotels", doc! { "_id": 2, "name": "Ritz", "stars": 5 })
            .document("hotels", doc! { "_id": 3, "name": "Inn", "stars": 2 })
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn insert_assigns_object_ids() {
        let client = InMemoryStoreClient::new();

        let inserted = client
            .insert_one("hotels", doc! { "name": "Grand" })
            .await
            .unwrap();

        assert!(matches!(inserted.inserted_id, Bson::ObjectId(_)));
        let stored = client
            .find_one("hotels", doc! { "_id": inserted.inserted_id.clone() })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, doc! { "_id": inserted.inserted_id, "name": "Grand" });
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_ids() {
        let client = seeded().await;

        let err = client
            .insert_one("hotels", doc! { "_id": 2, "name": "Copy" })
            .await
            .unwrap_err();

        assert!(matches!(err, MapperError::DuplicateKey(ref id, ref c) if id == "2" && c == "hotels"));
        assert_eq!(client.count("hotels").await, 3);
    }

    #[tokio::test]
    async fn find_one_returns_oldest_match() {
        let client = seeded().await;

        let found = client
            .find_one("hotels", doc! { "stars": { "$gte": 4 } })
            .await
            .unwrap();

        assert_eq!(found.unwrap().get_str("name").unwrap(), "Grand");
        assert!(client.find_one("missing", doc! {}).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_sorts_skips_and_limits() {
        let client = seeded().await;

        let names = client
            .find(
                "hotels",
                doc! {},
                FindOptions::default().sort(doc! { "stars": -1 }).skip(1).limit(1),
            )
            .await
            .unwrap()
            .map_ok(|document| document.get_str("name").unwrap().to_string())
            .try_collect::<Vec<_>>()
            .await
            .unwrap();

        assert_eq!(names, vec!["Grand".to_string()]);
    }

    #[tokio::test]
    async fn update_applies_operators() {
        let client = seeded().await;

        let result = client
            .update_one(
                "hotels",
                doc! { "name": "Inn" },
                doc! { "$inc": { "stars": 1 }, "$set": { "open": true } },
                UpdateOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(result, UpdateResult { matched_count: 1, modified_count: 1, upserted_id: None });
        assert_eq!(
            client.find_one("hotels", doc! { "_id": 3 }).await.unwrap().unwrap(),
            doc! { "_id": 3, "name": "Inn", "stars": 3, "open": true }
        );
    }

    #[tokio::test]
    async fn update_without_match() {
        let client = seeded().await;

        let result = client
            .update_one(
                "hotels",
                doc! { "name": "Nowhere" },
                doc! { "$set": { "stars": 1 } },
                UpdateOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(result, UpdateResult::default());
        assert_eq!(client.count("hotels").await, 3);
    }

    #[tokio::test]
    async fn upsert_creates_from_filter_and_update() {
        let client = seeded().await;

        let result = client
            .update_one(
                "hotels",
                doc! { "name": "Nowhere" },
                doc! { "$set": { "stars": 1 } },
                UpdateOptions::upsert(),
            )
            .await
            .unwrap();

        let id = result.upserted_id.unwrap();
        assert_eq!(result.matched_count, 0);
        assert_eq!(
            client.find_one("hotels", doc! { "_id": id.clone() }).await.unwrap().unwrap(),
            doc! { "_id": id, "name": "Nowhere", "stars": 1 }
        );
    }

    #[tokio::test]
    async fn update_cannot_change_identity() {
        let client = seeded().await;

        let err = client
            .update_one(
                "hotels",
                doc! { "_id": 1 },
                doc! { "$set": { "_id": 9 } },
                UpdateOptions::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, MapperError::InvalidDocument(_)));
    }

    #[tokio::test]
    async fn replace_keeps_identity() {
        let client = seeded().await;

        let result = client
            .replace_one("hotels", doc! { "_id": 2 }, doc! { "name": "Ritz Carlton" })
            .await
            .unwrap();

        assert_eq!(result.matched_count, 1);
        assert_eq!(result.modified_count, 1);
        assert_eq!(
            client.find_one("hotels", doc! { "_id": 2 }).await.unwrap().unwrap(),
            doc! { "_id": 2, "name": "Ritz Carlton" }
        );

        let err = client
            .replace_one("hotels", doc! { "_id": 2 }, doc! { "_id": 7, "name": "x" })
            .await
            .unwrap_err();
        assert!(matches!(err, MapperError::InvalidDocument(_)));
    }

    #[tokio::test]
    async fn indexes_are_accepted() {
        let client = InMemoryStoreClient::new();

        client
            .create_index("hotels", "name", IndexKind::Unique)
            .await
            .unwrap();

        assert!(client.list_collections().await.is_empty());
    }
}
