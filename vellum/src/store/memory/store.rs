use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::common::{values_equal, DOC_ID};
use crate::errors::{ErrorKind, VellumError, VellumResult};
use crate::store::{DeleteResult, DocumentStoreProvider, FindOptions, UpdateResult};

use super::matcher::matches;
use super::pipeline::{run_pipeline, sort_documents};
use super::update::apply_update;

type Collection = Arc<RwLock<Vec<Document>>>;

/// In-memory implementation of the document store.
///
/// # Purpose
/// `MemoryStore` keeps every collection as an insertion-ordered list of
/// documents behind its own lock. It understands the native filter, update
/// and pipeline syntax the repositories emit, which makes it the reference
/// backend for tests and for embedded use where persistence is not needed.
///
/// # Characteristics
/// - **Thread-Safe**: collections are shared across clones and threads
/// - **Atomic Updates**: `update_one` and `replace_one` match and apply under
///   one write lock
/// - **No Persistence**: all data is lost when the last clone is dropped
///
/// # Usage
/// ```text
/// let store = DocumentStore::new(MemoryStore::new());
/// store.insert_one("books", doc! { "_id": 1, "title": "Dune" }).await?;
/// ```
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Names of the collections created so far.
    pub fn collection_names(&self) -> Vec<String> {
        self.inner
            .collections
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }
}

#[async_trait]
impl DocumentStoreProvider for MemoryStore {
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> VellumResult<Vec<Document>> {
        self.inner.find(collection, &filter, &options)
    }

    async fn find_one(&self, collection: &str, filter: Document) -> VellumResult<Option<Document>> {
        let mut found = self.inner.find(collection, &filter, &FindOptions::new().limit(1))?;
        Ok(found.pop())
    }

    async fn count(&self, collection: &str, filter: Document, limit: u64) -> VellumResult<u64> {
        self.inner.count(collection, &filter, limit)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> VellumResult<Bson> {
        self.inner.insert_one(collection, document)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> VellumResult<UpdateResult> {
        self.inner.update_one(collection, &filter, &update)
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
    ) -> VellumResult<UpdateResult> {
        self.inner.replace_one(collection, &filter, replacement)
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> VellumResult<DeleteResult> {
        self.inner.delete_one(collection, &filter)
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> VellumResult<Vec<Document>> {
        self.inner.aggregate(collection, &pipeline)
    }
}

#[derive(Default)]
struct MemoryStoreInner {
    collections: DashMap<String, Collection>,
}

impl MemoryStoreInner {
    fn existing(&self, name: &str) -> Option<Collection> {
        self.collections.get(name).map(|entry| entry.value().clone())
    }

    fn get_or_create(&self, name: &str) -> Collection {
        self.collections
            .entry(name.to_string())
            .or_default()
            .value()
            .clone()
    }

    fn find(
        &self,
        collection: &str,
        filter: &Document,
        options: &FindOptions,
    ) -> VellumResult<Vec<Document>> {
        log::debug!(
            "find on {} with filter {} (skip {}, limit {})",
            collection,
            filter,
            options.skip_count(),
            options.limit_count()
        );
        let Some(documents) = self.existing(collection) else {
            return Ok(Vec::new());
        };

        let guard = documents.read();
        let mut found = Vec::new();
        for document in guard.iter() {
            if matches(document, filter)? {
                found.push(document.clone());
            }
        }
        drop(guard);

        sort_documents(&mut found, options.sortable_fields());
        let skip = usize::try_from(options.skip_count()).unwrap_or(usize::MAX);
        let iter = found.into_iter().skip(skip);
        Ok(match options.limit_count() {
            0 => iter.collect(),
            limit => iter.take(usize::try_from(limit).unwrap_or(usize::MAX)).collect(),
        })
    }

    fn count(&self, collection: &str, filter: &Document, limit: u64) -> VellumResult<u64> {
        let Some(documents) = self.existing(collection) else {
            return Ok(0);
        };

        let guard = documents.read();
        let mut count = 0u64;
        for document in guard.iter() {
            if limit != 0 && count >= limit {
                break;
            }
            if matches(document, filter)? {
                count += 1;
            }
        }
        Ok(count)
    }

    fn insert_one(&self, collection: &str, document: Document) -> VellumResult<Bson> {
        let document = if document.contains_key(DOC_ID) {
            document
        } else {
            let mut with_id = Document::new();
            with_id.insert(DOC_ID, ObjectId::new());
            for (key, value) in document {
                with_id.insert(key, value);
            }
            with_id
        };
        let id = document.get(DOC_ID).cloned().unwrap_or(Bson::Null);

        let documents = self.get_or_create(collection);
        let mut guard = documents.write();
        let duplicate = guard
            .iter()
            .any(|existing| existing.get(DOC_ID).is_some_and(|other| values_equal(other, &id)));
        if duplicate {
            log::error!("Duplicate {} {} in collection {}", DOC_ID, id, collection);
            return Err(VellumError::new(
                &format!("Duplicate {} {} in collection {}", DOC_ID, id, collection),
                ErrorKind::UniqueConstraintViolation,
            ));
        }

        log::debug!("insert into {} with {} {}", collection, DOC_ID, id);
        guard.push(document);
        Ok(id)
    }

    fn update_one(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
    ) -> VellumResult<UpdateResult> {
        log::debug!("update_one on {} with filter {}", collection, filter);
        let Some(documents) = self.existing(collection) else {
            return Ok(UpdateResult::default());
        };

        let mut guard = documents.write();
        for document in guard.iter_mut() {
            if matches(document, filter)? {
                let modified = apply_update(document, update)?;
                return Ok(UpdateResult {
                    matched_count: 1,
                    modified_count: u64::from(modified),
                });
            }
        }
        Ok(UpdateResult::default())
    }

    fn replace_one(
        &self,
        collection: &str,
        filter: &Document,
        replacement: Document,
    ) -> VellumResult<UpdateResult> {
        log::debug!("replace_one on {} with filter {}", collection, filter);
        let Some(documents) = self.existing(collection) else {
            return Ok(UpdateResult::default());
        };

        let mut guard = documents.write();
        for document in guard.iter_mut() {
            if !matches(document, filter)? {
                continue;
            }

            let id = document.get(DOC_ID).cloned().unwrap_or(Bson::Null);
            if let Some(other) = replacement.get(DOC_ID) {
                if !values_equal(other, &id) {
                    log::error!("Replacement for {} {} changes it to {}", DOC_ID, id, other);
                    return Err(VellumError::new(
                        &format!("Replacement cannot change {} {} to {}", DOC_ID, id, other),
                        ErrorKind::InvalidOperation,
                    ));
                }
            }

            let mut replaced = Document::new();
            replaced.insert(DOC_ID, id);
            for (key, value) in replacement {
                if key != DOC_ID {
                    replaced.insert(key, value);
                }
            }
            let modified = replaced != *document;
            *document = replaced;
            return Ok(UpdateResult {
                matched_count: 1,
                modified_count: u64::from(modified),
            });
        }
        Ok(UpdateResult::default())
    }

    fn delete_one(&self, collection: &str, filter: &Document) -> VellumResult<DeleteResult> {
        log::debug!("delete_one on {} with filter {}", collection, filter);
        let Some(documents) = self.existing(collection) else {
            return Ok(DeleteResult::default());
        };

        let mut guard = documents.write();
        let mut position = None;
        for (index, document) in guard.iter().enumerate() {
            if matches(document, filter)? {
                position = Some(index);
                break;
            }
        }

        Ok(match position {
            Some(index) => {
                guard.remove(index);
                DeleteResult { deleted_count: 1 }
            }
            None => DeleteResult::default(),
        })
    }

    fn aggregate(&self, collection: &str, pipeline: &[Document]) -> VellumResult<Vec<Document>> {
        log::debug!("aggregate on {} with {} stages", collection, pipeline.len());
        let documents = match self.existing(collection) {
            Some(documents) => documents.read().clone(),
            None => Vec::new(),
        };
        run_pipeline(documents, pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::SortOrder;
    use bson::doc;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        for n in 0..10 {
            store
                .insert_one("numbers", doc! { "_id": n, "n": n, "even": n % 2 == 0 })
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_find_with_sort_skip_limit() {
        let store = seeded().await;
        let options = FindOptions::new()
            .sort_by("n", SortOrder::Descending)
            .skip(2)
            .limit(3);
        let found = store.find("numbers", doc! {}, options).await.unwrap();
        let values: Vec<i32> = found.iter().map(|d| d.get_i32("n").unwrap()).collect();
        assert_eq!(values, vec![7, 6, 5]);
    }

    #[tokio::test]
    async fn test_find_without_sort_keeps_insertion_order() {
        let store = seeded().await;
        let found = store
            .find("numbers", doc! { "even": true }, FindOptions::new())
            .await
            .unwrap();
        let values: Vec<i32> = found.iter().map(|d| d.get_i32("n").unwrap()).collect();
        assert_eq!(values, vec![0, 2, 4, 6, 8]);
    }

    #[tokio::test]
    async fn test_missing_collection_reads_empty() {
        let store = MemoryStore::new();
        assert!(store.find("nothing", doc! {}, FindOptions::new()).await.unwrap().is_empty());
        assert_eq!(store.count("nothing", doc! {}, 0).await.unwrap(), 0);
        assert!(store.find_one("nothing", doc! {}).await.unwrap().is_none());
        assert!(store.collection_names().is_empty());
    }

    #[tokio::test]
    async fn test_count_honours_limit() {
        let store = seeded().await;
        assert_eq!(store.count("numbers", doc! {}, 0).await.unwrap(), 10);
        assert_eq!(store.count("numbers", doc! {}, 1).await.unwrap(), 1);
        assert_eq!(
            store.count("numbers", doc! { "n": { "$gte": 8 } }, 0).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let store = seeded().await;
        let err = store
            .insert_one("numbers", doc! { "_id": 3i64 })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::UniqueConstraintViolation);
    }

    #[tokio::test]
    async fn test_insert_generates_missing_id() {
        let store = MemoryStore::new();
        let id = store.insert_one("notes", doc! { "text": "x" }).await.unwrap();
        assert!(matches!(id, Bson::ObjectId(_)));
        let found = store.find_one("notes", doc! { "_id": id }).await.unwrap().unwrap();
        assert_eq!(found.keys().next().map(String::as_str), Some("_id"));
    }

    #[tokio::test]
    async fn test_conditional_update_matches_once() {
        let store = MemoryStore::new();
        store
            .insert_one("items", doc! { "_id": 1, "version": 0i64, "name": "a" })
            .await
            .unwrap();

        let update = doc! { "$set": { "name": "b" }, "$inc": { "version": 1i64 } };
        let first = store
            .update_one("items", doc! { "_id": 1, "version": 0i64 }, update.clone())
            .await
            .unwrap();
        assert_eq!(first, UpdateResult { matched_count: 1, modified_count: 1 });

        let second = store
            .update_one("items", doc! { "_id": 1, "version": 0i64 }, update)
            .await
            .unwrap();
        assert_eq!(second.matched_count, 0);

        let stored = store.find_one("items", doc! { "_id": 1 }).await.unwrap().unwrap();
        assert_eq!(stored.get_i64("version").ok(), Some(1));
        assert_eq!(stored.get_str("name").ok(), Some("b"));
    }

    #[tokio::test]
    async fn test_concurrent_conditional_updates() {
        let store = MemoryStore::new();
        store
            .insert_one("items", doc! { "_id": 1, "version": 0i64 })
            .await
            .unwrap();

        let mut handles = Vec::new();
        for worker in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update_one(
                        "items",
                        doc! { "_id": 1, "version": 0i64 },
                        doc! { "$set": { "worker": worker }, "$inc": { "version": 1i64 } },
                    )
                    .await
                    .unwrap()
                    .matched_count
            }));
        }

        let mut matched = 0;
        for handle in handles {
            matched += handle.await.unwrap();
        }
        assert_eq!(matched, 1);
    }

    #[tokio::test]
    async fn test_conditional_replace_drops_unwritten_fields() {
        let store = MemoryStore::new();
        store
            .insert_one("items", doc! { "_id": 1, "version": 0i64, "name": "a", "tag": "x" })
            .await
            .unwrap();

        let replacement = doc! { "version": 1i64, "name": "b" };
        let first = store
            .replace_one("items", doc! { "_id": 1, "version": 0i64 }, replacement.clone())
            .await
            .unwrap();
        assert_eq!(first, UpdateResult { matched_count: 1, modified_count: 1 });

        let second = store
            .replace_one("items", doc! { "_id": 1, "version": 0i64 }, replacement)
            .await
            .unwrap();
        assert_eq!(second.matched_count, 0);

        let stored = store.find_one("items", doc! { "_id": 1 }).await.unwrap().unwrap();
        assert_eq!(stored, doc! { "_id": 1, "version": 1i64, "name": "b" });
    }

    #[tokio::test]
    async fn test_replace_keeps_identity() {
        let store = MemoryStore::new();
        store
            .insert_one("items", doc! { "_id": 1, "name": "a" })
            .await
            .unwrap();

        let same = store
            .replace_one("items", doc! { "_id": 1 }, doc! { "name": "a", "_id": 1i64 })
            .await
            .unwrap();
        assert_eq!(same, UpdateResult { matched_count: 1, modified_count: 0 });

        let err = store
            .replace_one("items", doc! { "_id": 1 }, doc! { "_id": 2, "name": "b" })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperation);
        let stored = store.find_one("items", doc! { "_id": 1 }).await.unwrap().unwrap();
        assert_eq!(stored, doc! { "_id": 1, "name": "a" });
    }

    #[tokio::test]
    async fn test_concurrent_conditional_replaces() {
        let store = MemoryStore::new();
        store
            .insert_one("items", doc! { "_id": 1, "version": 0i64 })
            .await
            .unwrap();

        let mut handles = Vec::new();
        for worker in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .replace_one(
                        "items",
                        doc! { "_id": 1, "version": 0i64 },
                        doc! { "version": 1i64, "worker": worker },
                    )
                    .await
                    .unwrap()
                    .matched_count
            }));
        }

        let mut matched = 0;
        for handle in handles {
            matched += handle.await.unwrap();
        }
        assert_eq!(matched, 1);
    }

    #[tokio::test]
    async fn test_delete_one() {
        let store = seeded().await;
        let result = store.delete_one("numbers", doc! { "_id": 4 }).await.unwrap();
        assert_eq!(result.deleted_count, 1);
        let result = store.delete_one("numbers", doc! { "_id": 4 }).await.unwrap();
        assert_eq!(result.deleted_count, 0);
        assert_eq!(store.count("numbers", doc! {}, 0).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_aggregate() {
        let store = seeded().await;
        let results = store
            .aggregate(
                "numbers",
                vec![
                    doc! { "$match": { "n": { "$lt": 6 } } },
                    doc! { "$group": { "_id": "$even", "total": { "$sum": "$n" } } },
                ],
            )
            .await
            .unwrap();
        assert_eq!(
            results,
            vec![
                doc! { "_id": true, "total": 6 },
                doc! { "_id": false, "total": 9 },
            ]
        );
    }
}
