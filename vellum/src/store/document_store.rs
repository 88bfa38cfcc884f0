use async_trait::async_trait;
use bson::{Bson, Document};
use std::ops::Deref;
use std::sync::Arc;

use crate::errors::VellumResult;

use super::{FindOptions, MemoryStore};

/// Outcome of a conditional single-document update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    /// Number of documents that matched the filter, zero or one.
    pub matched_count: u64,
    /// Number of documents whose content changed.
    pub modified_count: u64,
}

/// Outcome of a single-document delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

/// The document store service the repositories talk to.
///
/// A provider owns named collections of documents keyed by `_id`. Filters,
/// update specifications and pipelines are native documents; callers lower
/// their expressions before handing them over.
///
/// # Atomicity
///
/// `update_one` and `replace_one` must match and apply as one indivisible
/// step. The repository relies on this for optimistic concurrency: with a
/// filter on both `_id` and `version`, two concurrent updates of the same
/// version can never both match.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one provider is shared by every
/// repository of a [`Vellum`](crate::vellum::Vellum) handle.
#[async_trait]
pub trait DocumentStoreProvider: Send + Sync {
    /// Returns the documents matching `filter`, paginated and sorted by
    /// `options`. Without sort keys the order is the store's natural order.
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> VellumResult<Vec<Document>>;

    async fn find_one(&self, collection: &str, filter: Document) -> VellumResult<Option<Document>>;

    /// Counts the documents matching `filter`, stopping at `limit` when it is
    /// not zero.
    async fn count(&self, collection: &str, filter: Document, limit: u64) -> VellumResult<u64>;

    /// Inserts a document and returns its `_id`. A duplicate `_id` fails with
    /// `UniqueConstraintViolation`.
    async fn insert_one(&self, collection: &str, document: Document) -> VellumResult<Bson>;

    /// Applies an operator update (`$set`, `$inc`, `$unset`) to the first
    /// document matching `filter`, atomically.
    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> VellumResult<UpdateResult>;

    /// Replaces the first document matching `filter` with `replacement`,
    /// atomically. The stored `_id` is kept; a replacement carrying a
    /// different `_id` fails with `InvalidOperation`.
    async fn replace_one(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
    ) -> VellumResult<UpdateResult>;

    async fn delete_one(&self, collection: &str, filter: Document) -> VellumResult<DeleteResult>;

    /// Runs the stages in order as one request.
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> VellumResult<Vec<Document>>;
}

/// Shared handle to a [`DocumentStoreProvider`].
///
/// Cloning is cheap; all clones talk to the same provider.
#[derive(Clone)]
pub struct DocumentStore {
    inner: Arc<dyn DocumentStoreProvider>,
}

impl DocumentStore {
    pub fn new<T: DocumentStoreProvider + 'static>(inner: T) -> Self {
        DocumentStore {
            inner: Arc::new(inner),
        }
    }
}

impl Default for DocumentStore {
    fn default() -> Self {
        DocumentStore::new(MemoryStore::new())
    }
}

impl Deref for DocumentStore {
    type Target = Arc<dyn DocumentStoreProvider>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
