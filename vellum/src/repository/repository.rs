use bson::Document;
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

use crate::aggregation::Pipeline;
use crate::common::{DOC_ID, VERSION_FIELD};
use crate::errors::{ErrorKind, VellumError, VellumResult};
use crate::filter::Query;
use crate::hooks::{HookEvent, HookRegistry};
use crate::model::{from_document, to_document, uuid_to_bson, DocumentId, Model};
use crate::store::{DocumentStore, DocumentStoreProvider, FindOptions};

/// A typed repository over one collection.
///
/// `Repository<T>` maps values of the model type `T` to documents and back,
/// fires lifecycle hooks around writes, and guards updates with the model's
/// version counter.
///
/// # Optimistic Concurrency
///
/// [`update`](Repository::update) is a single conditional write: the store
/// matches on both the identity and the version the caller read and replaces
/// the whole document with the item's encoding at the next version,
/// atomically. Fields the item no longer writes are gone afterwards.
/// When nothing matches, the repository tells a missing document
/// (`DocumentNotFound`) apart from a stale version (`OptimisticLockConflict`).
/// There is no retry; the caller decides.
///
/// # Thread Safety
///
/// Clones share the same store and hook table and can be moved across tasks.
///
/// # Usage
/// ```ignore
/// let books = vellum.repository::<Book>();
/// let book = books.create(Book::new("Dune")).await?;
/// let mut copy = books.get(book.id).await?;
/// copy.title = "Dune Messiah".into();
/// let copy = books.update(book.id, copy).await?;
/// assert_eq!(copy.version, 1);
/// ```
pub struct Repository<T: Model> {
    inner: Arc<RepositoryInner<T>>,
}

struct RepositoryInner<T> {
    collection_name: String,
    store: DocumentStore,
    hooks: HookRegistry,
    _phantom: PhantomData<fn() -> T>,
}

impl<T: Model> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Repository {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Model> Repository<T> {
    pub(crate) fn new(collection_name: String, store: DocumentStore, hooks: HookRegistry) -> Self {
        Repository {
            inner: Arc::new(RepositoryInner {
                collection_name,
                store,
                hooks,
                _phantom: PhantomData,
            }),
        }
    }

    /// Name of the backing collection.
    pub fn collection_name(&self) -> &str {
        &self.inner.collection_name
    }

    /// Stores a new item.
    ///
    /// `before_insert` hooks run first and may adjust the item; the written
    /// document is what they leave behind. `after_insert` hooks run after a
    /// successful write. A duplicate identity fails with
    /// `UniqueConstraintViolation`.
    pub async fn create(&self, mut item: T) -> VellumResult<T> {
        self.inner
            .hooks
            .fire(HookEvent::BeforeInsert, &mut item)
            .await?;

        let document = to_document(&item)?;
        log::debug!("Inserting {} into {}", item.id(), self.collection_name());
        self.inner
            .store
            .insert_one(self.collection_name(), document)
            .await?;

        self.inner
            .hooks
            .fire(HookEvent::AfterInsert, &mut item)
            .await?;
        Ok(item)
    }

    /// Type-erased [`create`](Repository::create).
    ///
    /// Fails with `ValidationError` when `item` is not a `T`.
    pub async fn create_dyn(&self, item: Box<dyn Any + Send>) -> VellumResult<T> {
        let item = self.downcast(item)?;
        self.create(item).await
    }

    /// Fetches the item with the given identity.
    ///
    /// Fails with `InvalidIdentifier` when `id` does not normalize and with
    /// `DocumentNotFound` when nothing is stored under it.
    pub async fn get<I: Into<DocumentId>>(&self, id: I) -> VellumResult<T> {
        let uuid = id.into().to_uuid()?;
        match self
            .inner
            .store
            .find_one(self.collection_name(), identity_filter(uuid))
            .await?
        {
            Some(document) => from_document(document),
            None => Err(self.not_found(uuid)),
        }
    }

    /// Writes `item` over the stored document with identity `id`, provided
    /// the stored version still equals `item.version()`.
    ///
    /// `before_update` hooks run before the write and may change any field
    /// except the version, which is matched as it was passed in. On success
    /// the item's version is advanced by one, `after_update` hooks run, and
    /// the item is returned. `item` must carry the identity it is written under,
    /// otherwise the call fails with `ValidationError`.
    pub async fn update<I: Into<DocumentId>>(&self, id: I, mut item: T) -> VellumResult<T> {
        let uuid = id.into().to_uuid()?;
        if item.id() != uuid {
            log::error!(
                "Cannot update {} with an item whose identity is {}",
                uuid,
                item.id()
            );
            return Err(VellumError::new(
                &format!(
                    "Cannot update {} with an item whose identity is {}",
                    uuid,
                    item.id()
                ),
                ErrorKind::ValidationError,
            ));
        }

        let expected = item.version();
        self.inner
            .hooks
            .fire(HookEvent::BeforeUpdate, &mut item)
            .await?;
        if item.version() != expected {
            log::warn!(
                "Before update hook changed the version of {} from {} to {}; restoring it",
                uuid,
                expected,
                item.version()
            );
            item.set_version(expected);
        }

        let mut filter = identity_filter(uuid);
        filter.insert(VERSION_FIELD, expected);
        let mut replacement = to_document(&item)?;
        replacement.insert(VERSION_FIELD, expected + 1);

        let result = self
            .inner
            .store
            .replace_one(self.collection_name(), filter, replacement)
            .await?;

        if result.matched_count == 0 {
            let exists = self
                .inner
                .store
                .count(self.collection_name(), identity_filter(uuid), 1)
                .await?
                > 0;
            if !exists {
                return Err(self.not_found(uuid));
            }

            log::warn!(
                "Optimistic lock conflict on {} {}: version {} is stale",
                self.collection_name(),
                uuid,
                expected
            );
            return Err(VellumError::new(
                &format!(
                    "Document {} in {} was modified concurrently; version {} is stale",
                    uuid,
                    self.collection_name(),
                    expected
                ),
                ErrorKind::OptimisticLockConflict {
                    id: uuid.to_string(),
                    version: expected,
                },
            ));
        }

        item.set_version(expected + 1);
        self.inner
            .hooks
            .fire(HookEvent::AfterUpdate, &mut item)
            .await?;
        Ok(item)
    }

    /// Type-erased [`update`](Repository::update).
    pub async fn update_dyn<I: Into<DocumentId>>(
        &self,
        id: I,
        item: Box<dyn Any + Send>,
    ) -> VellumResult<T> {
        let id = id.into();
        let item = self.downcast(item)?;
        self.update(id, item).await
    }

    /// Removes the item with the given identity.
    ///
    /// The current item is fetched first and handed to the `before_delete`
    /// and `after_delete` hooks. Fails with `DocumentNotFound` when there is
    /// nothing to delete, including when a concurrent delete got there first.
    pub async fn delete<I: Into<DocumentId>>(&self, id: I) -> VellumResult<()> {
        let uuid = id.into().to_uuid()?;
        let mut current = self.get(uuid).await?;

        self.inner
            .hooks
            .fire(HookEvent::BeforeDelete, &mut current)
            .await?;

        let result = self
            .inner
            .store
            .delete_one(self.collection_name(), identity_filter(uuid))
            .await?;
        if result.deleted_count == 0 {
            return Err(self.not_found(uuid));
        }

        self.inner
            .hooks
            .fire(HookEvent::AfterDelete, &mut current)
            .await?;
        Ok(())
    }

    /// Returns the items matching `query`.
    ///
    /// `query` is a native filter document or a query expression; use
    /// [`all()`](crate::filter::all) to match everything. Results come in
    /// store order unless `options` carries sort keys.
    pub async fn find<Q: Into<Query>>(&self, query: Q, options: FindOptions) -> VellumResult<Vec<T>> {
        let filter = query.into().into_filter();
        let documents = self
            .inner
            .store
            .find(self.collection_name(), filter, options)
            .await?;
        documents.into_iter().map(from_document).collect()
    }

    pub async fn find_one<Q: Into<Query>>(&self, query: Q) -> VellumResult<Option<T>> {
        let filter = query.into().into_filter();
        self.inner
            .store
            .find_one(self.collection_name(), filter)
            .await?
            .map(from_document)
            .transpose()
    }

    pub async fn count<Q: Into<Query>>(&self, query: Q) -> VellumResult<u64> {
        let filter = query.into().into_filter();
        self.inner
            .store
            .count(self.collection_name(), filter, 0)
            .await
    }

    /// Starts an empty aggregation pipeline over this collection.
    pub fn aggregate(&self) -> Pipeline<T> {
        Pipeline::new(self.inner.store.clone(), self.collection_name())
    }

    fn downcast(&self, item: Box<dyn Any + Send>) -> VellumResult<T> {
        item.downcast::<T>().map(|item| *item).map_err(|_| {
            log::error!(
                "Repository for {} received an item of another type",
                std::any::type_name::<T>()
            );
            VellumError::new(
                &format!(
                    "Repository for {} cannot store an item of another type",
                    std::any::type_name::<T>()
                ),
                ErrorKind::ValidationError,
            )
        })
    }

    fn not_found(&self, uuid: Uuid) -> VellumError {
        log::error!("No document {} in {}", uuid, self.collection_name());
        VellumError::new(
            &format!("No document {} in {}", uuid, self.collection_name()),
            ErrorKind::DocumentNotFound {
                id: uuid.to_string(),
            },
        )
    }
}

fn identity_filter(uuid: Uuid) -> Document {
    let mut filter = Document::new();
    filter.insert(DOC_ID, uuid_to_bson(uuid));
    filter
}
