use async_trait::async_trait;
use bson::{Bson, Document};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use vellum::common::INITIAL_VERSION;
use vellum::errors::VellumResult;
use vellum::hooks::HookRegistry;
use vellum::model::Model;
use vellum::store::{
    DeleteResult, DocumentStoreProvider, FindOptions, MemoryStore, UpdateResult,
};
use vellum::vellum::Vellum;

/// A handle over a recording in-memory store.
#[derive(Clone)]
pub struct TestContext {
    vellum: Vellum,
    store: RecordingStore,
}

impl TestContext {
    pub fn vellum(&self) -> Vellum {
        self.vellum.clone()
    }

    pub fn store(&self) -> RecordingStore {
        self.store.clone()
    }
}

pub fn create_test_context() -> VellumResult<TestContext> {
    create_test_context_with_hooks(HookRegistry::empty())
}

pub fn create_test_context_with_hooks(hooks: HookRegistry) -> VellumResult<TestContext> {
    let store = RecordingStore::new();
    let vellum = Vellum::builder()
        .store(store.clone())
        .hooks(hooks)
        .open()?;
    Ok(TestContext { vellum, store })
}

/// A request as the store received it.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreRequest {
    Find {
        collection: String,
        filter: Document,
        options: FindOptions,
    },
    FindOne {
        collection: String,
        filter: Document,
    },
    Count {
        collection: String,
        filter: Document,
    },
    Insert {
        collection: String,
        document: Document,
    },
    Update {
        collection: String,
        filter: Document,
        update: Document,
    },
    Replace {
        collection: String,
        filter: Document,
        replacement: Document,
    },
    Delete {
        collection: String,
        filter: Document,
    },
    Aggregate {
        collection: String,
        pipeline: Vec<Document>,
    },
}

/// A [`MemoryStore`] that keeps a log of every request it serves.
#[derive(Clone, Default)]
pub struct RecordingStore {
    backend: MemoryStore,
    requests: Arc<Mutex<Vec<StoreRequest>>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<StoreRequest> {
        self.requests.lock().clone()
    }

    /// The pipelines of every aggregate request, in arrival order.
    pub fn aggregate_requests(&self) -> Vec<Vec<Document>> {
        self.requests
            .lock()
            .iter()
            .filter_map(|request| match request {
                StoreRequest::Aggregate { pipeline, .. } => Some(pipeline.clone()),
                _ => None,
            })
            .collect()
    }

    /// The filter and replacement of every replace request.
    pub fn replace_requests(&self) -> Vec<(Document, Document)> {
        self.requests
            .lock()
            .iter()
            .filter_map(|request| match request {
                StoreRequest::Replace {
                    filter,
                    replacement,
                    ..
                } => Some((filter.clone(), replacement.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.requests.lock().clear();
    }

    fn record(&self, request: StoreRequest) {
        self.requests.lock().push(request);
    }
}

#[async_trait]
impl DocumentStoreProvider for RecordingStore {
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> VellumResult<Vec<Document>> {
        self.record(StoreRequest::Find {
            collection: collection.to_string(),
            filter: filter.clone(),
            options: options.clone(),
        });
        self.backend.find(collection, filter, options).await
    }

    async fn find_one(&self, collection: &str, filter: Document) -> VellumResult<Option<Document>> {
        self.record(StoreRequest::FindOne {
            collection: collection.to_string(),
            filter: filter.clone(),
        });
        self.backend.find_one(collection, filter).await
    }

    async fn count(&self, collection: &str, filter: Document, limit: u64) -> VellumResult<u64> {
        self.record(StoreRequest::Count {
            collection: collection.to_string(),
            filter: filter.clone(),
        });
        self.backend.count(collection, filter, limit).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> VellumResult<Bson> {
        self.record(StoreRequest::Insert {
            collection: collection.to_string(),
            document: document.clone(),
        });
        self.backend.insert_one(collection, document).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> VellumResult<UpdateResult> {
        self.record(StoreRequest::Update {
            collection: collection.to_string(),
            filter: filter.clone(),
            update: update.clone(),
        });
        self.backend.update_one(collection, filter, update).await
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
    ) -> VellumResult<UpdateResult> {
        self.record(StoreRequest::Replace {
            collection: collection.to_string(),
            filter: filter.clone(),
            replacement: replacement.clone(),
        });
        self.backend.replace_one(collection, filter, replacement).await
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> VellumResult<DeleteResult> {
        self.record(StoreRequest::Delete {
            collection: collection.to_string(),
            filter: filter.clone(),
        });
        self.backend.delete_one(collection, filter).await
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> VellumResult<Vec<Document>> {
        self.record(StoreRequest::Aggregate {
            collection: collection.to_string(),
            pipeline: pipeline.clone(),
        });
        self.backend.aggregate(collection, pipeline).await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: Uuid,
    pub version: i64,
    pub title: String,
    pub author: String,
    pub year: i32,
    pub copies: i64,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    pub fn new(title: &str, author: &str, year: i32) -> Self {
        let now = Utc::now();
        Book {
            id: Uuid::new_v4(),
            version: INITIAL_VERSION,
            title: title.to_string(),
            author: author.to_string(),
            year,
            copies: 1,
            tags: Vec::new(),
            subtitle: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Model for Book {
    fn id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub version: i64,
    pub customer: String,
    pub amount: i64,
    pub status: String,
    pub placed_at: DateTime<Utc>,
}

impl Order {
    pub fn new(customer: &str, amount: i64) -> Self {
        Order {
            id: Uuid::new_v4(),
            version: INITIAL_VERSION,
            customer: customer.to_string(),
            amount,
            status: "open".to_string(),
            placed_at: Utc::now(),
        }
    }
}

impl Model for Order {
    fn id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }
}

/// Per-customer totals as produced by a `$group` on `customer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerTotal {
    #[serde(rename = "_id")]
    pub customer: String,
    pub total: i64,
    pub orders: i64,
}
