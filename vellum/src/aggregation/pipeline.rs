use bson::{Bson, Document};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

use crate::common::{SortOrder, SortableFields, DOC_ID};
use crate::errors::{ErrorKind, VellumError, VellumResult};
use crate::filter::Query;
use crate::store::{DocumentStore, DocumentStoreProvider};

use super::{Raw, ResultShape, Shaped, Stage};

/// An aggregation pipeline bound to one collection.
///
/// Stage methods consume and return the pipeline so calls chain; every call
/// appends one stage, even when a stage of the same kind is already present.
/// Nothing reaches the store until [`execute`](Pipeline::execute).
///
/// A stage that cannot be built is not appended; its error is captured and
/// returned by `execute`, the first error winning.
///
/// `T` is the model type of the collection and `S` the declared result shape,
/// [`Raw`] until a shaping stage says otherwise.
pub struct Pipeline<T, S = Raw> {
    store: DocumentStore,
    collection: String,
    stages: Vec<Stage>,
    error: Option<VellumError>,
    _shape: PhantomData<fn() -> (T, S)>,
}

impl<T> Pipeline<T, Raw> {
    pub(crate) fn new(store: DocumentStore, collection: &str) -> Self {
        Pipeline {
            store,
            collection: collection.to_string(),
            stages: Vec::new(),
            error: None,
            _shape: PhantomData,
        }
    }
}

impl<T, S: ResultShape> Pipeline<T, S> {
    /// Appends a `$match` stage. Expressions are lowered right away.
    pub fn filter<Q: Into<Query>>(self, query: Q) -> Self {
        self.push(Stage::Match(query.into().into_filter()))
    }

    /// Appends a `$project` stage, keeping the current result shape.
    pub fn project(self, mapping: Document) -> Self {
        self.push(Stage::Project(mapping))
    }

    /// Appends a `$project` stage and declares `R` as the result shape.
    pub fn project_as<R>(self, mapping: Document) -> Pipeline<T, Shaped<R>>
    where
        R: Serialize + DeserializeOwned + Send + 'static,
    {
        self.push(Stage::Project(mapping)).reshape()
    }

    /// Appends a `$group` stage, keeping the current result shape.
    ///
    /// `key` is the grouping expression, such as `"$customer"` or a document
    /// of field references. `accumulators` maps output fields to one
    /// accumulator each, as in `{ "total": { "$sum": "$amount" } }`. The key
    /// owns `_id`, so an accumulator named `_id` fails with `InvalidOperand`.
    pub fn group<K: Into<Bson>>(self, key: K, accumulators: Document) -> Self {
        if accumulators.contains_key(DOC_ID) {
            log::error!("$group accumulators cannot define {}: {}", DOC_ID, accumulators);
            return self.fail(VellumError::new(
                &format!(
                    "$group accumulators cannot define {}; the grouping key is stored there",
                    DOC_ID
                ),
                ErrorKind::InvalidOperand,
            ));
        }
        self.push(Stage::Group {
            key: key.into(),
            accumulators,
        })
    }

    /// Appends a `$group` stage and declares `R` as the result shape.
    pub fn group_as<R>(self, key: impl Into<Bson>, accumulators: Document) -> Pipeline<T, Shaped<R>>
    where
        R: Serialize + DeserializeOwned + Send + 'static,
    {
        self.group(key, accumulators).reshape()
    }

    /// Appends a `$sort` stage over the given keys, in their order.
    pub fn sort(self, fields: SortableFields) -> Self {
        self.push(Stage::Sort(fields))
    }

    /// Appends a `$sort` stage over a single field.
    pub fn sort_by(self, field_name: &str, sort_order: SortOrder) -> Self {
        self.sort(SortableFields::new().add_sorted_field(field_name, sort_order))
    }

    pub fn skip(self, count: u64) -> Self {
        self.push(Stage::Skip(count))
    }

    /// Appends a `$limit` stage. Stores reject a limit of zero.
    pub fn limit(self, count: u64) -> Self {
        self.push(Stage::Limit(count))
    }

    /// The stages appended so far, in order.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// The native request [`execute`](Pipeline::execute) will send.
    pub fn to_pipeline(&self) -> Vec<Document> {
        self.stages.iter().map(Stage::to_document).collect()
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    /// Sends every stage as one aggregate request and coerces the results.
    ///
    /// Fails without contacting the store when a stage could not be built.
    /// If a single result does not fit the declared shape, the whole call
    /// fails and no partial result is returned.
    pub async fn execute(self) -> VellumResult<Vec<S::Output>> {
        if let Some(e) = self.error {
            return Err(e);
        }

        let request = self.to_pipeline();
        log::debug!(
            "Executing {} stage pipeline on {}",
            request.len(),
            self.collection
        );

        let documents = self.store.aggregate(&self.collection, request).await?;
        documents.into_iter().map(S::coerce).collect()
    }

    fn push(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    fn fail(mut self, error: VellumError) -> Self {
        if self.error.is_none() {
            self.error = Some(error);
        }
        self
    }

    fn reshape<N: ResultShape>(self) -> Pipeline<T, N> {
        Pipeline {
            store: self.store,
            collection: self.collection,
            stages: self.stages,
            error: self.error,
            _shape: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::filter::field;
    use bson::doc;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Total {
        #[serde(rename = "_id")]
        customer: String,
        total: i64,
    }

    struct Order;

    async fn seeded() -> DocumentStore {
        let store = DocumentStore::default();
        for (id, customer, amount) in [(1, "ada", 10i64), (2, "bob", 5), (3, "ada", 7)] {
            store
                .insert_one(
                    "orders",
                    doc! { "_id": id, "customer": customer, "amount": amount },
                )
                .await
                .unwrap();
        }
        store
    }

    #[test]
    fn test_stage_order_is_append_order() {
        let pipeline: Pipeline<Order> = Pipeline::new(DocumentStore::default(), "orders")
            .limit(5)
            .filter(field("a").eq(1))
            .skip(1)
            .sort_by("a", SortOrder::Ascending)
            .filter(doc! { "b": 2 })
            .project(doc! { "a": 1 })
            .group("$a", doc! { "n": { "$count": {} } })
            .limit(1);

        let names: Vec<&str> = pipeline.stages().iter().map(Stage::name).collect();
        assert_eq!(
            names,
            vec!["$limit", "$match", "$skip", "$sort", "$match", "$project", "$group", "$limit"]
        );
        let request = pipeline.to_pipeline();
        assert_eq!(request.len(), 8);
        assert_eq!(request[1], doc! { "$match": { "a": 1 } });
        assert_eq!(request[4], doc! { "$match": { "b": 2 } });
    }

    #[tokio::test]
    async fn test_execute_raw() {
        let results = Pipeline::<Order>::new(seeded().await, "orders")
            .filter(field("customer").eq("ada"))
            .sort_by("amount", SortOrder::Ascending)
            .execute()
            .await
            .unwrap();
        let ids: Vec<i32> = results.iter().map(|d| d.get_i32("_id").unwrap()).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[tokio::test]
    async fn test_execute_shaped() {
        let totals = Pipeline::<Order>::new(seeded().await, "orders")
            .group_as::<Total>("$customer", doc! { "total": { "$sum": "$amount" } })
            .sort_by("total", SortOrder::Descending)
            .execute()
            .await
            .unwrap();
        assert_eq!(
            totals,
            vec![
                Total { customer: "ada".into(), total: 17 },
                Total { customer: "bob".into(), total: 5 },
            ]
        );
    }

    #[tokio::test]
    async fn test_group_rejects_id_accumulator() {
        let pipeline = Pipeline::<Order>::new(seeded().await, "orders")
            .group("$customer", doc! { "_id": 1, "n": { "$count": {} } })
            .limit(5);
        assert_eq!(pipeline.stages().len(), 1);
        let err = pipeline.execute().await.unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperand);
        assert!(err.message().contains("_id"));

        let err = Pipeline::<Order>::new(seeded().await, "orders")
            .group_as::<Total>(
                "$customer",
                doc! { "_id": "$amount", "total": { "$sum": "$amount" } },
            )
            .execute()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperand);
    }

    #[tokio::test]
    async fn test_shape_mismatch_fails_whole_execution() {
        let err = Pipeline::<Order>::new(seeded().await, "orders")
            .project_as::<Total>(doc! { "_id": "$customer", "total": "$amount", "extra": "x" })
            .execute()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ObjectMappingError);
    }
}
