use std::sync::Arc;

use crate::hooks::HookRegistry;
use crate::model::Model;
use crate::repository::Repository;
use crate::store::DocumentStore;
use crate::vellum_builder::VellumBuilder;
use crate::vellum_config::VellumConfig;

/// Entry point: a store service bound to a hook registry.
///
/// A `Vellum` hands out [`Repository`] values for model types. Clones share
/// the same store and hooks, so a handle can be passed freely across tasks.
///
/// # Examples
///
/// ```rust,ignore
/// let vellum = Vellum::builder().open()?;
/// let books = vellum.repository::<Book>();
/// let book = books.create(Book::new("Dune")).await?;
/// ```
#[derive(Clone)]
pub struct Vellum {
    inner: Arc<VellumInner>,
}

struct VellumInner {
    config: VellumConfig,
    hooks: HookRegistry,
}

impl Vellum {
    pub fn builder() -> VellumBuilder {
        VellumBuilder::new()
    }

    pub(crate) fn new(config: VellumConfig) -> Self {
        let hooks = config.hooks();
        Vellum {
            inner: Arc::new(VellumInner { config, hooks }),
        }
    }

    /// Returns a repository for `T` over `prefix + T::collection_name()`.
    pub fn repository<T: Model>(&self) -> Repository<T> {
        let name = self
            .inner
            .config
            .resolve_collection_name(&T::collection_name());
        Repository::new(name, self.store().clone(), self.inner.hooks.clone())
    }

    pub fn store(&self) -> &DocumentStore {
        self.inner.config.store()
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.inner.hooks
    }

    pub fn config(&self) -> &VellumConfig {
        &self.inner.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Invoice {
        id: Uuid,
        version: i64,
        total: i64,
    }

    impl Model for Invoice {
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

    #[test]
    fn test_repository_collection_name() {
        let vellum = Vellum::builder().open().unwrap();
        assert_eq!(vellum.repository::<Invoice>().collection_name(), "invoice");

        let vellum = Vellum::builder().collection_prefix("billing_").open().unwrap();
        assert_eq!(
            vellum.repository::<Invoice>().collection_name(),
            "billing_invoice"
        );
    }

    #[tokio::test]
    async fn test_repositories_share_the_store() {
        let vellum = Vellum::builder().open().unwrap();
        let invoice = Invoice {
            id: Uuid::new_v4(),
            version: 0,
            total: 12,
        };
        vellum.repository::<Invoice>().create(invoice.clone()).await.unwrap();

        let other = vellum.clone().repository::<Invoice>();
        assert_eq!(other.get(invoice.id).await.unwrap(), invoice);
    }
}
