use crate::errors::{VellumError, VellumResult};
use crate::hooks::HookRegistry;
use crate::store::{DocumentStore, DocumentStoreProvider};
use crate::vellum::Vellum;
use crate::vellum_config::VellumConfig;

/// Builder for a [`Vellum`] handle.
///
/// Configuration errors are captured as they happen and reported by
/// [`open`](VellumBuilder::open); the first error wins.
///
/// # Examples
///
/// ```rust,ignore
/// let vellum = Vellum::builder()
///     .store(MemoryStore::new())
///     .hooks(registry)
///     .collection_prefix("billing_")
///     .open()?;
/// ```
#[derive(Default)]
pub struct VellumBuilder {
    error: Option<VellumError>,
    config: VellumConfig,
}

impl VellumBuilder {
    pub fn new() -> Self {
        VellumBuilder {
            error: None,
            config: VellumConfig::new(),
        }
    }

    /// Sets the store service. Defaults to a fresh in-memory store.
    pub fn store<S: DocumentStoreProvider + 'static>(mut self, store: S) -> Self {
        self.config.set_store(DocumentStore::new(store));
        self
    }

    /// Sets an existing store handle, sharing it with other handles.
    pub fn store_handle(mut self, store: DocumentStore) -> Self {
        self.config.set_store(store);
        self
    }

    /// Sets the hook registry, overriding any installed process-wide one.
    pub fn hooks(mut self, hooks: HookRegistry) -> Self {
        self.config.set_hooks(hooks);
        self
    }

    /// Prepends `prefix` to every model's collection name.
    ///
    /// A blank prefix, or one ending in `$` or `.`, is captured and reported
    /// by `open()`.
    pub fn collection_prefix(mut self, prefix: &str) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.set_collection_prefix(prefix) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Opens the handle.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error captured by the builder.
    pub fn open(self) -> VellumResult<Vellum> {
        if let Some(e) = self.error {
            return Err(e);
        }
        log::debug!(
            "Opening vellum with collection prefix {:?}",
            self.config.collection_prefix()
        );
        Ok(Vellum::new(self.config))
    }
}
