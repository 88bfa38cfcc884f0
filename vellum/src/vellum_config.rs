//! Configuration of a Vellum handle.

use crate::errors::{ErrorKind, VellumError, VellumResult};
use crate::hooks::{installed, HookRegistry};
use crate::store::DocumentStore;

/// Settings a [`Vellum`](crate::vellum::Vellum) handle is opened with.
///
/// Built through [`VellumBuilder`](crate::vellum_builder::VellumBuilder);
/// unset values fall back to a fresh in-memory store, the process-wide hook
/// registry (or none) and no collection prefix.
#[derive(Clone, Default)]
pub struct VellumConfig {
    store: DocumentStore,
    hooks: Option<HookRegistry>,
    collection_prefix: Option<String>,
}

impl VellumConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn set_store(&mut self, store: DocumentStore) {
        self.store = store;
    }

    /// The hook registry repositories fire.
    ///
    /// An explicitly set registry wins; otherwise the installed process-wide
    /// registry is used, and an empty one when nothing is installed.
    pub fn hooks(&self) -> HookRegistry {
        self.hooks
            .clone()
            .or_else(installed)
            .unwrap_or_else(HookRegistry::empty)
    }

    pub fn set_hooks(&mut self, hooks: HookRegistry) {
        self.hooks = Some(hooks);
    }

    pub fn collection_prefix(&self) -> Option<&str> {
        self.collection_prefix.as_deref()
    }

    /// Sets the namespace prepended to every model's collection name.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the prefix is blank or ends with `$` or
    /// `.`.
    pub fn set_collection_prefix(&mut self, prefix: &str) -> VellumResult<()> {
        if prefix.trim().is_empty() {
            log::error!("Collection prefix cannot be empty");
            return Err(VellumError::new(
                "Collection prefix cannot be empty",
                ErrorKind::InvalidOperation,
            ));
        }

        if prefix.ends_with('$') || prefix.ends_with('.') {
            log::error!("Collection prefix {:?} cannot end with '$' or '.'", prefix);
            return Err(VellumError::new(
                &format!("Collection prefix {:?} cannot end with '$' or '.'", prefix),
                ErrorKind::InvalidOperation,
            ));
        }

        self.collection_prefix = Some(prefix.to_string());
        Ok(())
    }

    /// The full collection name for a model collection `name`.
    pub fn resolve_collection_name(&self, name: &str) -> String {
        match &self.collection_prefix {
            Some(prefix) => format!("{}{}", prefix, name),
            None => name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_validation() {
        let mut config = VellumConfig::new();
        for bad in ["", "  ", "app.", "app$"] {
            let err = config.set_collection_prefix(bad).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::InvalidOperation, "{:?}", bad);
        }
        assert_eq!(config.collection_prefix(), None);

        config.set_collection_prefix("tenant_a_").unwrap();
        assert_eq!(config.collection_prefix(), Some("tenant_a_"));
        assert_eq!(config.resolve_collection_name("book"), "tenant_a_book");
    }

    #[test]
    fn test_no_prefix() {
        let config = VellumConfig::new();
        assert_eq!(config.resolve_collection_name("book"), "book");
    }

    #[test]
    fn test_explicit_hooks_win() {
        let mut config = VellumConfig::new();
        let hooks = HookRegistry::builder()
            .on::<i32, _>(crate::hooks::HookEvent::AfterInsert, |_| Ok(()))
            .build();
        config.set_hooks(hooks);
        assert!(!config.hooks().is_empty());
    }
}
