use once_cell::sync::OnceCell;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{ErrorKind, VellumError, VellumResult};

use super::{Hook, HookEvent};

static INSTALLED: OnceCell<HookRegistry> = OnceCell::new();

/// Installs the process-wide hook registry.
///
/// Installation happens once, at startup, before any [`Vellum`](crate::vellum::Vellum)
/// handle is opened. A second call fails with `InvalidOperation`.
pub fn install(registry: HookRegistry) -> VellumResult<()> {
    INSTALLED.set(registry).map_err(|_| {
        log::error!("A hook registry is already installed");
        VellumError::new(
            "A hook registry is already installed",
            ErrorKind::InvalidOperation,
        )
    })
}

/// The process-wide registry, if one was installed.
pub fn installed() -> Option<HookRegistry> {
    INSTALLED.get().cloned()
}

struct TypeHooks<T> {
    by_event: HashMap<HookEvent, Vec<Hook<T>>>,
}

impl<T> Default for TypeHooks<T> {
    fn default() -> Self {
        TypeHooks {
            by_event: HashMap::new(),
        }
    }
}

/// Collects hook registrations and freezes them into a [`HookRegistry`].
///
/// # Usage
/// ```ignore
/// let registry = HookRegistry::builder()
///     .on::<Book, _>(HookEvent::BeforeInsert, |book| {
///         book.title = book.title.trim().to_string();
///         Ok(())
///     })
///     .register::<Book>(HookEvent::BeforeUpdate, Hook::new(StampUpdated))
///     .build();
/// ```
#[derive(Default)]
pub struct HookRegistryBuilder {
    hooks: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl HookRegistryBuilder {
    pub fn new() -> Self {
        HookRegistryBuilder::default()
    }

    /// Appends a hook for type `T` at `event`. Hooks run in the order they
    /// were registered.
    pub fn register<T: Send + 'static>(mut self, event: HookEvent, hook: Hook<T>) -> Self {
        let slot = self
            .hooks
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(TypeHooks::<T>::default()));

        if let Some(type_hooks) = slot.downcast_mut::<TypeHooks<T>>() {
            type_hooks.by_event.entry(event).or_default().push(hook);
        }
        self
    }

    /// Appends a synchronous closure hook for type `T` at `event`.
    pub fn on<T, F>(self, event: HookEvent, callback: F) -> Self
    where
        T: Send + 'static,
        F: Fn(&mut T) -> VellumResult<()> + Send + Sync + 'static,
    {
        self.register(event, Hook::from_fn(callback))
    }

    pub fn build(self) -> HookRegistry {
        HookRegistry {
            inner: Arc::new(self.hooks),
        }
    }
}

/// An immutable table of hooks keyed by item type and event.
///
/// Hooks registered for one type are never visible to another. Cloning is
/// cheap and every clone sees the same table.
#[derive(Clone, Default)]
pub struct HookRegistry {
    inner: Arc<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl HookRegistry {
    pub fn builder() -> HookRegistryBuilder {
        HookRegistryBuilder::new()
    }

    /// An empty registry.
    pub fn empty() -> Self {
        HookRegistry::default()
    }

    /// The hooks of type `T` at `event`, in registration order.
    pub fn hooks<T: Send + 'static>(&self, event: HookEvent) -> &[Hook<T>] {
        self.inner
            .get(&TypeId::of::<T>())
            .and_then(|slot| slot.downcast_ref::<TypeHooks<T>>())
            .and_then(|type_hooks| type_hooks.by_event.get(&event))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Runs the hooks of type `T` at `event` against `item`, one after the
    /// other. The first failure stops the chain and is returned unchanged.
    pub async fn fire<T: Send + 'static>(&self, event: HookEvent, item: &mut T) -> VellumResult<()> {
        let hooks = self.hooks::<T>(event);
        if !hooks.is_empty() {
            log::debug!(
                "Firing {} {} hook(s) for {}",
                hooks.len(),
                event,
                std::any::type_name::<T>()
            );
        }
        for hook in hooks {
            hook.call(item).await?;
        }
        Ok(())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, Default)]
    struct Note {
        trail: Vec<String>,
    }

    #[derive(Debug, Default)]
    struct Other {
        touched: bool,
    }

    #[tokio::test]
    async fn test_hooks_run_in_registration_order() {
        let registry = HookRegistry::builder()
            .on::<Note, _>(HookEvent::BeforeInsert, |note| {
                note.trail.push("first".into());
                Ok(())
            })
            .on::<Note, _>(HookEvent::BeforeInsert, |note| {
                note.trail.push("second".into());
                Ok(())
            })
            .on::<Note, _>(HookEvent::AfterInsert, |note| {
                note.trail.push("after".into());
                Ok(())
            })
            .build();

        let mut note = Note::default();
        registry.fire(HookEvent::BeforeInsert, &mut note).await.unwrap();
        assert_eq!(note.trail, vec!["first", "second"]);
        registry.fire(HookEvent::AfterInsert, &mut note).await.unwrap();
        assert_eq!(note.trail, vec!["first", "second", "after"]);
    }

    #[tokio::test]
    async fn test_failure_stops_the_chain() {
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let registry = HookRegistry::builder()
            .on::<Note, _>(HookEvent::BeforeDelete, |_| {
                Err(VellumError::new("no deletes today", ErrorKind::HookError))
            })
            .on::<Note, _>(HookEvent::BeforeDelete, move |_| {
                *counter.lock() += 1;
                Ok(())
            })
            .build();

        let err = registry
            .fire(HookEvent::BeforeDelete, &mut Note::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::HookError);
        assert_eq!(err.message(), "no deletes today");
        assert_eq!(*calls.lock(), 0);
    }

    #[tokio::test]
    async fn test_no_leak_between_types() {
        let registry = HookRegistry::builder()
            .on::<Note, _>(HookEvent::BeforeUpdate, |note| {
                note.trail.push("note".into());
                Ok(())
            })
            .build();

        assert_eq!(registry.hooks::<Note>(HookEvent::BeforeUpdate).len(), 1);
        assert!(registry.hooks::<Other>(HookEvent::BeforeUpdate).is_empty());
        assert!(registry.hooks::<Note>(HookEvent::AfterUpdate).is_empty());

        let mut other = Other::default();
        registry.fire(HookEvent::BeforeUpdate, &mut other).await.unwrap();
        assert!(!other.touched);
    }

    #[test]
    fn test_empty_registry() {
        assert!(HookRegistry::empty().is_empty());
        assert!(!HookRegistry::builder()
            .on::<Other, _>(HookEvent::AfterDelete, |_| Ok(()))
            .build()
            .is_empty());
    }

    #[test]
    fn test_install_once() {
        let registry = HookRegistry::builder()
            .on::<Other, _>(HookEvent::AfterDelete, |other| {
                other.touched = true;
                Ok(())
            })
            .build();
        install(registry).unwrap();
        assert!(installed().is_some());

        let err = install(HookRegistry::empty()).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperation);
        assert_eq!(
            installed().unwrap().hooks::<Other>(HookEvent::AfterDelete).len(),
            1
        );
    }
}
