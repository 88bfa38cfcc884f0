use async_trait::async_trait;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use crate::errors::VellumResult;

/// Lifecycle points at which a repository fires hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    BeforeInsert,
    AfterInsert,
    BeforeUpdate,
    AfterUpdate,
    BeforeDelete,
    AfterDelete,
}

impl HookEvent {
    pub const ALL: [HookEvent; 6] = [
        HookEvent::BeforeInsert,
        HookEvent::AfterInsert,
        HookEvent::BeforeUpdate,
        HookEvent::AfterUpdate,
        HookEvent::BeforeDelete,
        HookEvent::AfterDelete,
    ];
}

impl Display for HookEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HookEvent::BeforeInsert => "before_insert",
            HookEvent::AfterInsert => "after_insert",
            HookEvent::BeforeUpdate => "before_update",
            HookEvent::AfterUpdate => "after_update",
            HookEvent::BeforeDelete => "before_delete",
            HookEvent::AfterDelete => "after_delete",
        };
        write!(f, "{}", name)
    }
}

/// A callback invoked at a lifecycle point.
///
/// Hooks receive the item being written and may modify it before the write
/// (`before_*` events). An error returned from `call` aborts the surrounding
/// repository operation and reaches the caller unchanged.
///
/// # Usage
/// ```ignore
/// struct StampUpdated;
///
/// #[async_trait]
/// impl HookProvider<Book> for StampUpdated {
///     async fn call(&self, item: &mut Book) -> VellumResult<()> {
///         item.updated_at = Utc::now();
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait HookProvider<T>: Send + Sync {
    async fn call(&self, item: &mut T) -> VellumResult<()>;
}

/// Shared handle to a hook.
pub struct Hook<T> {
    inner: Arc<dyn HookProvider<T>>,
}

impl<T: Send + 'static> Hook<T> {
    pub fn new<H: HookProvider<T> + 'static>(inner: H) -> Self {
        Hook {
            inner: Arc::new(inner),
        }
    }

    /// Wraps a synchronous closure as a hook.
    pub fn from_fn<F>(callback: F) -> Self
    where
        F: Fn(&mut T) -> VellumResult<()> + Send + Sync + 'static,
    {
        Hook::new(FnHook { callback })
    }

    pub async fn call(&self, item: &mut T) -> VellumResult<()> {
        self.inner.call(item).await
    }
}

impl<T> Clone for Hook<T> {
    fn clone(&self) -> Self {
        Hook {
            inner: self.inner.clone(),
        }
    }
}

struct FnHook<F> {
    callback: F,
}

#[async_trait]
impl<T, F> HookProvider<T> for FnHook<F>
where
    T: Send + 'static,
    F: Fn(&mut T) -> VellumResult<()> + Send + Sync + 'static,
{
    async fn call(&self, item: &mut T) -> VellumResult<()> {
        (self.callback)(item)
    }
}
