//! Lifecycle hooks.
//!
//! Hooks are registered once per item type at startup and frozen into an
//! immutable [`HookRegistry`]. Repositories fire them around inserts, updates
//! and deletes; within one event they run strictly one after another, in
//! registration order.

mod hook;
mod registry;

pub use hook::*;
pub use registry::*;
