//! The document store service and its in-memory implementation.
//!
//! Repositories never talk to a backend directly. They hand native filters,
//! update specifications and pipelines to a [`DocumentStoreProvider`] through
//! the shared [`DocumentStore`] handle.
//!
//! # Providers
//!
//! - **Memory Store**: [`MemoryStore`], a complete in-process implementation
//!   used by default and throughout the tests
//! - Adapters for external stores implement [`DocumentStoreProvider`] and
//!   report backend failures with `ErrorKind::BackendError`
//!
//! # Conditional Writes
//!
//! `update_one` matches and applies under one critical section. Optimistic
//! concurrency in the repository is built entirely on that guarantee.

mod document_store;
mod find_options;
pub mod memory;

pub use document_store::*;
pub use find_options::*;
pub use memory::MemoryStore;
