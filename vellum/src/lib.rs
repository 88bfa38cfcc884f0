//! # Vellum - Typed Document Store Access
//!
//! Vellum maps typed domain records to documents in a schemaless store. It
//! provides:
//!
//! - **Repositories**: create, read, update and delete typed models, with
//!   every update guarded by an optimistic version check
//! - **Query expressions**: a composable boolean algebra of field predicates
//!   that lowers to the store's native filter documents
//! - **Aggregation**: a fluent pipeline builder that sends all of its stages as
//!   one request and optionally coerces results into a declared type
//! - **Hooks**: per-type callbacks around inserts, updates and deletes
//!
//! The store itself is an opaque async service ([`store::DocumentStoreProvider`]);
//! [`store::MemoryStore`] is the in-process implementation used by default.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use vellum::filter::field;
//! use vellum::store::FindOptions;
//! use vellum::vellum::Vellum;
//!
//! let vellum = Vellum::builder().open()?;
//! let books = vellum.repository::<Book>();
//!
//! let book = books.create(Book::new("Dune", 1965)).await?;
//! let mut edited = books.get(book.id).await?;
//! edited.year = 1966;
//! let edited = books.update(book.id, edited).await?;
//! assert_eq!(edited.version, 1);
//!
//! let classics = books
//!     .find(field("year").lt(1970) & field("title").ne(""), FindOptions::new())
//!     .await?;
//! ```
//!
//! ## Module Organization
//!
//! - [`aggregation`] - Pipeline builder, stages and result shapes
//! - [`common`] - Constants, sort types and document helpers
//! - [`errors`] - Error types and result definitions
//! - [`filter`] - Query expressions and the fluent field builder
//! - [`hooks`] - Lifecycle hooks and the hook registry
//! - [`model`] - The `Model` trait and identity normalization
//! - [`repository`] - Typed repositories
//! - [`store`] - The store service trait and the in-memory store
//! - [`vellum`] - The entry-point handle
//! - [`vellum_builder`] - Builder for the handle
//! - [`vellum_config`] - Handle configuration

pub mod aggregation;
pub mod common;
pub mod errors;
pub mod filter;
pub mod hooks;
pub mod model;
pub mod repository;
pub mod store;
pub mod vellum;
pub mod vellum_builder;
pub mod vellum_config;

pub use errors::{ErrorKind, VellumError, VellumResult};
pub use model::{DocumentId, Model};
pub use repository::Repository;
pub use vellum::Vellum;
