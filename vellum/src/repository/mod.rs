//! Typed repositories.
//!
//! A [`Repository`] binds one [`Model`](crate::model::Model) type to one
//! collection. It is the only place where documents are written: creates,
//! version-guarded updates and deletes all go through it, and it fires the
//! lifecycle hooks registered for the model type.
//!
//! # Getting a Repository
//!
//! ```rust,ignore
//! let vellum = Vellum::builder().open()?;
//! let books = vellum.repository::<Book>();
//!
//! let book = books.create(Book::new("Dune")).await?;
//! let found = books.find(field("title").eq("Dune"), FindOptions::new()).await?;
//! ```
//!
//! # Operations
//!
//! - `create`, `get`, `update`, `delete` on single items
//! - `find`, `find_one`, `count` with native filters or query expressions
//! - `aggregate` to start a pipeline over the collection

mod repository;

pub use repository::*;
