//! Fluent aggregation pipelines.
//!
//! A [`Pipeline`] accumulates stages and sends them, in append order, as one
//! aggregate request when [`Pipeline::execute`] is awaited. Nothing is
//! reordered or merged.
//!
//! # Result Shapes
//!
//! A pipeline returns raw documents until a shaping stage declares a result
//! type with [`Pipeline::project_as`] or [`Pipeline::group_as`]. From then on
//! every result document is coerced into that type and a single document that
//! does not fit fails the whole execution.
//!
//! # Examples
//!
//! ```rust,ignore
//! #[derive(Deserialize, Serialize)]
//! struct Total { _id: String, total: i64 }
//!
//! let totals: Vec<Total> = orders
//!     .aggregate()
//!     .filter(field("status").eq("paid"))
//!     .group_as::<Total>("$customer", doc! { "total": { "$sum": "$amount" } })
//!     .sort_by("total", SortOrder::Descending)
//!     .limit(10)
//!     .execute()
//!     .await?;
//! ```

mod pipeline;
mod shape;
mod stage;

pub use pipeline::*;
pub use shape::*;
pub use stage::*;
