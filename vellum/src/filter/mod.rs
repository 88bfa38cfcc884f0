//! Query expressions for selecting documents.
//!
//! Expressions are immutable trees built with a fluent API and lowered to the
//! store's native filter document with [`QueryExpression::to_filter`]. Lowering
//! is pure: no store round trip is involved, and the same expression always
//! produces the same filter.
//!
//! # Creating Expressions
//!
//! - `field("age").gt(30)` - comparison operators
//! - `field("status").in_array(vec!["new", "open"])?` - membership
//! - `field("age").gt(30).and(field("status").eq("active"))` - logical AND
//! - `or(vec![a, b])?`, `nor(vec![a])?` - n-ary connectives
//! - `by_id(uuid)?` - match by identity, normalized at construction
//!
//! # Examples
//!
//! ```rust,ignore
//! use vellum::filter::{field, and};
//!
//! let expression = and(vec![
//!     field("age").gte(18),
//!     field("country").eq("NO").or(field("country").eq("SE")),
//! ])?;
//! let results = repository.find(expression, FindOptions::new()).await?;
//! ```
//!
//! # Supported Operators
//!
//! - **Equality**: `eq`, `ne`
//! - **Comparison**: `gt`, `gte`, `lt`, `lte`
//! - **Membership**: `in_array`, `not_in_array`, `in_set`, `not_in_set`
//! - **Logical**: `and`, `or`, `nor`, `not`

mod basic_filters;
mod filter;
mod fluent;
mod logical_filters;

pub use basic_filters::*;
pub use filter::*;
pub use fluent::*;
pub use logical_filters::*;
