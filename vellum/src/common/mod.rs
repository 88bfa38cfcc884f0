//! Shared constants, sorting types and document helpers.

mod constants;
mod sort_order;
mod util;

pub use constants::*;
pub use sort_order::*;
pub use util::*;
