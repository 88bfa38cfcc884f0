mod matcher;
mod pipeline;
mod store;
mod update;

pub use store::*;
