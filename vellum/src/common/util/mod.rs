mod document_utils;
mod value_utils;

pub use document_utils::*;
pub use value_utils::*;
