use bson::{Bson, Document};

use crate::common::FIELD_SEPARATOR;
use crate::errors::{ErrorKind, VellumError, VellumResult};

/// Reads the value at a dotted field path.
///
/// Numeric segments index into arrays. A non-numeric segment applied to an
/// array is applied to every element and the hits are collected into an
/// array, so `"items.sku"` over `{items: [{sku: 1}, {sku: 2}]}` yields `[1, 2]`.
pub fn get_field(document: &Document, path: &str) -> Option<Bson> {
    let segments: Vec<&str> = path.split(FIELD_SEPARATOR).collect();
    let (head, tail) = segments.split_first()?;
    document.get(*head).and_then(|value| descend(value, tail))
}

fn descend(value: &Bson, path: &[&str]) -> Option<Bson> {
    let Some((head, tail)) = path.split_first() else {
        return Some(value.clone());
    };

    match value {
        Bson::Document(inner) => inner.get(*head).and_then(|v| descend(v, tail)),
        Bson::Array(items) => {
            if let Ok(index) = head.parse::<usize>() {
                return items.get(index).and_then(|v| descend(v, tail));
            }
            let hits: Vec<Bson> = items.iter().filter_map(|item| descend(item, path)).collect();
            if hits.is_empty() {
                None
            } else {
                Some(Bson::Array(hits))
            }
        }
        _ => None,
    }
}

/// Writes `value` at a dotted field path, creating intermediate documents.
pub fn set_field(document: &mut Document, path: &str, value: Bson) -> VellumResult<()> {
    let Some((head, tail)) = path.split_once(FIELD_SEPARATOR) else {
        document.insert(path, value);
        return Ok(());
    };

    if !document.contains_key(head) {
        document.insert(head, Document::new());
    }

    match document.get_mut(head) {
        Some(Bson::Document(inner)) => set_field(inner, tail, value),
        Some(other) => {
            log::error!("Cannot set field {} inside a {} value", path, type_name(other));
            Err(VellumError::new(
                &format!("Cannot set field {} inside a {} value", path, type_name(other)),
                ErrorKind::InvalidOperation,
            ))
        }
        None => Err(VellumError::new(
            &format!("Intermediate field {} vanished while setting {}", head, path),
            ErrorKind::InternalError,
        )),
    }
}

/// Removes the value at a dotted field path and returns it.
pub fn remove_field(document: &mut Document, path: &str) -> Option<Bson> {
    match path.split_once(FIELD_SEPARATOR) {
        None => document.remove(path),
        Some((head, tail)) => match document.get_mut(head) {
            Some(Bson::Document(inner)) => remove_field(inner, tail),
            _ => None,
        },
    }
}

/// Human readable name of a value's type, for error messages.
pub fn type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "document",
        Bson::Boolean(_) => "bool",
        Bson::Null => "null",
        Bson::Int32(_) => "int32",
        Bson::Int64(_) => "int64",
        Bson::Binary(_) => "binary",
        Bson::ObjectId(_) => "objectId",
        Bson::DateTime(_) => "date",
        Bson::Timestamp(_) => "timestamp",
        Bson::RegularExpression(_) => "regex",
        Bson::Decimal128(_) => "decimal",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_get_top_level_field() {
        let document = doc! { "name": "Ada", "age": 36 };
        assert_eq!(get_field(&document, "name"), Some(Bson::String("Ada".into())));
        assert_eq!(get_field(&document, "missing"), None);
    }

    #[test]
    fn test_get_nested_field() {
        let document = doc! { "address": { "city": { "name": "Oslo" } } };
        assert_eq!(
            get_field(&document, "address.city.name"),
            Some(Bson::String("Oslo".into()))
        );
        assert_eq!(get_field(&document, "address.zip"), None);
    }

    #[test]
    fn test_get_array_index_and_projection() {
        let document = doc! { "items": [ { "sku": 1 }, { "sku": 2 }, { "other": 3 } ] };
        assert_eq!(get_field(&document, "items.1.sku"), Some(Bson::Int32(2)));
        assert_eq!(
            get_field(&document, "items.sku"),
            Some(Bson::Array(vec![Bson::Int32(1), Bson::Int32(2)]))
        );
        assert_eq!(get_field(&document, "items.nothing"), None);
    }

    #[test]
    fn test_set_field_creates_intermediate_documents() {
        let mut document = Document::new();
        set_field(&mut document, "a.b.c", Bson::Int32(1)).unwrap();
        assert_eq!(document, doc! { "a": { "b": { "c": 1 } } });
    }

    #[test]
    fn test_set_field_through_scalar_fails() {
        let mut document = doc! { "a": 5 };
        let err = set_field(&mut document, "a.b", Bson::Int32(1)).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_remove_field() {
        let mut document = doc! { "a": { "b": 1, "c": 2 }, "d": 3 };
        assert_eq!(remove_field(&mut document, "a.b"), Some(Bson::Int32(1)));
        assert_eq!(remove_field(&mut document, "d"), Some(Bson::Int32(3)));
        assert_eq!(remove_field(&mut document, "x.y"), None);
        assert_eq!(document, doc! { "a": { "c": 2 } });
    }
}
