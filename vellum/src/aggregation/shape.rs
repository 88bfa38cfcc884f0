use bson::{Bson, Document};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

use crate::errors::{ErrorKind, VellumError, VellumResult};

/// How an executed pipeline turns result documents into values.
pub trait ResultShape: Send + Sync + 'static {
    type Output: Send;

    fn coerce(document: Document) -> VellumResult<Self::Output>;
}

/// No declared shape: results are returned as documents.
pub struct Raw;

impl ResultShape for Raw {
    type Output = Document;

    #[inline]
    fn coerce(document: Document) -> VellumResult<Document> {
        Ok(document)
    }
}

/// Results must deserialize into `R` without losing any field.
///
/// A document deserializes and is then encoded again; any key of the result
/// document, at any depth, that is missing from the re-encoded value means `R`
/// would have silently dropped data, and coercion fails with
/// `ObjectMappingError`. A `null` key may vanish, as an absent optional does.
pub struct Shaped<R>(PhantomData<fn() -> R>);

impl<R> ResultShape for Shaped<R>
where
    R: Serialize + DeserializeOwned + Send + 'static,
{
    type Output = R;

    fn coerce(document: Document) -> VellumResult<R> {
        let type_name = std::any::type_name::<R>();
        let value: R = bson::from_document(document.clone()).map_err(|e| {
            log::error!("Result {} does not fit {}: {}", document, type_name, e);
            VellumError::new_with_cause(
                &format!("Aggregation result does not fit {}", type_name),
                ErrorKind::ObjectMappingError,
                e.into(),
            )
        })?;

        let encoded = bson::to_document(&value)?;
        if let Some(field) = lost_field(&document, &encoded, "") {
            log::error!("Field {} of result {} has no place in {}", field, document, type_name);
            return Err(VellumError::new(
                &format!("Aggregation result field {} has no place in {}", field, type_name),
                ErrorKind::ObjectMappingError,
            ));
        }
        Ok(value)
    }
}

/// Finds the dotted path of the first non-null key of `original` that has no
/// counterpart in `encoded`.
fn lost_field(original: &Document, encoded: &Document, prefix: &str) -> Option<String> {
    original.iter().find_map(|(key, value)| {
        let path = format!("{}{}", prefix, key);
        match encoded.get(key) {
            None if matches!(value, Bson::Null) => None,
            None => Some(path),
            Some(kept) => lost_in_value(value, kept, &path),
        }
    })
}

fn lost_in_value(original: &Bson, encoded: &Bson, path: &str) -> Option<String> {
    match (original, encoded) {
        (Bson::Document(original), Bson::Document(encoded)) => {
            lost_field(original, encoded, &format!("{}.", path))
        }
        (Bson::Array(original), Bson::Array(encoded)) => original
            .iter()
            .enumerate()
            .find_map(|(index, item)| match encoded.get(index) {
                Some(kept) => lost_in_value(item, kept, &format!("{}.{}", path, index)),
                None => Some(format!("{}.{}", path, index)),
            }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Total {
        #[serde(rename = "_id")]
        customer: String,
        total: i64,
    }

    #[test]
    fn test_raw_passes_through() {
        let document = doc! { "anything": [1, 2] };
        assert_eq!(Raw::coerce(document.clone()).unwrap(), document);
    }

    #[test]
    fn test_shaped_accepts_exact_fit() {
        let total = Shaped::<Total>::coerce(doc! { "_id": "ada", "total": 17i64 }).unwrap();
        assert_eq!(
            total,
            Total {
                customer: "ada".into(),
                total: 17
            }
        );
    }

    #[test]
    fn test_shaped_accepts_narrower_integer() {
        let total = Shaped::<Total>::coerce(doc! { "_id": "ada", "total": 17 }).unwrap();
        assert_eq!(total.total, 17);
    }

    #[test]
    fn test_shaped_rejects_missing_field() {
        let err = Shaped::<Total>::coerce(doc! { "_id": "ada" }).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ObjectMappingError);
        assert!(err.cause().is_some());
    }

    #[test]
    fn test_shaped_rejects_wrong_type() {
        let err = Shaped::<Total>::coerce(doc! { "_id": "ada", "total": "lots" }).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ObjectMappingError);
    }

    #[test]
    fn test_shaped_rejects_dropped_field() {
        let err = Shaped::<Total>::coerce(doc! { "_id": "ada", "total": 1i64, "extra": true })
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ObjectMappingError);
        assert!(err.message().contains("extra"));
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Inner {
        a: i32,
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Outer {
        #[serde(rename = "_id")]
        id: String,
        meta: Inner,
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Listed {
        #[serde(rename = "_id")]
        id: String,
        items: Vec<Inner>,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Noted {
        #[serde(rename = "_id")]
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    }

    #[test]
    fn test_shaped_rejects_dropped_nested_field() {
        let err = Shaped::<Outer>::coerce(doc! { "_id": "x", "meta": { "a": 1, "b": "lost" } })
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ObjectMappingError);
        assert!(err.message().contains("meta.b"), "{}", err.message());

        let outer = Shaped::<Outer>::coerce(doc! { "_id": "x", "meta": { "a": 1 } }).unwrap();
        assert_eq!(outer.meta.a, 1);
    }

    #[test]
    fn test_shaped_rejects_dropped_field_inside_array() {
        let err = Shaped::<Listed>::coerce(doc! {
            "_id": "x",
            "items": [ { "a": 1 }, { "a": 2, "b": true } ],
        })
        .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ObjectMappingError);
        assert!(err.message().contains("items.1.b"), "{}", err.message());
    }

    #[test]
    fn test_shaped_accepts_null_for_skipped_option() {
        let noted = Shaped::<Noted>::coerce(doc! { "_id": "x", "note": null }).unwrap();
        assert_eq!(
            noted,
            Noted {
                id: "x".into(),
                note: None
            }
        );

        let err = Shaped::<Noted>::coerce(doc! { "_id": "x", "other": null, "more": 1 })
            .unwrap_err();
        assert!(err.message().contains("more"), "{}", err.message());
    }
}
