use bson::{Bson, Document};
use std::cmp::Ordering;

use crate::common::{
    compare_values, get_field, same_type_class, type_name, values_equal, OP_AND, OP_EQ, OP_GT,
    OP_GTE, OP_IN, OP_LT, OP_LTE, OP_NE, OP_NIN, OP_NOR, OP_OR,
};
use crate::errors::{ErrorKind, VellumError, VellumResult};

/// Evaluates a native filter against one document.
///
/// Top-level keys are combined with AND. An empty filter matches everything.
pub(crate) fn matches(document: &Document, filter: &Document) -> VellumResult<bool> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            OP_AND => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    if !matches(document, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            OP_OR => {
                let mut any = false;
                for clause in clauses(key, condition)? {
                    if matches(document, clause)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            OP_NOR => {
                let mut none = true;
                for clause in clauses(key, condition)? {
                    if matches(document, clause)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            operator if operator.starts_with('$') => {
                log::error!("Unsupported top level filter operator {}", operator);
                return Err(VellumError::new(
                    &format!("Unsupported top level filter operator {}", operator),
                    ErrorKind::InvalidOperation,
                ));
            }
            field => matches_field(get_field(document, field).as_ref(), condition)?,
        };

        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses<'a>(operator: &str, condition: &'a Bson) -> VellumResult<Vec<&'a Document>> {
    let Bson::Array(items) = condition else {
        log::error!("{} expects an array, found {}", operator, type_name(condition));
        return Err(VellumError::new(
            &format!("{} expects an array of filters", operator),
            ErrorKind::InvalidOperand,
        ));
    };
    if items.is_empty() {
        return Err(VellumError::new(
            &format!("{} expects a non-empty array of filters", operator),
            ErrorKind::InvalidOperand,
        ));
    }

    items
        .iter()
        .map(|item| match item {
            Bson::Document(clause) => Ok(clause),
            other => Err(VellumError::new(
                &format!("{} clause must be a document, found {}", operator, type_name(other)),
                ErrorKind::InvalidOperand,
            )),
        })
        .collect()
}

/// An operator document is a non-empty document whose keys all start with `$`.
fn is_operator_document(condition: &Bson) -> Option<&Document> {
    match condition {
        Bson::Document(inner)
            if !inner.is_empty() && inner.keys().all(|key| key.starts_with('$')) =>
        {
            Some(inner)
        }
        _ => None,
    }
}

fn matches_field(value: Option<&Bson>, condition: &Bson) -> VellumResult<bool> {
    let Some(predicates) = is_operator_document(condition) else {
        return Ok(equals(value, condition));
    };

    for (operator, operand) in predicates {
        let matched = match operator.as_str() {
            OP_EQ => equals(value, operand),
            OP_NE => !equals(value, operand),
            OP_GT => in_range(value, operand, |o| o == Ordering::Greater),
            OP_GTE => in_range(value, operand, |o| o != Ordering::Less),
            OP_LT => in_range(value, operand, |o| o == Ordering::Less),
            OP_LTE => in_range(value, operand, |o| o != Ordering::Greater),
            OP_IN => member_of(operator, value, operand)?,
            OP_NIN => !member_of(operator, value, operand)?,
            other => {
                log::error!("Unsupported field operator {}", other);
                return Err(VellumError::new(
                    &format!("Unsupported field operator {}", other),
                    ErrorKind::InvalidOperation,
                ));
            }
        };

        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Equality in the store's sense: a missing field equals null, and an array
/// field equals a scalar when any element does.
fn equals(value: Option<&Bson>, operand: &Bson) -> bool {
    match value {
        None => matches!(operand, Bson::Null),
        Some(value) => {
            if values_equal(value, operand) {
                return true;
            }
            match value {
                Bson::Array(items) => items.iter().any(|item| values_equal(item, operand)),
                _ => false,
            }
        }
    }
}

/// Range predicates only hold between values of the same type class.
fn in_range(value: Option<&Bson>, operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    let check = |candidate: &Bson| {
        same_type_class(candidate, operand) && accept(compare_values(candidate, operand))
    };
    match value {
        None => false,
        Some(Bson::Array(items)) if !matches!(operand, Bson::Array(_)) => items.iter().any(check),
        Some(value) => check(value),
    }
}

fn member_of(operator: &str, value: Option<&Bson>, operand: &Bson) -> VellumResult<bool> {
    match operand {
        Bson::Array(candidates) => Ok(candidates.iter().any(|candidate| equals(value, candidate))),
        other => {
            log::error!("{} expects an array, found {}", operator, type_name(other));
            Err(VellumError::new(
                &format!("{} expects an array operand, found {}", operator, type_name(other)),
                ErrorKind::InvalidOperand,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn person() -> Document {
        doc! {
            "name": "Ada",
            "age": 36,
            "score": 9.5,
            "tags": ["math", "engines"],
            "address": { "city": "London" },
            "children": [ { "name": "Byron" }, { "name": "Anne" } ],
        }
    }

    fn check(filter: Document) -> bool {
        matches(&person(), &filter).unwrap()
    }

    #[test]
    fn test_empty_filter_matches() {
        assert!(check(doc! {}));
    }

    #[test]
    fn test_implicit_equality() {
        assert!(check(doc! { "name": "Ada" }));
        assert!(!check(doc! { "name": "Grace" }));
        assert!(check(doc! { "age": 36i64 }));
        assert!(check(doc! { "address": { "city": "London" } }));
        assert!(check(doc! { "address.city": "London" }));
        assert!(check(doc! { "missing": null }));
    }

    #[test]
    fn test_array_element_equality() {
        assert!(check(doc! { "tags": "math" }));
        assert!(check(doc! { "children.name": "Anne" }));
        assert!(!check(doc! { "tags": "poetry" }));
    }

    #[test]
    fn test_comparisons() {
        assert!(check(doc! { "age": { "$gt": 30 } }));
        assert!(check(doc! { "age": { "$gte": 36.0 } }));
        assert!(!check(doc! { "age": { "$lt": 36 } }));
        assert!(check(doc! { "age": { "$lte": 36 } }));
        assert!(check(doc! { "age": { "$ne": 35 } }));
        assert!(check(doc! { "age": { "$eq": 36 } }));
        assert!(check(doc! { "score": { "$gt": 9, "$lt": 10 } }));
    }

    #[test]
    fn test_range_requires_same_type_class() {
        assert!(!check(doc! { "name": { "$gt": 1 } }));
        assert!(!check(doc! { "age": { "$lt": "z" } }));
        assert!(!check(doc! { "missing": { "$gt": 0 } }));
    }

    #[test]
    fn test_membership() {
        assert!(check(doc! { "name": { "$in": ["Grace", "Ada"] } }));
        assert!(check(doc! { "tags": { "$in": ["engines"] } }));
        assert!(check(doc! { "name": { "$nin": ["Grace"] } }));
        assert!(!check(doc! { "name": { "$nin": ["Ada"] } }));
    }

    #[test]
    fn test_logical_operators() {
        assert!(check(doc! { "$and": [ { "name": "Ada" }, { "age": { "$gt": 1 } } ] }));
        assert!(check(doc! { "$or": [ { "name": "Grace" }, { "age": 36 } ] }));
        assert!(!check(doc! { "$nor": [ { "name": "Grace" }, { "age": 36 } ] }));
        assert!(check(doc! {
            "$and": [
                { "name": "Ada" },
                { "$or": [ { "age": 1 }, { "tags": "math" } ] }
            ]
        }));
    }

    #[test]
    fn test_malformed_filters() {
        let err = matches(&person(), &doc! { "$and": [] }).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperand);
        let err = matches(&person(), &doc! { "$where": "1" }).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperation);
        let err = matches(&person(), &doc! { "age": { "$regex": "x" } }).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperation);
        let err = matches(&person(), &doc! { "age": { "$in": 3 } }).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperand);
    }
}
