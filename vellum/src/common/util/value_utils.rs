use bson::Bson;
use std::cmp::Ordering;

/// Rank of a value's type in the cross-type sort order.
///
/// Values of different ranks never compare equal and sort by rank. All numeric
/// types share one rank so that `Int32(1)`, `Int64(1)` and `Double(1.0)`
/// compare as equal.
fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::MaxKey => 13,
        _ => 12,
    }
}

#[inline]
pub fn is_number(value: &Bson) -> bool {
    matches!(value, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_))
}

#[inline]
fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(v) => Some(*v as i64),
        Bson::Int64(v) => Some(*v),
        _ => None,
    }
}

#[inline]
pub fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(*v as f64),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

/// Returns `true` when both values belong to the same comparison class.
///
/// Range predicates (`$gt`, `$lt`, ...) only match within one class.
#[inline]
pub fn same_type_class(a: &Bson, b: &Bson) -> bool {
    type_rank(a) == type_rank(b)
}

/// Total order over values, used for sorting and range predicates.
pub fn compare_values(a: &Bson, b: &Bson) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }

    if let (Some(x), Some(y)) = (as_i64(a), as_i64(b)) {
        return x.cmp(&y);
    }
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return x.total_cmp(&y);
    }

    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::DateTime(x), Bson::DateTime(y)) => {
            x.timestamp_millis().cmp(&y.timestamp_millis())
        }
        (Bson::Timestamp(x), Bson::Timestamp(y)) => {
            (x.time, x.increment).cmp(&(y.time, y.increment))
        }
        (Bson::Binary(x), Bson::Binary(y)) => x
            .bytes
            .len()
            .cmp(&y.bytes.len())
            .then_with(|| x.bytes.cmp(&y.bytes)),
        (Bson::Array(x), Bson::Array(y)) => {
            for (left, right) in x.iter().zip(y.iter()) {
                let ordering = compare_values(left, right);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            x.len().cmp(&y.len())
        }
        (Bson::Document(x), Bson::Document(y)) => {
            for ((lk, lv), (rk, rv)) in x.iter().zip(y.iter()) {
                let ordering = lk.cmp(rk).then_with(|| compare_values(lv, rv));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            x.len().cmp(&y.len())
        }
        (Bson::Null, Bson::Null) | (Bson::MinKey, Bson::MinKey) | (Bson::MaxKey, Bson::MaxKey) => {
            Ordering::Equal
        }
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// Equality with numeric widening; everything else compares structurally.
pub fn values_equal(a: &Bson, b: &Bson) -> bool {
    if is_number(a) && is_number(b) {
        return compare_values(a, b) == Ordering::Equal;
    }
    match (a, b) {
        (Bson::Array(x), Bson::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(l, r)| values_equal(l, r))
        }
        (Bson::Document(x), Bson::Document(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .zip(y.iter())
                    .all(|((lk, lv), (rk, rv))| lk == rk && values_equal(lv, rv))
        }
        _ => a == b,
    }
}

/// Adds two numeric values, widening `Int32 → Int64 → Double` on overflow
/// or when the operands differ. Returns `None` for non-numeric input.
pub fn add_numbers(a: &Bson, b: &Bson) -> Option<Bson> {
    match (a, b) {
        (Bson::Int32(x), Bson::Int32(y)) => Some(
            x.checked_add(*y)
                .map(Bson::Int32)
                .unwrap_or_else(|| Bson::Int64(*x as i64 + *y as i64)),
        ),
        _ => match (as_i64(a), as_i64(b)) {
            (Some(x), Some(y)) => Some(
                x.checked_add(y)
                    .map(Bson::Int64)
                    .unwrap_or_else(|| Bson::Double(x as f64 + y as f64)),
            ),
            _ => match (as_f64(a), as_f64(b)) {
                (Some(x), Some(y)) => Some(Bson::Double(x + y)),
                _ => None,
            },
        },
    }
}
