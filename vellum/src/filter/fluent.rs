use bson::Bson;

use crate::common::compare_values;
use crate::errors::VellumResult;
use crate::model::DocumentId;

use super::{ComparisonOperator, FieldFilter, QueryExpression};

/// Starts a fluent predicate on the given field.
///
/// Dotted names address nested fields, as in `field("address.city")`.
pub fn field(field_name: &str) -> FluentFilter {
    FluentFilter {
        field_name: field_name.to_string(),
    }
}

/// A fluent builder for single-field predicates.
///
/// Each method consumes the builder and returns an immutable
/// [`QueryExpression`]. Membership methods taking an arbitrary value return a
/// `VellumResult` because the operand is only known to be a collection at
/// runtime.
pub struct FluentFilter {
    field_name: String,
}

impl FluentFilter {
    /// Matches documents where the field equals the value.
    #[inline]
    pub fn eq<T: Into<Bson>>(self, value: T) -> QueryExpression {
        self.compare(ComparisonOperator::Eq, value.into())
    }

    /// Matches documents where the field differs from the value.
    #[inline]
    pub fn ne<T: Into<Bson>>(self, value: T) -> QueryExpression {
        self.compare(ComparisonOperator::Ne, value.into())
    }

    #[inline]
    pub fn gt<T: Into<Bson>>(self, value: T) -> QueryExpression {
        self.compare(ComparisonOperator::Gt, value.into())
    }

    #[inline]
    pub fn gte<T: Into<Bson>>(self, value: T) -> QueryExpression {
        self.compare(ComparisonOperator::Gte, value.into())
    }

    #[inline]
    pub fn lt<T: Into<Bson>>(self, value: T) -> QueryExpression {
        self.compare(ComparisonOperator::Lt, value.into())
    }

    #[inline]
    pub fn lte<T: Into<Bson>>(self, value: T) -> QueryExpression {
        self.compare(ComparisonOperator::Lte, value.into())
    }

    /// Matches documents where the field equals one of the values.
    ///
    /// The values must form an array; they are emitted in the given order.
    /// Any other operand fails with `InvalidOperand`.
    ///
    /// ```rust,ignore
    /// let filter = field("status").in_array(vec!["new", "open"])?;
    /// ```
    pub fn in_array<T: Into<Bson>>(self, values: T) -> VellumResult<QueryExpression> {
        FieldFilter::membership(self.field_name, ComparisonOperator::In, values.into())
            .map(QueryExpression::new)
    }

    /// Matches documents where the field equals none of the values.
    pub fn not_in_array<T: Into<Bson>>(self, values: T) -> VellumResult<QueryExpression> {
        FieldFilter::membership(self.field_name, ComparisonOperator::NotIn, values.into())
            .map(QueryExpression::new)
    }

    /// Matches documents where the field equals one of the values, treating
    /// them as an unordered set.
    ///
    /// Values are sorted and deduplicated before lowering, so the same set
    /// always produces the same filter whatever order it was collected in.
    pub fn in_set<I, T>(self, values: I) -> QueryExpression
    where
        I: IntoIterator<Item = T>,
        T: Into<Bson>,
    {
        QueryExpression::new(FieldFilter::new(
            self.field_name,
            ComparisonOperator::In,
            canonical_set(values),
        ))
    }

    /// Set flavoured counterpart of [`not_in_array`](FluentFilter::not_in_array).
    pub fn not_in_set<I, T>(self, values: I) -> QueryExpression
    where
        I: IntoIterator<Item = T>,
        T: Into<Bson>,
    {
        QueryExpression::new(FieldFilter::new(
            self.field_name,
            ComparisonOperator::NotIn,
            canonical_set(values),
        ))
    }

    /// Matches documents whose field holds the given identity, normalized to
    /// its canonical wire form.
    pub fn eq_id<I: Into<DocumentId>>(self, id: I) -> VellumResult<QueryExpression> {
        let value = id.into().normalize()?;
        Ok(self.compare(ComparisonOperator::Eq, value))
    }

    /// Matches documents whose field holds any of the given identities.
    ///
    /// Fails with `InvalidIdentifier` on the first identity that does not
    /// normalize.
    pub fn in_ids<I, D>(self, ids: I) -> VellumResult<QueryExpression>
    where
        I: IntoIterator<Item = D>,
        D: Into<DocumentId>,
    {
        let values = ids
            .into_iter()
            .map(|id| id.into().normalize())
            .collect::<VellumResult<Vec<Bson>>>()?;
        FieldFilter::membership(self.field_name, ComparisonOperator::In, Bson::Array(values))
            .map(QueryExpression::new)
    }

    fn compare(self, operator: ComparisonOperator, value: Bson) -> QueryExpression {
        QueryExpression::new(FieldFilter::new(self.field_name, operator, value))
    }
}

fn canonical_set<I, T>(values: I) -> Bson
where
    I: IntoIterator<Item = T>,
    T: Into<Bson>,
{
    let mut values: Vec<Bson> = values.into_iter().map(Into::into).collect();
    values.sort_by(compare_values);
    values.dedup();
    Bson::Array(values)
}
