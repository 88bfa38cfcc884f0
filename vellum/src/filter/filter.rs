use bson::Document;
use std::fmt::{Debug, Display};
use std::ops::{BitAnd, BitOr, Not};
use std::sync::Arc;

use crate::common::DOC_ID;
use crate::errors::VellumResult;
use crate::model::DocumentId;

use super::{field, Connective, LogicalFilter};

/// Trait for implementing expression nodes.
///
/// An `ExpressionProvider` knows how to lower itself to the store's native
/// filter syntax. Custom predicates can implement this trait and be wrapped in a
/// [`QueryExpression`] to compose with the built-in ones.
pub trait ExpressionProvider: Send + Sync + Display {
    /// Lowers this node to a native filter document.
    fn lower(&self) -> Document;
}

/// An immutable boolean predicate over document fields.
///
/// `QueryExpression` shares its node through an `Arc`, so cloning is cheap and
/// composing never copies or mutates existing children.
///
/// # Filter Composition
///
/// - `and(other)` / `a & b` - logical AND
/// - `or(other)` / `a | b` - logical OR
/// - `not()` / `!a` - logical NOR of the single operand
#[derive(Clone)]
pub struct QueryExpression {
    inner: Arc<dyn ExpressionProvider>,
}

impl QueryExpression {
    /// Creates a new expression from a provider implementation.
    pub fn new<T: ExpressionProvider + 'static>(inner: T) -> Self {
        QueryExpression {
            inner: Arc::new(inner),
        }
    }

    /// Lowers the expression to the store's native filter document.
    #[inline]
    pub fn to_filter(&self) -> Document {
        self.inner.lower()
    }

    /// Combines this expression with another using logical AND.
    pub fn and(&self, expression: QueryExpression) -> Self {
        QueryExpression::new(LogicalFilter::of(
            Connective::And,
            vec![self.clone(), expression],
        ))
    }

    /// Combines this expression with another using logical OR.
    pub fn or(&self, expression: QueryExpression) -> Self {
        QueryExpression::new(LogicalFilter::of(
            Connective::Or,
            vec![self.clone(), expression],
        ))
    }

    /// Negates this expression as a single-operand NOR.
    pub fn not(&self) -> Self {
        QueryExpression::new(LogicalFilter::of(Connective::Nor, vec![self.clone()]))
    }
}

impl Display for QueryExpression {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl Debug for QueryExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "QueryExpression({})", self.inner)
    }
}

impl BitAnd for QueryExpression {
    type Output = QueryExpression;

    fn bitand(self, rhs: QueryExpression) -> QueryExpression {
        QueryExpression::and(&self, rhs)
    }
}

impl BitOr for QueryExpression {
    type Output = QueryExpression;

    fn bitor(self, rhs: QueryExpression) -> QueryExpression {
        QueryExpression::or(&self, rhs)
    }
}

impl Not for QueryExpression {
    type Output = QueryExpression;

    fn not(self) -> QueryExpression {
        QueryExpression::not(&self)
    }
}

/// A filter given to a read: either a raw native document or an expression.
#[derive(Clone, Debug)]
pub enum Query {
    Native(Document),
    Expression(QueryExpression),
}

impl Query {
    /// Produces the native filter document, lowering expressions.
    pub fn to_filter(&self) -> Document {
        match self {
            Query::Native(document) => document.clone(),
            Query::Expression(expression) => expression.to_filter(),
        }
    }

    pub fn into_filter(self) -> Document {
        match self {
            Query::Native(document) => document,
            Query::Expression(expression) => expression.to_filter(),
        }
    }
}

impl Default for Query {
    fn default() -> Self {
        all()
    }
}

impl From<Document> for Query {
    fn from(value: Document) -> Self {
        Query::Native(value)
    }
}

impl From<QueryExpression> for Query {
    fn from(value: QueryExpression) -> Self {
        Query::Expression(value)
    }
}

impl From<&QueryExpression> for Query {
    fn from(value: &QueryExpression) -> Self {
        Query::Expression(value.clone())
    }
}

/// Creates a filter that matches all documents.
///
/// Every call returns a fresh empty filter.
pub fn all() -> Query {
    Query::Native(Document::new())
}

/// Creates an expression matching the document with the given identity.
///
/// The identity is normalized here, so an invalid identifier fails at
/// construction with `InvalidIdentifier`.
pub fn by_id<I: Into<DocumentId>>(id: I) -> VellumResult<QueryExpression> {
    field(DOC_ID).eq_id(id)
}

/// Combines operands using logical AND.
///
/// Fails with `InvalidOperand` when no operand is given and with
/// `TypeMismatch` when an operand is a raw native filter.
pub fn and<I, Q>(operands: I) -> VellumResult<QueryExpression>
where
    I: IntoIterator<Item = Q>,
    Q: Into<Query>,
{
    LogicalFilter::try_new(Connective::And, operands).map(QueryExpression::new)
}

/// Combines operands using logical OR. See [`and`] for the failure modes.
pub fn or<I, Q>(operands: I) -> VellumResult<QueryExpression>
where
    I: IntoIterator<Item = Q>,
    Q: Into<Query>,
{
    LogicalFilter::try_new(Connective::Or, operands).map(QueryExpression::new)
}

/// Matches documents satisfying none of the operands. See [`and`] for the
/// failure modes.
pub fn nor<I, Q>(operands: I) -> VellumResult<QueryExpression>
where
    I: IntoIterator<Item = Q>,
    Q: Into<Query>,
{
    LogicalFilter::try_new(Connective::Nor, operands).map(QueryExpression::new)
}

/// Negates an expression.
pub fn not(expression: QueryExpression) -> QueryExpression {
    expression.not()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use bson::{doc, Bson};
    use uuid::Uuid;

    #[test]
    fn test_all_is_fresh_empty_filter() {
        let mut first = all().into_filter();
        first.insert("polluted", true);
        assert!(all().to_filter().is_empty());
        assert!(Query::default().to_filter().is_empty());
    }

    #[test]
    fn test_native_query_passes_through() {
        let query = Query::from(doc! { "age": { "$gt": 3 } });
        assert_eq!(query.to_filter(), doc! { "age": { "$gt": 3 } });
    }

    #[test]
    fn test_by_id_normalizes() {
        let uuid = Uuid::new_v4();
        let filter = by_id(uuid).unwrap().to_filter();
        assert_eq!(
            filter.get(DOC_ID),
            Some(&DocumentId::from(uuid).normalize().unwrap())
        );
        assert_eq!(
            by_id(uuid.to_string()).unwrap().to_filter(),
            filter
        );
    }

    #[test]
    fn test_by_id_rejects_bad_identifier() {
        let err = by_id("nope").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidIdentifier);
    }

    #[test]
    fn test_and_of_or_mirrors_nesting() {
        let a = field("a").eq(1);
        let b = field("b").gt(2);
        let c = field("c").lte(3);
        let expression = and(vec![a, b.or(c)]).unwrap();
        assert_eq!(
            expression.to_filter(),
            doc! {
                "$and": [
                    { "a": 1 },
                    { "$or": [ { "b": { "$gt": 2 } }, { "c": { "$lte": 3 } } ] }
                ]
            }
        );
    }

    #[test]
    fn test_operator_overloads() {
        let a = field("a").eq(1);
        let b = field("b").ne(2);
        assert_eq!(
            (a.clone() & b.clone()).to_filter(),
            doc! { "$and": [ { "a": 1 }, { "b": { "$ne": 2 } } ] }
        );
        assert_eq!(
            (a.clone() | b).to_filter(),
            doc! { "$or": [ { "a": 1 }, { "b": { "$ne": 2 } } ] }
        );
        assert_eq!((!a).to_filter(), doc! { "$nor": [ { "a": 1 } ] });
    }

    #[test]
    fn test_connectives_reject_empty_and_native_operands() {
        let err = and(Vec::<QueryExpression>::new()).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperand);

        let operands: Vec<Query> = vec![field("a").eq(1).into(), doc! { "b": 2 }.into()];
        let err = or(operands).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_composition_does_not_mutate_children() {
        let a = field("a").eq(1);
        let before = a.to_filter();
        let _combined = a.and(field("b").eq(Bson::Null)).or(a.clone());
        assert_eq!(a.to_filter(), before);
    }

    #[test]
    fn test_display() {
        let expression = field("a").eq(1).and(field("b").lt(2));
        assert_eq!(expression.to_string(), "((a == 1) && (b < 2))");
    }
}
