use bson::{Bson, Document};
use itertools::Itertools;
use std::fmt::Display;

use crate::common::{
    type_name, OP_EQ, OP_GT, OP_GTE, OP_IN, OP_LT, OP_LTE, OP_NE, OP_NIN,
};
use crate::errors::{ErrorKind, VellumError, VellumResult};

use super::ExpressionProvider;

/// Operators of a single-field predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
}

impl ComparisonOperator {
    /// The native operator key.
    pub fn operator(&self) -> &'static str {
        match self {
            ComparisonOperator::Eq => OP_EQ,
            ComparisonOperator::Ne => OP_NE,
            ComparisonOperator::Gt => OP_GT,
            ComparisonOperator::Gte => OP_GTE,
            ComparisonOperator::Lt => OP_LT,
            ComparisonOperator::Lte => OP_LTE,
            ComparisonOperator::In => OP_IN,
            ComparisonOperator::NotIn => OP_NIN,
        }
    }

    /// `true` for the membership operators, whose operand must be an array.
    #[inline]
    pub fn takes_collection(&self) -> bool {
        matches!(self, ComparisonOperator::In | ComparisonOperator::NotIn)
    }

    fn symbol(&self) -> &'static str {
        match self {
            ComparisonOperator::Eq => "==",
            ComparisonOperator::Ne => "!=",
            ComparisonOperator::Gt => ">",
            ComparisonOperator::Gte => ">=",
            ComparisonOperator::Lt => "<",
            ComparisonOperator::Lte => "<=",
            ComparisonOperator::In => "in",
            ComparisonOperator::NotIn => "not in",
        }
    }
}

/// A predicate comparing one field against one operand.
///
/// Equality lowers to the implicit form `{field: value}` unless the value is
/// itself a document, in which case the explicit `{field: {$eq: value}}` is
/// used so the value cannot be read back as an operator document. Every other
/// operator lowers to `{field: {$op: value}}`.
pub(crate) struct FieldFilter {
    field_name: String,
    operator: ComparisonOperator,
    value: Bson,
}

impl FieldFilter {
    pub(crate) fn new(field_name: String, operator: ComparisonOperator, value: Bson) -> Self {
        FieldFilter {
            field_name,
            operator,
            value,
        }
    }

    /// Builds a membership predicate, rejecting operands that are not arrays.
    pub(crate) fn membership(
        field_name: String,
        operator: ComparisonOperator,
        value: Bson,
    ) -> VellumResult<Self> {
        if operator.takes_collection() && !matches!(value, Bson::Array(_)) {
            log::error!(
                "{} on field {} expects an array, found {}",
                operator.operator(),
                field_name,
                type_name(&value)
            );
            return Err(VellumError::new(
                &format!(
                    "{} on field {} expects an array operand, found {}",
                    operator.operator(),
                    field_name,
                    type_name(&value)
                ),
                ErrorKind::InvalidOperand,
            ));
        }
        Ok(FieldFilter::new(field_name, operator, value))
    }

    pub(crate) fn operator(&self) -> ComparisonOperator {
        self.operator
    }

    pub(crate) fn value(&self) -> &Bson {
        &self.value
    }
}

impl Display for FieldFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.value {
            Bson::Array(values) => write!(
                f,
                "({} {} [{}])",
                self.field_name,
                self.operator.symbol(),
                values.iter().join(", ")
            ),
            value => write!(f, "({} {} {})", self.field_name, self.operator.symbol(), value),
        }
    }
}

impl ExpressionProvider for FieldFilter {
    fn lower(&self) -> Document {
        let mut document = Document::new();
        match (&self.operator, &self.value) {
            (ComparisonOperator::Eq, value) if !matches!(value, Bson::Document(_)) => {
                document.insert(self.field_name.clone(), value.clone());
            }
            (operator, value) => {
                let mut predicate = Document::new();
                predicate.insert(operator.operator(), value.clone());
                document.insert(self.field_name.clone(), predicate);
            }
        }
        document
    }
}
