use bson::{Bson, Document};
use itertools::Itertools;
use std::fmt::Display;

use crate::common::{OP_AND, OP_NOR, OP_OR};
use crate::errors::{ErrorKind, VellumError, VellumResult};

use super::{ExpressionProvider, Query, QueryExpression};

/// The n-ary boolean connectives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
    Nor,
}

impl Connective {
    /// The native operator key this connective lowers to.
    pub fn operator(&self) -> &'static str {
        match self {
            Connective::And => OP_AND,
            Connective::Or => OP_OR,
            Connective::Nor => OP_NOR,
        }
    }
}

/// A connective applied to an ordered list of child expressions.
///
/// Children keep the order they were given in, and lowering emits them in that
/// order, so `and([a, or([b, c])])` lowers to
/// `{$and: [a', {$or: [b', c']}]}` without any flattening or reordering.
pub(crate) struct LogicalFilter {
    connective: Connective,
    operands: Vec<QueryExpression>,
}

impl LogicalFilter {
    /// Builds a node from operands already known to be valid expressions.
    pub(crate) fn of(connective: Connective, operands: Vec<QueryExpression>) -> Self {
        LogicalFilter {
            connective,
            operands,
        }
    }

    /// Builds a node from caller supplied operands, validating each one.
    pub(crate) fn try_new<I, Q>(connective: Connective, operands: I) -> VellumResult<Self>
    where
        I: IntoIterator<Item = Q>,
        Q: Into<Query>,
    {
        let mut expressions = Vec::new();
        for (position, operand) in operands.into_iter().enumerate() {
            match operand.into() {
                Query::Expression(expression) => expressions.push(expression),
                Query::Native(document) => {
                    log::error!(
                        "Operand {} of {} is a native filter {}, expected an expression",
                        position,
                        connective.operator(),
                        document
                    );
                    return Err(VellumError::new(
                        &format!(
                            "Operand {} of {} must be a query expression, found a native filter",
                            position,
                            connective.operator()
                        ),
                        ErrorKind::TypeMismatch,
                    ));
                }
            }
        }

        if expressions.is_empty() {
            log::error!("{} requires at least one operand", connective.operator());
            return Err(VellumError::new(
                &format!("{} requires at least one operand", connective.operator()),
                ErrorKind::InvalidOperand,
            ));
        }
        Ok(LogicalFilter::of(connective, expressions))
    }
}

impl Display for LogicalFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.connective {
            Connective::And => write!(f, "({})", self.operands.iter().join(" && ")),
            Connective::Or => write!(f, "({})", self.operands.iter().join(" || ")),
            Connective::Nor => write!(f, "!({})", self.operands.iter().join(" || ")),
        }
    }
}

impl ExpressionProvider for LogicalFilter {
    fn lower(&self) -> Document {
        let children: Vec<Bson> = self
            .operands
            .iter()
            .map(|operand| Bson::Document(operand.to_filter()))
            .collect();

        let mut document = Document::new();
        document.insert(self.connective.operator(), children);
        document
    }
}
