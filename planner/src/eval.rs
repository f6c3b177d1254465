//! Resolved expression trees, typed and ready for evaluation by the executor.

use std::fmt;

use metadata::catalog::Column;
use metadata::functions::FunctionDesc;
use types::{data::Datum, schema::Type};

use crate::ast::NodeKind;

/// Binary operator of a resolved expression, including the logical connectives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
}

impl BinaryOp {
    /// Fixed mapping from the grammar token to the resolved operator.
    pub fn from_node_kind(kind: NodeKind) -> Option<BinaryOp> {
        match kind {
            NodeKind::And => Some(BinaryOp::And),
            NodeKind::Or => Some(BinaryOp::Or),
            NodeKind::Equal => Some(BinaryOp::Equal),
            NodeKind::NotEqual => Some(BinaryOp::NotEqual),
            NodeKind::Lth => Some(BinaryOp::Less),
            NodeKind::Leq => Some(BinaryOp::LessEqual),
            NodeKind::Gth => Some(BinaryOp::Greater),
            NodeKind::Geq => Some(BinaryOp::GreaterEqual),
            NodeKind::Plus => Some(BinaryOp::Plus),
            NodeKind::Minus => Some(BinaryOp::Minus),
            NodeKind::Multiply => Some(BinaryOp::Multiply),
            NodeKind::Divide => Some(BinaryOp::Divide),
            NodeKind::Modular => Some(BinaryOp::Modulo),
            _ => None,
        }
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Plus
                | BinaryOp::Minus
                | BinaryOp::Multiply
                | BinaryOp::Divide
                | BinaryOp::Modulo
        )
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::And => write!(f, "AND"),
            BinaryOp::Or => write!(f, "OR"),
            BinaryOp::Equal => write!(f, "="),
            BinaryOp::NotEqual => write!(f, "<>"),
            BinaryOp::Less => write!(f, "<"),
            BinaryOp::LessEqual => write!(f, "<="),
            BinaryOp::Greater => write!(f, ">"),
            BinaryOp::GreaterEqual => write!(f, ">="),
            BinaryOp::Plus => write!(f, "+"),
            BinaryOp::Minus => write!(f, "-"),
            BinaryOp::Multiply => write!(f, "*"),
            BinaryOp::Divide => write!(f, "/"),
            BinaryOp::Modulo => write!(f, "%"),
        }
    }
}

/// A resolved expression subtree.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalNode {
    Const(Datum),
    Field(Column),
    Not(Box<EvalNode>),
    Binary {
        op: BinaryOp,
        lhs: Box<EvalNode>,
        rhs: Box<EvalNode>,
    },
    Like {
        not: bool,
        field: Column,
        pattern: Datum,
    },
    FuncCall {
        desc: FunctionDesc,
        args: Vec<EvalNode>,
    },
    AggFuncCall {
        desc: FunctionDesc,
        args: Vec<EvalNode>,
    },
    CaseWhen {
        whens: Vec<(EvalNode, EvalNode)>,
        else_result: Option<Box<EvalNode>>,
    },
}

impl EvalNode {
    /// The type this expression evaluates to.
    ///
    /// Comparisons, logical connectives, NOT and LIKE are boolean; arithmetic
    /// follows the numeric widening of its operands; CASE takes the type of
    /// its first branch result, falling back to the ELSE result.
    pub fn value_type(&self) -> Type {
        match self {
            EvalNode::Const(datum) => datum.ty(),
            EvalNode::Field(column) => column.ty(),
            EvalNode::Not(_) | EvalNode::Like { .. } => Type::Bool,
            EvalNode::Binary { op, lhs, rhs } => {
                if op.is_arithmetic() {
                    let lhs_ty = lhs.value_type();
                    Type::promotion(&lhs_ty, &rhs.value_type()).unwrap_or(lhs_ty)
                } else {
                    Type::Bool
                }
            }
            EvalNode::FuncCall { desc, .. } | EvalNode::AggFuncCall { desc, .. } => {
                desc.return_type()
            }
            EvalNode::CaseWhen { whens, else_result } => whens
                .first()
                .map(|(_, result)| result.value_type())
                .or_else(|| else_result.as_ref().map(|e| e.value_type()))
                .unwrap_or(Type::Any),
        }
    }

    /// Returns `true` if an aggregate function call is reachable from this node.
    pub fn contains_aggregate(&self) -> bool {
        match self {
            EvalNode::AggFuncCall { .. } => true,
            EvalNode::Const(_) | EvalNode::Field(_) | EvalNode::Like { .. } => false,
            EvalNode::Not(child) => child.contains_aggregate(),
            EvalNode::Binary { lhs, rhs, .. } => {
                lhs.contains_aggregate() || rhs.contains_aggregate()
            }
            EvalNode::FuncCall { args, .. } => args.iter().any(EvalNode::contains_aggregate),
            EvalNode::CaseWhen { whens, else_result } => {
                whens
                    .iter()
                    .any(|(cond, result)| cond.contains_aggregate() || result.contains_aggregate())
                    || else_result
                        .as_ref()
                        .is_some_and(|e| e.contains_aggregate())
            }
        }
    }
}
