//! Type checking and row-wise evaluation of condition expressions.
//!
//! [`compile`] resolves every identifier (bound variables first, then scalar
//! columns) and checks operand types once, before any row is read. The
//! resulting [`CompiledCondition`] only fails at evaluation time on integer
//! division by zero or overflow.

use std::collections::HashMap;

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::error::{ConditionError, ConditionErrorKind};
use crate::column::{ColumnDescriptor, ColumnValues, Scalar, ScalarRef, ValueShape};

/// Values bound to identifiers in a condition.
pub type Variables = HashMap<String, Scalar>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ty {
    Long,
    Double,
    Bool,
    Str,
}

impl Ty {
    const fn name(self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Double => "double",
            Self::Bool => "bool",
            Self::Str => "string",
        }
    }

    const fn is_numeric(self) -> bool {
        matches!(self, Self::Long | Self::Double)
    }

    fn of_scalar(s: &Scalar) -> Self {
        match s {
            Scalar::Long(_) => Self::Long,
            Scalar::Double(_) => Self::Double,
            Scalar::Bool(_) => Self::Bool,
            Scalar::String(_) => Self::Str,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Const(Scalar),
    Column(usize),
    Not(Box<Node>),
    Neg(Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
}

/// A type-checked condition bound to a schema.
#[derive(Debug, Clone)]
pub struct CompiledCondition {
    root: Node,
    columns: Vec<usize>,
}

/// Resolves identifiers and type-checks `expr` against `schema`.
///
/// # Errors
///
/// - `UnknownIdentifier` if a name is neither a variable nor a column.
/// - `NotScalar` if an array or mask column is referenced.
/// - `TypeMismatch` for operands that do not fit their operator.
/// - `NotBoolean` if the whole expression is not boolean.
pub fn compile(
    expr: &Expr,
    schema: &[ColumnDescriptor],
    variables: &Variables,
) -> Result<CompiledCondition, ConditionError> {
    let mut columns = Vec::new();
    let (root, ty) = check(expr, schema, variables, &mut columns)?;
    if ty != Ty::Bool {
        return Err(ConditionError::new(
            ConditionErrorKind::NotBoolean,
            0,
            ty.name(),
            format!("Condition must be boolean, found {}", ty.name()),
        ));
    }
    Ok(CompiledCondition { root, columns })
}

fn check(
    expr: &Expr,
    schema: &[ColumnDescriptor],
    variables: &Variables,
    columns: &mut Vec<usize>,
) -> Result<(Node, Ty), ConditionError> {
    match expr {
        Expr::Literal(s) => Ok((Node::Const(s.clone()), Ty::of_scalar(s))),
        Expr::Ident(name) => {
            if let Some(value) = variables.get(name) {
                return Ok((Node::Const(value.clone()), Ty::of_scalar(value)));
            }
            let index = schema
                .iter()
                .position(|c| c.name == *name)
                .ok_or_else(|| ConditionError::unknown_identifier(name))?;
            let ty = match schema[index].kind.shape() {
                ValueShape::Long => Ty::Long,
                ValueShape::Double => Ty::Double,
                ValueShape::Bool => Ty::Bool,
                ValueShape::String => Ty::Str,
                shape => {
                    return Err(ConditionError::new(
                        ConditionErrorKind::NotScalar,
                        0,
                        name.as_str(),
                        format!("Column '{name}' holds {shape} values and cannot be compared"),
                    ))
                }
            };
            if !columns.contains(&index) {
                columns.push(index);
            }
            Ok((Node::Column(index), ty))
        }
        Expr::Unary(UnaryOp::Not, inner) => {
            let (node, ty) = check(inner, schema, variables, columns)?;
            if ty != Ty::Bool {
                return Err(ConditionError::type_mismatch(
                    "~",
                    format!("Logical not requires a bool operand, found {}", ty.name()),
                ));
            }
            Ok((Node::Not(Box::new(node)), Ty::Bool))
        }
        Expr::Unary(UnaryOp::Neg, inner) => {
            let (node, ty) = check(inner, schema, variables, columns)?;
            if !ty.is_numeric() {
                return Err(ConditionError::type_mismatch(
                    "-",
                    format!("Negation requires a numeric operand, found {}", ty.name()),
                ));
            }
            Ok((Node::Neg(Box::new(node)), ty))
        }
        Expr::Binary(op, l, r) => {
            let (left, lt) = check(l, schema, variables, columns)?;
            let (right, rt) = check(r, schema, variables, columns)?;
            let ty = binary_type(*op, lt, rt)?;
            Ok((Node::Binary(*op, Box::new(left), Box::new(right)), ty))
        }
    }
}

fn binary_type(op: BinaryOp, lt: Ty, rt: Ty) -> Result<Ty, ConditionError> {
    let mismatch = || {
        ConditionError::type_mismatch(
            op.symbol(),
            format!(
                "Operator '{op}' cannot combine {} and {}",
                lt.name(),
                rt.name()
            ),
        )
    };

    if op.is_logical() {
        return if lt == Ty::Bool && rt == Ty::Bool {
            Ok(Ty::Bool)
        } else {
            Err(mismatch())
        };
    }

    if op.is_comparison() {
        let comparable = (lt.is_numeric() && rt.is_numeric())
            || (lt == Ty::Str && rt == Ty::Str)
            || (lt == Ty::Bool && rt == Ty::Bool && matches!(op, BinaryOp::Eq | BinaryOp::Ne));
        return if comparable {
            Ok(Ty::Bool)
        } else {
            Err(mismatch())
        };
    }

    match (lt, rt) {
        (Ty::Long, Ty::Long) => Ok(Ty::Long),
        (a, b) if a.is_numeric() && b.is_numeric() => Ok(Ty::Double),
        _ => Err(mismatch()),
    }
}

impl CompiledCondition {
    /// Indices (into the schema) of the columns the condition reads.
    #[must_use]
    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    /// Evaluates the condition at `row`.
    ///
    /// `columns` must be laid out in schema order.
    ///
    /// # Errors
    ///
    /// Returns `DivisionByZero` or `Overflow` for failing integer arithmetic.
    pub fn matches(&self, columns: &[ColumnValues], row: usize) -> Result<bool, ConditionError> {
        match eval(&self.root, columns, row)? {
            ScalarRef::Bool(b) => Ok(b),
            other => Err(ConditionError::evaluation(
                ConditionErrorKind::NotBoolean,
                row,
                format!("Condition produced a non-boolean value {other:?}"),
            )),
        }
    }
}

fn eval<'a>(
    node: &'a Node,
    columns: &'a [ColumnValues],
    row: usize,
) -> Result<ScalarRef<'a>, ConditionError> {
    match node {
        Node::Const(s) => Ok(ScalarRef::from(s)),
        Node::Column(index) => columns
            .get(*index)
            .and_then(|c| c.scalar_at(row))
            .ok_or_else(|| {
                ConditionError::evaluation(
                    ConditionErrorKind::NotScalar,
                    row,
                    format!("Column {index} has no scalar value at row {row}"),
                )
            }),
        Node::Not(inner) => match eval(inner, columns, row)? {
            ScalarRef::Bool(b) => Ok(ScalarRef::Bool(!b)),
            _ => Err(type_error(row)),
        },
        Node::Neg(inner) => match eval(inner, columns, row)? {
            ScalarRef::Long(v) => v.checked_neg().map(ScalarRef::Long).ok_or_else(|| {
                ConditionError::evaluation(ConditionErrorKind::Overflow, row, "Integer overflow")
            }),
            ScalarRef::Double(v) => Ok(ScalarRef::Double(-v)),
            _ => Err(type_error(row)),
        },
        Node::Binary(BinaryOp::And, l, r) => {
            if as_bool(eval(l, columns, row)?, row)? {
                Ok(ScalarRef::Bool(as_bool(eval(r, columns, row)?, row)?))
            } else {
                Ok(ScalarRef::Bool(false))
            }
        }
        Node::Binary(BinaryOp::Or, l, r) => {
            if as_bool(eval(l, columns, row)?, row)? {
                Ok(ScalarRef::Bool(true))
            } else {
                Ok(ScalarRef::Bool(as_bool(eval(r, columns, row)?, row)?))
            }
        }
        Node::Binary(op, l, r) => {
            let left = eval(l, columns, row)?;
            let right = eval(r, columns, row)?;
            if op.is_comparison() {
                compare(*op, left, right, row).map(ScalarRef::Bool)
            } else {
                arithmetic(*op, left, right, row)
            }
        }
    }
}

fn as_bool(value: ScalarRef<'_>, row: usize) -> Result<bool, ConditionError> {
    match value {
        ScalarRef::Bool(b) => Ok(b),
        _ => Err(type_error(row)),
    }
}

fn compare(
    op: BinaryOp,
    left: ScalarRef<'_>,
    right: ScalarRef<'_>,
    row: usize,
) -> Result<bool, ConditionError> {
    use std::cmp::Ordering;

    let ordering = match (left, right) {
        (ScalarRef::Long(a), ScalarRef::Long(b)) => Some(a.cmp(&b)),
        (ScalarRef::Str(a), ScalarRef::Str(b)) => Some(a.cmp(b)),
        (ScalarRef::Bool(a), ScalarRef::Bool(b)) => Some(a.cmp(&b)),
        (a, b) => match (as_f64(a), as_f64(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => return Err(type_error(row)),
        },
    };

    // NaN compares unequal to everything.
    let Some(ordering) = ordering else {
        return Ok(op == BinaryOp::Ne);
    };
    Ok(match op {
        BinaryOp::Eq => ordering == Ordering::Equal,
        BinaryOp::Ne => ordering != Ordering::Equal,
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Le => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::Ge => ordering != Ordering::Less,
        _ => return Err(type_error(row)),
    })
}

fn arithmetic<'a>(
    op: BinaryOp,
    left: ScalarRef<'a>,
    right: ScalarRef<'a>,
    row: usize,
) -> Result<ScalarRef<'a>, ConditionError> {
    if let (ScalarRef::Long(a), ScalarRef::Long(b)) = (left, right) {
        if b == 0 && matches!(op, BinaryOp::Div | BinaryOp::Rem) {
            return Err(ConditionError::evaluation(
                ConditionErrorKind::DivisionByZero,
                row,
                format!("Integer division by zero at row {row}"),
            ));
        }
        let result = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Div => a.checked_div(b),
            BinaryOp::Rem => a.checked_rem(b),
            _ => return Err(type_error(row)),
        };
        return result.map(ScalarRef::Long).ok_or_else(|| {
            ConditionError::evaluation(
                ConditionErrorKind::Overflow,
                row,
                format!("Integer overflow at row {row}"),
            )
        });
    }

    let (Some(a), Some(b)) = (as_f64(left), as_f64(right)) else {
        return Err(type_error(row));
    };
    let value = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        _ => return Err(type_error(row)),
    };
    Ok(ScalarRef::Double(value))
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(value: ScalarRef<'_>) -> Option<f64> {
    match value {
        ScalarRef::Long(v) => Some(v as f64),
        ScalarRef::Double(v) => Some(v),
        _ => None,
    }
}

fn type_error(row: usize) -> ConditionError {
    ConditionError::evaluation(
        ConditionErrorKind::TypeMismatch,
        row,
        "Operand type changed after compilation",
    )
}
