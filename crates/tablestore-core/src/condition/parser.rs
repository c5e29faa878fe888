//! Condition parser built on pest.

use pest::iterators::Pair;
use pest::Parser as PestParser;
use pest_derive::Parser;

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::error::{ConditionError, ConditionErrorKind};
use crate::column::Scalar;

#[derive(Parser)]
#[grammar = "condition/grammar.pest"]
pub(crate) struct ConditionParser;

/// Deepest parenthesis nesting [`parse`] accepts.
pub const MAX_NESTING: usize = 64;

/// Deepest expression tree [`parse`] builds. Long operator chains and
/// repeated `~`/`-` count one level per operator.
pub const MAX_DEPTH: usize = 256;

/// An expression and the depth of its tree.
type Built = (Expr, usize);

/// Parses a condition string into an expression tree.
///
/// # Errors
///
/// Returns a [`ConditionError`] of kind `Syntax` if the input does not match
/// the grammar, nests parentheses deeper than [`MAX_NESTING`] or builds a
/// tree deeper than [`MAX_DEPTH`], or `Overflow` for an integer literal
/// outside `i64`.
pub fn parse(input: &str) -> Result<Expr, ConditionError> {
    check_nesting(input)?;
    let mut pairs = ConditionParser::parse(Rule::condition, input).map_err(|e| {
        let position = match e.location {
            pest::error::InputLocation::Pos(p) => p,
            pest::error::InputLocation::Span((s, _)) => s,
        };
        ConditionError::syntax(
            position,
            input.chars().take(50).collect::<String>(),
            e.variant.message().into_owned(),
        )
    })?;

    let condition = pairs
        .next()
        .ok_or_else(|| ConditionError::syntax(0, input, "Empty condition"))?;
    let or_expr = condition
        .into_inner()
        .next()
        .ok_or_else(|| ConditionError::syntax(0, input, "Empty condition"))?;
    build(or_expr).map(|(expr, _)| expr)
}

/// Rejects deep nesting before the recursive descent sees it. Quoted
/// parentheses do not count.
fn check_nesting(input: &str) -> Result<(), ConditionError> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (position, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(') => {
                depth += 1;
                if depth > MAX_NESTING {
                    return Err(ConditionError::syntax(
                        position,
                        input.chars().take(50).collect::<String>(),
                        format!("Parentheses nested deeper than {MAX_NESTING}"),
                    ));
                }
            }
            (None, ')') => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

/// Depth of a node `levels` above a subtree of `depth`.
fn deeper(depth: usize, levels: usize, position: usize) -> Result<usize, ConditionError> {
    let depth = depth.saturating_add(levels);
    if depth > MAX_DEPTH {
        return Err(ConditionError::syntax(
            position,
            "",
            format!("Expression nested deeper than {MAX_DEPTH}"),
        ));
    }
    Ok(depth)
}

fn leaf(expr: Expr) -> Built {
    (expr, 1)
}

fn build(pair: Pair<'_, Rule>) -> Result<Built, ConditionError> {
    match pair.as_rule() {
        Rule::or_expr => build_chain(pair, Rule::or_op),
        Rule::and_expr => build_chain(pair, Rule::and_op),
        Rule::not_expr => build_not(pair),
        Rule::comparison | Rule::additive | Rule::multiplicative => build_infix(pair),
        Rule::unary => build_unary(pair),
        Rule::boolean => Ok(leaf(Expr::Literal(Scalar::Bool(
            pair.as_str().eq_ignore_ascii_case("true"),
        )))),
        Rule::integer => build_integer(&pair).map(leaf),
        Rule::float => build_float(&pair).map(leaf),
        Rule::string => Ok(leaf(Expr::Literal(Scalar::String(
            pair.into_inner()
                .next()
                .map(|inner| inner.as_str().to_string())
                .unwrap_or_default(),
        )))),
        Rule::identifier => Ok(leaf(Expr::Ident(pair.as_str().to_string()))),
        other => Err(unexpected(&pair, other)),
    }
}

/// `a op b op c` for the logical operators, folded left.
fn build_chain(pair: Pair<'_, Rule>, op_rule: Rule) -> Result<Built, ConditionError> {
    let op = if op_rule == Rule::or_op {
        BinaryOp::Or
    } else {
        BinaryOp::And
    };
    let position = pair.as_span().start();
    let mut operands = pair.into_inner().filter(|p| p.as_rule() != op_rule);
    let first = operands
        .next()
        .ok_or_else(|| ConditionError::syntax(position, "", "Expected operand"))?;
    let (mut expr, mut depth) = build(first)?;
    for next in operands {
        let start = next.as_span().start();
        let (rhs, rhs_depth) = build(next)?;
        depth = deeper(depth.max(rhs_depth), 1, start)?;
        expr = Expr::binary(op, expr, rhs);
    }
    Ok((expr, depth))
}

fn build_not(pair: Pair<'_, Rule>) -> Result<Built, ConditionError> {
    let position = pair.as_span().start();
    let mut negations = 0usize;
    let mut operand = None;
    for inner in pair.into_inner() {
        if inner.as_rule() == Rule::not_op {
            negations += 1;
        } else {
            operand = Some(build(inner)?);
        }
    }
    let (mut expr, depth) =
        operand.ok_or_else(|| ConditionError::syntax(position, "", "Expected operand"))?;
    let depth = deeper(depth, negations, position)?;
    for _ in 0..negations {
        expr = Expr::unary(UnaryOp::Not, expr);
    }
    Ok((expr, depth))
}

/// Comparison, additive and multiplicative levels: operands interleaved with
/// operator tokens, folded left.
fn build_infix(pair: Pair<'_, Rule>) -> Result<Built, ConditionError> {
    let position = pair.as_span().start();
    let mut inner = pair.into_inner();
    let first = inner
        .next()
        .ok_or_else(|| ConditionError::syntax(position, "", "Expected operand"))?;
    let (mut expr, mut depth) = build(first)?;
    while let Some(op_pair) = inner.next() {
        let op = binary_op(&op_pair)?;
        let rhs = inner.next().ok_or_else(|| {
            ConditionError::syntax(
                op_pair.as_span().end(),
                op_pair.as_str(),
                "Expected operand after operator",
            )
        })?;
        let (rhs, rhs_depth) = build(rhs)?;
        depth = deeper(depth.max(rhs_depth), 1, op_pair.as_span().start())?;
        expr = Expr::binary(op, expr, rhs);
    }
    Ok((expr, depth))
}

fn build_unary(pair: Pair<'_, Rule>) -> Result<Built, ConditionError> {
    let position = pair.as_span().start();
    let mut negations = 0usize;
    let mut operand = None;
    for inner in pair.into_inner() {
        if inner.as_rule() == Rule::neg_op {
            negations += 1;
        } else {
            operand = Some(inner);
        }
    }
    let operand =
        operand.ok_or_else(|| ConditionError::syntax(position, "", "Expected operand"))?;

    // Fold a single minus into a numeric literal so that i64::MIN parses.
    if negations == 1 && operand.as_rule() == Rule::integer {
        let text = format!("-{}", operand.as_str());
        return text
            .parse::<i64>()
            .map(|v| (Expr::Literal(Scalar::Long(v)), 1))
            .map_err(|_| overflow(&operand));
    }

    let (mut expr, depth) = build(operand)?;
    let depth = deeper(depth, negations, position)?;
    for _ in 0..negations {
        expr = Expr::unary(UnaryOp::Neg, expr);
    }
    Ok((expr, depth))
}

fn build_integer(pair: &Pair<'_, Rule>) -> Result<Expr, ConditionError> {
    pair.as_str()
        .parse::<i64>()
        .map(|v| Expr::Literal(Scalar::Long(v)))
        .map_err(|_| overflow(pair))
}

fn build_float(pair: &Pair<'_, Rule>) -> Result<Expr, ConditionError> {
    pair.as_str()
        .parse::<f64>()
        .map(|v| Expr::Literal(Scalar::Double(v)))
        .map_err(|e| {
            ConditionError::syntax(pair.as_span().start(), pair.as_str(), e.to_string())
        })
}

fn binary_op(pair: &Pair<'_, Rule>) -> Result<BinaryOp, ConditionError> {
    let op = match pair.as_str() {
        "==" => BinaryOp::Eq,
        "!=" => BinaryOp::Ne,
        "<" => BinaryOp::Lt,
        "<=" => BinaryOp::Le,
        ">" => BinaryOp::Gt,
        ">=" => BinaryOp::Ge,
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "*" => BinaryOp::Mul,
        "/" => BinaryOp::Div,
        "%" => BinaryOp::Rem,
        _ => return Err(unexpected(pair, pair.as_rule())),
    };
    Ok(op)
}

fn overflow(pair: &Pair<'_, Rule>) -> ConditionError {
    ConditionError::new(
        ConditionErrorKind::Overflow,
        pair.as_span().start(),
        pair.as_str(),
        "Integer literal out of range",
    )
}

fn unexpected(pair: &Pair<'_, Rule>, rule: Rule) -> ConditionError {
    ConditionError::syntax(
        pair.as_span().start(),
        pair.as_str(),
        format!("Unexpected {rule:?}"),
    )
}
