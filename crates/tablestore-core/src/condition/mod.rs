//! Row-selection condition language.
//!
//! Conditions are boolean expressions over column names and bound
//! variables, used by `get_where_list`:
//!
//! ```text
//! (a == 2) | (b > 1.5 & ~flag)
//! name == 'x' and count % 2 == 0
//! ```
//!
//! Parsing goes through an explicit pest grammar and evaluation through a
//! small interpreter over [`Expr`]; nothing is ever handed to a general
//! expression evaluator.
//!
//! Precedence, loosest first: `|`/`or`, `&`/`and`, `~`/`not`, comparisons,
//! `+ -`, `* / %`, unary `-`. Unlike some array-expression languages, the
//! logical operators bind looser than comparisons, so `a == 1 | b == 2`
//! needs no parentheses.

mod ast;
mod error;
mod eval;
mod parser;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub use error::{ConditionError, ConditionErrorKind};
pub use eval::{compile, CompiledCondition, Variables};
pub use parser::{parse, MAX_DEPTH, MAX_NESTING};
