//! Arbitrary-precision interactive calculator core.
//!
//! A line of input flows through three stages: the backtracking grammar
//! in [`grammar`] emits a flat rule-tagged token trace, [`tree`] nests it
//! by span containment, and [`eval`] walks the tree against a [`Session`].
//! Numeric results are exact complex-rational matrices ([`matrix`],
//! [`complex`]); `simplify` and `derivative` switch to the symbolic
//! engine in [`expression`], whose trees also feed the evolutionary
//! antiderivative search in [`integrate`].

pub mod complex;
pub mod eval;
pub mod expression;
pub mod grammar;
pub mod integrate;
pub mod matrix;
pub mod tree;

pub use eval::{EvalError, Session, Value};
pub use expression::Node;
pub use grammar::{parse, ParseError};
pub use integrate::{integrate, IntegrateError};
