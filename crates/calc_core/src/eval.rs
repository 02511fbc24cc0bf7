use std::fmt;
use std::mem;

use num_traits::One;
use thiserror::Error;

use crate::complex::{self, Rational};
use crate::expression::Node;
use crate::grammar::Rule;
use crate::matrix::{Matrix, MatrixError};
use crate::tree::{Parsed, TreeNode};

/// Result of evaluating one line: a numeric matrix (scalars are 1x1) or a
/// symbolic expression from `simplify`/`derivative`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Matrix(Matrix),
    Expression(Node),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Matrix(matrix) => fmt::Display::fmt(matrix, f),
            Value::Expression(node) => fmt::Display::fmt(node, f),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("matrix within matrix is not allowed")]
    MatrixInMatrix,
    #[error("free variable `{0}` in a numeric context")]
    FreeVariable(String),
    #[error("symbolic result used in numeric arithmetic")]
    SymbolicOperand,
    #[error("expression has no symbolic form")]
    Unconvertible,
    #[error("malformed parse tree")]
    Malformed,
    #[error("precision must be an integer of at least 2")]
    Precision,
    #[error(transparent)]
    Matrix(#[from] MatrixError),
}

/// One interactive session. The working precision (bits for float
/// excursions) lives here, not in a process global: `prec(n)` mutates
/// this session only, and independent sessions do not observe each other.
#[derive(Debug, Clone)]
pub struct Session {
    precision: u32,
}

impl Default for Session {
    fn default() -> Self {
        Session { precision: 1024 }
    }
}

impl Session {
    pub fn new() -> Self {
        Session::default()
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    /// Evaluates a parsed line against this session.
    pub fn eval(&mut self, parsed: &Parsed) -> Result<Value, EvalError> {
        let e1 = parsed.root.child(Rule::E1).ok_or(EvalError::Malformed)?;
        self.eval_e1(parsed, e1)
    }

    // Additive fold: e2 ((add e2) / (minus e2))*.
    fn eval_e1(&mut self, p: &Parsed, node: &TreeNode) -> Result<Value, EvalError> {
        let mut value: Option<Value> = None;
        let mut children = node.children.iter();
        while let Some(child) = children.next() {
            match child.token.rule {
                Rule::E2 => value = Some(self.eval_e2(p, child)?),
                Rule::Add | Rule::Minus => {
                    let rule = child.token.rule;
                    let operand = children.next().ok_or(EvalError::Malformed)?;
                    let rhs = as_matrix(self.eval_e2(p, operand)?)?;
                    let lhs = as_matrix(value.take().ok_or(EvalError::Malformed)?)?;
                    let result = if rule == Rule::Add {
                        lhs.add(&rhs)?
                    } else {
                        lhs.sub(&rhs)?
                    };
                    value = Some(Value::Matrix(result));
                }
                _ => {}
            }
        }
        value.ok_or(EvalError::Malformed)
    }

    // Multiplicative fold: e3 ((multiply e3) / (divide e3) / (modulus e3))*.
    fn eval_e2(&mut self, p: &Parsed, node: &TreeNode) -> Result<Value, EvalError> {
        let mut value: Option<Value> = None;
        let mut children = node.children.iter();
        while let Some(child) = children.next() {
            match child.token.rule {
                Rule::E3 => value = Some(self.eval_e3(p, child)?),
                Rule::Multiply | Rule::Divide | Rule::Modulus => {
                    let rule = child.token.rule;
                    let operand = children.next().ok_or(EvalError::Malformed)?;
                    let rhs = as_matrix(self.eval_e3(p, operand)?)?;
                    let lhs = as_matrix(value.take().ok_or(EvalError::Malformed)?)?;
                    let result = match rule {
                        Rule::Multiply => lhs.mul(&rhs)?,
                        Rule::Divide => lhs.div(&rhs)?,
                        _ => lhs.modulus(&rhs)?,
                    };
                    value = Some(Value::Matrix(result));
                }
                _ => {}
            }
        }
        value.ok_or(EvalError::Malformed)
    }

    // Exponentiation folds left per repetition: 2^3^2 is (2^3)^2.
    fn eval_e3(&mut self, p: &Parsed, node: &TreeNode) -> Result<Value, EvalError> {
        let mut value: Option<Value> = None;
        let mut children = node.children.iter();
        while let Some(child) = children.next() {
            match child.token.rule {
                Rule::E4 => value = Some(self.eval_e4(p, child)?),
                Rule::Exponentiation => {
                    let operand = children.next().ok_or(EvalError::Malformed)?;
                    let rhs = as_matrix(self.eval_e4(p, operand)?)?;
                    let lhs = as_matrix(value.take().ok_or(EvalError::Malformed)?)?;
                    value = Some(Value::Matrix(lhs.pow(&rhs, self.precision)?));
                }
                _ => {}
            }
        }
        value.ok_or(EvalError::Malformed)
    }

    // e4 <- (minus value) / value.
    fn eval_e4(&mut self, p: &Parsed, node: &TreeNode) -> Result<Value, EvalError> {
        let mut negate = false;
        for child in &node.children {
            match child.token.rule {
                Rule::Minus => negate = true,
                Rule::Value => {
                    let value = self.eval_value(p, child)?;
                    return if negate {
                        Ok(Value::Matrix(as_matrix(value)?.neg()))
                    } else {
                        Ok(value)
                    };
                }
                _ => {}
            }
        }
        Err(EvalError::Malformed)
    }

    fn eval_value(&mut self, p: &Parsed, node: &TreeNode) -> Result<Value, EvalError> {
        for child in &node.children {
            match child.token.rule {
                Rule::Number => return self.literal(p, child, false),
                Rule::Imaginary => return self.literal(p, child, true),
                Rule::Matrix => return self.eval_matrix(p, child),
                Rule::Exp1 => {
                    let inner = as_matrix(self.eval_inner(p, child)?)?;
                    return Ok(Value::Matrix(inner.map(self.precision, |c| c.exp())?));
                }
                Rule::Exp2 => {
                    let operand = child.child(Rule::Value).ok_or(EvalError::Malformed)?;
                    let inner = as_matrix(self.eval_value(p, operand)?)?;
                    return Ok(Value::Matrix(inner.map(self.precision, |c| c.exp())?));
                }
                Rule::Natural => {
                    let one = Matrix::from_scalar(Rational::one());
                    return Ok(Value::Matrix(one.map(self.precision, |c| c.exp())?));
                }
                Rule::Pi => {
                    let value = complex::pi(self.precision)
                        .ok_or(EvalError::Matrix(MatrixError::NonFinite))?;
                    return Ok(Value::Matrix(Matrix::from_scalar(Rational::real(value))));
                }
                Rule::Prec => {
                    let value = as_matrix(self.eval_inner(p, child)?)?;
                    let scalar = value.scalar().ok_or(EvalError::Precision)?;
                    self.precision = scalar
                        .a
                        .numer()
                        .to_u32()
                        .filter(|&bits| bits >= 2)
                        .ok_or(EvalError::Precision)?;
                    return Ok(Value::Matrix(value));
                }
                Rule::Simplify => {
                    let inner = child.child(Rule::E1).ok_or(EvalError::Malformed)?;
                    let node = convert(p, inner).ok_or(EvalError::Unconvertible)?;
                    return Ok(Value::Expression(node.simplify()));
                }
                Rule::Derivative => {
                    let inner = child.child(Rule::E1).ok_or(EvalError::Malformed)?;
                    let node = convert(p, inner).ok_or(EvalError::Unconvertible)?;
                    return Ok(Value::Expression(node.derivative().simplify()));
                }
                Rule::Log => return self.transcendental(p, child, |c| c.ln()),
                Rule::Sqrt => return self.transcendental(p, child, |c| c.sqrt()),
                Rule::Cos => return self.transcendental(p, child, |c| c.cos()),
                Rule::Sin => return self.transcendental(p, child, |c| c.sin()),
                Rule::Tan => return self.transcendental(p, child, |c| c.tan()),
                Rule::Variable => return Err(EvalError::FreeVariable(p.text(&child.token))),
                Rule::Sub => return self.eval_inner(p, child),
                _ => {}
            }
        }
        Err(EvalError::Malformed)
    }

    fn eval_inner(&mut self, p: &Parsed, node: &TreeNode) -> Result<Value, EvalError> {
        let inner = node.child(Rule::E1).ok_or(EvalError::Malformed)?;
        self.eval_e1(p, inner)
    }

    fn transcendental(
        &mut self,
        p: &Parsed,
        node: &TreeNode,
        f: impl FnOnce(rug::Complex) -> rug::Complex,
    ) -> Result<Value, EvalError> {
        let inner = as_matrix(self.eval_inner(p, node)?)?;
        Ok(Value::Matrix(inner.map(self.precision, f)?))
    }

    // A numeric literal: decimal mantissa, optional power-of-ten notation.
    // Imaginary literals carry the value in the imaginary part.
    fn literal(&mut self, p: &Parsed, node: &TreeNode, imaginary: bool) -> Result<Value, EvalError> {
        let mut scalar = Rational::one();
        for part in &node.children {
            match part.token.rule {
                Rule::Decimal => {
                    scalar.a = complex::parse_decimal(&p.text(&part.token))
                        .ok_or(EvalError::Malformed)?;
                }
                Rule::Notation => {
                    let digits = part.child(Rule::Decimal).ok_or(EvalError::Malformed)?;
                    let exponent = complex::parse_decimal(&p.text(&digits.token))
                        .ok_or(EvalError::Malformed)?;
                    let ten = Rational::real(rug::Rational::from(10));
                    let factor = ten
                        .pow(&Rational::real(exponent), self.precision)
                        .ok_or(EvalError::Matrix(MatrixError::NonFinite))?;
                    scalar = scalar * factor;
                }
                _ => {}
            }
        }
        if imaginary {
            mem::swap(&mut scalar.a, &mut scalar.b);
        }
        Ok(Value::Matrix(Matrix::from_scalar(scalar)))
    }

    // Matrix literal assembly: elements extend the current row, each `row`
    // separator starts a new one. Only scalar elements may appear.
    fn eval_matrix(&mut self, p: &Parsed, node: &TreeNode) -> Result<Value, EvalError> {
        let mut values: Vec<Vec<Rational>> = vec![Vec::new()];
        for child in &node.children {
            match child.token.rule {
                Rule::E1 => {
                    let element = as_matrix(self.eval_e1(p, child)?)?;
                    let entry = element.scalar().ok_or(EvalError::MatrixInMatrix)?.clone();
                    if let Some(row) = values.last_mut() {
                        row.push(entry);
                    }
                }
                Rule::Row => values.push(Vec::new()),
                _ => {}
            }
        }
        Ok(Value::Matrix(Matrix { values }))
    }
}

fn as_matrix(value: Value) -> Result<Matrix, EvalError> {
    match value {
        Value::Matrix(matrix) => Ok(matrix),
        Value::Expression(_) => Err(EvalError::SymbolicOperand),
    }
}

/// Symbolic form of a precedence-level subtree. `None` when the subtree
/// contains something with no symbolic counterpart (matrices, `prec`,
/// nested symbolic calls).
fn convert(p: &Parsed, node: &TreeNode) -> Option<Node> {
    let mut value: Option<Node> = None;
    let mut children = node.children.iter();
    while let Some(child) = children.next() {
        match child.token.rule {
            Rule::E2 | Rule::E3 => value = Some(convert(p, child)?),
            Rule::E4 => value = Some(convert_value(p, child)?),
            Rule::Add | Rule::Minus | Rule::Multiply | Rule::Divide | Rule::Modulus => {
                let rule = child.token.rule;
                let operand = children.next()?;
                let rhs = Box::new(convert(p, operand)?);
                let lhs = Box::new(value.take()?);
                value = Some(match rule {
                    Rule::Add => Node::Add(lhs, rhs),
                    Rule::Minus => Node::Subtract(lhs, rhs),
                    Rule::Multiply => Node::Multiply(lhs, rhs),
                    Rule::Divide => Node::Divide(lhs, rhs),
                    _ => Node::Modulus(lhs, rhs),
                });
            }
            Rule::Exponentiation => {
                let operand = children.next()?;
                let rhs = Box::new(convert_value(p, operand)?);
                let lhs = Box::new(value.take()?);
                value = Some(Node::Exponentiation(lhs, rhs));
            }
            _ => {}
        }
    }
    value
}

fn convert_value(p: &Parsed, node: &TreeNode) -> Option<Node> {
    let mut children = node.children.iter();
    while let Some(child) = children.next() {
        match child.token.rule {
            Rule::Value => return convert_value(p, child),
            Rule::Minus => {
                // Unary minus wraps the operand that follows.
                let operand = children.next()?;
                return Some(Node::Negate(Box::new(convert_value(p, operand)?)));
            }
            Rule::Variable => return Some(Node::Variable(p.text(&child.token))),
            Rule::Number => return convert_literal(p, child, false),
            Rule::Imaginary => return convert_literal(p, child, true),
            Rule::Exp1 => {
                let inner = convert(p, child.child(Rule::E1)?)?;
                return Some(Node::NaturalExp(Box::new(inner)));
            }
            Rule::Exp2 => {
                let inner = convert_value(p, child.child(Rule::Value)?)?;
                return Some(Node::NaturalExp(Box::new(inner)));
            }
            Rule::Natural => return Some(Node::Natural),
            Rule::Pi => return Some(Node::Pi),
            Rule::Log => return convert_unary(p, child, Node::Log),
            Rule::Sqrt => return convert_unary(p, child, Node::Sqrt),
            Rule::Cos => return convert_unary(p, child, Node::Cos),
            Rule::Sin => return convert_unary(p, child, Node::Sin),
            Rule::Tan => return convert_unary(p, child, Node::Tan),
            Rule::Sub => return convert(p, child.child(Rule::E1)?),
            _ => {}
        }
    }
    None
}

fn convert_unary(
    p: &Parsed,
    node: &TreeNode,
    wrap: fn(Box<Node>) -> Node,
) -> Option<Node> {
    let inner = convert(p, node.child(Rule::E1)?)?;
    Some(wrap(Box::new(inner)))
}

fn convert_literal(p: &Parsed, node: &TreeNode, imaginary: bool) -> Option<Node> {
    let mut mantissa: Option<String> = None;
    let mut exponent: Option<String> = None;
    for part in &node.children {
        match part.token.rule {
            Rule::Decimal => mantissa = Some(p.text(&part.token)),
            Rule::Notation => {
                let digits = part.child(Rule::Decimal)?;
                exponent = Some(p.text(&digits.token));
            }
            _ => {}
        }
    }
    let leaf = if imaginary {
        Node::Imaginary(mantissa?)
    } else {
        Node::Number(mantissa?)
    };
    Some(match exponent {
        Some(text) => Node::Notation(Box::new(leaf), Box::new(Node::Number(text))),
        None => leaf,
    })
}

#[cfg(test)]
mod tests {
    use super::{EvalError, Session, Value};
    use crate::grammar::parse;
    use crate::matrix::MatrixError;

    fn eval(input: &str) -> Result<Value, EvalError> {
        Session::new().eval(&parse(input).unwrap())
    }

    fn display(input: &str) -> String {
        eval(input).unwrap().to_string()
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        assert_eq!(display("1 + 2 * 3"), "7");
        assert_eq!(display("(1 + 2) * 3"), "9");
    }

    #[test]
    fn exponentiation_folds_left() {
        assert_eq!(display("2^3^2"), "64");
    }

    #[test]
    fn unary_minus_and_negative_literals() {
        assert_eq!(display("-2 + 3"), "1");
        assert_eq!(display("2 - -2"), "4");
        assert_eq!(display("-(1 + 2)"), "-3");
    }

    #[test]
    fn exact_rational_division() {
        assert_eq!(display("1/2"), "1/2");
        assert_eq!(display("1/3 + 1/6"), "1/2");
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(
            eval("1/0").unwrap_err(),
            EvalError::Matrix(MatrixError::DivisionByZero)
        );
    }

    #[test]
    fn imaginary_arithmetic() {
        assert_eq!(display("2i * 2i"), "-4");
        assert_eq!(display("1 + 2i"), "1+2i");
    }

    #[test]
    fn scientific_notation_stays_exact() {
        assert_eq!(display("1e2"), "100");
        assert_eq!(display("5e-1"), "1/2");
        assert_eq!(display("2e3i"), "2000i");
    }

    #[test]
    fn matrix_addition_renders_row_major() {
        assert_eq!(display("[[1,2][3,4]] + [[1,1][1,1]]"), "[[2,3][4,5]]");
    }

    #[test]
    fn space_separated_matrix_elements() {
        assert_eq!(display("[[1 2][3 4]]"), "[[1,2][3,4]]");
    }

    #[test]
    fn matrix_within_matrix_is_rejected() {
        assert_eq!(
            eval("[[ [[1,2][3,4]] ]]").unwrap_err(),
            EvalError::MatrixInMatrix
        );
    }

    #[test]
    fn modulus_is_euclidean_on_integers_and_identity_otherwise() {
        assert_eq!(display("7 % 3"), "1");
        assert_eq!(display("-7 % 3"), "2");
        assert_eq!(display("3.5 % 2"), "7/2");
    }

    #[test]
    fn natural_exponent_forms_agree() {
        assert_eq!(display("exp(0)"), "1");
        assert_eq!(display("e^0"), "1");
        assert_eq!(display("e ^ 0"), "1");
    }

    #[test]
    fn trig_at_zero_is_exact() {
        assert_eq!(display("cos(0)"), "1");
        assert_eq!(display("sin(0)"), "0");
        assert_eq!(display("tan(0)"), "0");
    }

    #[test]
    fn pi_matches_the_agm_computation() {
        let value = display("pi");
        let reference = crate::complex::pi(1024).unwrap().to_string();
        assert_eq!(value, reference);
    }

    #[test]
    fn prec_sets_session_precision_and_returns_its_argument() {
        let mut session = Session::new();
        assert_eq!(session.precision(), 1024);
        let value = session.eval(&parse("prec(64)").unwrap()).unwrap();
        assert_eq!(value.to_string(), "64");
        assert_eq!(session.precision(), 64);
    }

    #[test]
    fn precision_controls_rationalized_digit_count() {
        let mut coarse = Session::new();
        coarse.eval(&parse("prec(64)").unwrap()).unwrap();
        let short = coarse.eval(&parse("sqrt(2)").unwrap()).unwrap().to_string();
        let long = Session::new()
            .eval(&parse("sqrt(2)").unwrap())
            .unwrap()
            .to_string();
        assert!(short.len() < long.len(), "{} !< {}", short.len(), long.len());
    }

    #[test]
    fn sessions_do_not_share_precision() {
        let mut a = Session::new();
        a.eval(&parse("prec(64)").unwrap()).unwrap();
        let b = Session::new();
        assert_eq!(b.precision(), 1024);
    }

    #[test]
    fn invalid_precision_is_rejected() {
        assert_eq!(eval("prec(0)").unwrap_err(), EvalError::Precision);
    }

    #[test]
    fn free_variable_is_a_numeric_error() {
        assert_eq!(eval("x + 1").unwrap_err(), EvalError::FreeVariable("x".into()));
    }

    #[test]
    fn simplify_produces_symbolic_values() {
        assert_eq!(display("simplify(x * 1)"), "x");
        assert_eq!(display("simplify(x + 0 * y)"), "x");
    }

    #[test]
    fn derivative_applies_the_power_rule() {
        assert_eq!(display("derivative(x^3)"), "(3 * (x^2))");
        assert_eq!(display("derivative(sin(x))"), "cos(x)");
    }

    #[test]
    fn converter_preserves_unary_minus() {
        assert_eq!(display("simplify(-x * 1)"), "-(x)");
    }

    #[test]
    fn converter_builds_left_folded_chains() {
        assert_eq!(display("simplify(a + b + c)"), "((a + b) + c)");
    }

    #[test]
    fn symbolic_operands_cannot_enter_numeric_arithmetic() {
        assert_eq!(
            eval("simplify(x) + 1").unwrap_err(),
            EvalError::SymbolicOperand
        );
    }

    #[test]
    fn symbolic_literals_keep_notation() {
        assert_eq!(display("simplify(2e3 * 1)"), "2e3");
        assert_eq!(display("simplify(2e3i * 1)"), "2e3i");
    }
}
