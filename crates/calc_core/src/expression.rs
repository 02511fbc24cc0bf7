use std::fmt;

use rug::Integer;

/// Operation tags, used where code needs to talk about a node's kind
/// without holding its operands (mutation pools, fitness comparison).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Number,
    Imaginary,
    Variable,
    Natural,
    Pi,
    Negate,
    NaturalExp,
    Log,
    Sqrt,
    Cos,
    Sin,
    Tan,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulus,
    Exponentiation,
    Notation,
}

/// Binary tags eligible for random structural mutation. Modulus is
/// excluded (its derivative is opaque); scientific notation is a regular
/// binary node here.
pub const BINARY: &[Op] = &[
    Op::Add,
    Op::Subtract,
    Op::Multiply,
    Op::Divide,
    Op::Exponentiation,
    Op::Notation,
];

pub const UNARY: &[Op] = &[
    Op::Negate,
    Op::NaturalExp,
    Op::Log,
    Op::Sqrt,
    Op::Cos,
    Op::Sin,
    Op::Tan,
];

pub const NUMBERS: &[Op] = &[Op::Number, Op::Imaginary];

pub const CONSTANTS: &[Op] = &[Op::Natural, Op::Pi];

/// A symbolic expression. The variant shape fixes each operation's arity:
/// leaves carry literal text, unary nodes one operand, binary nodes two.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Number(String),
    Imaginary(String),
    Variable(String),
    Natural,
    Pi,
    Negate(Box<Node>),
    NaturalExp(Box<Node>),
    Log(Box<Node>),
    Sqrt(Box<Node>),
    Cos(Box<Node>),
    Sin(Box<Node>),
    Tan(Box<Node>),
    Add(Box<Node>, Box<Node>),
    Subtract(Box<Node>, Box<Node>),
    Multiply(Box<Node>, Box<Node>),
    Divide(Box<Node>, Box<Node>),
    Modulus(Box<Node>, Box<Node>),
    Exponentiation(Box<Node>, Box<Node>),
    Notation(Box<Node>, Box<Node>),
}

impl Node {
    pub fn op(&self) -> Op {
        match self {
            Node::Number(_) => Op::Number,
            Node::Imaginary(_) => Op::Imaginary,
            Node::Variable(_) => Op::Variable,
            Node::Natural => Op::Natural,
            Node::Pi => Op::Pi,
            Node::Negate(_) => Op::Negate,
            Node::NaturalExp(_) => Op::NaturalExp,
            Node::Log(_) => Op::Log,
            Node::Sqrt(_) => Op::Sqrt,
            Node::Cos(_) => Op::Cos,
            Node::Sin(_) => Op::Sin,
            Node::Tan(_) => Op::Tan,
            Node::Add(_, _) => Op::Add,
            Node::Subtract(_, _) => Op::Subtract,
            Node::Multiply(_, _) => Op::Multiply,
            Node::Divide(_, _) => Op::Divide,
            Node::Modulus(_, _) => Op::Modulus,
            Node::Exponentiation(_, _) => Op::Exponentiation,
            Node::Notation(_, _) => Op::Notation,
        }
    }

    /// Builds a binary node from a tag. `None` for tags of other arities.
    pub fn binary(op: Op, left: Node, right: Node) -> Option<Node> {
        let (l, r) = (Box::new(left), Box::new(right));
        Some(match op {
            Op::Add => Node::Add(l, r),
            Op::Subtract => Node::Subtract(l, r),
            Op::Multiply => Node::Multiply(l, r),
            Op::Divide => Node::Divide(l, r),
            Op::Modulus => Node::Modulus(l, r),
            Op::Exponentiation => Node::Exponentiation(l, r),
            Op::Notation => Node::Notation(l, r),
            _ => return None,
        })
    }

    /// Builds a unary node from a tag. `None` for tags of other arities.
    pub fn unary(op: Op, operand: Node) -> Option<Node> {
        let l = Box::new(operand);
        Some(match op {
            Op::Negate => Node::Negate(l),
            Op::NaturalExp => Node::NaturalExp(l),
            Op::Log => Node::Log(l),
            Op::Sqrt => Node::Sqrt(l),
            Op::Cos => Node::Cos(l),
            Op::Sin => Node::Sin(l),
            Op::Tan => Node::Tan(l),
            _ => return None,
        })
    }

    pub fn left(&self) -> Option<&Node> {
        match self {
            Node::Negate(l)
            | Node::NaturalExp(l)
            | Node::Log(l)
            | Node::Sqrt(l)
            | Node::Cos(l)
            | Node::Sin(l)
            | Node::Tan(l)
            | Node::Add(l, _)
            | Node::Subtract(l, _)
            | Node::Multiply(l, _)
            | Node::Divide(l, _)
            | Node::Modulus(l, _)
            | Node::Exponentiation(l, _)
            | Node::Notation(l, _) => Some(l),
            _ => None,
        }
    }

    pub fn right(&self) -> Option<&Node> {
        match self {
            Node::Add(_, r)
            | Node::Subtract(_, r)
            | Node::Multiply(_, r)
            | Node::Divide(_, r)
            | Node::Modulus(_, r)
            | Node::Exponentiation(_, r)
            | Node::Notation(_, r) => Some(r),
            _ => None,
        }
    }

    /// Number of nodes in the tree, this one included.
    pub fn count(&self) -> usize {
        1 + self.left().map_or(0, Node::count) + self.right().map_or(0, Node::count)
    }

    pub fn literal(&self) -> Option<&str> {
        match self {
            Node::Number(v) | Node::Imaginary(v) | Node::Variable(v) => Some(v),
            _ => None,
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self.op(), Op::Number | Op::Imaginary | Op::Notation)
    }

    /// Whether this node is a numeric literal equal to the integer `x`.
    /// Literal text that is not a base-10 integer never matches, and
    /// non-literal nodes never match.
    pub fn is_integer(&self, x: i64) -> bool {
        match self {
            Node::Number(v) | Node::Imaginary(v) => {
                v.parse::<Integer>().map_or(false, |value| value == x)
            }
            Node::Notation(l, r) => {
                let mantissa = match l.literal() {
                    Some(text) => text,
                    None => return false,
                };
                let exponent = match r.literal() {
                    Some(text) => text,
                    None => return false,
                };
                let mantissa: Integer = match mantissa.parse() {
                    Ok(value) => value,
                    Err(_) => return false,
                };
                let exponent = match exponent.parse::<Integer>().ok().and_then(|e| e.to_u32()) {
                    Some(e) => e,
                    None => return false,
                };
                Integer::from(Integer::u_pow_u(10, exponent)) * mantissa == x
            }
            _ => false,
        }
    }

    /// The symbolic derivative with respect to the (single) variable.
    /// Constant exponents only for the power rule; modulus passes through
    /// unchanged.
    pub fn derivative(&self) -> Node {
        match self {
            Node::Add(l, r) => Node::Add(Box::new(l.derivative()), Box::new(r.derivative())),
            Node::Subtract(l, r) => {
                Node::Subtract(Box::new(l.derivative()), Box::new(r.derivative()))
            }
            Node::Multiply(l, r) => Node::Add(
                Box::new(Node::Multiply(l.clone(), Box::new(r.derivative()))),
                Box::new(Node::Multiply(r.clone(), Box::new(l.derivative()))),
            ),
            Node::Divide(l, r) => Node::Divide(
                Box::new(Node::Subtract(
                    Box::new(Node::Multiply(r.clone(), Box::new(l.derivative()))),
                    Box::new(Node::Multiply(l.clone(), Box::new(r.derivative()))),
                )),
                Box::new(Node::Exponentiation(
                    r.clone(),
                    Box::new(Node::Number("2".into())),
                )),
            ),
            Node::Exponentiation(l, r) => {
                let mut decremented = r
                    .literal()
                    .and_then(|text| text.parse::<Integer>().ok())
                    .unwrap_or_default();
                decremented -= 1;
                let power = Node::Exponentiation(
                    l.clone(),
                    Box::new(Node::Number(decremented.to_string())),
                );
                Node::Multiply(
                    Box::new(Node::Multiply(r.clone(), Box::new(power))),
                    Box::new(l.derivative()),
                )
            }
            Node::Negate(l) => Node::Negate(Box::new(l.derivative())),
            Node::NaturalExp(l) => {
                Node::Multiply(Box::new(self.clone()), Box::new(l.derivative()))
            }
            Node::Log(l) => Node::Divide(Box::new(l.derivative()), l.clone()),
            Node::Sqrt(l) => Node::Divide(
                Box::new(Node::Multiply(
                    Box::new(Node::Number("0.5".into())),
                    Box::new(l.derivative()),
                )),
                Box::new(self.clone()),
            ),
            Node::Cos(l) => Node::Negate(Box::new(Node::Multiply(
                Box::new(Node::Sin(l.clone())),
                Box::new(l.derivative()),
            ))),
            Node::Sin(l) => Node::Multiply(
                Box::new(Node::Cos(l.clone())),
                Box::new(l.derivative()),
            ),
            Node::Tan(l) => Node::Multiply(
                Box::new(Node::Add(
                    Box::new(Node::Number("1".into())),
                    Box::new(Node::Exponentiation(
                        Box::new(self.clone()),
                        Box::new(Node::Number("2".into())),
                    )),
                )),
                Box::new(l.derivative()),
            ),
            Node::Variable(_) => Node::Number("1".into()),
            Node::Modulus(_, _) => self.clone(),
            Node::Number(_) | Node::Imaginary(_) | Node::Notation(_, _) | Node::Natural
            | Node::Pi => Node::Number("0".into()),
        }
    }

    /// One bottom-up rewrite pass over the identity table. Children are
    /// simplified first, then each node is matched against the identities
    /// for its operation.
    pub fn simplify(&self) -> Node {
        match self {
            Node::Add(l, r) => {
                let (l, r) = (l.simplify(), r.simplify());
                if l.is_numeric() && l.is_integer(0) {
                    r
                } else if r.is_numeric() && r.is_integer(0) {
                    l
                } else {
                    Node::Add(Box::new(l), Box::new(r))
                }
            }
            Node::Subtract(l, r) => {
                let (l, r) = (l.simplify(), r.simplify());
                if l.is_numeric() && l.is_integer(0) {
                    Node::Negate(Box::new(r))
                } else if r.is_numeric() && r.is_integer(0) {
                    l
                } else {
                    Node::Subtract(Box::new(l), Box::new(r))
                }
            }
            Node::Multiply(l, r) => {
                let (l, r) = (l.simplify(), r.simplify());
                if (l.is_numeric() && l.is_integer(0)) || (r.is_numeric() && r.is_integer(0)) {
                    Node::Number("0".into())
                } else if l.is_numeric() && l.is_integer(1) {
                    r
                } else if r.is_numeric() && r.is_integer(1) {
                    l
                } else {
                    Node::Multiply(Box::new(l), Box::new(r))
                }
            }
            Node::Divide(l, r) => {
                let (l, r) = (l.simplify(), r.simplify());
                if l.is_numeric() && l.is_integer(0) {
                    Node::Number("0".into())
                } else if r.is_numeric() && r.is_integer(0) {
                    Node::Number("+Inf".into())
                } else if r.is_numeric() && r.is_integer(1) {
                    l
                } else {
                    Node::Divide(Box::new(l), Box::new(r))
                }
            }
            Node::Modulus(l, r) => {
                let (l, r) = (l.simplify(), r.simplify());
                if r.is_numeric() && r.is_integer(1) {
                    l
                } else {
                    Node::Modulus(Box::new(l), Box::new(r))
                }
            }
            Node::Exponentiation(l, r) => {
                let (l, r) = (l.simplify(), r.simplify());
                if r.is_numeric() && r.is_integer(0) {
                    Node::Number("1".into())
                } else if l.is_numeric() && l.is_integer(0) {
                    Node::Number("0".into())
                } else if l.is_numeric() && l.is_integer(1) {
                    Node::Number("1".into())
                } else if r.is_numeric() && r.is_integer(1) {
                    l
                } else {
                    Node::Exponentiation(Box::new(l), Box::new(r))
                }
            }
            Node::Negate(l) => {
                let l = l.simplify();
                if l.is_numeric() && l.is_integer(0) {
                    Node::Number("0".into())
                } else {
                    Node::Negate(Box::new(l))
                }
            }
            Node::NaturalExp(l) => {
                let l = l.simplify();
                if l.is_numeric() && l.is_integer(0) {
                    Node::Number("1".into())
                } else if l.is_numeric() && l.is_integer(1) {
                    Node::Variable("e".into())
                } else {
                    Node::NaturalExp(Box::new(l))
                }
            }
            Node::Log(l) => {
                let l = l.simplify();
                if l.op() == Op::Natural {
                    l
                } else {
                    Node::Log(Box::new(l))
                }
            }
            Node::Sqrt(l) => {
                let l = l.simplify();
                if l.is_numeric() && l.is_integer(0) {
                    Node::Number("0".into())
                } else if l.is_numeric() && l.is_integer(1) {
                    Node::Number("1".into())
                } else {
                    Node::Sqrt(Box::new(l))
                }
            }
            Node::Cos(l) => Node::Cos(Box::new(l.simplify())),
            Node::Sin(l) => Node::Sin(Box::new(l.simplify())),
            Node::Tan(l) => Node::Tan(Box::new(l.simplify())),
            Node::Notation(l, r) => Node::Notation(Box::new(l.simplify()), Box::new(r.simplify())),
            Node::Number(_) | Node::Imaginary(_) | Node::Variable(_) | Node::Natural
            | Node::Pi => self.clone(),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Node::Number(v) => write!(f, "{v}"),
            Node::Imaginary(v) => write!(f, "{v}i"),
            Node::Variable(v) => write!(f, "{v}"),
            Node::Natural => write!(f, "e"),
            Node::Pi => write!(f, "pi"),
            Node::Negate(l) => write!(f, "-({l})"),
            Node::NaturalExp(l) => write!(f, "(e^{l})"),
            Node::Log(l) => write!(f, "log({l})"),
            Node::Sqrt(l) => write!(f, "sqrt({l})"),
            Node::Cos(l) => write!(f, "cos({l})"),
            Node::Sin(l) => write!(f, "sin({l})"),
            Node::Tan(l) => write!(f, "tan({l})"),
            Node::Add(l, r) => write!(f, "({l} + {r})"),
            Node::Subtract(l, r) => write!(f, "({l} - {r})"),
            Node::Multiply(l, r) => write!(f, "({l} * {r})"),
            Node::Divide(l, r) => write!(f, "({l} / {r})"),
            Node::Modulus(l, r) => write!(f, "({l} % {r})"),
            Node::Exponentiation(l, r) => write!(f, "({l}^{r})"),
            Node::Notation(l, r) => match &**l {
                Node::Imaginary(v) => write!(f, "{v}e{r}i"),
                _ => write!(f, "{l}e{r}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Node;

    fn x() -> Node {
        Node::Variable("x".into())
    }

    fn num(v: &str) -> Node {
        Node::Number(v.into())
    }

    #[test]
    fn render_templates_parenthesize_fully() {
        let sum = Node::Add(Box::new(x()), Box::new(num("1")));
        assert_eq!(sum.to_string(), "(x + 1)");
        let nested = Node::Multiply(Box::new(sum), Box::new(Node::Sin(Box::new(x()))));
        assert_eq!(nested.to_string(), "((x + 1) * sin(x))");
        assert_eq!(Node::Negate(Box::new(x())).to_string(), "-(x)");
        assert_eq!(Node::NaturalExp(Box::new(x())).to_string(), "(e^x)");
    }

    #[test]
    fn notation_renders_mantissa_exponent() {
        let real = Node::Notation(Box::new(num("2")), Box::new(num("3")));
        assert_eq!(real.to_string(), "2e3");
        let imaginary = Node::Notation(
            Box::new(Node::Imaginary("2".into())),
            Box::new(num("3")),
        );
        assert_eq!(imaginary.to_string(), "2e3i");
    }

    #[test]
    fn power_rule_decrements_integer_exponents() {
        let cubed = Node::Exponentiation(Box::new(x()), Box::new(num("3")));
        assert_eq!(cubed.derivative().simplify().to_string(), "(3 * (x^2))");
    }

    #[test]
    fn sine_derivative_is_cosine() {
        let sine = Node::Sin(Box::new(x()));
        assert_eq!(sine.derivative().simplify().to_string(), "cos(x)");
    }

    #[test]
    fn square_root_derivative_keeps_decimal_constant() {
        let root = Node::Sqrt(Box::new(x()));
        assert_eq!(
            root.derivative().simplify().to_string(),
            "(0.5 / sqrt(x))"
        );
    }

    #[test]
    fn product_rule_shape() {
        let product = Node::Multiply(Box::new(x()), Box::new(Node::Sin(Box::new(x()))));
        assert_eq!(
            product.derivative().to_string(),
            "((x * (cos(x) * 1)) + (sin(x) * 1))"
        );
    }

    #[test]
    fn quotient_rule_squares_denominator() {
        let quotient = Node::Divide(Box::new(num("1")), Box::new(x()));
        assert_eq!(
            quotient.derivative().simplify().to_string(),
            "(-(1) / (x^2))"
        );
    }

    #[test]
    fn constants_differentiate_to_zero() {
        assert_eq!(Node::Pi.derivative().to_string(), "0");
        assert_eq!(Node::Natural.derivative().to_string(), "0");
        assert_eq!(num("7").derivative().to_string(), "0");
    }

    #[test]
    fn zero_to_the_zero_simplifies_to_one() {
        let power = Node::Exponentiation(Box::new(num("0")), Box::new(num("0")));
        assert_eq!(power.simplify().to_string(), "1");
    }

    #[test]
    fn division_by_zero_simplifies_to_inf_sentinel() {
        let quotient = Node::Divide(Box::new(x()), Box::new(num("0")));
        assert_eq!(quotient.simplify().to_string(), "+Inf");
    }

    #[test]
    fn identity_table() {
        let cases: &[(Node, &str)] = &[
            (Node::Add(Box::new(num("0")), Box::new(x())), "x"),
            (Node::Subtract(Box::new(x()), Box::new(num("0"))), "x"),
            (Node::Subtract(Box::new(num("0")), Box::new(x())), "-(x)"),
            (Node::Multiply(Box::new(num("1")), Box::new(x())), "x"),
            (Node::Multiply(Box::new(x()), Box::new(num("0"))), "0"),
            (Node::Modulus(Box::new(x()), Box::new(num("1"))), "x"),
            (Node::Exponentiation(Box::new(x()), Box::new(num("1"))), "x"),
            (Node::Divide(Box::new(x()), Box::new(num("1"))), "x"),
            (Node::NaturalExp(Box::new(num("1"))), "e"),
            (Node::Log(Box::new(Node::Natural)), "e"),
            (Node::Sqrt(Box::new(num("1"))), "1"),
        ];
        for (node, expected) in cases {
            assert_eq!(node.simplify().to_string(), *expected, "{node}");
        }
    }

    #[test]
    fn simplify_is_idempotent() {
        let samples = [
            Node::Exponentiation(Box::new(x()), Box::new(num("3")))
                .derivative(),
            Node::Sin(Box::new(Node::Multiply(Box::new(num("2")), Box::new(x()))))
                .derivative(),
            Node::Divide(Box::new(num("1")), Box::new(x())).derivative(),
        ];
        for sample in samples {
            let once = sample.simplify();
            assert_eq!(once.simplify(), once);
        }
    }

    #[test]
    fn decimal_literals_never_match_integer_identities() {
        assert!(!num("0.5").is_integer(0));
        assert!(!num("0.5").is_integer(1));
        assert!(num("5").is_integer(5));
        let notation = Node::Notation(Box::new(num("2")), Box::new(num("2")));
        assert!(notation.is_integer(200));
    }

    #[test]
    fn node_count_includes_all_descendants() {
        let tree = Node::Multiply(
            Box::new(Node::Sin(Box::new(x()))),
            Box::new(Node::Add(Box::new(x()), Box::new(num("1")))),
        );
        assert_eq!(tree.count(), 6);
    }
}
