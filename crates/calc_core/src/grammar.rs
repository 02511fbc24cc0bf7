use std::fmt;

use thiserror::Error;

use crate::tree::{build, Parsed};

/// Grammar rule tags. Every successful production records a span labeled
/// with its tag; both the numeric evaluator and the symbolic converter
/// dispatch on these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    E,
    E1,
    E2,
    E3,
    E4,
    Value,
    Number,
    Imaginary,
    Decimal,
    Notation,
    Variable,
    Matrix,
    Row,
    Exp1,
    Exp2,
    Natural,
    Pi,
    Prec,
    Simplify,
    Derivative,
    Log,
    Sqrt,
    Cos,
    Sin,
    Tan,
    Sub,
    Add,
    Minus,
    Multiply,
    Divide,
    Modulus,
    Exponentiation,
    Open,
    Close,
    Sp,
}

impl Rule {
    pub fn name(self) -> &'static str {
        match self {
            Rule::E => "e",
            Rule::E1 => "e1",
            Rule::E2 => "e2",
            Rule::E3 => "e3",
            Rule::E4 => "e4",
            Rule::Value => "value",
            Rule::Number => "number",
            Rule::Imaginary => "imaginary",
            Rule::Decimal => "decimal",
            Rule::Notation => "notation",
            Rule::Variable => "variable",
            Rule::Matrix => "matrix",
            Rule::Row => "row",
            Rule::Exp1 => "exp1",
            Rule::Exp2 => "exp2",
            Rule::Natural => "natural",
            Rule::Pi => "pi",
            Rule::Prec => "prec",
            Rule::Simplify => "simplify",
            Rule::Derivative => "derivative",
            Rule::Log => "log",
            Rule::Sqrt => "sqrt",
            Rule::Cos => "cos",
            Rule::Sin => "sin",
            Rule::Tan => "tan",
            Rule::Sub => "sub",
            Rule::Add => "add",
            Rule::Minus => "minus",
            Rule::Multiply => "multiply",
            Rule::Divide => "divide",
            Rule::Modulus => "modulus",
            Rule::Exponentiation => "exponentiation",
            Rule::Open => "open",
            Rule::Close => "close",
            Rule::Sp => "sp",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A half-open span over the input's code-point sequence, labeled with the
/// rule that matched it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub rule: Rule,
    pub begin: u32,
    pub end: u32,
}

/// Syntax error anchored at the furthest position the grammar reached.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error near {rule} (line {begin_line} symbol {begin_symbol} - line {end_line} symbol {end_symbol}):\n\"{text}\"\n")]
pub struct ParseError {
    pub rule: Rule,
    pub begin_line: usize,
    pub begin_symbol: usize,
    pub end_line: usize,
    pub end_symbol: usize,
    pub text: String,
}

/// Keywords recognized as grammar leaves, with the descriptions the
/// interactive front end surfaces for autocomplete.
pub const KEYWORDS: &[(&str, &str)] = &[
    ("exp", "The natural number raised to a value"),
    ("e", "The natural number"),
    ("pi", "The constant PI"),
    ("prec", "Sets the precision for calculations"),
    ("simplify", "Simplifies the expression"),
    ("derivative", "Computes the symbolic derivative of the expression"),
    ("log", "The natural logarithm of the input"),
    ("sqrt", "The square root of the value"),
    ("cos", "The cosine of the value"),
    ("sin", "The sine of the value"),
    ("tan", "The tangent of the value"),
];

/// Parses one line of input into a tree, or reports a position-annotated
/// syntax error.
pub fn parse(input: &str) -> Result<Parsed, ParseError> {
    let buffer: Vec<char> = input.chars().collect();
    let mut parser = Parser {
        buffer,
        tokens: Vec::new(),
        position: 0,
        max: None,
    };
    if parser.e() {
        let root = build(&parser.tokens);
        match root {
            Some(root) => Ok(Parsed::new(parser.buffer, root)),
            None => Err(parser.error()),
        }
    } else {
        Err(parser.error())
    }
}

/// Deterministic backtracking matcher over a code-point buffer. Each rule
/// method consumes input on success and restores the saved position (and
/// truncates the emitted token list) on failure.
struct Parser {
    buffer: Vec<char>,
    tokens: Vec<Token>,
    position: usize,
    max: Option<Token>,
}

impl Parser {
    fn error(&self) -> ParseError {
        let token = self.max.unwrap_or(Token {
            rule: Rule::E,
            begin: 0,
            end: 0,
        });
        let (begin_line, begin_symbol) = self.translate(token.begin as usize);
        let (end_line, end_symbol) = self.translate(token.end as usize);
        let text: String = self.buffer[token.begin as usize..token.end as usize]
            .iter()
            .collect();
        ParseError {
            rule: token.rule,
            begin_line,
            begin_symbol,
            end_line,
            end_symbol,
            text,
        }
    }

    // 1-based line/symbol pair for a code-point offset. A position one past
    // the end of the buffer counts the end-of-input sentinel as a symbol.
    fn translate(&self, position: usize) -> (usize, usize) {
        let mut line = 1;
        let mut symbol = 0;
        for i in 0..=position {
            let c = self.buffer.get(i).copied().unwrap_or('\u{0}');
            if c == '\n' {
                line += 1;
                symbol = 0;
            } else {
                symbol += 1;
            }
            if i == position {
                break;
            }
        }
        (line, symbol)
    }

    fn mark(&self) -> (usize, usize) {
        (self.position, self.tokens.len())
    }

    fn restore(&mut self, mark: (usize, usize)) {
        self.position = mark.0;
        self.tokens.truncate(mark.1);
    }

    fn emit(&mut self, rule: Rule, begin: usize) {
        let token = Token {
            rule,
            begin: begin as u32,
            end: self.position as u32,
        };
        self.tokens.push(token);
        if begin != self.position && self.max.map_or(true, |max| token.end > max.end) {
            self.max = Some(token);
        }
    }

    fn peek(&self) -> Option<char> {
        self.buffer.get(self.position).copied()
    }

    fn at_end(&self) -> bool {
        self.position == self.buffer.len()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, s: &str) -> bool {
        let save = self.position;
        for c in s.chars() {
            if !self.eat(c) {
                self.position = save;
                return false;
            }
        }
        true
    }

    fn eat_digit(&mut self) -> bool {
        match self.peek() {
            Some(c) if c.is_ascii_digit() => {
                self.position += 1;
                true
            }
            _ => false,
        }
    }

    // e <- sp e1 !.
    fn e(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        self.sp();
        if self.e1() && self.at_end() {
            self.emit(Rule::E, begin);
            true
        } else {
            self.restore(mark);
            false
        }
    }

    // e1 <- e2 ((add e2) / (minus e2))*
    fn e1(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        if !self.e2() {
            self.restore(mark);
            return false;
        }
        loop {
            let repeat = self.mark();
            if self.add() && self.e2() {
                continue;
            }
            self.restore(repeat);
            if self.minus() && self.e2() {
                continue;
            }
            self.restore(repeat);
            break;
        }
        self.emit(Rule::E1, begin);
        true
    }

    // e2 <- e3 ((multiply e3) / (divide e3) / (modulus e3))*
    fn e2(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        if !self.e3() {
            self.restore(mark);
            return false;
        }
        loop {
            let repeat = self.mark();
            if self.multiply() && self.e3() {
                continue;
            }
            self.restore(repeat);
            if self.divide() && self.e3() {
                continue;
            }
            self.restore(repeat);
            if self.modulus() && self.e3() {
                continue;
            }
            self.restore(repeat);
            break;
        }
        self.emit(Rule::E2, begin);
        true
    }

    // e3 <- e4 (exponentiation e4)*
    fn e3(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        if !self.e4() {
            self.restore(mark);
            return false;
        }
        loop {
            let repeat = self.mark();
            if self.exponentiation() && self.e4() {
                continue;
            }
            self.restore(repeat);
            break;
        }
        self.emit(Rule::E3, begin);
        true
    }

    // e4 <- (minus value) / value
    fn e4(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        if self.minus() && self.value() {
            self.emit(Rule::E4, begin);
            return true;
        }
        self.restore(mark);
        if self.value() {
            self.emit(Rule::E4, begin);
            return true;
        }
        self.restore(mark);
        false
    }

    // Ordered choice over every kind of leaf value. Named forms come before
    // the bare variable so keywords are never split into letters.
    fn value(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        let alternatives: &[fn(&mut Parser) -> bool] = &[
            Parser::imaginary,
            Parser::number,
            Parser::matrix,
            Parser::exp1,
            Parser::exp2,
            Parser::natural,
            Parser::pi,
            Parser::prec,
            Parser::simplify,
            Parser::derivative,
            Parser::log,
            Parser::sqrt,
            Parser::cos,
            Parser::sin,
            Parser::tan,
            Parser::variable,
            Parser::sub,
        ];
        for alternative in alternatives {
            if alternative(self) {
                self.emit(Rule::Value, begin);
                return true;
            }
            self.restore(mark);
        }
        false
    }

    // decimal <- '-'? [0-9]+ ('.' [0-9]*)?
    fn decimal(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        self.eat('-');
        if !self.eat_digit() {
            self.restore(mark);
            return false;
        }
        while self.eat_digit() {}
        if self.eat('.') {
            while self.eat_digit() {}
        }
        self.emit(Rule::Decimal, begin);
        true
    }

    // notation <- [eE] decimal
    fn notation(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        if (self.eat('e') || self.eat('E')) && self.decimal() {
            self.emit(Rule::Notation, begin);
            true
        } else {
            self.restore(mark);
            false
        }
    }

    // number <- decimal notation? sp
    fn number(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        if !self.decimal() {
            self.restore(mark);
            return false;
        }
        let save = self.mark();
        if !self.notation() {
            self.restore(save);
        }
        self.sp();
        self.emit(Rule::Number, begin);
        true
    }

    // imaginary <- decimal notation? 'i' sp
    fn imaginary(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        if !self.decimal() {
            self.restore(mark);
            return false;
        }
        let save = self.mark();
        if !self.notation() {
            self.restore(save);
        }
        if !self.eat('i') {
            self.restore(mark);
            return false;
        }
        self.sp();
        self.emit(Rule::Imaginary, begin);
        true
    }

    // variable <- [a-z] sp
    fn variable(&mut self) -> bool {
        let begin = self.position;
        match self.peek() {
            Some(c) if c.is_ascii_lowercase() => {
                self.position += 1;
                self.sp();
                self.emit(Rule::Variable, begin);
                true
            }
            _ => false,
        }
    }

    // matrix <- '[' sp '[' sp e1 (',' sp? e1)* (row e1 (',' sp? e1)*)* ']' sp ']' sp
    // Elements within a row are comma or space separated; `row` is the
    // "][" separator between rows.
    fn matrix(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        if !(self.bracket('[') && self.bracket('[')) {
            self.restore(mark);
            return false;
        }
        if !self.elements() {
            self.restore(mark);
            return false;
        }
        loop {
            let repeat = self.mark();
            if self.row() && self.elements() {
                continue;
            }
            self.restore(repeat);
            break;
        }
        if self.bracket(']') && self.bracket(']') {
            self.emit(Rule::Matrix, begin);
            true
        } else {
            self.restore(mark);
            false
        }
    }

    fn elements(&mut self) -> bool {
        if !self.e1() {
            return false;
        }
        loop {
            let repeat = self.mark();
            if self.eat(',') {
                self.sp();
            }
            if self.e1() {
                continue;
            }
            self.restore(repeat);
            break;
        }
        true
    }

    // row <- ']' sp '[' sp
    fn row(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        if self.bracket(']') && self.bracket('[') {
            self.emit(Rule::Row, begin);
            true
        } else {
            self.restore(mark);
            false
        }
    }

    fn call(&mut self, name: &str, rule: Rule) -> bool {
        let mark = self.mark();
        let begin = self.position;
        if self.eat_str(name) && self.open() && self.e1() && self.close() {
            self.emit(rule, begin);
            true
        } else {
            self.restore(mark);
            false
        }
    }

    // exp1 <- 'exp' open e1 close
    fn exp1(&mut self) -> bool {
        self.call("exp", Rule::Exp1)
    }

    // exp2 <- 'e^' sp value
    fn exp2(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        if !self.eat_str("e^") {
            return false;
        }
        self.sp();
        if self.value() {
            self.emit(Rule::Exp2, begin);
            true
        } else {
            self.restore(mark);
            false
        }
    }

    // natural <- 'e' sp
    fn natural(&mut self) -> bool {
        let begin = self.position;
        if self.eat('e') {
            self.sp();
            self.emit(Rule::Natural, begin);
            true
        } else {
            false
        }
    }

    // pi <- 'pi' sp
    fn pi(&mut self) -> bool {
        let begin = self.position;
        if self.eat_str("pi") {
            self.sp();
            self.emit(Rule::Pi, begin);
            true
        } else {
            false
        }
    }

    fn prec(&mut self) -> bool {
        self.call("prec", Rule::Prec)
    }

    fn simplify(&mut self) -> bool {
        self.call("simplify", Rule::Simplify)
    }

    fn derivative(&mut self) -> bool {
        self.call("derivative", Rule::Derivative)
    }

    fn log(&mut self) -> bool {
        self.call("log", Rule::Log)
    }

    fn sqrt(&mut self) -> bool {
        self.call("sqrt", Rule::Sqrt)
    }

    fn cos(&mut self) -> bool {
        self.call("cos", Rule::Cos)
    }

    fn sin(&mut self) -> bool {
        self.call("sin", Rule::Sin)
    }

    fn tan(&mut self) -> bool {
        self.call("tan", Rule::Tan)
    }

    // sub <- open e1 close
    fn sub(&mut self) -> bool {
        let mark = self.mark();
        let begin = self.position;
        if self.open() && self.e1() && self.close() {
            self.emit(Rule::Sub, begin);
            true
        } else {
            self.restore(mark);
            false
        }
    }

    fn add(&mut self) -> bool {
        self.operator('+', Rule::Add)
    }

    fn minus(&mut self) -> bool {
        self.operator('-', Rule::Minus)
    }

    fn multiply(&mut self) -> bool {
        self.operator('*', Rule::Multiply)
    }

    fn divide(&mut self) -> bool {
        self.operator('/', Rule::Divide)
    }

    fn modulus(&mut self) -> bool {
        self.operator('%', Rule::Modulus)
    }

    fn exponentiation(&mut self) -> bool {
        self.operator('^', Rule::Exponentiation)
    }

    fn open(&mut self) -> bool {
        self.operator('(', Rule::Open)
    }

    fn close(&mut self) -> bool {
        self.operator(')', Rule::Close)
    }

    // Bracket characters inside matrix literals consume trailing blanks
    // but emit no token of their own.
    fn bracket(&mut self, c: char) -> bool {
        if self.eat(c) {
            self.sp();
            true
        } else {
            false
        }
    }

    fn operator(&mut self, c: char, rule: Rule) -> bool {
        let begin = self.position;
        if self.eat(c) {
            self.sp();
            self.emit(rule, begin);
            true
        } else {
            false
        }
    }

    // sp <- (' ' / '\t')*
    fn sp(&mut self) {
        let begin = self.position;
        while matches!(self.peek(), Some(' ') | Some('\t')) {
            self.position += 1;
        }
        self.emit(Rule::Sp, begin);
    }
}

#[cfg(test)]
mod tests {
    use super::{parse, Rule};

    #[test]
    fn parses_simple_arithmetic() {
        let parsed = parse("1 + 2 * 3").unwrap();
        assert_eq!(parsed.root.token.rule, Rule::E);
        let e1 = &parsed.root.children[0];
        assert_eq!(e1.token.rule, Rule::E1);
        let rules: Vec<Rule> = e1.children.iter().map(|c| c.token.rule).collect();
        assert_eq!(rules, vec![Rule::E2, Rule::Add, Rule::E2]);
    }

    #[test]
    fn children_nest_and_order_by_begin() {
        let parsed = parse("(1 + 2) * 3").unwrap();
        let root = &parsed.root;
        let mut begin = 0;
        for child in &root.children {
            assert!(child.token.begin >= root.token.begin);
            assert!(child.token.end <= root.token.end);
            assert!(child.token.begin >= begin);
            begin = child.token.begin;
        }
    }

    #[test]
    fn parses_matrix_literal() {
        let parsed = parse("[[1,2][3,4]]").unwrap();
        fn find(node: &crate::tree::TreeNode, rule: Rule) -> Option<&crate::tree::TreeNode> {
            if node.token.rule == rule {
                return Some(node);
            }
            node.children.iter().find_map(|c| find(c, rule))
        }
        let matrix = find(&parsed.root, Rule::Matrix).unwrap();
        let rows = matrix
            .children
            .iter()
            .filter(|c| c.token.rule == Rule::Row)
            .count();
        let elements = matrix
            .children
            .iter()
            .filter(|c| c.token.rule == Rule::E1)
            .count();
        assert_eq!(rows, 1);
        assert_eq!(elements, 4);
    }

    #[test]
    fn trailing_operator_reports_position_after_operator() {
        let err = parse("1 + ").unwrap_err();
        assert!(err.begin_symbol >= 3, "anchored at {}", err.begin_symbol);
        assert_eq!(err.begin_line, 1);
        let message = err.to_string();
        assert!(message.starts_with("parse error near "), "{message}");
    }

    #[test]
    fn error_message_format() {
        let err = parse("1 + ").unwrap_err();
        assert_eq!(
            err.to_string(),
            "parse error near sp (line 1 symbol 4 - line 1 symbol 5):\n\" \"\n"
        );
    }

    #[test]
    fn empty_input_fails() {
        assert!(parse("").is_err());
    }

    #[test]
    fn scientific_notation_nests_decimal_inside_notation() {
        let parsed = parse("2e3").unwrap();
        fn find(node: &crate::tree::TreeNode, rule: Rule) -> Option<&crate::tree::TreeNode> {
            if node.token.rule == rule {
                return Some(node);
            }
            node.children.iter().find_map(|c| find(c, rule))
        }
        let notation = find(&parsed.root, Rule::Notation).unwrap();
        assert!(notation
            .children
            .iter()
            .any(|c| c.token.rule == Rule::Decimal));
        assert_eq!(parsed.text(&notation.children[0].token), "3");
    }
}
