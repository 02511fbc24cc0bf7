use crate::grammar::{Rule, Token};

/// One node of the nested parse: a token plus the nodes whose spans it
/// contains, in source order.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub token: Token,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// First child carrying the given rule tag, if any.
    pub fn child(&self, rule: Rule) -> Option<&TreeNode> {
        self.children.iter().find(|c| c.token.rule == rule)
    }
}

/// A successful parse: the code-point buffer plus the nested token tree.
/// The buffer stays alive so leaf literals can be sliced back out.
#[derive(Debug, Clone)]
pub struct Parsed {
    buffer: Vec<char>,
    pub root: TreeNode,
}

impl Parsed {
    pub(crate) fn new(buffer: Vec<char>, root: TreeNode) -> Self {
        Parsed { buffer, root }
    }

    /// The source text a token covers, with surrounding blanks removed.
    pub fn text(&self, token: &Token) -> String {
        let slice: String = self.buffer[token.begin as usize..token.end as usize]
            .iter()
            .collect();
        slice.trim().to_string()
    }
}

/// Nests a flat emission-ordered token list into a tree. Tokens arrive
/// children-before-parents, so a stack suffices: each incoming token pops
/// every stack entry its span contains and adopts them, then the remaining
/// entry is the root. Zero-width tokens carry no text and are dropped.
pub(crate) fn build(tokens: &[Token]) -> Option<TreeNode> {
    let mut stack: Vec<TreeNode> = Vec::new();
    for &token in tokens {
        if token.begin == token.end {
            continue;
        }
        let mut node = TreeNode {
            token,
            children: Vec::new(),
        };
        while let Some(top) = stack.last() {
            if top.token.begin >= token.begin && top.token.end <= token.end {
                if let Some(child) = stack.pop() {
                    node.children.push(child);
                }
            } else {
                break;
            }
        }
        node.children.reverse();
        stack.push(node);
    }
    if stack.len() == 1 {
        stack.pop()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::build;
    use crate::grammar::{Rule, Token};

    fn token(rule: Rule, begin: u32, end: u32) -> Token {
        Token { rule, begin, end }
    }

    #[test]
    fn zero_width_tokens_are_dropped() {
        let tokens = vec![
            token(Rule::Sp, 0, 0),
            token(Rule::Decimal, 0, 1),
            token(Rule::Number, 0, 1),
        ];
        let root = build(&tokens).unwrap();
        assert_eq!(root.token.rule, Rule::Number);
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].token.rule, Rule::Decimal);
    }

    #[test]
    fn equal_spans_nest_by_emission_order() {
        let tokens = vec![
            token(Rule::Decimal, 0, 1),
            token(Rule::Number, 0, 1),
            token(Rule::Value, 0, 1),
        ];
        let root = build(&tokens).unwrap();
        assert_eq!(root.token.rule, Rule::Value);
        assert_eq!(root.children[0].token.rule, Rule::Number);
        assert_eq!(root.children[0].children[0].token.rule, Rule::Decimal);
    }

    #[test]
    fn siblings_stay_in_source_order() {
        let tokens = vec![
            token(Rule::E2, 0, 1),
            token(Rule::Add, 1, 2),
            token(Rule::E2, 2, 3),
            token(Rule::E1, 0, 3),
        ];
        let root = build(&tokens).unwrap();
        let rules: Vec<Rule> = root.children.iter().map(|c| c.token.rule).collect();
        assert_eq!(rules, vec![Rule::E2, Rule::Add, Rule::E2]);
    }

    #[test]
    fn dangling_tokens_yield_no_root() {
        let tokens = vec![token(Rule::E2, 0, 1), token(Rule::Add, 1, 2)];
        assert!(build(&tokens).is_none());
    }
}
