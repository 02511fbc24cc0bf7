use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rug::Integer;
use thiserror::Error;

use crate::expression::{Node, Op, BINARY, CONSTANTS, NUMBERS, UNARY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IntegrateError {
    #[error("generation budget exhausted without convergence")]
    BudgetExhausted,
}

const POPULATION: usize = 1000;

/// Searches for an antiderivative of `target` by mutating a population of
/// candidate trees until the fittest one differentiates back to the
/// target. The run is deterministic: the generator is seeded with a fixed
/// value, so a given target always takes the same path.
///
/// `max_generations` bounds the search; `None` runs until convergence,
/// which is not guaranteed for every target.
pub fn integrate(target: &Node, max_generations: Option<u64>) -> Result<Node, IntegrateError> {
    let mut rng = StdRng::seed_from_u64(1);
    let goal = target.to_string();
    let mut population: Vec<Node> = vec![target.clone(); POPULATION];
    let mut generation: u64 = 0;
    loop {
        if max_generations.map_or(false, |limit| generation >= limit) {
            return Err(IntegrateError::BudgetExhausted);
        }
        let parents = population.len();
        for i in 0..parents {
            if rng.gen_range(0..3) == 0 {
                let mut candidate = mutate(&population[i], &mut rng);
                for _ in 0..rng.gen_range(0..3) {
                    candidate = mutate(&candidate, &mut rng);
                }
                population.push(candidate);
            }
        }
        // Fitness keys are computed once per candidate, then a stable
        // ascending sort keeps earlier candidates ahead on ties.
        let mut keyed: Vec<(u64, Node)> = population
            .drain(..)
            .map(|candidate| {
                let derivative = candidate.derivative();
                let seed = derivative.to_string().chars().count() as u64;
                (difference(Some(&derivative), Some(target), seed), candidate)
            })
            .collect();
        keyed.sort_by_key(|(fitness, _)| *fitness);
        keyed.truncate(POPULATION);
        population = keyed.into_iter().map(|(_, candidate)| candidate).collect();
        if let Some(best) = population.first() {
            if best.derivative().simplify().to_string() == goal {
                return Ok(best.clone());
            }
        }
        generation += 1;
    }
}

fn literal_int(node: &Node) -> Integer {
    node.literal()
        .and_then(|text| text.parse().ok())
        .unwrap_or_default()
}

/// Structural distance between two trees: numeric leaves differ by their
/// integer gap, mismatched constants or variables by 1, mismatched tags
/// by 8, and every node missing on one side by 1.
fn difference(a: Option<&Node>, b: Option<&Node>, mut diff: u64) -> u64 {
    match (a, b) {
        (Some(a), Some(b)) => {
            let (ta, tb) = (a.op(), b.op());
            if NUMBERS.contains(&ta) && NUMBERS.contains(&tb) {
                let gap = (literal_int(a) - literal_int(b)).abs();
                diff = diff.saturating_add(gap.to_u64().unwrap_or(u64::MAX));
            } else if CONSTANTS.contains(&ta) && CONSTANTS.contains(&tb) {
                if ta != tb {
                    diff += 1;
                }
            } else if ta == Op::Variable && tb == Op::Variable {
                if a.literal() != b.literal() {
                    diff += 1;
                }
            } else if ta != tb {
                diff += 8;
            }
            diff = difference(a.left(), b.left(), diff);
            difference(a.right(), b.right(), diff)
        }
        (Some(a), None) => {
            diff += 1;
            diff = difference(a.left(), None, diff);
            difference(a.right(), None, diff)
        }
        (None, Some(b)) => {
            diff += 1;
            diff = difference(None, b.left(), diff);
            difference(None, b.right(), diff)
        }
        (None, None) => diff,
    }
}

/// Rebuilds the tree with one uniformly chosen node transformed. The
/// original is left untouched; mutation never aliases the parent.
fn mutate(node: &Node, rng: &mut StdRng) -> Node {
    let target = rng.gen_range(0..node.count());
    let mut seen = 0;
    rebuild(node, target, &mut seen, rng)
}

fn rebuild(node: &Node, target: usize, seen: &mut usize, rng: &mut StdRng) -> Node {
    let index = *seen;
    *seen += 1;
    if index == target {
        return transform(node, rng);
    }
    match (node.left(), node.right()) {
        (Some(l), Some(r)) => {
            let left = rebuild(l, target, seen, rng);
            let right = rebuild(r, target, seen, rng);
            Node::binary(node.op(), left, right).unwrap_or_else(|| node.clone())
        }
        (Some(l), None) => {
            let left = rebuild(l, target, seen, rng);
            Node::unary(node.op(), left).unwrap_or_else(|| node.clone())
        }
        _ => node.clone(),
    }
}

fn transform(node: &Node, rng: &mut StdRng) -> Node {
    if rng.gen_range(0..2) == 0 {
        restructure(node, rng)
    } else {
        retag(node, rng)
    }
}

fn random_constant(rng: &mut StdRng) -> Node {
    match CONSTANTS[rng.gen_range(0..CONSTANTS.len())] {
        Op::Natural => Node::Natural,
        _ => Node::Pi,
    }
}

fn random_leaf(rng: &mut StdRng) -> Node {
    match rng.gen_range(0..3) {
        0 => {
            let digit = rng.gen_range(0..10u32).to_string();
            if rng.gen_range(0..2) == 0 {
                Node::Number(digit)
            } else {
                Node::Imaginary(digit)
            }
        }
        1 => random_constant(rng),
        _ => Node::Variable("x".into()),
    }
}

/// Grows or replaces the subtree: wrap it in a random binary operation
/// with a fresh leaf operand (exponents stay small integers), wrap it in
/// a random unary operation, or drop it for a fresh leaf.
fn restructure(node: &Node, rng: &mut StdRng) -> Node {
    match rng.gen_range(0..3) {
        0 => {
            let op = BINARY[rng.gen_range(0..BINARY.len())];
            let operand = if op == Op::Exponentiation {
                Node::Number(rng.gen_range(0..10u32).to_string())
            } else {
                random_leaf(rng)
            };
            Node::binary(op, node.clone(), operand).unwrap_or_else(|| node.clone())
        }
        1 => {
            let op = UNARY[rng.gen_range(0..UNARY.len())];
            Node::unary(op, node.clone()).unwrap_or_else(|| node.clone())
        }
        _ => random_leaf(rng),
    }
}

/// Re-tags the node within its arity class, keeping its operands. Numeric
/// leaves are nudged instead; constants may collapse to zero.
fn retag(node: &Node, rng: &mut StdRng) -> Node {
    let op = node.op();
    if BINARY.contains(&op) {
        if let (Some(l), Some(r)) = (node.left(), node.right()) {
            let replacement = BINARY[rng.gen_range(0..BINARY.len())];
            return Node::binary(replacement, l.clone(), r.clone())
                .unwrap_or_else(|| node.clone());
        }
    }
    if UNARY.contains(&op) {
        if let Some(l) = node.left() {
            let replacement = UNARY[rng.gen_range(0..UNARY.len())];
            return Node::unary(replacement, l.clone()).unwrap_or_else(|| node.clone());
        }
    }
    if NUMBERS.contains(&op) {
        let mut value = literal_int(node);
        match rng.gen_range(0..3) {
            0 => value = Integer::new(),
            1 => value += 1,
            _ => value -= 1,
        }
        let text = value.to_string();
        return match node {
            Node::Imaginary(_) => Node::Imaginary(text),
            _ => Node::Number(text),
        };
    }
    if CONSTANTS.contains(&op) {
        return if rng.gen_range(0..2) == 0 {
            Node::Number("0".into())
        } else {
            random_constant(rng)
        };
    }
    if rng.gen_range(0..2) == 0 {
        Node::Number("0".into())
    } else {
        node.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::{difference, integrate, mutate, IntegrateError};
    use crate::expression::Node;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn x() -> Node {
        Node::Variable("x".into())
    }

    #[test]
    fn integrating_zero_converges() {
        let result = integrate(&Node::Number("0".into()), Some(5)).unwrap();
        assert_eq!(result.derivative().simplify().to_string(), "0");
    }

    #[test]
    fn zero_budget_reports_exhaustion() {
        let err = integrate(&x(), Some(0)).unwrap_err();
        assert_eq!(err, IntegrateError::BudgetExhausted);
    }

    #[test]
    fn identical_trees_score_only_the_seed() {
        let tree = Node::Multiply(Box::new(x()), Box::new(Node::Sin(Box::new(x()))));
        assert_eq!(difference(Some(&tree), Some(&tree), 7), 7);
    }

    #[test]
    fn tag_mismatch_scores_eight() {
        let sine = Node::Sin(Box::new(x()));
        let cosine = Node::Cos(Box::new(x()));
        assert_eq!(difference(Some(&sine), Some(&cosine), 0), 8);
    }

    #[test]
    fn numeric_leaves_score_their_gap() {
        let three = Node::Number("3".into());
        let seven = Node::Number("7".into());
        assert_eq!(difference(Some(&three), Some(&seven), 0), 4);
    }

    #[test]
    fn constants_score_one_when_mismatched() {
        assert_eq!(difference(Some(&Node::Natural), Some(&Node::Pi), 0), 1);
        assert_eq!(difference(Some(&Node::Pi), Some(&Node::Pi), 0), 0);
    }

    #[test]
    fn one_sided_nodes_score_one_each() {
        let pair = Node::Add(Box::new(x()), Box::new(Node::Number("1".into())));
        assert_eq!(difference(Some(&pair), None, 0), 3);
        assert_eq!(difference(None, Some(&pair), 0), 3);
    }

    #[test]
    fn mutation_is_deterministic_per_seed() {
        let tree = Node::Multiply(Box::new(x()), Box::new(Node::Sin(Box::new(x()))));
        let mut a = StdRng::seed_from_u64(9);
        let mut b = StdRng::seed_from_u64(9);
        assert_eq!(mutate(&tree, &mut a), mutate(&tree, &mut b));
    }

    #[test]
    fn mutation_leaves_the_original_untouched() {
        let tree = Node::Sin(Box::new(x()));
        let copy = tree.clone();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..32 {
            let _ = mutate(&tree, &mut rng);
        }
        assert_eq!(tree, copy);
    }
}
