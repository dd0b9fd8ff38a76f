use itertools::Itertools;

/// Full cross product of `a` and `b`, `a`-major.
///
/// Every item of `a` is paired with every item of `b` in order, so the
/// output has `a.len() * b.len()` pairs and no deduplication happens.
pub fn expand<A: Clone, B: Clone>(a: &[A], b: &[B]) -> Vec<(A, B)> {
    a.iter()
        .cartesian_product(b.iter())
        .map(|(x, y)| (x.clone(), y.clone()))
        .collect()
}
