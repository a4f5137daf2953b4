//! Transitive "is-a" closure over the term arena.
//!
//! Traversal is iterative with an explicit stack and a visited set, so deep
//! hierarchies never recurse and a malformed cyclic hierarchy still
//! terminates.

use std::collections::HashSet;

use serde::Serialize;

use super::types::{OntologyTerm, TermId};

/// Closure of a set of codes, with the codes the store did not know.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClosureReport {
    /// Sorted, deduplicated closure codes.
    pub codes: Vec<String>,
    /// Input codes absent from the store, in input order.
    pub unknown: Vec<String>,
}

/// Every term reachable from `seed` by following parent links, `seed`
/// included. Order is traversal order.
pub fn ancestors_of(terms: &[OntologyTerm], seed: TermId) -> Vec<TermId> {
    let mut visited = HashSet::new();
    let mut out = Vec::new();
    walk(terms, seed, &mut visited, &mut out);
    out
}

/// Union of the closures of every seed, sorted and deduplicated.
pub fn closure_of<I>(terms: &[OntologyTerm], seeds: I) -> Vec<TermId>
where
    I: IntoIterator<Item = TermId>,
{
    let mut visited = HashSet::new();
    let mut out = Vec::new();
    for seed in seeds {
        walk(terms, seed, &mut visited, &mut out);
    }
    out.sort_unstable();
    out
}

fn walk(
    terms: &[OntologyTerm],
    seed: TermId,
    visited: &mut HashSet<TermId>,
    out: &mut Vec<TermId>,
) {
    let mut stack = vec![seed];
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        out.push(id);
        if let Some(term) = terms.get(id.index()) {
            stack.extend(term.parents.iter().copied().filter(|p| !visited.contains(p)));
        }
    }
}
