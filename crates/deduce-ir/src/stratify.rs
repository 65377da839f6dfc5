//! Stratification of rule-defined relations.

use std::collections::BTreeSet;
use std::fmt;

use petgraph::algo::{condensation, toposort};
use petgraph::graph::DiGraph;
use rustc_hash::FxHashMap;

use crate::{Literal, Program, RelationSymbol};

/// A group of mutually recursive relations evaluated together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stratum {
    rank: usize,
    symbols: BTreeSet<RelationSymbol>,
    has_recursive_negation: bool,
}

impl Stratum {
    pub fn new(
        rank: usize,
        symbols: BTreeSet<RelationSymbol>,
        has_recursive_negation: bool,
    ) -> Self {
        Self {
            rank,
            symbols,
            has_recursive_negation,
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn symbols(&self) -> &BTreeSet<RelationSymbol> {
        &self.symbols
    }

    pub fn contains(&self, symbol: &RelationSymbol) -> bool {
        self.symbols.contains(symbol)
    }

    /// Whether some relation in this stratum depends negatively on another
    /// relation of the same stratum.
    pub fn has_recursive_negation(&self) -> bool {
        self.has_recursive_negation
    }
}

impl fmt::Display for Stratum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stratum {} {{", self.rank)?;
        for (i, symbol) in self.symbols.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{symbol}")?;
        }
        f.write_str("}")
    }
}

/// Group the relations defined by rules into strata.
///
/// Builds the dependency graph between rule-defined relations, collapses its
/// strongly connected components and returns them in topological order
/// (dependencies first). Relations that only hold base facts belong to no
/// stratum.
pub fn stratify(program: &Program) -> Vec<Stratum> {
    let symbols = program.rule_symbols();
    if symbols.is_empty() {
        return vec![];
    }

    let mut graph = DiGraph::<usize, bool>::new();
    let nodes: Vec<_> = (0..symbols.len()).map(|i| graph.add_node(i)).collect();
    let node_of: FxHashMap<&RelationSymbol, usize> =
        symbols.iter().enumerate().map(|(i, s)| (s, i)).collect();

    // Edge from body relation to head relation, labelled with negation.
    let mut negative_edges = Vec::new();
    for rule in program.rules() {
        let head = node_of[&rule.head.symbol];
        for literal in &rule.body {
            if let Literal::Predicate(atom) = literal
                && let Some(&body) = node_of.get(&atom.symbol)
            {
                graph.add_edge(nodes[body], nodes[head], atom.negated);
                if atom.negated {
                    negative_edges.push((body, head));
                }
            }
        }
    }

    let condensed = condensation(graph, true);
    let order = toposort(&condensed, None).expect("condensation is always a DAG");

    let mut component_of = vec![0; symbols.len()];
    for (rank, &idx) in order.iter().enumerate() {
        for &member in &condensed[idx] {
            component_of[member] = rank;
        }
    }

    let mut unsafe_ranks = vec![false; order.len()];
    for (body, head) in negative_edges {
        if component_of[body] == component_of[head] {
            unsafe_ranks[component_of[head]] = true;
        }
    }

    order
        .iter()
        .enumerate()
        .map(|(rank, &idx)| {
            let members = condensed[idx].iter().map(|&i| symbols[i].clone()).collect();
            Stratum::new(rank, members, unsafe_ranks[rank])
        })
        .collect()
}
