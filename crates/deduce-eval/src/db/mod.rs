//! Multi-index relation store.
//!
//! Each relation keeps one sorted index per binding pattern requested while
//! compiling rules, plus a master index (every column free) that holds the
//! canonical set of facts. Indices are requested on an
//! [`IndexedFactDbBuilder`] and frozen by [`IndexedFactDbBuilder::build`].

mod index;
mod view;

use std::fmt;
use std::sync::Arc;

use deduce_ir::RelationSymbol;
use rustc_hash::FxHashMap;

use crate::config::EvalConfig;
use crate::error::SetupError;
use crate::terms::{TermId, Tuple};

use index::SortedIndex;
pub use view::{Iter, View};
pub(crate) use view::ViewLimits;

/// How a lookup treats one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingType {
    /// Known before the lookup; part of the search key.
    Bound,
    /// Unknown; read from each matching tuple.
    Free,
    /// Never read; the column is dropped from the index.
    Ignored,
}

impl BindingType {
    fn code(self) -> char {
        match self {
            BindingType::Bound => 'b',
            BindingType::Free => 'f',
            BindingType::Ignored => '_',
        }
    }
}

fn pattern_name(pattern: &[BindingType]) -> String {
    pattern.iter().map(|b| b.code()).collect()
}

/// Collects index requests before a store is built.
#[derive(Debug, Clone)]
pub struct IndexedFactDbBuilder {
    symbols: Vec<RelationSymbol>,
    patterns: FxHashMap<RelationSymbol, Vec<Box<[BindingType]>>>,
}

impl IndexedFactDbBuilder {
    pub fn new(symbols: impl IntoIterator<Item = RelationSymbol>) -> Self {
        let mut builder = Self {
            symbols: Vec::new(),
            patterns: FxHashMap::default(),
        };
        for symbol in symbols {
            if !builder.patterns.contains_key(&symbol) {
                builder.patterns.insert(symbol.clone(), Vec::new());
                builder.symbols.push(symbol);
            }
        }
        builder
    }

    /// Request an index for `pattern`, returning its id within the relation.
    /// Requesting the same pattern again returns the same id.
    pub fn make_index(
        &mut self,
        symbol: &RelationSymbol,
        pattern: &[BindingType],
    ) -> Result<usize, SetupError> {
        let patterns = self
            .patterns
            .get_mut(symbol)
            .ok_or_else(|| SetupError::UnknownRelation(symbol.name().to_string()))?;
        if pattern.len() != symbol.arity() {
            return Err(SetupError::ArityMismatch {
                relation: symbol.name().to_string(),
                expected: symbol.arity(),
                found: pattern.len(),
            });
        }
        if let Some(id) = patterns.iter().position(|p| &**p == pattern) {
            return Ok(id);
        }
        patterns.push(pattern.into());
        Ok(patterns.len() - 1)
    }

    /// Freeze the requested indices into an empty store. May be called more
    /// than once to get structurally identical stores.
    pub fn build(&self, config: &EvalConfig) -> IndexedFactDb {
        let limits = ViewLimits {
            max_array_size: config.max_array_size,
            num_guesses: config.num_guesses,
        };
        let mut relations = FxHashMap::default();
        for symbol in &self.symbols {
            let patterns = &self.patterns[symbol];
            let mut indices: Vec<Arc<SortedIndex>> = patterns
                .iter()
                .map(|p| Arc::new(SortedIndex::new(p)))
                .collect();
            let master = match patterns
                .iter()
                .position(|p| p.iter().all(|b| *b == BindingType::Free))
            {
                Some(id) => id,
                None => {
                    indices.push(Arc::new(SortedIndex::new(&vec![
                        BindingType::Free;
                        symbol.arity()
                    ])));
                    indices.len() - 1
                }
            };
            relations.insert(symbol.clone(), Relation { indices, master });
        }
        IndexedFactDb {
            symbols: self.symbols.clone(),
            relations,
            limits,
        }
    }
}

#[derive(Debug)]
struct Relation {
    indices: Vec<Arc<SortedIndex>>,
    master: usize,
}

impl Relation {
    fn master(&self) -> &Arc<SortedIndex> {
        &self.indices[self.master]
    }
}

/// Relation store with one sorted index per requested binding pattern.
///
/// Every non-projected index holds the same tuples as the master; a projected
/// index holds one representative per key. Lookups on relations the store was
/// not built for come back empty.
#[derive(Debug)]
pub struct IndexedFactDb {
    symbols: Vec<RelationSymbol>,
    relations: FxHashMap<RelationSymbol, Relation>,
    limits: ViewLimits,
}

impl IndexedFactDb {
    /// Relations the store was built for, in registration order.
    pub fn symbols(&self) -> &[RelationSymbol] {
        &self.symbols
    }

    /// Insert a normalized tuple. Returns whether it was new.
    pub fn add(&self, symbol: &RelationSymbol, tuple: Tuple) -> bool {
        debug_assert_eq!(tuple.len(), symbol.arity(), "tuple arity mismatch for {symbol}");
        let Some(rel) = self.relations.get(symbol) else {
            return false;
        };
        if !rel.master().insert(&tuple) {
            return false;
        }
        for (id, index) in rel.indices.iter().enumerate() {
            if id != rel.master {
                index.insert(&tuple);
            }
        }
        true
    }

    /// Insert many tuples, returning how many were new.
    pub fn add_all(&self, symbol: &RelationSymbol, tuples: impl IntoIterator<Item = Tuple>) -> usize {
        let Some(rel) = self.relations.get(symbol) else {
            return 0;
        };
        let tuples: Vec<Tuple> = tuples.into_iter().collect();
        let added = rel.master().insert_all(&tuples);
        if added > 0 {
            for (id, index) in rel.indices.iter().enumerate() {
                if id != rel.master {
                    index.insert_all(&tuples);
                }
            }
        }
        added
    }

    /// Tuples matching `key` at the bound columns of index `index`.
    pub fn get(&self, symbol: &RelationSymbol, key: &[TermId], index: usize) -> View {
        match self.relations.get(symbol).and_then(|r| r.indices.get(index)) {
            Some(idx) => idx.lookup(key, self.limits),
            None => View::empty(),
        }
    }

    /// Every fact of `symbol`.
    pub fn all(&self, symbol: &RelationSymbol) -> View {
        match self.relations.get(symbol) {
            Some(rel) => rel.master().all(self.limits),
            None => View::empty(),
        }
    }

    pub fn has_fact(&self, symbol: &RelationSymbol, tuple: &[TermId]) -> bool {
        self.relations
            .get(symbol)
            .is_some_and(|rel| rel.master().contains(tuple))
    }

    pub fn count_distinct(&self, symbol: &RelationSymbol) -> usize {
        self.relations.get(symbol).map_or(0, |rel| rel.master().len())
    }

    /// Sum of the sizes of every index of `symbol`.
    pub fn count_duplicates(&self, symbol: &RelationSymbol) -> usize {
        self.relations
            .get(symbol)
            .map_or(0, |rel| rel.indices.iter().map(|i| i.len()).sum())
    }

    pub fn num_indices(&self, symbol: &RelationSymbol) -> usize {
        self.relations.get(symbol).map_or(0, |rel| rel.indices.len())
    }

    pub fn is_empty(&self, symbol: &RelationSymbol) -> bool {
        self.count_distinct(symbol) == 0
    }

    /// Remove every tuple of every relation.
    pub fn clear(&self) {
        for rel in self.relations.values() {
            for index in &rel.indices {
                index.clear();
            }
        }
    }

    /// Remove every tuple of `symbol`.
    pub fn clear_relation(&self, symbol: &RelationSymbol) {
        if let Some(rel) = self.relations.get(symbol) {
            for index in &rel.indices {
                index.clear();
            }
        }
    }

    /// Check that every index agrees with the master.
    pub fn check_consistency(&self) -> Result<(), String> {
        for symbol in &self.symbols {
            let rel = &self.relations[symbol];
            let master = rel.master().tuples();
            for index in &rel.indices {
                if index.is_projection() {
                    if master.iter().any(|t| !index.contains(t)) || index.len() > master.len() {
                        return Err(format!(
                            "{symbol}[{}] is not a projection of the master",
                            pattern_name(index.pattern())
                        ));
                    }
                } else if index.len() != master.len() || master.iter().any(|t| !index.contains(t)) {
                    return Err(format!(
                        "{symbol}[{}] holds {} tuples, master holds {}",
                        pattern_name(index.pattern()),
                        index.len(),
                        master.len()
                    ));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for IndexedFactDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for symbol in &self.symbols {
            let rel = &self.relations[symbol];
            writeln!(f, "{symbol} ({} facts)", rel.master().len())?;
            for (id, index) in rel.indices.iter().enumerate() {
                let marker = if id == rel.master { " master" } else { "" };
                writeln!(
                    f,
                    "  #{id} [{}] bound={} size={}{marker}",
                    pattern_name(index.pattern()),
                    index.bound_columns(),
                    index.len()
                )?;
            }
            for tuple in rel.master().tuples() {
                let ids: Vec<String> = tuple.iter().map(|id| id.to_string()).collect();
                writeln!(f, "  ({})", ids.join(", "))?;
            }
        }
        Ok(())
    }
}
