//! Hash-consed ground terms.
//!
//! Every ground value seen during evaluation is interned once in a
//! [`TermStore`] and referred to by its [`TermId`] afterwards. Structurally
//! equal terms always receive the same id, so tuples compare, hash and sort by
//! id alone.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHasher};
use smallvec::SmallVec;

/// Stable identifier of an interned ground term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TermId(u32);

impl TermId {
    /// Smallest id. Used as an inclusive lower bound when scanning indices.
    pub const MIN: TermId = TermId(0);
    /// Largest id. Never handed out by a store.
    pub const MAX: TermId = TermId(u32::MAX);

    pub fn raw(self) -> u32 {
        self.0
    }

    pub(crate) fn from_raw(raw: u32) -> Self {
        TermId(raw)
    }
}

impl fmt::Display for TermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A fact: one interned term per column.
pub type Tuple = Arc<[TermId]>;

/// The structure behind a [`TermId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroundTerm {
    Bool(bool),
    Int(i64),
    Str(Arc<str>),
    Ctor(Arc<str>, SmallVec<[TermId; 4]>),
}

/// Number of shards for the hash-consing maps (power of 2).
const NUM_SHARDS: usize = 16;

/// Thread-safe interner for ground terms.
pub struct TermStore {
    /// Term structure indexed by id. Slots are filled before their id is
    /// published through a shard.
    nodes: RwLock<Vec<Option<GroundTerm>>>,
    shards: [RwLock<FxHashMap<GroundTerm, TermId>>; NUM_SHARDS],
    next_id: AtomicU32,
}

impl Default for TermStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TermStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TermStore")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl TermStore {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(Vec::new()),
            shards: std::array::from_fn(|_| RwLock::new(FxHashMap::default())),
            next_id: AtomicU32::new(0),
        }
    }

    /// Intern `term`, returning the id shared by every structurally equal term.
    pub fn intern(&self, term: GroundTerm) -> TermId {
        let shard = &self.shards[Self::shard_index(&term)];

        if let Some(&id) = shard.read().get(&term) {
            return id;
        }

        let mut map = shard.write();
        if let Some(&id) = map.get(&term) {
            return id;
        }

        let id = TermId(self.next_id.fetch_add(1, Ordering::Relaxed));
        {
            let mut nodes = self.nodes.write();
            let idx = id.0 as usize;
            if nodes.len() <= idx {
                nodes.resize(idx + 1, None);
            }
            nodes[idx] = Some(term.clone());
        }
        map.insert(term, id);
        id
    }

    pub fn bool(&self, value: bool) -> TermId {
        self.intern(GroundTerm::Bool(value))
    }

    pub fn int(&self, value: i64) -> TermId {
        self.intern(GroundTerm::Int(value))
    }

    pub fn string(&self, value: &str) -> TermId {
        self.intern(GroundTerm::Str(value.into()))
    }

    pub fn ctor(&self, name: &str, args: &[TermId]) -> TermId {
        self.intern(GroundTerm::Ctor(name.into(), SmallVec::from_slice(args)))
    }

    /// Look up the structure of `id`. Returns `None` for ids this store never
    /// handed out.
    pub fn resolve(&self, id: TermId) -> Option<GroundTerm> {
        self.nodes.read().get(id.0 as usize).cloned().flatten()
    }

    pub fn as_int(&self, id: TermId) -> Option<i64> {
        match self.resolve(id)? {
            GroundTerm::Int(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_bool(&self, id: TermId) -> Option<bool> {
        match self.resolve(id)? {
            GroundTerm::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self, id: TermId) -> Option<Arc<str>> {
        match self.resolve(id)? {
            GroundTerm::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Number of distinct terms interned so far. Every id handed out is
    /// strictly below this bound.
    pub fn len(&self) -> usize {
        self.next_id.load(Ordering::Acquire) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render `id` in the same notation rules use for constants.
    pub fn render(&self, id: TermId) -> String {
        let mut out = String::new();
        self.render_into(id, &mut out);
        out
    }

    fn render_into(&self, id: TermId, out: &mut String) {
        use std::fmt::Write;

        match self.resolve(id) {
            None => {
                let _ = write!(out, "{id}");
            }
            Some(GroundTerm::Bool(b)) => {
                let _ = write!(out, "{b}");
            }
            Some(GroundTerm::Int(n)) => {
                let _ = write!(out, "{n}");
            }
            Some(GroundTerm::Str(s)) => {
                let _ = write!(out, "{s:?}");
            }
            Some(GroundTerm::Ctor(name, args)) => {
                out.push_str(&name);
                if !args.is_empty() {
                    out.push('(');
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        self.render_into(*arg, out);
                    }
                    out.push(')');
                }
            }
        }
    }

    /// Render a tuple as `(a, b, ..)`.
    pub fn render_tuple(&self, tuple: &[TermId]) -> String {
        let mut out = String::from("(");
        for (i, &id) in tuple.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            self.render_into(id, &mut out);
        }
        out.push(')');
        out
    }

    fn shard_index(term: &GroundTerm) -> usize {
        let mut hasher = FxHasher::default();
        term.hash(&mut hasher);
        (hasher.finish() as usize) % NUM_SHARDS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_consing() {
        let store = TermStore::new();
        let one = store.int(1);
        assert_eq!(store.int(1), one);
        assert_ne!(store.int(2), one);
        assert_ne!(store.string("1"), one);

        let a = store.ctor("pair", &[one, store.bool(true)]);
        let b = store.ctor("pair", &[store.int(1), store.bool(true)]);
        assert_eq!(a, b);
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn test_resolve_and_render() {
        let store = TermStore::new();
        let s = store.string("hi");
        let nil = store.ctor("nil", &[]);
        let cons = store.ctor("cons", &[store.int(-3), nil]);
        assert_eq!(store.as_str(s).as_deref(), Some("hi"));
        assert_eq!(store.render(cons), "cons(-3, nil)");
        assert_eq!(store.render_tuple(&[s, cons]), "(\"hi\", cons(-3, nil))");
        assert_eq!(store.resolve(TermId::MAX), None);
        assert_eq!(store.render(TermId::from_raw(999)), "#999");
    }

    #[test]
    fn test_concurrent_interning() {
        let store = Arc::new(TermStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || (0..500).map(|n| store.int(n)).collect::<Vec<_>>())
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for ids in &results[1..] {
            assert_eq!(ids, &results[0]);
        }
        assert_eq!(store.len(), 500);
        for (n, id) in results[0].iter().enumerate() {
            assert_eq!(store.as_int(*id), Some(n as i64));
        }
    }
}
