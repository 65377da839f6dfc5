//! One sort order over the tuples of a relation.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::RwLock;

use super::BindingType;
use super::view::{View, ViewLimits};
use crate::terms::{TermId, Tuple};

/// A tuple stored under its index key.
///
/// Entries compare by key only, so an index whose pattern ignores some
/// columns keeps the first tuple inserted for each key.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub(crate) key: Box<[TermId]>,
    pub(crate) tuple: Tuple,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl Borrow<[TermId]> for Entry {
    fn borrow(&self) -> &[TermId] {
        &self.key
    }
}

pub(crate) type KeyBound = Bound<Box<[TermId]>>;

fn as_slice(bound: &KeyBound) -> Bound<&[TermId]> {
    bound.as_ref().map(|k| &**k)
}

/// `BTreeSet::range` panics on inverted or empty-exclusive bounds.
fn is_valid_range(lower: Bound<&[TermId]>, upper: Bound<&[TermId]>) -> bool {
    match (lower, upper) {
        (Bound::Excluded(lo), Bound::Excluded(hi)) => lo < hi,
        (Bound::Included(lo) | Bound::Excluded(lo), Bound::Included(hi) | Bound::Excluded(hi)) => {
            lo <= hi
        }
        _ => true,
    }
}

fn columns(pattern: &[BindingType], ty: BindingType) -> impl Iterator<Item = usize> + '_ {
    pattern
        .iter()
        .enumerate()
        .filter(move |(_, b)| **b == ty)
        .map(|(i, _)| i)
}

/// Sorted container of the tuples of one relation under one binding pattern.
///
/// Keys hold the bound columns first, then the free columns; ignored columns
/// are dropped. Inserts serialize on the index's own lock.
#[derive(Debug)]
pub(crate) struct SortedIndex {
    pattern: Box<[BindingType]>,
    order: Box<[usize]>,
    bound: usize,
    entries: RwLock<BTreeSet<Entry>>,
}

impl SortedIndex {
    pub(crate) fn new(pattern: &[BindingType]) -> Self {
        let order: Box<[usize]> = columns(pattern, BindingType::Bound)
            .chain(columns(pattern, BindingType::Free))
            .collect();
        let bound = pattern.iter().filter(|b| **b == BindingType::Bound).count();
        Self {
            pattern: pattern.into(),
            order,
            bound,
            entries: RwLock::new(BTreeSet::new()),
        }
    }

    pub(crate) fn pattern(&self) -> &[BindingType] {
        &self.pattern
    }

    /// Whether some column is left out of the key.
    pub(crate) fn is_projection(&self) -> bool {
        self.order.len() < self.pattern.len()
    }

    pub(crate) fn bound_columns(&self) -> usize {
        self.bound
    }

    fn key_of(&self, tuple: &[TermId]) -> Box<[TermId]> {
        self.order.iter().map(|&i| tuple[i]).collect()
    }

    pub(crate) fn insert(&self, tuple: &Tuple) -> bool {
        let entry = Entry {
            key: self.key_of(tuple),
            tuple: Arc::clone(tuple),
        };
        self.entries.write().insert(entry)
    }

    pub(crate) fn insert_all<'a>(&self, tuples: impl IntoIterator<Item = &'a Tuple>) -> usize {
        let mut entries = self.entries.write();
        let mut added = 0;
        for tuple in tuples {
            let entry = Entry {
                key: self.key_of(tuple),
                tuple: Arc::clone(tuple),
            };
            if entries.insert(entry) {
                added += 1;
            }
        }
        added
    }

    pub(crate) fn contains(&self, tuple: &[TermId]) -> bool {
        let key = self.key_of(tuple);
        self.entries.read().contains(&*key)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub(crate) fn clear(&self) {
        self.entries.write().clear();
    }

    /// Key bounds covering every entry whose bound columns equal `prefix`.
    fn prefix_bounds(&self, prefix: &[TermId]) -> (KeyBound, KeyBound) {
        let rest = self.order.len() - prefix.len();
        let mut lower = Vec::with_capacity(self.order.len());
        lower.extend_from_slice(prefix);
        let mut upper = lower.clone();
        lower.extend(std::iter::repeat_n(TermId::MIN, rest));
        upper.extend(std::iter::repeat_n(TermId::MAX, rest));
        (
            Bound::Included(lower.into()),
            Bound::Included(upper.into()),
        )
    }

    /// Every tuple whose bound columns equal `key`.
    pub(crate) fn lookup(self: &Arc<Self>, key: &[TermId], limits: ViewLimits) -> View {
        debug_assert_eq!(key.len(), self.bound, "lookup key does not match pattern");
        let (lower, upper) = self.prefix_bounds(key);
        self.view(lower, upper, limits)
    }

    /// Every tuple of the index.
    pub(crate) fn all(self: &Arc<Self>, limits: ViewLimits) -> View {
        self.view(Bound::Unbounded, Bound::Unbounded, limits)
    }

    /// Copy small results out immediately; keep large ones as a lazy range.
    pub(crate) fn view(self: &Arc<Self>, lower: KeyBound, upper: KeyBound, limits: ViewLimits) -> View {
        let entries = self.entries.read();
        let range = (as_slice(&lower), as_slice(&upper));
        if !is_valid_range(range.0, range.1) {
            return View::empty();
        }
        let mut iter = entries.range::<[TermId], _>(range);
        let head: Vec<Tuple> = iter
            .by_ref()
            .take(limits.max_array_size + 1)
            .map(|e| Arc::clone(&e.tuple))
            .collect();
        if head.len() <= limits.max_array_size {
            return View::array(head);
        }
        let count = head.len() + iter.count();
        drop(entries);
        View::range(Arc::clone(self), lower, upper, count, limits)
    }

    /// Up to `limit` entries of the range, in key order.
    pub(crate) fn chunk(&self, lower: &KeyBound, upper: &KeyBound, limit: usize) -> Vec<Entry> {
        let range = (as_slice(lower), as_slice(upper));
        if !is_valid_range(range.0, range.1) {
            return Vec::new();
        }
        self.entries
            .read()
            .range::<[TermId], _>(range)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Keys of the first and last entries of the range.
    pub(crate) fn extremes(
        &self,
        lower: &KeyBound,
        upper: &KeyBound,
    ) -> Option<(Box<[TermId]>, Box<[TermId]>)> {
        let range = (as_slice(lower), as_slice(upper));
        if !is_valid_range(range.0, range.1) {
            return None;
        }
        let entries = self.entries.read();
        let mut iter = entries.range::<[TermId], _>(range);
        let first = iter.next()?.key.clone();
        let last = iter.next_back().map_or_else(|| first.clone(), |e| e.key.clone());
        Some((first, last))
    }

    /// Number of entries in the range.
    pub(crate) fn count(&self, lower: &KeyBound, upper: &KeyBound) -> usize {
        let range = (as_slice(lower), as_slice(upper));
        if !is_valid_range(range.0, range.1) {
            return 0;
        }
        self.entries.read().range::<[TermId], _>(range).count()
    }

    /// Snapshot of all tuples in key order.
    pub(crate) fn tuples(&self) -> Vec<Tuple> {
        self.entries
            .read()
            .iter()
            .map(|e| Arc::clone(&e.tuple))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BindingType::{Bound as B, Free as F, Ignored as I};

    fn tuple(ids: &[u32]) -> Tuple {
        ids.iter().map(|&i| TermId::from_raw(i)).collect()
    }

    fn raw(tuples: &View) -> Vec<Vec<u32>> {
        tuples
            .iter()
            .map(|t| t.iter().map(|id| id.raw()).collect())
            .collect()
    }

    const LIMITS: ViewLimits = ViewLimits {
        max_array_size: 1024,
        num_guesses: 8,
    };

    #[test]
    fn test_key_order_bound_first() {
        let index = Arc::new(SortedIndex::new(&[F, B]));
        for t in [[1, 9], [2, 8], [3, 9]] {
            assert!(index.insert(&tuple(&t)));
        }
        assert!(!index.insert(&tuple(&[1, 9])));
        assert_eq!(raw(&index.lookup(&[TermId::from_raw(9)], LIMITS)), vec![vec![1, 9], vec![3, 9]]);
        assert_eq!(raw(&index.all(LIMITS)), vec![vec![2, 8], vec![1, 9], vec![3, 9]]);
        assert!(index.lookup(&[TermId::from_raw(7)], LIMITS).is_empty());
    }

    #[test]
    fn test_projection_keeps_first_representative() {
        let index = Arc::new(SortedIndex::new(&[B, I]));
        assert!(index.is_projection());
        assert!(index.insert(&tuple(&[1, 5])));
        assert!(!index.insert(&tuple(&[1, 6])));
        assert!(index.insert(&tuple(&[2, 6])));
        assert_eq!(index.len(), 2);
        assert!(index.contains(&tuple(&[1, 42])));
        assert_eq!(raw(&index.lookup(&[TermId::from_raw(1)], LIMITS)), vec![vec![1, 5]]);
    }

    #[test]
    fn test_range_helpers() {
        let index = SortedIndex::new(&[F]);
        index.insert_all(&(0..10).map(|i| tuple(&[i])).collect::<Vec<_>>());
        let lo: KeyBound = Bound::Included(vec![TermId::from_raw(3)].into());
        let hi: KeyBound = Bound::Excluded(vec![TermId::from_raw(7)].into());
        assert_eq!(index.count(&lo, &hi), 4);
        let (first, last) = index.extremes(&lo, &hi).unwrap();
        assert_eq!((first[0].raw(), last[0].raw()), (3, 6));
        assert_eq!(index.chunk(&lo, &hi, 2).len(), 2);
        // inverted bounds are empty rather than a panic
        assert_eq!(index.count(&hi, &lo), 0);
    }
}
