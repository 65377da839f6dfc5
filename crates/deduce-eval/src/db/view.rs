//! Lookup results.
//!
//! A [`View`] is what an index lookup hands back: either a small array of
//! tuples copied out of the index, or, for large results, a key range that is
//! read lazily. Both kinds split in two so that a large lookup can be spread
//! over several tasks.

use std::collections::VecDeque;
use std::ops::Bound;
use std::sync::Arc;

use rand::Rng;

use super::index::{KeyBound, SortedIndex};
use crate::terms::{TermId, Tuple};

/// Entries copied out of an index per lock acquisition while iterating a
/// lazy view.
const CHUNK: usize = 256;

/// Size thresholds shared by every view of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ViewLimits {
    pub(crate) max_array_size: usize,
    pub(crate) num_guesses: usize,
}

/// An ordered, splittable set of tuples.
#[derive(Debug, Clone)]
pub struct View(Repr);

#[derive(Debug, Clone)]
enum Repr {
    Empty,
    Array {
        tuples: Arc<[Tuple]>,
        start: usize,
        end: usize,
    },
    Range(RangeView),
}

#[derive(Debug, Clone)]
struct RangeView {
    index: Arc<SortedIndex>,
    lower: KeyBound,
    upper: KeyBound,
    count: usize,
    limits: ViewLimits,
}

impl View {
    pub fn empty() -> Self {
        View(Repr::Empty)
    }

    pub(crate) fn array(tuples: Vec<Tuple>) -> Self {
        if tuples.is_empty() {
            return View::empty();
        }
        let end = tuples.len();
        View(Repr::Array {
            tuples: tuples.into(),
            start: 0,
            end,
        })
    }

    pub(crate) fn range(
        index: Arc<SortedIndex>,
        lower: KeyBound,
        upper: KeyBound,
        count: usize,
        limits: ViewLimits,
    ) -> Self {
        View(Repr::Range(RangeView {
            index,
            lower,
            upper,
            count,
            limits,
        }))
    }

    /// Number of tuples in the view.
    pub fn len(&self) -> usize {
        match &self.0 {
            Repr::Empty => 0,
            Repr::Array { start, end, .. } => end - start,
            Repr::Range(range) => range.count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter(match &self.0 {
            Repr::Empty => IterRepr::Array([].iter()),
            Repr::Array { tuples, start, end } => IterRepr::Array(tuples[*start..*end].iter()),
            Repr::Range(range) => IterRepr::Range {
                range,
                cursor: range.lower.clone(),
                buffer: VecDeque::new(),
                exhausted: false,
            },
        })
    }

    pub fn to_vec(&self) -> Vec<Tuple> {
        self.iter().collect()
    }

    /// Split into two disjoint views whose union is this view.
    ///
    /// Returns `None` when there are fewer than two tuples, or when no probe
    /// found a split point with tuples on both sides.
    pub fn split(&self) -> Option<(View, View)> {
        match &self.0 {
            Repr::Empty => None,
            Repr::Array { tuples, start, end } => {
                if end - start < 2 {
                    return None;
                }
                let mid = start + (end - start) / 2;
                let half = |start, end| {
                    View(Repr::Array {
                        tuples: Arc::clone(tuples),
                        start,
                        end,
                    })
                };
                Some((half(*start, mid), half(mid, *end)))
            }
            Repr::Range(range) => range.split(),
        }
    }
}

impl RangeView {
    fn split(&self) -> Option<(View, View)> {
        if self.count < 2 {
            return None;
        }
        let (first, last) = self.index.extremes(&self.lower, &self.upper)?;
        if first.is_empty() {
            return None;
        }

        let mut rng = rand::thread_rng();
        let mut best: Option<(Box<[TermId]>, usize)> = None;
        let mut best_delta = usize::MAX;
        for _ in 0..self.limits.num_guesses {
            let guess = guess_middle(&first, &last, &mut rng);
            let below = self
                .index
                .count(&self.lower, &Bound::Excluded(guess.clone()));
            if below == 0 || below >= self.count {
                continue;
            }
            let delta = below.abs_diff(self.count / 2);
            if delta < best_delta {
                best_delta = delta;
                best = Some((guess, below));
                if delta * 10 < self.count {
                    break;
                }
            }
        }

        let (middle, below) = best?;
        let left = self.sub_view(self.lower.clone(), Bound::Excluded(middle.clone()), below);
        let right = self.sub_view(Bound::Included(middle), self.upper.clone(), self.count - below);
        Some((left, right))
    }

    fn sub_view(&self, lower: KeyBound, upper: KeyBound, count: usize) -> View {
        if count <= self.limits.max_array_size {
            self.index.view(lower, upper, self.limits)
        } else {
            View::range(Arc::clone(&self.index), lower, upper, count, self.limits)
        }
    }
}

/// A random key between `first` and `last` (inclusive).
///
/// Columns are chosen left to right; once the guess is known to be above
/// `first` (or below `last`) later columns may range over every id.
fn guess_middle(first: &[TermId], last: &[TermId], rng: &mut impl Rng) -> Box<[TermId]> {
    let bound = first
        .iter()
        .chain(last)
        .map(|id| id.raw())
        .max()
        .unwrap_or(0)
        .saturating_add(1);
    let mut above_first = false;
    let mut below_last = false;
    first
        .iter()
        .zip(last)
        .map(|(lo, hi)| {
            let (lo, hi) = (lo.raw(), hi.raw());
            let lo_bound = if above_first { 0 } else { lo };
            let hi_bound = if below_last { bound } else { hi.saturating_add(1) };
            let id = if lo_bound < hi_bound {
                rng.gen_range(lo_bound..hi_bound)
            } else {
                lo_bound
            };
            above_first |= id > lo;
            below_last |= id < hi;
            TermId::from_raw(id)
        })
        .collect()
}

/// Iterator over the tuples of a [`View`].
pub struct Iter<'a>(IterRepr<'a>);

enum IterRepr<'a> {
    Array(std::slice::Iter<'a, Tuple>),
    Range {
        range: &'a RangeView,
        cursor: KeyBound,
        buffer: VecDeque<Tuple>,
        exhausted: bool,
    },
}

impl Iterator for Iter<'_> {
    type Item = Tuple;

    fn next(&mut self) -> Option<Tuple> {
        match &mut self.0 {
            IterRepr::Array(iter) => iter.next().cloned(),
            IterRepr::Range {
                range,
                cursor,
                buffer,
                exhausted,
            } => {
                if buffer.is_empty() && !*exhausted {
                    let chunk = range.index.chunk(cursor, &range.upper, CHUNK);
                    *exhausted = chunk.len() < CHUNK;
                    if let Some(last) = chunk.last() {
                        *cursor = Bound::Excluded(last.key.clone());
                    }
                    buffer.extend(chunk.into_iter().map(|e| e.tuple));
                }
                buffer.pop_front()
            }
        }
    }
}

impl<'a> IntoIterator for &'a View {
    type Item = Tuple;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}
