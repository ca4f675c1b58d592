// set.rs — Multisets of tag phases with canonical identity
//
// A PhaseSet is the DFA-state payload: how many hypotheses place each
// (tag, phase) slot at this point of the automaton. Equality and hashing
// derive from the sorted map, so two sets compare equal exactly when their
// phase counts match; the graph's set-to-node index turns that equality
// into shared node identity.

use std::collections::BTreeMap;
use std::fmt;

use crate::phase::TagPhase;
use crate::tag::TagId;

/// Result of removing one occurrence of a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The phase was not present.
    Absent,
    /// One occurrence removed, at least one remains.
    Reduced,
    /// The last occurrence was removed.
    Gone,
}

/// A multiset of TagPhases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhaseSet {
    counts: BTreeMap<TagPhase, u32>,
}

impl PhaseSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn singleton(tp: TagPhase) -> Self {
        let mut s = Self::new();
        s.insert(tp);
        s
    }

    /// Add one occurrence. Returns true when the phase was newly introduced.
    pub fn insert(&mut self, tp: TagPhase) -> bool {
        let c = self.counts.entry(tp).or_insert(0);
        *c += 1;
        *c == 1
    }

    /// Remove one occurrence.
    pub fn remove(&mut self, tp: TagPhase) -> Removal {
        match self.counts.get_mut(&tp) {
            None => Removal::Absent,
            Some(c) if *c > 1 => {
                *c -= 1;
                Removal::Reduced
            }
            Some(_) => {
                self.counts.remove(&tp);
                Removal::Gone
            }
        }
    }

    /// A copy with one more occurrence of `tp`.
    pub fn with(&self, tp: TagPhase) -> Self {
        let mut s = self.clone();
        s.insert(tp);
        s
    }

    /// A copy with one occurrence of `tp` removed.
    pub fn without(&self, tp: TagPhase) -> Self {
        let mut s = self.clone();
        s.remove(tp);
        s
    }

    pub fn contains(&self, tp: TagPhase) -> bool {
        self.counts.contains_key(&tp)
    }

    pub fn count(&self, tp: TagPhase) -> u32 {
        self.counts.get(&tp).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Number of distinct phases.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TagPhase, u32)> + '_ {
        self.counts.iter().map(|(&tp, &c)| (tp, c))
    }

    pub fn has_tag(&self, tag: TagId) -> bool {
        self.counts.keys().any(|tp| tp.tag == tag)
    }

    pub fn phases_of(&self, tag: TagId) -> impl Iterator<Item = TagPhase> + '_ {
        self.counts
            .keys()
            .copied()
            .filter(move |tp| tp.tag == tag)
    }

    /// Move every occurrence of `from`'s phases over to `to`, keeping counts.
    pub fn rename_tag(&mut self, from: TagId, to: TagId) {
        let moved: Vec<(TagPhase, u32)> = self
            .counts
            .iter()
            .filter(|(tp, _)| tp.tag == from)
            .map(|(&tp, &c)| (tp, c))
            .collect();
        for (tp, c) in moved {
            self.counts.remove(&tp);
            *self
                .counts
                .entry(TagPhase::new(to, tp.phase))
                .or_insert(0) += c;
        }
    }
}

impl fmt::Display for PhaseSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        let mut first = true;
        for (tp, c) in self.iter() {
            if !first {
                write!(f, ", ")?;
            }
            if c == 1 {
                write!(f, "{tp}")?;
            } else {
                write!(f, "{tp}x{c}")?;
            }
            first = false;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tp(tag: i32, phase: u8) -> TagPhase {
        TagPhase::new(TagId(tag), phase)
    }

    #[test]
    fn insert_remove_roundtrip() {
        let mut s = PhaseSet::new();
        assert!(s.insert(tp(7, 1)));
        assert!(!s.insert(tp(7, 1)));
        assert_eq!(s.count(tp(7, 1)), 2);
        assert_eq!(s.remove(tp(7, 1)), Removal::Reduced);
        assert_eq!(s.remove(tp(7, 1)), Removal::Gone);
        assert_eq!(s.remove(tp(7, 1)), Removal::Absent);
        assert!(s.is_empty());
    }

    #[test]
    fn equality_ignores_insertion_order() {
        let mut a = PhaseSet::new();
        a.insert(tp(1, 0));
        a.insert(tp(2, 3));
        let mut b = PhaseSet::new();
        b.insert(tp(2, 3));
        b.insert(tp(1, 0));
        assert_eq!(a, b);
        assert_ne!(a, a.with(tp(1, 0)));
    }

    #[test]
    fn rename_moves_counts() {
        let mut s = PhaseSet::new();
        s.insert(tp(5, 1));
        s.insert(tp(5, 1));
        s.insert(tp(5, 2));
        s.insert(tp(9, 1));
        s.rename_tag(TagId(5), TagId(-1));
        assert!(!s.has_tag(TagId(5)));
        assert_eq!(s.count(tp(-1, 1)), 2);
        assert_eq!(s.count(tp(-1, 2)), 1);
        assert_eq!(s.count(tp(9, 1)), 1);
    }
}
