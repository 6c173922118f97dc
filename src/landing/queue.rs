//! FIFO of pull requests waiting for the next attempt on one target branch.
//!
//! The queue stores only pull request numbers; the records themselves live in
//! the coordinator's arena.

use std::collections::VecDeque;

use crate::types::PrNumber;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LandingQueue {
    entries: VecDeque<PrNumber>,
}

impl LandingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a pull request. Pushing one that is already queued is a no-op.
    pub fn push_back(&mut self, pr: PrNumber) {
        if !self.contains(pr) {
            self.entries.push_back(pr);
        }
    }

    /// Puts `prs` back at the front, preserving their relative order.
    pub fn push_front_all(&mut self, prs: impl IntoIterator<Item = PrNumber>) {
        let prs: Vec<_> = prs.into_iter().filter(|pr| !self.contains(*pr)).collect();
        for pr in prs.into_iter().rev() {
            self.entries.push_front(pr);
        }
    }

    /// Removes a pull request, returning whether it was queued.
    pub fn remove(&mut self, pr: PrNumber) -> bool {
        match self.entries.iter().position(|p| *p == pr) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Takes every queued pull request, in order.
    pub fn drain_all(&mut self) -> Vec<PrNumber> {
        self.entries.drain(..).collect()
    }

    pub fn contains(&self, pr: PrNumber) -> bool {
        self.entries.contains(&pr)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = PrNumber> + '_ {
        self.entries.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn prs(ns: &[u64]) -> Vec<PrNumber> {
        ns.iter().copied().map(PrNumber).collect()
    }

    #[test]
    fn requeue_goes_in_front_in_original_order() {
        let mut queue = LandingQueue::new();
        queue.push_back(PrNumber(3));
        queue.push_front_all(prs(&[1, 2]));

        assert_eq!(queue.iter().collect::<Vec<_>>(), prs(&[1, 2, 3]));
    }

    #[test]
    fn remove_from_middle() {
        let mut queue = LandingQueue::new();
        for n in 1..=3 {
            queue.push_back(PrNumber(n));
        }

        assert!(queue.remove(PrNumber(2)));
        assert!(!queue.remove(PrNumber(2)));
        assert_eq!(queue.drain_all(), prs(&[1, 3]));
        assert!(queue.is_empty());
    }

    proptest! {
        #[test]
        fn drain_preserves_arrival_order(ns in prop::collection::vec(0u64..50, 0..30)) {
            let mut queue = LandingQueue::new();
            let mut expected = Vec::new();
            for n in ns {
                queue.push_back(PrNumber(n));
                if !expected.contains(&PrNumber(n)) {
                    expected.push(PrNumber(n));
                }
            }

            prop_assert_eq!(queue.len(), expected.len());
            prop_assert_eq!(queue.drain_all(), expected);
        }

        #[test]
        fn never_holds_duplicates(
            back in prop::collection::vec(0u64..20, 0..20),
            front in prop::collection::vec(0u64..20, 0..20),
        ) {
            let mut queue = LandingQueue::new();
            for n in back {
                queue.push_back(PrNumber(n));
            }
            queue.push_front_all(front.into_iter().map(PrNumber));

            let drained = queue.drain_all();
            let mut deduped = drained.clone();
            deduped.sort();
            deduped.dedup();
            prop_assert_eq!(drained.len(), deduped.len());
        }
    }
}
