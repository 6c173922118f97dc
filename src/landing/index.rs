//! Cross-branch index of open, tracked pull requests.
//!
//! Branch coordinators own their pull request records; this index only
//! answers the two questions that span branches: which branches must see an
//! update for a bug, and whether any other open pull request still
//! references a bug before it is unsubscribed.

use std::collections::{BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::types::{BugId, PrNumber};

#[derive(Debug, Default)]
struct Inner {
    by_pr: HashMap<PrNumber, (BugId, String)>,
    by_bug: HashMap<BugId, BTreeSet<PrNumber>>,
}

#[derive(Debug, Default)]
pub struct PullRequestIndex {
    inner: RwLock<Inner>,
}

impl PullRequestIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Records an open pull request. Re-tracking replaces the previous entry.
    pub fn track(&self, pr: PrNumber, bug: BugId, target_branch: &str) {
        let mut inner = self.write();
        if let Some((old_bug, _)) = inner.by_pr.insert(pr, (bug, target_branch.to_string()))
            && old_bug != bug
        {
            remove_ref(&mut inner.by_bug, old_bug, pr);
        }
        inner.by_bug.entry(bug).or_default().insert(pr);
    }

    /// Forgets a pull request. Returns the bug it referenced, if tracked.
    pub fn untrack(&self, pr: PrNumber) -> Option<BugId> {
        let mut inner = self.write();
        let (bug, _) = inner.by_pr.remove(&pr)?;
        remove_ref(&mut inner.by_bug, bug, pr);
        Some(bug)
    }

    pub fn branch_for(&self, pr: PrNumber) -> Option<String> {
        self.read().by_pr.get(&pr).map(|(_, branch)| branch.clone())
    }

    /// Target branches with at least one tracked pull request for `bug`.
    pub fn branches_for_bug(&self, bug: BugId) -> BTreeSet<String> {
        let inner = self.read();
        inner
            .by_bug
            .get(&bug)
            .into_iter()
            .flatten()
            .filter_map(|pr| inner.by_pr.get(pr).map(|(_, branch)| branch.clone()))
            .collect()
    }

    /// True if any tracked pull request still references `bug`.
    pub fn is_referenced(&self, bug: BugId) -> bool {
        self.read().by_bug.get(&bug).is_some_and(|prs| !prs.is_empty())
    }

    pub fn len(&self) -> usize {
        self.read().by_pr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn remove_ref(by_bug: &mut HashMap<BugId, BTreeSet<PrNumber>>, bug: BugId, pr: PrNumber) {
    if let Some(prs) = by_bug.get_mut(&bug) {
        prs.remove(&pr);
        if prs.is_empty() {
            by_bug.remove(&bug);
        }
    }
}
