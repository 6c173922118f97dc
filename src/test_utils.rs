//! In-memory collaborators and arbitrary generators shared by tests.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use proptest::prelude::*;
use sha2::{Digest, Sha256};

use crate::collab::{
    BugState, BugTracker, BugTrackerError, CiError, CommitState, RunOutcome, ScmError,
    SourceControl, TaskGraph, TaskRunner,
};
use crate::types::{BugId, PrNumber, RunId, Sha};

pub fn arb_pr_number() -> impl Strategy<Value = PrNumber> {
    any::<u64>().prop_map(PrNumber)
}

pub fn arb_bug_id() -> impl Strategy<Value = BugId> {
    (1u64..10_000_000).prop_map(BugId)
}

pub fn arb_sha() -> impl Strategy<Value = Sha> {
    "[0-9a-f]{40}".prop_map(|s| Sha::parse(s).unwrap())
}

pub fn arb_branch_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9/-]{0,50}".prop_map(String::from)
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

// ─── Source Control ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Commit {
    parents: Vec<Sha>,
    message: String,
    files: BTreeMap<String, String>,
}

/// A recorded commit status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedStatus {
    pub state: CommitState,
    pub context: String,
    pub description: String,
}

#[derive(Debug, Default)]
struct ScmInner {
    next_id: u64,
    commits: HashMap<Sha, Commit>,
    branches: HashMap<String, Sha>,
    conflicting: HashSet<String>,
    merge_outages: HashSet<String>,
    pr_comments: BTreeMap<PrNumber, Vec<String>>,
    statuses: Vec<(Sha, RecordedStatus)>,
    fast_forwards: usize,
    merges: usize,
}

impl ScmInner {
    fn new_commit(&mut self, parents: Vec<Sha>, message: String, files: BTreeMap<String, String>) -> Sha {
        self.next_id += 1;
        let digest = Sha256::digest(format!("commit-{}", self.next_id).as_bytes());
        let sha = Sha::parse(&hex::encode(digest)[..40]).unwrap();
        self.commits.insert(
            sha.clone(),
            Commit {
                parents,
                message,
                files,
            },
        );
        sha
    }

    fn reachable(&self, ancestor: &Sha, descendant: &Sha) -> bool {
        let mut seen = HashSet::new();
        let mut pending = VecDeque::from([descendant.clone()]);
        while let Some(sha) = pending.pop_front() {
            if &sha == ancestor {
                return true;
            }
            if !seen.insert(sha.clone()) {
                continue;
            }
            if let Some(commit) = self.commits.get(&sha) {
                pending.extend(commit.parents.iter().cloned());
            }
        }
        false
    }

    fn head(&self, branch: &str) -> Result<Sha, ScmError> {
        self.branches
            .get(branch)
            .cloned()
            .ok_or_else(|| ScmError::NotFound(format!("branch {branch}")))
    }
}

/// A tiny commit graph standing in for the hosting service.
#[derive(Debug, Default)]
pub struct FakeSourceControl {
    inner: Mutex<ScmInner>,
    unavailable: AtomicBool,
}

impl FakeSourceControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// A repository with one branch holding a single root commit.
    pub fn with_branch(name: &str) -> Self {
        let scm = Self::new();
        {
            let mut inner = lock(&scm.inner);
            let root = inner.new_commit(Vec::new(), "Initial commit".to_string(), BTreeMap::new());
            inner.branches.insert(name.to_string(), root);
        }
        scm
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), ScmError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(ScmError::Unavailable("fake outage".to_string()))
        } else {
            Ok(())
        }
    }

    /// Creates `new` pointing at the head of `from`.
    pub fn branch_from(&self, new: &str, from: &str) {
        let mut inner = lock(&self.inner);
        let head = inner.branches[from].clone();
        inner.branches.insert(new.to_string(), head);
    }

    /// Adds a commit writing `path` on top of `branch`.
    pub fn commit(&self, branch: &str, path: &str, content: &str) -> Sha {
        let mut inner = lock(&self.inner);
        let parent = inner.branches[branch].clone();
        let mut files = inner.commits[&parent].files.clone();
        files.insert(path.to_string(), content.to_string());
        let sha = inner.new_commit(vec![parent], format!("Update {path}"), files);
        inner.branches.insert(branch.to_string(), sha.clone());
        sha
    }

    /// Makes every later merge of `branch` fail with a conflict.
    pub fn mark_conflicting(&self, branch: &str) {
        lock(&self.inner).conflicting.insert(branch.to_string());
    }

    /// Makes merges of `branch` fail as if the service were down, while every
    /// other call keeps working.
    pub fn set_merge_outage(&self, branch: &str, down: bool) {
        let mut inner = lock(&self.inner);
        if down {
            inner.merge_outages.insert(branch.to_string());
        } else {
            inner.merge_outages.remove(branch);
        }
    }

    pub fn head(&self, branch: &str) -> Option<Sha> {
        lock(&self.inner).branches.get(branch).cloned()
    }

    pub fn parents(&self, sha: &Sha) -> Vec<Sha> {
        lock(&self.inner)
            .commits
            .get(sha)
            .map(|c| c.parents.clone())
            .unwrap_or_default()
    }

    pub fn message(&self, sha: &Sha) -> String {
        lock(&self.inner)
            .commits
            .get(sha)
            .map(|c| c.message.clone())
            .unwrap_or_default()
    }

    pub fn is_reachable(&self, ancestor: &Sha, descendant: &Sha) -> bool {
        lock(&self.inner).reachable(ancestor, descendant)
    }

    /// Number of commits reachable from the head of `branch`.
    pub fn commit_count(&self, branch: &str) -> usize {
        let inner = lock(&self.inner);
        let Some(head) = inner.branches.get(branch) else {
            return 0;
        };
        inner
            .commits
            .keys()
            .filter(|sha| inner.reachable(sha, head))
            .count()
    }

    pub fn fast_forward_count(&self) -> usize {
        lock(&self.inner).fast_forwards
    }

    pub fn merge_count(&self) -> usize {
        lock(&self.inner).merges
    }

    pub fn pr_comments(&self, pr: PrNumber) -> Vec<String> {
        lock(&self.inner)
            .pr_comments
            .get(&pr)
            .cloned()
            .unwrap_or_default()
    }

    /// Statuses set on `sha`, oldest first.
    pub fn statuses(&self, sha: &Sha) -> Vec<RecordedStatus> {
        lock(&self.inner)
            .statuses
            .iter()
            .filter(|(s, _)| s == sha)
            .map(|(_, status)| status.clone())
            .collect()
    }
}

impl SourceControl for FakeSourceControl {
    async fn branch_head(&self, branch: &str) -> Result<Option<Sha>, ScmError> {
        self.check_available()?;
        Ok(self.head(branch))
    }

    async fn create_branch(&self, branch: &str, sha: &Sha) -> Result<(), ScmError> {
        self.check_available()?;
        let mut inner = lock(&self.inner);
        if inner.branches.contains_key(branch) {
            return Err(ScmError::Rejected(format!("branch {branch} already exists")));
        }
        if !inner.commits.contains_key(sha) {
            return Err(ScmError::NotFound(format!("commit {sha}")));
        }
        inner.branches.insert(branch.to_string(), sha.clone());
        Ok(())
    }

    async fn delete_branch(&self, branch: &str) -> Result<(), ScmError> {
        self.check_available()?;
        match lock(&self.inner).branches.remove(branch) {
            Some(_) => Ok(()),
            None => Err(ScmError::NotFound(format!("branch {branch}"))),
        }
    }

    async fn merge(&self, base: &str, head: &str, message: &str) -> Result<Sha, ScmError> {
        self.check_available()?;
        let mut inner = lock(&self.inner);
        if inner.merge_outages.contains(head) {
            return Err(ScmError::Unavailable(format!("merging {head}")));
        }
        let base_sha = inner.head(base)?;
        let head_sha = inner.head(head)?;
        if inner.conflicting.contains(head) {
            return Err(ScmError::MergeConflict {
                base: base.to_string(),
                head: head.to_string(),
            });
        }
        if inner.reachable(&head_sha, &base_sha) {
            return Ok(base_sha);
        }

        let mut files = inner.commits[&base_sha].files.clone();
        files.extend(inner.commits[&head_sha].files.clone());
        let merged = inner.new_commit(vec![base_sha, head_sha], message.to_string(), files);
        inner.branches.insert(base.to_string(), merged.clone());
        inner.merges += 1;
        Ok(merged)
    }

    async fn fast_forward(&self, branch: &str, sha: &Sha) -> Result<(), ScmError> {
        self.check_available()?;
        let mut inner = lock(&self.inner);
        let current = inner.head(branch)?;
        if !inner.reachable(&current, sha) {
            return Err(ScmError::NonFastForward {
                branch: branch.to_string(),
                sha: sha.to_string(),
            });
        }
        inner.branches.insert(branch.to_string(), sha.clone());
        inner.fast_forwards += 1;
        Ok(())
    }

    async fn is_ancestor(&self, ancestor: &Sha, descendant: &Sha) -> Result<bool, ScmError> {
        self.check_available()?;
        Ok(self.is_reachable(ancestor, descendant))
    }

    async fn read_file(&self, sha: &Sha, path: &str) -> Result<Option<String>, ScmError> {
        self.check_available()?;
        let inner = lock(&self.inner);
        let commit = inner
            .commits
            .get(sha)
            .ok_or_else(|| ScmError::NotFound(format!("commit {sha}")))?;
        Ok(commit.files.get(path).cloned())
    }

    async fn post_pr_comment(&self, pr: PrNumber, body: &str) -> Result<(), ScmError> {
        self.check_available()?;
        lock(&self.inner)
            .pr_comments
            .entry(pr)
            .or_default()
            .push(body.to_string());
        Ok(())
    }

    async fn set_commit_status(
        &self,
        sha: &Sha,
        state: CommitState,
        context: &str,
        description: &str,
    ) -> Result<(), ScmError> {
        self.check_available()?;
        lock(&self.inner).statuses.push((
            sha.clone(),
            RecordedStatus {
                state,
                context: context.to_string(),
                description: description.to_string(),
            },
        ));
        Ok(())
    }
}

// ─── Bug Tracker ──────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct BugsInner {
    states: HashMap<BugId, BugState>,
    comments: HashMap<BugId, Vec<String>>,
    resolved: BTreeSet<BugId>,
    attachments: Vec<(BugId, PrNumber)>,
}

#[derive(Debug, Default)]
pub struct FakeBugTracker {
    inner: Mutex<BugsInner>,
    unavailable: AtomicBool,
}

impl FakeBugTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_state(&self, bug: BugId, checkin_requested: bool, approved: bool) {
        lock(&self.inner).states.insert(
            bug,
            BugState {
                checkin_requested,
                approved,
            },
        );
    }

    /// Sets both gates on `bug`.
    pub fn make_ready(&self, bug: BugId) {
        self.set_state(bug, true, true);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), BugTrackerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(BugTrackerError::Unavailable("fake outage".to_string()))
        } else {
            Ok(())
        }
    }

    pub fn comments(&self, bug: BugId) -> Vec<String> {
        lock(&self.inner)
            .comments
            .get(&bug)
            .cloned()
            .unwrap_or_default()
    }

    pub fn checkin(&self, bug: BugId) -> bool {
        lock(&self.inner)
            .states
            .get(&bug)
            .is_some_and(|s| s.checkin_requested)
    }

    pub fn is_resolved(&self, bug: BugId) -> bool {
        lock(&self.inner).resolved.contains(&bug)
    }

    pub fn attachments(&self) -> Vec<(BugId, PrNumber)> {
        lock(&self.inner).attachments.clone()
    }
}

impl BugTracker for FakeBugTracker {
    async fn bug_state(&self, bug: BugId, _pr: PrNumber) -> Result<BugState, BugTrackerError> {
        self.check_available()?;
        Ok(lock(&self.inner).states.get(&bug).copied().unwrap_or_default())
    }

    async fn list_comments(&self, bug: BugId) -> Result<Vec<String>, BugTrackerError> {
        self.check_available()?;
        Ok(self.comments(bug))
    }

    async fn post_comment(&self, bug: BugId, body: &str) -> Result<(), BugTrackerError> {
        self.check_available()?;
        lock(&self.inner)
            .comments
            .entry(bug)
            .or_default()
            .push(body.to_string());
        Ok(())
    }

    async fn clear_checkin_requested(&self, bug: BugId) -> Result<(), BugTrackerError> {
        self.check_available()?;
        lock(&self.inner)
            .states
            .entry(bug)
            .or_default()
            .checkin_requested = false;
        Ok(())
    }

    async fn resolve_fixed(&self, bug: BugId) -> Result<(), BugTrackerError> {
        self.check_available()?;
        lock(&self.inner).resolved.insert(bug);
        Ok(())
    }

    async fn attach_pull_request(
        &self,
        bug: BugId,
        pr: PrNumber,
        _source_branch: &str,
        _target_branch: &str,
    ) -> Result<(), BugTrackerError> {
        self.check_available()?;
        lock(&self.inner).attachments.push((bug, pr));
        Ok(())
    }
}

// ─── Task Runner ──────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct RunsInner {
    submitted: Vec<(RunId, Sha, TaskGraph)>,
    outcomes: HashMap<RunId, RunOutcome>,
    max_outstanding: usize,
}

/// Scripted CI: runs stay pending until resolved.
#[derive(Debug, Default)]
pub struct FakeTaskRunner {
    inner: Mutex<RunsInner>,
}

impl FakeTaskRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self, run: &RunId, outcome: RunOutcome) {
        lock(&self.inner).outcomes.insert(run.clone(), outcome);
    }

    pub fn runs(&self) -> Vec<RunId> {
        lock(&self.inner)
            .submitted
            .iter()
            .map(|(run, _, _)| run.clone())
            .collect()
    }

    pub fn last_run(&self) -> Option<RunId> {
        self.runs().pop()
    }

    pub fn submitted_sha(&self, run: &RunId) -> Option<Sha> {
        lock(&self.inner)
            .submitted
            .iter()
            .find(|(r, _, _)| r == run)
            .map(|(_, sha, _)| sha.clone())
    }

    pub fn submitted_graph(&self, run: &RunId) -> Option<TaskGraph> {
        lock(&self.inner)
            .submitted
            .iter()
            .find(|(r, _, _)| r == run)
            .map(|(_, _, graph)| graph.clone())
    }

    /// Highest number of simultaneously pending runs ever observed.
    pub fn max_outstanding(&self) -> usize {
        lock(&self.inner).max_outstanding
    }
}

impl TaskRunner for FakeTaskRunner {
    async fn submit(&self, sha: &Sha, graph: &TaskGraph) -> Result<RunId, CiError> {
        let mut inner = lock(&self.inner);
        let run = RunId::new(format!("run-{}", inner.submitted.len() + 1));
        inner.submitted.push((run.clone(), sha.clone(), graph.clone()));
        inner.outcomes.insert(run.clone(), RunOutcome::Pending);
        let outstanding = inner
            .outcomes
            .values()
            .filter(|o| **o == RunOutcome::Pending)
            .count();
        inner.max_outstanding = inner.max_outstanding.max(outstanding);
        Ok(run)
    }

    async fn poll_outcome(&self, run: &RunId) -> Result<RunOutcome, CiError> {
        lock(&self.inner)
            .outcomes
            .get(run)
            .copied()
            .ok_or_else(|| CiError::UnknownRun(run.clone()))
    }
}
