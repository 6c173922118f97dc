//! Per-branch landing coordinator.
//!
//! The coordinator drives pull requests through
//! `New → AwaitingReview → Queued → InAttempt → Landed | Failed | Abandoned`
//! and owns at most one integration attempt at a time. When no attempt is
//! running, every queued pull request joins the next one.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, trace, warn};

use super::{BranchEvent, BranchView, LandingContext, LandingError, LandingQueue, Result};
use crate::bug::comments::{
    FAILURE_DESCRIPTION, NO_BUG_FOUND, SUCCESS_DESCRIPTION, failure_comment, landing_comment,
    pending_description,
};
use crate::bug::parse_bug_id;
use crate::collab::{
    BugState, BugTracker, CommitState, RunOutcome, ScmError, SourceControl, TaskRunner,
};
use crate::integration::IntegrationBranchManager;
use crate::table::TableStore;
use crate::tracker::{TaskGraphError, TaskRunTracker, read_task_graph};
use crate::types::{
    AttemptMember, AttemptOutcome, BugId, FailureReason, IntegrationAttempt, LandingState,
    PrNumber, PullRequest, RunId,
};

pub struct BranchCoordinator<S, B, R, T> {
    pub(super) target: String,
    pub(super) ctx: Arc<LandingContext<S, B, R, T>>,
    /// Pull requests this branch is tracking, mirrored to the pull request
    /// store. Landed and abandoned records are dropped once released.
    pub(super) prs: BTreeMap<PrNumber, PullRequest>,
    /// Open pull requests already answered with the "no bug found" comment.
    pub(super) rejected: BTreeSet<PrNumber>,
    pub(super) queue: LandingQueue,
    pub(super) attempt: Option<IntegrationAttempt>,
}

impl<S, B, R, T> BranchCoordinator<S, B, R, T>
where
    S: SourceControl,
    B: BugTracker,
    R: TaskRunner,
    T: TableStore,
{
    pub fn new(target: impl Into<String>, ctx: Arc<LandingContext<S, B, R, T>>) -> Self {
        BranchCoordinator {
            target: target.into(),
            ctx,
            prs: BTreeMap::new(),
            rejected: BTreeSet::new(),
            queue: LandingQueue::new(),
            attempt: None,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn pull_request(&self, pr: PrNumber) -> Option<&PullRequest> {
        self.prs.get(&pr)
    }

    pub fn queue(&self) -> &LandingQueue {
        &self.queue
    }

    pub fn attempt(&self) -> Option<&IntegrationAttempt> {
        self.attempt.as_ref()
    }

    pub fn view(&self) -> BranchView {
        BranchView {
            target_branch: self.target.clone(),
            queue: self.queue.iter().collect(),
            attempt: self.attempt.clone(),
            pull_requests: self.prs.values().cloned().collect(),
        }
    }

    /// Applies one event, then starts the next attempt if the branch is idle.
    #[instrument(skip(self), fields(branch = %self.target))]
    pub async fn handle(&mut self, event: BranchEvent) -> Result<()> {
        match event {
            BranchEvent::Opened {
                number,
                title,
                source_branch,
            } => self.on_opened(number, title, source_branch).await?,
            BranchEvent::Closed { number } => self.on_closed(number).await?,
            BranchEvent::BugChanged { bug } => self.on_bug_changed(bug).await?,
            BranchEvent::RunCompleted { run_id } => {
                if self.current_run() == Some(&run_id) {
                    self.advance_attempt().await?;
                } else {
                    trace!(%run_id, "Run does not belong to this branch");
                }
            }
            BranchEvent::Poll => self.advance_attempt().await?,
        }

        self.maybe_start_attempt().await
    }

    fn current_run(&self) -> Option<&RunId> {
        self.attempt.as_ref().and_then(|a| a.run_id.as_ref())
    }

    // ─── Pull Request Lifecycle ───────────────────────────────────────────────

    async fn on_opened(&mut self, number: PrNumber, title: String, source_branch: String) -> Result<()> {
        if let Some(record) = self.prs.get(&number) {
            if record.open && !record.state.is_terminal() {
                // A replayed event: the first delivery may have stopped before
                // the bug state was read.
                debug!(pr = %number, "Pull request already tracked, refreshing");
                return self.refresh(number).await;
            }
            return Ok(());
        }
        if self.rejected.contains(&number) {
            debug!(pr = %number, "Pull request already rejected");
            return Ok(());
        }

        let Some(bug) = parse_bug_id(&title) else {
            info!(pr = %number, %title, "No bug number in title, rejecting pull request");
            self.ctx.scm.post_pr_comment(number, NO_BUG_FOUND).await?;
            self.rejected.insert(number);
            return Ok(());
        };

        // Subscribe before the record exists so that no bug update for a
        // tracked pull request can be filtered out.
        self.ctx.track(number, bug, &self.target).await?;

        let pr = PullRequest::new(number, title, source_branch, self.target.clone(), bug);
        let source_branch = pr.source_branch.clone();
        self.prs.insert(number, pr);
        self.transition(number, LandingState::AwaitingReview);
        self.persist(number).await?;
        info!(pr = %number, %bug, "Tracking pull request");

        if let Err(e) = self
            .ctx
            .bugs
            .attach_pull_request(bug, number, &source_branch, &self.target)
            .await
        {
            warn!(pr = %number, %bug, error = %e, "Failed to attach pull request to bug");
        }

        self.refresh(number).await
    }

    async fn on_closed(&mut self, number: PrNumber) -> Result<()> {
        self.rejected.remove(&number);
        let Some(record) = self.prs.get_mut(&number) else {
            debug!(pr = %number, "Closed pull request is not tracked");
            return Ok(());
        };
        record.open = false;
        let state = record.state;
        let bug = record.bug;

        if state == LandingState::InAttempt {
            debug!(pr = %number, "Closed pull request stays in its attempt until it resolves");
        } else {
            // Terminal records still here were not released yet; retry that.
            self.queue.remove(number);
            if !state.is_terminal() {
                self.transition(number, LandingState::Abandoned);
                info!(pr = %number, "Pull request closed before landing");
            }
            self.release(number, bug).await?;
        }
        self.persist(number).await
    }

    async fn on_bug_changed(&mut self, bug: BugId) -> Result<()> {
        let affected: Vec<PrNumber> = self
            .prs
            .values()
            .filter(|pr| pr.bug == bug && pr.open && !pr.state.is_terminal())
            .map(|pr| pr.number)
            .collect();

        for number in affected {
            self.refresh(number).await?;
        }
        Ok(())
    }

    /// Re-reads the bug state for a pull request and applies it.
    async fn refresh(&mut self, number: PrNumber) -> Result<()> {
        let Some(bug) = self.prs.get(&number).map(|pr| pr.bug) else {
            return Ok(());
        };
        let state = self.ctx.bugs.bug_state(bug, number).await?;
        self.apply_bug_state(number, state);
        self.persist(number).await
    }

    fn apply_bug_state(&mut self, number: PrNumber, bug_state: BugState) {
        let Some(record) = self.prs.get_mut(&number) else {
            return;
        };
        record.approved = bug_state.approved;
        record.checkin_requested = bug_state.checkin_requested;
        let ready = record.is_ready();
        let state = record.state;

        match state {
            LandingState::AwaitingReview | LandingState::Failed if ready => {
                self.transition(number, LandingState::Queued);
                if let Some(record) = self.prs.get_mut(&number) {
                    record.queued_at = Some(Utc::now());
                }
                self.queue.push_back(number);
                info!(pr = %number, position = self.queue.len(), "Queued for landing");
            }
            LandingState::Failed if bug_state.checkin_requested => {
                self.transition(number, LandingState::AwaitingReview);
            }
            LandingState::Queued if !ready => {
                self.queue.remove(number);
                self.transition(number, LandingState::AwaitingReview);
                if let Some(record) = self.prs.get_mut(&number) {
                    record.queued_at = None;
                }
                info!(pr = %number, "Approval or checkin flag dropped, leaving queue");
            }
            _ => {}
        }
    }

    /// Moves a pull request to `next`, ignoring transitions the lifecycle forbids.
    pub(super) fn transition(&mut self, number: PrNumber, next: LandingState) {
        let Some(record) = self.prs.get_mut(&number) else {
            return;
        };
        if record.state == next {
            return;
        }
        if !record.state.can_transition_to(next) {
            warn!(
                pr = %number,
                from = record.state.name(),
                to = next.name(),
                "Ignoring invalid landing state transition"
            );
            return;
        }
        debug!(pr = %number, from = record.state.name(), to = next.name(), "Landing state transition");
        record.state = next;
    }

    /// Stops tracking a pull request and drops the bug subscription if no other
    /// open pull request references it.
    pub(super) async fn release(&mut self, number: PrNumber, bug: BugId) -> Result<()> {
        self.ctx.untrack(number, bug).await?;
        Ok(())
    }

    /// Writes the arena record of `number` to the pull request store. A
    /// landed or abandoned record is deleted from the store and the arena.
    pub(super) async fn persist(&mut self, number: PrNumber) -> Result<()> {
        let Some(record) = self.prs.get(&number) else {
            return Ok(());
        };
        if record.state.is_terminal() {
            self.ctx.pull_requests.remove(number).await?;
            self.prs.remove(&number);
            trace!(pr = %number, "Dropped finished pull request");
        } else {
            self.ctx.pull_requests.save(record).await?;
        }
        Ok(())
    }

    // ─── Attempt Lifecycle ────────────────────────────────────────────────────

    /// Persists a modified copy of the current attempt, then adopts it.
    pub(super) async fn update_attempt(&mut self, f: impl FnOnce(&mut IntegrationAttempt)) -> Result<()> {
        let Some(current) = self.attempt.as_ref() else {
            return Ok(());
        };
        let mut next = current.clone();
        f(&mut next);
        self.ctx.attempts.save(&next).await?;
        self.attempt = Some(next);
        Ok(())
    }

    async fn set_outcome(&mut self, outcome: AttemptOutcome) -> Result<()> {
        let valid = self
            .attempt
            .as_ref()
            .is_some_and(|a| a.outcome.can_transition_to(&outcome));
        if !valid {
            return Ok(());
        }
        info!(?outcome, "Attempt outcome");
        self.update_attempt(move |a| a.outcome = outcome).await
    }

    /// Starts an attempt with every queued pull request if none is running.
    pub(super) async fn maybe_start_attempt(&mut self) -> Result<()> {
        if self.attempt.is_some() || self.queue.is_empty() {
            return Ok(());
        }

        let prs = self.queue.drain_all();
        let members: Vec<AttemptMember> = prs
            .iter()
            .filter_map(|n| self.prs.get(n))
            .map(|pr| AttemptMember {
                pr: pr.number,
                bug: pr.bug,
                source_branch: pr.source_branch.clone(),
                title: pr.title.clone(),
            })
            .collect();

        let attempt = IntegrationAttempt::new(self.target.clone(), members);
        if let Err(e) = self.ctx.attempts.save(&attempt).await {
            self.queue.push_front_all(prs);
            return Err(e.into());
        }

        for number in &prs {
            self.transition(*number, LandingState::InAttempt);
        }
        info!(members = ?prs, "Started integration attempt");
        self.attempt = Some(attempt);
        for number in &prs {
            self.persist(*number).await?;
        }

        self.run_attempt().await
    }

    /// Merges every member onto a fresh integration branch and submits CI.
    async fn run_attempt(&mut self) -> Result<()> {
        let Some(attempt) = self.attempt.clone() else {
            return Ok(());
        };
        let ctx = Arc::clone(&self.ctx);
        let manager = IntegrationBranchManager::new(&ctx.scm);

        let (integration_ref, mut head) = manager.ensure_integration_branch(&self.target).await?;
        for member in &attempt.members {
            match manager.merge_onto(&integration_ref, &member.source_branch).await {
                Ok(sha) => head = sha,
                Err(ScmError::MergeConflict { .. }) => {
                    warn!(pr = %member.pr, branch = %member.source_branch, "Merge conflict");
                    let pr = member.pr;
                    self.set_outcome(AttemptOutcome::Failure {
                        reason: FailureReason::MergeConflict { pr },
                    })
                    .await?;
                    return self.finish_attempt().await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let merged_head = head.clone();
        self.update_attempt(move |a| a.head_sha = Some(merged_head)).await?;

        let graph = match read_task_graph(&ctx.scm, &head, &ctx.settings.task_graph_path).await {
            Ok(graph) => graph,
            Err(TaskGraphError::Invalid { source, .. }) => {
                warn!(error = %source, "Invalid task graph");
                self.set_outcome(AttemptOutcome::Failure {
                    reason: FailureReason::InvalidTaskGraph {
                        message: source.to_string(),
                    },
                })
                .await?;
                return self.finish_attempt().await;
            }
            Err(TaskGraphError::Scm(e)) => return Err(e.into()),
        };

        let run = TaskRunTracker::new(&ctx.ci).submit(&head, &graph).await?;
        let run_for_record = run.clone();
        self.update_attempt(move |a| a.run_id = Some(run_for_record)).await?;

        let description = pending_description(run.as_str());
        for member in &attempt.members {
            self.set_member_status(member, CommitState::Pending, &description)
                .await?;
        }
        Ok(())
    }

    /// Polls the running attempt, or resumes post-processing of a resolved one.
    pub(super) async fn advance_attempt(&mut self) -> Result<()> {
        let Some(attempt) = self.attempt.as_ref() else {
            return Ok(());
        };
        if attempt.outcome.is_terminal() {
            return self.finish_attempt().await;
        }
        let Some(run_id) = attempt.run_id.clone() else {
            warn!("Attempt never received a run id, reissuing");
            return self.reissue_attempt().await;
        };
        let resuming = attempt.outcome == AttemptOutcome::UnknownAfterRestart;

        let ctx = Arc::clone(&self.ctx);
        match TaskRunTracker::new(&ctx.ci).poll_outcome(&run_id).await? {
            RunOutcome::Pending => {
                if resuming {
                    info!(%run_id, "Run still in progress, resuming");
                    self.set_outcome(AttemptOutcome::Pending).await?;
                }
                Ok(())
            }
            RunOutcome::Success => {
                self.set_outcome(AttemptOutcome::Success).await?;
                self.finish_attempt().await
            }
            RunOutcome::Failure => {
                self.set_outcome(AttemptOutcome::Failure {
                    reason: FailureReason::CiFailed,
                })
                .await?;
                self.finish_attempt().await
            }
        }
    }

    /// Applies the side effects of a terminal outcome. Safe to repeat.
    pub(super) async fn finish_attempt(&mut self) -> Result<()> {
        let Some(attempt) = self.attempt.clone() else {
            return Ok(());
        };
        match attempt.outcome.clone() {
            AttemptOutcome::Success => self.land(attempt).await,
            AttemptOutcome::Failure { reason } => self.fail(attempt, reason).await,
            AttemptOutcome::Pending | AttemptOutcome::UnknownAfterRestart => Ok(()),
        }
    }

    async fn land(&mut self, attempt: IntegrationAttempt) -> Result<()> {
        let head = attempt
            .head_sha
            .clone()
            .ok_or_else(|| LandingError::MissingHead {
                target: self.target.clone(),
            })?;
        let ctx = Arc::clone(&self.ctx);

        if !attempt.fast_forwarded {
            match IntegrationBranchManager::new(&ctx.scm)
                .fast_forward(&self.target, &head)
                .await
            {
                Ok(()) => self.update_attempt(|a| a.fast_forwarded = true).await?,
                Err(ScmError::NonFastForward { .. }) => {
                    warn!(head = %head.short(), "Target moved during attempt, requeueing members");
                    return self.requeue_members().await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let pending: Vec<AttemptMember> = attempt.unfinalized().cloned().collect();
        for member in pending {
            let comment = landing_comment(&self.target, member.pr, &head);
            self.comment_once(member.bug, &comment).await?;
            ctx.bugs.clear_checkin_requested(member.bug).await?;
            ctx.bugs.resolve_fixed(member.bug).await?;
            self.set_member_status(&member, CommitState::Success, SUCCESS_DESCRIPTION)
                .await?;

            self.restore_member(&member);
            self.transition(member.pr, LandingState::Landed);
            self.release(member.pr, member.bug).await?;
            self.persist(member.pr).await?;

            let pr = member.pr;
            self.update_attempt(move |a| {
                a.finalized.insert(pr);
            })
            .await?;
            info!(pr = %member.pr, bug = %member.bug, "Pull request landed");
        }

        self.close_attempt().await
    }

    async fn fail(&mut self, attempt: IntegrationAttempt, reason: FailureReason) -> Result<()> {
        let ctx = Arc::clone(&self.ctx);

        let pending: Vec<AttemptMember> = attempt.unfinalized().cloned().collect();
        for member in pending {
            let comment = failure_comment(&self.target, &member, &reason, attempt.head_sha.as_ref());
            self.comment_once(member.bug, &comment).await?;
            ctx.bugs.clear_checkin_requested(member.bug).await?;
            self.set_member_status(&member, CommitState::Failure, FAILURE_DESCRIPTION)
                .await?;

            self.restore_member(&member);
            self.transition(member.pr, LandingState::Failed);
            let mut closed = false;
            if let Some(record) = self.prs.get_mut(&member.pr) {
                record.checkin_requested = false;
                record.queued_at = None;
                closed = !record.open;
            }
            if closed {
                self.transition(member.pr, LandingState::Abandoned);
                self.release(member.pr, member.bug).await?;
            }
            self.persist(member.pr).await?;

            let pr = member.pr;
            self.update_attempt(move |a| {
                a.finalized.insert(pr);
            })
            .await?;
            info!(pr = %member.pr, bug = %member.bug, ?reason, "Pull request failed to land");
        }

        self.close_attempt().await
    }

    /// Deletes the integration branch and the attempt record.
    async fn close_attempt(&mut self) -> Result<()> {
        let Some(integration_ref) = self.attempt.as_ref().map(|a| a.integration_ref.clone()) else {
            return Ok(());
        };
        let ctx = Arc::clone(&self.ctx);

        IntegrationBranchManager::new(&ctx.scm)
            .delete_integration_branch(&integration_ref)
            .await?;
        ctx.attempts.remove(&self.target).await?;
        self.attempt = None;
        debug!("Closed attempt");
        Ok(())
    }

    /// Discards the current attempt and returns its open members to the front
    /// of the queue in their original order.
    pub(super) async fn requeue_members(&mut self) -> Result<()> {
        let Some(attempt) = self.attempt.clone() else {
            return Ok(());
        };
        let ctx = Arc::clone(&self.ctx);

        IntegrationBranchManager::new(&ctx.scm)
            .delete_integration_branch(&attempt.integration_ref)
            .await?;
        ctx.attempts.remove(&self.target).await?;
        self.attempt = None;

        let mut requeued = Vec::new();
        let mut closed = Vec::new();
        for member in &attempt.members {
            self.restore_member(member);
            self.transition(member.pr, LandingState::Queued);
            if self.prs.get(&member.pr).is_some_and(|pr| pr.open) {
                requeued.push(member.pr);
            } else {
                self.transition(member.pr, LandingState::Abandoned);
                closed.push(member);
            }
        }
        info!(members = ?requeued, "Requeued attempt members");
        self.queue.push_front_all(requeued.iter().copied());

        for member in closed {
            self.release(member.pr, member.bug).await?;
        }
        for member in &attempt.members {
            self.persist(member.pr).await?;
        }
        Ok(())
    }

    /// Abandons an attempt that never got a run id and starts over.
    pub(super) async fn reissue_attempt(&mut self) -> Result<()> {
        self.requeue_members().await?;
        self.maybe_start_attempt().await
    }

    // ─── Side Effect Helpers ──────────────────────────────────────────────────

    /// Posts `body` on the bug unless an identical comment is already there.
    async fn comment_once(&self, bug: BugId, body: &str) -> Result<()> {
        let existing = self.ctx.bugs.list_comments(bug).await?;
        if existing.iter().any(|c| c == body) {
            debug!(%bug, "Comment already present, skipping");
            return Ok(());
        }
        self.ctx.bugs.post_comment(bug, body).await?;
        Ok(())
    }

    /// Sets a status on the current head of a member's source branch.
    async fn set_member_status(
        &self,
        member: &AttemptMember,
        state: CommitState,
        description: &str,
    ) -> Result<()> {
        let Some(sha) = self.ctx.scm.branch_head(&member.source_branch).await? else {
            debug!(branch = %member.source_branch, "Source branch gone, skipping status");
            return Ok(());
        };
        self.ctx
            .scm
            .set_commit_status(&sha, state, &self.ctx.settings.status_context, description)
            .await?;
        Ok(())
    }

    /// Ensures an arena record exists for an attempt member.
    ///
    /// Records are rebuilt from the attempt after a restart; both human gates
    /// were satisfied when the member joined the attempt.
    pub(super) fn restore_member(&mut self, member: &AttemptMember) {
        if self.prs.contains_key(&member.pr) {
            return;
        }
        let mut pr = PullRequest::new(
            member.pr,
            member.title.clone(),
            member.source_branch.clone(),
            self.target.clone(),
            member.bug,
        );
        pr.approved = true;
        pr.checkin_requested = true;
        pr.state = LandingState::InAttempt;
        self.ctx.index.track(member.pr, member.bug, &self.target);
        self.prs.insert(member.pr, pr);
    }
}
