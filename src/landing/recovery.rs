//! Resuming a branch after a restart.
//!
//! The pull request store holds every tracked record of the branch and the
//! attempt store its in-flight attempt. Together they rebuild the arena, the
//! queue and this branch's share of the cross-branch index.

use std::collections::BTreeSet;

use tracing::{debug, info, instrument, warn};

use super::{BranchCoordinator, Result};
use crate::collab::{BugTracker, SourceControl, TaskRunner};
use crate::table::TableStore;
use crate::types::{AttemptOutcome, LandingState, PrNumber};

impl<S, B, R, T> BranchCoordinator<S, B, R, T>
where
    S: SourceControl,
    B: BugTracker,
    R: TaskRunner,
    T: TableStore,
{
    /// Restores the tracked pull requests and the persisted attempt for this
    /// branch, then drives the attempt forward.
    ///
    /// A run that was pending at shutdown is marked
    /// [`AttemptOutcome::UnknownAfterRestart`] until the next poll resolves
    /// it. Post-processing of a resolved attempt resumes where it stopped:
    /// members already finalized are skipped.
    #[instrument(skip(self), fields(branch = %self.target))]
    pub async fn recover(&mut self) -> Result<()> {
        self.restore_tracked().await?;

        let attempt = self.ctx.attempts.load(&self.target).await?;
        let members: BTreeSet<PrNumber> = attempt
            .iter()
            .flat_map(|a| a.unfinalized().map(|m| m.pr))
            .collect();
        self.settle_orphans(&members).await?;

        let Some(attempt) = attempt else {
            return self.maybe_start_attempt().await;
        };

        info!(
            members = ?attempt.member_prs().collect::<Vec<_>>(),
            outcome = ?attempt.outcome,
            "Recovering integration attempt"
        );

        // Finalized members were already released before the restart.
        for member in attempt.unfinalized() {
            self.queue.remove(member.pr);
            self.restore_member(member);
            if let Some(record) = self.prs.get_mut(&member.pr) {
                record.state = LandingState::InAttempt;
            }
        }

        let outcome = attempt.outcome.clone();
        let has_run = attempt.run_id.is_some();
        self.attempt = Some(attempt);

        match outcome {
            AttemptOutcome::Pending | AttemptOutcome::UnknownAfterRestart if has_run => {
                self.update_attempt(|a| a.outcome = AttemptOutcome::UnknownAfterRestart)
                    .await?;
                self.advance_attempt().await?;
            }
            AttemptOutcome::Pending | AttemptOutcome::UnknownAfterRestart => {
                warn!("Attempt was interrupted before its run was submitted");
                self.reissue_attempt().await?;
            }
            AttemptOutcome::Success | AttemptOutcome::Failure { .. } => {
                self.finish_attempt().await?;
            }
        }

        self.maybe_start_attempt().await
    }

    /// Loads the stored records into the arena and the index, and queues the
    /// ones waiting to land in the order they were queued.
    async fn restore_tracked(&mut self) -> Result<()> {
        let records = self.ctx.pull_requests.list_branch(&self.target).await?;
        let mut waiting = Vec::new();
        for record in records {
            self.ctx.index.track(record.number, record.bug, &self.target);
            if matches!(record.state, LandingState::Queued | LandingState::InAttempt) {
                waiting.push((record.queued_at, record.number));
            }
            self.prs.insert(record.number, record);
        }

        waiting.sort();
        for (_, number) in &waiting {
            self.queue.push_back(*number);
        }
        info!(
            tracked = self.prs.len(),
            queued = waiting.len(),
            "Restored tracked pull requests"
        );
        Ok(())
    }

    /// Records left `InAttempt` by an attempt that no longer exists go back
    /// to `Queued`, or are abandoned if closed meanwhile.
    async fn settle_orphans(&mut self, members: &BTreeSet<PrNumber>) -> Result<()> {
        let orphans: Vec<(PrNumber, bool)> = self
            .prs
            .values()
            .filter(|pr| pr.state == LandingState::InAttempt && !members.contains(&pr.number))
            .map(|pr| (pr.number, pr.open))
            .collect();

        for (number, open) in orphans {
            debug!(pr = %number, open, "Pull request outlived its attempt");
            let Some(record) = self.prs.get_mut(&number) else {
                continue;
            };
            record.state = LandingState::Queued;
            let bug = record.bug;
            if !open {
                self.queue.remove(number);
                self.transition(number, LandingState::Abandoned);
                self.release(number, bug).await?;
            }
            self.persist(number).await?;
        }
        Ok(())
    }
}
