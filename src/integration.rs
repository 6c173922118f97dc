//! Management of the per-target integration branch.
//!
//! The integration branch starts at the target's head, receives one merge
//! commit per attempt member, and is deleted once the attempt resolves so
//! that the next attempt starts from the fresh target head.

use tracing::{debug, info, instrument};

use crate::collab::{ScmError, SourceControl};
use crate::types::{Sha, integration_ref_for};

pub struct IntegrationBranchManager<'a, S> {
    scm: &'a S,
}

impl<'a, S: SourceControl> IntegrationBranchManager<'a, S> {
    pub fn new(scm: &'a S) -> Self {
        IntegrationBranchManager { scm }
    }

    /// Creates the integration branch from the target head if absent.
    ///
    /// Returns the integration ref name and its current head.
    #[instrument(skip(self))]
    pub async fn ensure_integration_branch(&self, target: &str) -> Result<(String, Sha), ScmError> {
        let integration_ref = integration_ref_for(target);

        if let Some(head) = self.scm.branch_head(&integration_ref).await? {
            debug!(%integration_ref, head = %head.short(), "Integration branch already exists");
            return Ok((integration_ref, head));
        }

        let target_head = self
            .scm
            .branch_head(target)
            .await?
            .ok_or_else(|| ScmError::NotFound(format!("branch {}", target)))?;

        self.scm.create_branch(&integration_ref, &target_head).await?;
        info!(%integration_ref, head = %target_head.short(), "Created integration branch");
        Ok((integration_ref, target_head))
    }

    /// Merges `pr_branch` onto the integration ref with a distinct merge commit.
    ///
    /// Conflicts surface as [`ScmError::MergeConflict`] and are not retried.
    #[instrument(skip(self))]
    pub async fn merge_onto(&self, integration_ref: &str, pr_branch: &str) -> Result<Sha, ScmError> {
        let message = format!("Merge branch '{}' into {}", pr_branch, integration_ref);
        let head = self.scm.merge(integration_ref, pr_branch, &message).await?;
        debug!(head = %head.short(), "Merged onto integration branch");
        Ok(head)
    }

    /// Advances `target` to the integration head.
    ///
    /// A target already at `head` is left alone. A target that is not an
    /// ancestor of `head` fails with [`ScmError::NonFastForward`].
    #[instrument(skip(self))]
    pub async fn fast_forward(&self, target: &str, head: &Sha) -> Result<(), ScmError> {
        let target_head = self
            .scm
            .branch_head(target)
            .await?
            .ok_or_else(|| ScmError::NotFound(format!("branch {}", target)))?;

        if &target_head == head {
            debug!("Target already at integration head");
            return Ok(());
        }

        if !self.scm.is_ancestor(&target_head, head).await? {
            return Err(ScmError::NonFastForward {
                branch: target.to_string(),
                sha: head.to_string(),
            });
        }

        self.scm.fast_forward(target, head).await?;
        info!(head = %head.short(), "Fast-forwarded target branch");
        Ok(())
    }

    /// Deletes the integration branch. Deleting an absent branch succeeds.
    #[instrument(skip(self))]
    pub async fn delete_integration_branch(&self, integration_ref: &str) -> Result<(), ScmError> {
        match self.scm.delete_branch(integration_ref).await {
            Ok(()) => {
                debug!("Deleted integration branch");
                Ok(())
            }
            Err(ScmError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
