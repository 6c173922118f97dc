//! Event dispatch layer routing events to per-branch workers.
//!
//! ```text
//! ┌─────────────┐     ┌────────────┐     ┌──────────────────┐
//! │   axum      │ ──► │  dispatch  │ ──► │ worker (master)  │
//! │  /events    │     │ by branch  │     └──────────────────┘
//! └─────────────┘     │            │     ┌──────────────────┐
//!                     │ bug: index │ ──► │ worker (v2.2)    │
//!                     │ run: all   │     └──────────────────┘
//!                     └────────────┘
//! ```
//!
//! Pull request events name their target branch. Bug updates are dropped
//! unless the bug is subscribed, then fanned out to every branch with a
//! tracked pull request for it. Run completions go to every worker; each
//! ignores runs it does not own.
//!
//! Workers are created lazily on the first event for a branch, and eagerly
//! for every branch with persisted state by [`Dispatcher::recover_all`].

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace};

use super::{BranchWorker, LandingEvent, PollConfig, WorkerMessage};
use crate::collab::{BugTracker, SourceControl, TaskRunner};
use crate::landing::{BranchCoordinator, BranchEvent, BranchView, LandingContext};
use crate::store::StoreError;
use crate::table::TableStore;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to send message to worker: channel closed")]
    ChannelClosed,

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, DispatchError>;

/// Channel buffer size for worker messages.
const WORKER_CHANNEL_BUFFER: usize = 100;

struct WorkerHandle {
    tx: mpsc::Sender<WorkerMessage>,

    #[allow(dead_code)]
    task: JoinHandle<()>,

    cancel: CancellationToken,
}

pub struct Dispatcher<S, B, R, T> {
    ctx: Arc<LandingContext<S, B, R, T>>,
    poll: PollConfig,
    workers: RwLock<HashMap<String, WorkerHandle>>,
    shutdown: CancellationToken,
}

impl<S, B, R, T> Dispatcher<S, B, R, T>
where
    S: SourceControl + 'static,
    B: BugTracker + 'static,
    R: TaskRunner + 'static,
    T: TableStore + 'static,
{
    pub fn new(ctx: Arc<LandingContext<S, B, R, T>>, poll: PollConfig) -> Self {
        Self::new_with_shutdown(ctx, poll, CancellationToken::new())
    }

    pub fn new_with_shutdown(
        ctx: Arc<LandingContext<S, B, R, T>>,
        poll: PollConfig,
        shutdown: CancellationToken,
    ) -> Self {
        info!(poll_interval = ?poll.poll_interval, "Creating dispatcher");
        Dispatcher {
            ctx,
            poll,
            workers: RwLock::new(HashMap::new()),
            shutdown,
        }
    }

    pub fn context(&self) -> &Arc<LandingContext<S, B, R, T>> {
        &self.ctx
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Starts a worker for every branch with a persisted attempt or tracked
    /// pull request.
    ///
    /// The index is rebuilt before any worker starts so that bug updates
    /// arriving during recovery reach their branches. Returns the number of
    /// branches being recovered.
    #[instrument(skip(self))]
    pub async fn recover_all(&self) -> Result<usize> {
        let attempts = self.ctx.attempts.list_all().await?;
        let tracked = self.ctx.pull_requests.list_all().await?;

        let mut branches = BTreeSet::new();
        for pr in &tracked {
            self.ctx.index.track(pr.number, pr.bug, &pr.target_branch);
            branches.insert(pr.target_branch.clone());
        }
        branches.extend(attempts.into_iter().map(|a| a.target_branch));

        for branch in &branches {
            self.get_or_spawn_worker(branch).await;
        }
        info!(
            branches = branches.len(),
            pull_requests = tracked.len(),
            "Recovering persisted branches"
        );
        Ok(branches.len())
    }

    /// Routes an event. Returns the number of workers it was delivered to.
    #[instrument(skip(self, event), fields(kind = event.kind()))]
    pub async fn dispatch(&self, event: LandingEvent) -> Result<usize> {
        match event {
            LandingEvent::PullRequestOpened { .. } | LandingEvent::PullRequestClosed { .. } => {
                let branch = event.target_branch().unwrap_or_default().to_string();
                let tx = self.get_or_spawn_worker(&branch).await;
                send(&tx, WorkerMessage::Event(event.into_branch_event())).await?;
                Ok(1)
            }
            LandingEvent::BugUpdated { bug } => {
                if !self.ctx.subscriptions.is_subscribed(bug).await? {
                    debug!(%bug, "Ignoring update for unsubscribed bug");
                    return Ok(0);
                }
                let branches = self.ctx.index.branches_for_bug(bug);
                let workers = self.workers.read().await;
                let mut delivered = 0;
                for branch in branches {
                    if let Some(handle) = workers.get(&branch) {
                        send(&handle.tx, WorkerMessage::Event(BranchEvent::BugChanged { bug }))
                            .await?;
                        delivered += 1;
                    }
                }
                Ok(delivered)
            }
            LandingEvent::RunCompleted { run_id } => {
                let workers = self.workers.read().await;
                for (branch, handle) in workers.iter() {
                    trace!(%branch, %run_id, "Forwarding run completion");
                    send(
                        &handle.tx,
                        WorkerMessage::Event(BranchEvent::RunCompleted {
                            run_id: run_id.clone(),
                        }),
                    )
                    .await?;
                }
                Ok(workers.len())
            }
        }
    }

    /// Returns a snapshot of a branch, or `None` if no worker runs for it.
    pub async fn inspect(&self, branch: &str) -> Result<Option<BranchView>> {
        let tx = {
            let workers = self.workers.read().await;
            match workers.get(branch) {
                Some(handle) => handle.tx.clone(),
                None => return Ok(None),
            }
        };
        let (reply, rx) = oneshot::channel();
        send(&tx, WorkerMessage::Inspect(reply)).await?;
        rx.await.map(Some).map_err(|_| DispatchError::ChannelClosed)
    }

    /// Asks every worker to poll its running attempt now.
    pub async fn broadcast_poll(&self) {
        let workers = self.workers.read().await;
        for (branch, handle) in workers.iter() {
            trace!(%branch, "Broadcasting poll to worker");
            let _ = handle.tx.send(WorkerMessage::Event(BranchEvent::Poll)).await;
        }
    }

    async fn get_or_spawn_worker(&self, branch: &str) -> mpsc::Sender<WorkerMessage> {
        {
            let workers = self.workers.read().await;
            if let Some(handle) = workers.get(branch) {
                return handle.tx.clone();
            }
        }

        let mut workers = self.workers.write().await;
        if let Some(handle) = workers.get(branch) {
            return handle.tx.clone();
        }

        debug!(%branch, "Spawning new branch worker");
        let coordinator = BranchCoordinator::new(branch, Arc::clone(&self.ctx));
        let worker = BranchWorker::new(coordinator, self.poll.clone());

        // The task and the handle share one token so remove_worker cancels the right task.
        let (tx, rx) = mpsc::channel(WORKER_CHANNEL_BUFFER);
        let cancel = self.shutdown.child_token();
        let task = tokio::spawn(worker.run(rx, cancel.clone()));

        workers.insert(
            branch.to_string(),
            WorkerHandle {
                tx: tx.clone(),
                task,
                cancel,
            },
        );
        tx
    }

    pub async fn worker_count(&self) -> usize {
        self.workers.read().await.len()
    }

    pub async fn has_worker(&self, branch: &str) -> bool {
        self.workers.read().await.contains_key(branch)
    }

    /// Stops and forgets the worker for a branch.
    pub async fn remove_worker(&self, branch: &str) -> bool {
        let mut workers = self.workers.write().await;
        match workers.remove(branch) {
            Some(handle) => {
                handle.cancel.cancel();
                let _ = handle.tx.send(WorkerMessage::Shutdown).await;
                true
            }
            None => false,
        }
    }

    pub async fn shutdown_all(&self) {
        info!("Shutting down all workers");
        self.shutdown.cancel();

        let workers = self.workers.read().await;
        for (branch, handle) in workers.iter() {
            trace!(%branch, "Sending shutdown to worker");
            let _ = handle.tx.send(WorkerMessage::Shutdown).await;
        }
    }
}

async fn send(tx: &mpsc::Sender<WorkerMessage>, msg: WorkerMessage) -> Result<()> {
    tx.send(msg).await.map_err(|_| DispatchError::ChannelClosed)
}
