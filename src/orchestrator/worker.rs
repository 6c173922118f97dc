//! Per-branch worker task.
//!
//! Each target branch gets one task that owns its [`BranchCoordinator`] and
//! processes messages serially. Branches progress independently.

use std::collections::VecDeque;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::PollConfig;
use crate::collab::{BugTracker, SourceControl, TaskRunner};
use crate::landing::{BranchCoordinator, BranchEvent, BranchView, LandingError};
use crate::table::TableStore;

/// Messages that can be sent to a branch worker.
#[derive(Debug)]
pub enum WorkerMessage {
    Event(BranchEvent),

    /// Reply with a snapshot of the coordinator.
    Inspect(oneshot::Sender<BranchView>),

    /// Finish the current message and exit.
    Shutdown,
}

pub struct BranchWorker<S, B, R, T> {
    coordinator: BranchCoordinator<S, B, R, T>,
    poll: PollConfig,
    recovered: bool,
    /// Events that failed on an operational error, replayed on the next tick.
    deferred: VecDeque<BranchEvent>,
}

impl<S, B, R, T> BranchWorker<S, B, R, T>
where
    S: SourceControl,
    B: BugTracker,
    R: TaskRunner,
    T: TableStore,
{
    pub fn new(coordinator: BranchCoordinator<S, B, R, T>, poll: PollConfig) -> Self {
        BranchWorker {
            coordinator,
            poll,
            recovered: false,
            deferred: VecDeque::new(),
        }
    }

    /// Runs the event loop until shutdown.
    ///
    /// Recovery of the persisted attempt happens before the first message is
    /// processed, and is retried on each tick until it succeeds.
    #[instrument(skip_all, fields(branch = %self.coordinator.target()))]
    pub async fn run(mut self, mut rx: mpsc::Receiver<WorkerMessage>, shutdown: CancellationToken) {
        info!("Branch worker started");
        self.try_recover().await;

        let interval = self.poll.poll_interval_with_jitter(self.coordinator.target());
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received, stopping worker");
                    break;
                }

                msg = rx.recv() => {
                    match msg {
                        Some(WorkerMessage::Shutdown) => {
                            info!("Shutdown message received");
                            break;
                        }
                        Some(WorkerMessage::Event(event)) => {
                            if !self.recovered {
                                self.try_recover().await;
                            }
                            if self.recovered {
                                self.handle(event).await;
                            } else if !self.deferred.contains(&event) {
                                // Handling before recovery could start a second attempt.
                                self.deferred.push_back(event);
                            }
                        }
                        Some(WorkerMessage::Inspect(reply)) => {
                            let _ = reply.send(self.coordinator.view());
                        }
                        None => {
                            info!("Message channel closed");
                            break;
                        }
                    }
                }

                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    async fn try_recover(&mut self) {
        match self.coordinator.recover().await {
            Ok(()) => self.recovered = true,
            Err(e) => error!(error = %e, "Recovery failed, retrying on next poll"),
        }
    }

    async fn tick(&mut self) {
        if !self.recovered {
            self.try_recover().await;
            if !self.recovered {
                return;
            }
        }

        let deferred = std::mem::take(&mut self.deferred);
        if !deferred.is_empty() {
            debug!(count = deferred.len(), "Replaying deferred events");
        }
        for event in deferred {
            self.handle(event).await;
        }
        self.handle(BranchEvent::Poll).await;
    }

    async fn handle(&mut self, event: BranchEvent) {
        match self.coordinator.handle(event.clone()).await {
            Ok(()) => {}
            Err(e) => self.report(event, e),
        }
    }

    fn report(&mut self, event: BranchEvent, e: LandingError) {
        if !e.is_retriable() {
            error!(error = %e, ?event, "Event failed");
            return;
        }
        warn!(error = %e, ?event, "Event failed on an unavailable collaborator, will retry");
        if event != BranchEvent::Poll && !self.deferred.contains(&event) {
            self.deferred.push_back(event);
        }
    }
}
