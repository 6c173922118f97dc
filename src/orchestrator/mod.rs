//! Top-level event routing and per-branch workers.
//!
//! - [`event`]: inbound events as accepted over HTTP
//! - [`dispatch`]: routing to workers, restart bootstrap
//! - [`worker`]: the per-branch event loop
//! - [`poll`]: fallback polling cadence

mod dispatch;
mod event;
mod poll;
mod worker;

pub use dispatch::{DispatchError, Dispatcher};
pub use event::LandingEvent;
pub use poll::{DEFAULT_POLL_INTERVAL_SECS, PollConfig};
pub use worker::{BranchWorker, WorkerMessage};
