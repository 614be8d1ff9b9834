//! Run lifecycle and cancellation for throughput runs

use super::ThroughputOutcome;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Lifecycle of one throughput run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunStatus {
    Running = 0,
    /// Aggregating; cancellation no longer has an effect
    Completing = 1,
    Done = 2,
    Cancelled = 3,
}

impl RunStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Completing,
            2 => Self::Done,
            _ => Self::Cancelled,
        }
    }
}

/// Cloneable handle that can cancel a run from any thread
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
    status: Arc<AtomicU8>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            status: Arc::new(AtomicU8::new(RunStatus::Running as u8)),
        }
    }

    /// Cancel a running run. Returns `false` when the run was already
    /// completing, done or cancelled; in that case nothing changes.
    pub fn cancel(&self) -> bool {
        let won = self.transition(RunStatus::Running, RunStatus::Cancelled);
        if won {
            self.token.cancel();
        }
        won
    }

    pub fn status(&self) -> RunStatus {
        RunStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn is_cancelled(&self) -> bool {
        self.status() == RunStatus::Cancelled
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Enter aggregation. Fails if the run was cancelled first.
    pub(crate) fn begin_completing(&self) -> bool {
        self.transition(RunStatus::Running, RunStatus::Completing)
    }

    pub(crate) fn mark_done(&self) {
        self.transition(RunStatus::Completing, RunStatus::Done);
    }

    fn transition(&self, from: RunStatus, to: RunStatus) -> bool {
        self.status
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Handle to a throughput run started with `ThroughputTest::start`
#[derive(Debug)]
pub struct ThroughputController {
    handle: CancelHandle,
    task: JoinHandle<Option<ThroughputOutcome>>,
}

impl ThroughputController {
    pub(crate) fn new(handle: CancelHandle, task: JoinHandle<Option<ThroughputOutcome>>) -> Self {
        Self { handle, task }
    }

    /// Stop the run. In-flight transfers are aborted and no further
    /// callbacks fire. See [`CancelHandle::cancel`].
    pub fn cancel(&self) -> bool {
        self.handle.cancel()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.handle.clone()
    }

    pub fn status(&self) -> RunStatus {
        self.handle.status()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the run. `None` when it was cancelled.
    pub async fn wait(self) -> Option<ThroughputOutcome> {
        self.task.await.unwrap_or_default()
    }
}
