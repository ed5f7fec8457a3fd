// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Per-transfer state shared between the controller and its worker.
//!
//! The state machine, worker slot and last error sit behind a single
//! session-scoped lock so that pause, resume and cancel can never interleave
//! with a terminal transition. The byte counter is an atomic that only the
//! worker writes; readers may observe a stale but monotonic value.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;
use strum_macros::{Display, EnumString, IntoStaticStr};
use tokio::sync::{Notify, watch};
use tokio_util::sync::CancellationToken;

use crate::{
    error::TransferError,
    id::{ObserverId, TransferId, WorkerId},
    metrics::{TRANSFER_PAUSED, TRANSFER_RESUMED},
};

/// Lifecycle state of a transfer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum TransferState {
    NotStarted,
    Connecting,
    Transferring,
    Paused,
    Done,
    Cancelled,
    Failed,
}

impl TransferState {
    /// `Done`, `Cancelled` and `Failed` never transition again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled | Self::Failed)
    }
}

/// Fraction of the resource received so far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PercentComplete {
    /// Ratio in `0.0..=1.0`.
    Determinate(f64),
    /// The total length is unknown.
    Indeterminate,
}

impl PercentComplete {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_progress(bytes_received: u64, total_length: Option<u64>) -> Self {
        match total_length {
            None => Self::Indeterminate,
            Some(0) => Self::Determinate(1.0),
            Some(total) => Self::Determinate((bytes_received as f64 / total as f64).min(1.0)),
        }
    }

    #[must_use]
    pub const fn ratio(self) -> Option<f64> {
        match self {
            Self::Determinate(ratio) => Some(ratio),
            Self::Indeterminate => None,
        }
    }

    #[must_use]
    pub const fn is_indeterminate(self) -> bool { matches!(self, Self::Indeterminate) }
}

impl fmt::Display for PercentComplete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Determinate(ratio) => write!(f, "{:.1}%", ratio * 100.0),
            Self::Indeterminate => f.write_str("indeterminate"),
        }
    }
}

/// Addressing information for the live worker of a session.
#[derive(Debug, Clone)]
pub(crate) struct WorkerSlot {
    pub(crate) id:     WorkerId,
    pub(crate) cancel: CancellationToken,
}

#[derive(Debug)]
struct Control {
    state:            TransferState,
    total_length:     Option<u64>,
    resolved_locator: Option<String>,
    last_error:       Option<Arc<TransferError>>,
    worker:           Option<WorkerSlot>,
    request_observer: Option<ObserverId>,
}

#[derive(Debug)]
struct Inner {
    id:             TransferId,
    locator:        String,
    bytes_received: AtomicU64,
    control:        Mutex<Control>,
    resume:         Notify,
    finished:       watch::Sender<bool>,
}

/// Cheap, cloneable handle to the state of one transfer.
///
/// Observers receive this handle with every event and may query it; only the
/// owning controller and its worker mutate it.
#[derive(Debug, Clone)]
pub struct TransferSession {
    inner: Arc<Inner>,
}

impl TransferSession {
    pub(crate) fn new(locator: impl Into<String>) -> Self {
        let (finished, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                id: TransferId::new(),
                locator: locator.into(),
                bytes_received: AtomicU64::new(0),
                control: Mutex::new(Control {
                    state:            TransferState::NotStarted,
                    total_length:     None,
                    resolved_locator: None,
                    last_error:       None,
                    worker:           None,
                    request_observer: None,
                }),
                resume: Notify::new(),
                finished,
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> TransferId { self.inner.id }

    #[must_use]
    pub fn locator(&self) -> &str { &self.inner.locator }

    /// Locator reported by the provider once the stream is open, if it
    /// differs from the requested one (e.g. after a redirect).
    #[must_use]
    pub fn resolved_locator(&self) -> Option<String> {
        self.inner.control.lock().resolved_locator.clone()
    }

    #[must_use]
    pub fn state(&self) -> TransferState { self.inner.control.lock().state }

    #[must_use]
    pub fn is_done(&self) -> bool { self.state().is_terminal() }

    #[must_use]
    pub fn is_paused(&self) -> bool { self.state() == TransferState::Paused }

    #[must_use]
    pub fn bytes_received(&self) -> u64 { self.inner.bytes_received.load(Ordering::Acquire) }

    /// Known length of the resource, `None` when the provider could not tell.
    #[must_use]
    pub fn total_length(&self) -> Option<u64> { self.inner.control.lock().total_length }

    #[must_use]
    pub fn percent_complete(&self) -> PercentComplete {
        PercentComplete::from_progress(self.bytes_received(), self.total_length())
    }

    /// Terminal error, set only once the session is `Failed` or `Cancelled`.
    #[must_use]
    pub fn last_error(&self) -> Option<Arc<TransferError>> {
        self.inner.control.lock().last_error.clone()
    }

    /// Whether a worker is currently attached to the session.
    #[must_use]
    pub fn has_worker(&self) -> bool { self.inner.control.lock().worker.is_some() }

    pub(crate) fn worker_id(&self) -> Option<WorkerId> {
        self.inner.control.lock().worker.as_ref().map(|slot| slot.id)
    }

    // ------------------------------------------------------------------------
    // Controller-side transitions
    // ------------------------------------------------------------------------

    pub(crate) fn begin_connecting(&self, request_observer: ObserverId) {
        let mut control = self.inner.control.lock();
        control.state = TransferState::Connecting;
        control.request_observer = Some(request_observer);
    }

    pub(crate) fn stream_opened(&self, total_length: Option<u64>, resolved: Option<String>) {
        let mut control = self.inner.control.lock();
        control.total_length = total_length;
        control.resolved_locator = resolved;
    }

    /// Moves to `Transferring` and records the worker that now owns the
    /// streams.
    pub(crate) fn attach_worker(&self, slot: WorkerSlot) {
        let mut control = self.inner.control.lock();
        debug_assert!(control.worker.is_none(), "a session has one live worker");
        control.state = TransferState::Transferring;
        control.worker = Some(slot);
    }

    pub(crate) fn pause(&self) -> bool {
        let mut control = self.inner.control.lock();
        if control.state != TransferState::Transferring || control.worker.is_none() {
            return false;
        }
        control.state = TransferState::Paused;
        TRANSFER_PAUSED.inc();
        true
    }

    pub(crate) fn resume(&self) -> bool {
        let mut control = self.inner.control.lock();
        if control.state != TransferState::Paused || control.worker.is_none() {
            return false;
        }
        control.state = TransferState::Transferring;
        self.inner.resume.notify_one();
        TRANSFER_RESUMED.inc();
        true
    }

    pub(crate) fn cancel(&self) -> bool {
        let control = self.inner.control.lock();
        match &control.worker {
            Some(slot) => {
                slot.cancel.cancel();
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------------
    // Worker-side transitions
    // ------------------------------------------------------------------------

    /// Parks until the session is no longer paused. Returns `false` if the
    /// cancellation token fired while waiting.
    pub(crate) async fn wait_while_paused(&self, cancel: &CancellationToken) -> bool {
        loop {
            let resumed = self.inner.resume.notified();
            if cancel.is_cancelled() {
                return false;
            }
            if !self.is_paused() {
                return true;
            }
            tokio::select! {
                () = resumed => {}
                () = cancel.cancelled() => return false,
            }
        }
    }

    pub(crate) fn advance(&self, chunk: u64) -> u64 {
        self.inner.bytes_received.fetch_add(chunk, Ordering::AcqRel) + chunk
    }

    /// Detaches the worker so that control operations become no-ops while
    /// the worker releases its resources.
    pub(crate) fn retire_worker(&self) -> Option<WorkerId> {
        self.inner.control.lock().worker.take().map(|slot| slot.id)
    }

    /// Commits the terminal state and records the error in one critical
    /// section. Returns the observer registered by
    /// the request so the caller can drop it after Done is delivered.
    pub(crate) fn finish(&self, error: Option<TransferError>) -> Terminal {
        let mut control = self.inner.control.lock();
        let state = match &error {
            None => TransferState::Done,
            Some(err) if err.is_cancelled() => TransferState::Cancelled,
            Some(_) => TransferState::Failed,
        };
        control.state = state;
        control.last_error = error.map(Arc::new);
        control.worker = None;
        Terminal {
            state,
            error: control.last_error.clone(),
            request_observer: control.request_observer.take(),
        }
    }

    /// Wakes everyone blocked in [`Self::wait_finished`]. Called after the
    /// Done event has been delivered.
    pub(crate) fn mark_finished(&self) { self.inner.finished.send_replace(true); }

    /// Whether the Done event of this session has been delivered.
    #[must_use]
    pub fn is_finished(&self) -> bool { *self.inner.finished.borrow() }

    /// A session occupies its controller from the moment it starts
    /// connecting until its Done event was delivered.
    pub(crate) fn is_occupied(&self) -> bool {
        self.state() != TransferState::NotStarted && !self.is_finished()
    }

    /// Resolves once the Done event of this session has been delivered.
    pub async fn wait_finished(&self) {
        let mut finished = self.inner.finished.subscribe();
        let _ = finished.wait_for(|done| *done).await;
    }
}

/// Result of [`TransferSession::finish`].
#[derive(Debug)]
pub(crate) struct Terminal {
    pub(crate) state:            TransferState,
    pub(crate) error:            Option<Arc<TransferError>>,
    pub(crate) request_observer: Option<ObserverId>,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn transferring_session() -> (TransferSession, CancellationToken) {
        let session = TransferSession::new("file:///tmp/input.bin");
        session.begin_connecting(ObserverId::next());
        let cancel = CancellationToken::new();
        session.attach_worker(WorkerSlot {
            id:     WorkerId::new(),
            cancel: cancel.clone(),
        });
        (session, cancel)
    }

    #[test]
    fn test_percent_complete() {
        assert_eq!(
            PercentComplete::from_progress(50, Some(200)),
            PercentComplete::Determinate(0.25)
        );
        assert!(PercentComplete::from_progress(7000, None).is_indeterminate());
        assert_eq!(PercentComplete::from_progress(0, Some(0)).ratio(), Some(1.0));
        assert_eq!(PercentComplete::Determinate(0.5).to_string(), "50.0%");
        assert_eq!(PercentComplete::Indeterminate.to_string(), "indeterminate");
    }

    #[test]
    fn test_pause_resume_transitions() {
        let (session, _cancel) = transferring_session();

        assert!(!session.resume(), "resume on a running session is a no-op");
        assert!(session.pause());
        assert_eq!(session.state(), TransferState::Paused);
        assert!(!session.pause(), "already paused");
        assert!(session.resume());
        assert_eq!(session.state(), TransferState::Transferring);
    }

    #[test]
    fn test_control_after_terminal() {
        let (session, cancel) = transferring_session();
        let terminal = session.finish(None);
        assert_eq!(terminal.state, TransferState::Done);
        assert!(terminal.request_observer.is_some());

        assert!(session.is_done());
        assert!(!session.has_worker());
        assert!(!session.pause());
        assert!(!session.resume());
        assert!(!session.cancel());
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let (session, cancel) = transferring_session();
        assert!(session.cancel());
        assert!(session.cancel());
        assert!(cancel.is_cancelled());

        let terminal = session.finish(Some(TransferError::UserCancelled));
        assert_eq!(terminal.state, TransferState::Cancelled);
        assert!(session.last_error().is_some_and(|err| err.is_cancelled()));
    }

    #[test]
    fn test_idle_session_ignores_control() {
        let session = TransferSession::new("");
        assert_eq!(session.state(), TransferState::NotStarted);
        assert!(!session.pause());
        assert!(!session.cancel());
        assert!(!session.is_done());
        assert_eq!(session.bytes_received(), 0);
        assert!(!session.is_occupied());
    }

    #[test]
    fn test_occupied_until_done_delivered() {
        let (session, _cancel) = transferring_session();
        assert!(session.is_occupied());

        session.retire_worker();
        assert!(session.is_occupied(), "releasing resources still occupies");

        session.finish(None);
        assert!(session.is_occupied(), "Done not delivered yet");

        session.mark_finished();
        assert!(session.is_finished());
        assert!(!session.is_occupied());
    }

    #[tokio::test]
    async fn test_wait_while_paused_wakes_on_resume() {
        let (session, cancel) = transferring_session();
        assert!(session.pause());

        let waiter = {
            let session = session.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { session.wait_while_paused(&cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished(), "worker must stay parked while paused");

        assert!(session.resume());
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_while_paused_wakes_on_cancel() {
        let (session, cancel) = transferring_session();
        assert!(session.pause());

        let waiter = {
            let session = session.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { session.wait_while_paused(&cancel).await })
        };

        assert!(session.cancel());
        assert!(!waiter.await.unwrap());
    }
}
