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

use std::sync::Arc;

use parking_lot::Mutex;
use snafu::{IntoError, OptionExt, ensure};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    config::TransferConfig,
    error::{
        ConnectSnafu, InvalidRequestSnafu, NoRuntimeSnafu, Result, TransferError,
        TransferInProgressSnafu,
    },
    event::{EventChannel, TransferObserver},
    id::{ObserverId, TransferId, WorkerId},
    metrics::{TRANSFER_CONNECT_ERRORS, TRANSFER_FINISHED, TRANSFER_STARTED},
    provider::StreamProvider,
    request::TransferRequest,
    session::{PercentComplete, TransferSession, TransferState, WorkerSlot},
    worker::TransferWorker,
};

/// Final state of a transfer as seen by [`TransferController::wait`].
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub id:             TransferId,
    pub state:          TransferState,
    pub bytes_received: u64,
    pub error:          Option<Arc<TransferError>>,
}

impl TransferOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool { self.state == TransferState::Done }
}

/// Public façade of the engine.
///
/// A controller drives one transfer at a time. [`start`](Self::start)
/// connects, opens the destination and hands both to a background worker;
/// every other operation is synchronous, never blocks on I/O, and reports
/// success as a `bool` instead of failing.
pub struct TransferController {
    provider: Arc<dyn StreamProvider>,
    config:   TransferConfig,
    channel:  Arc<EventChannel>,
    session:  Mutex<TransferSession>,
}

impl TransferController {
    pub fn new(provider: impl StreamProvider + 'static, config: TransferConfig) -> Self {
        Self::with_provider(Arc::new(provider), config)
    }

    pub fn with_provider(provider: Arc<dyn StreamProvider>, config: TransferConfig) -> Self {
        Self {
            provider,
            config,
            channel: Arc::new(EventChannel::new()),
            session: Mutex::new(TransferSession::new("")),
        }
    }

    /// Starts retrieving `request.locator` into `request.destination`.
    ///
    /// Returns once the worker is spawned. Errors returned here mean no
    /// worker was started; for connect and sink-open failures the request
    /// observer has already received its Done event. Dropping the returned
    /// future before it resolves ends the session as cancelled.
    pub async fn start(&self, request: TransferRequest) -> Result<TransferSession> {
        ensure!(
            self.config.buffer_size > 0,
            InvalidRequestSnafu {
                reason: "buffer size must be greater than zero",
            }
        );
        let runtime = match &self.config.runtime {
            Some(handle) => handle.clone(),
            None => Handle::try_current().ok().context(NoRuntimeSnafu)?,
        };
        let request = request.validate()?;

        let session = {
            let mut current = self.session.lock();
            ensure!(
                !current.is_occupied(),
                TransferInProgressSnafu {
                    locator: current.locator(),
                }
            );
            let session = TransferSession::new(request.locator.as_str());
            session.begin_connecting(self.channel.subscribe(request.observer));
            *current = session.clone();
            session
        };
        info!(transfer = %session.id(), locator = session.locator(), "Connecting");
        let pending = PendingStart {
            controller: self,
            session:    Some(session.clone()),
        };

        let opened = match self.provider.open(&request.locator, &request.options).await {
            Ok(opened) => opened,
            Err(source) => {
                TRANSFER_CONNECT_ERRORS.inc();
                let err = ConnectSnafu {
                    locator: request.locator.as_str(),
                }
                .into_error(source);
                return Err(pending.fail(err));
            }
        };
        session.stream_opened(opened.length, opened.resolved_locator.clone());

        let sink = match request.destination.open().await {
            Ok(sink) => sink,
            Err(source) => {
                drop(opened);
                let err = TransferError::Io {
                    source: Arc::new(source),
                };
                return Err(pending.fail(err));
            }
        };
        pending.disarm();

        let cancel = CancellationToken::new();
        session.attach_worker(WorkerSlot {
            id:     WorkerId::new(),
            cancel: cancel.clone(),
        });
        self.channel.fire_start(&session);

        let worker = TransferWorker::new(
            session.clone(),
            self.channel.clone(),
            opened.reader,
            sink,
            cancel,
            self.config.buffer_size,
        );
        runtime.spawn(worker.run());
        TRANSFER_STARTED.inc();
        info!(
            transfer = %session.id(),
            worker = ?session.worker_id(),
            total_length = ?session.total_length(),
            "Transfer started"
        );

        Ok(session)
    }

    /// Terminates a session that never got a worker and delivers its Done
    /// event.
    fn abort(&self, session: &TransferSession, err: TransferError) -> TransferError {
        warn!(transfer = %session.id(), error = %err, "Transfer failed before start");
        let terminal = session.finish(Some(err.clone()));
        let outcome: &'static str = terminal.state.into();
        TRANSFER_FINISHED.with_label_values(&[outcome]).inc();

        self.channel.fire_done(session, Some(&err));
        if let Some(observer) = terminal.request_observer {
            self.channel.unsubscribe(observer);
        }
        session.mark_finished();
        err
    }

    /// Requests cooperative cancellation. Idempotent; returns `false` when no
    /// worker is running.
    pub fn cancel(&self) -> bool {
        let session = self.session();
        let cancelled = session.cancel();
        if cancelled {
            info!(transfer = %session.id(), "Cancellation requested");
        }
        cancelled
    }

    /// Parks the worker without releasing the stream or the sink. Only valid
    /// while transferring.
    pub fn pause(&self) -> bool {
        let session = self.session();
        let paused = session.pause();
        if paused {
            info!(transfer = %session.id(), bytes = session.bytes_received(), "Transfer paused");
        }
        paused
    }

    /// Wakes a paused worker. Only valid while paused.
    pub fn resume(&self) -> bool {
        let session = self.session();
        let resumed = session.resume();
        if resumed {
            info!(transfer = %session.id(), bytes = session.bytes_received(), "Transfer resumed");
        }
        resumed
    }

    #[must_use]
    pub fn is_done(&self) -> bool { self.session().is_done() }

    #[must_use]
    pub fn is_paused(&self) -> bool { self.session().is_paused() }

    #[must_use]
    pub fn state(&self) -> TransferState { self.session().state() }

    #[must_use]
    pub fn bytes_received(&self) -> u64 { self.session().bytes_received() }

    #[must_use]
    pub fn percent_complete(&self) -> PercentComplete { self.session().percent_complete() }

    /// Handle to the current (or most recent) session.
    #[must_use]
    pub fn session(&self) -> TransferSession { self.session.lock().clone() }

    /// Registers an observer for every subsequent event of this controller.
    pub fn subscribe(&self, observer: Arc<dyn TransferObserver>) -> ObserverId {
        self.channel.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool { self.channel.unsubscribe(id) }

    /// Resolves after the Done event of the current session was delivered.
    /// Returns immediately if nothing was ever started.
    pub async fn wait(&self) -> TransferOutcome {
        let session = self.session();
        if session.state() != TransferState::NotStarted {
            session.wait_finished().await;
        }
        TransferOutcome {
            id:             session.id(),
            state:          session.state(),
            bytes_received: session.bytes_received(),
            error:          session.last_error(),
        }
    }
}

/// Connect phase of [`TransferController::start`]. Aborts the session as
/// cancelled when dropped armed, i.e. when the caller gave up on `start`
/// before a worker took over.
struct PendingStart<'a> {
    controller: &'a TransferController,
    session:    Option<TransferSession>,
}

impl PendingStart<'_> {
    fn fail(mut self, err: TransferError) -> TransferError {
        match self.session.take() {
            Some(session) => self.controller.abort(&session, err),
            None => err,
        }
    }

    fn disarm(mut self) { self.session = None; }
}

impl Drop for PendingStart<'_> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            info!(transfer = %session.id(), "Start abandoned while connecting");
            self.controller.abort(&session, TransferError::UserCancelled);
        }
    }
}

impl std::fmt::Debug for TransferController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferController")
            .field("config", &self.config)
            .field("channel", &self.channel)
            .field("session", &self.session())
            .finish_non_exhaustive()
    }
}
