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

//! Lifecycle events and the observer registry that delivers them.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{error, trace};

use crate::{
    error::{TransferError, TransferErrorKind},
    id::{ObserverId, TransferId},
    metrics::OBSERVER_PANICS,
    session::{PercentComplete, TransferSession},
};

/// Receives the lifecycle events of a transfer.
///
/// For one session the calls arrive strictly as `on_start`, then any number
/// of `on_data`, then exactly one `on_done`. A connection failure produces
/// `on_done` without a preceding `on_start`. Callbacks run on the worker
/// task, so they should return quickly.
pub trait TransferObserver: Send + Sync {
    fn on_start(&self, _session: &TransferSession) {}

    /// `bytes_received` is the cumulative count after the chunk was written.
    fn on_data(&self, _session: &TransferSession, _bytes_received: u64) {}

    /// `error` is `None` when the transfer completed.
    fn on_done(&self, _session: &TransferSession, _error: Option<&TransferError>) {}
}

/// Owned snapshot of a lifecycle event.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    Start {
        id:           TransferId,
        locator:      String,
        total_length: Option<u64>,
    },
    Data {
        id:             TransferId,
        bytes_received: u64,
        percent:        PercentComplete,
    },
    Done {
        id:             TransferId,
        bytes_received: u64,
        error:          Option<TransferErrorKind>,
    },
}

impl TransferEvent {
    #[must_use]
    pub const fn id(&self) -> TransferId {
        match self {
            Self::Start { id, .. } | Self::Data { id, .. } | Self::Done { id, .. } => *id,
        }
    }

    #[must_use]
    pub const fn is_done(&self) -> bool { matches!(self, Self::Done { .. }) }
}

/// Observer that forwards every event into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<TransferEvent>,
}

impl ChannelObserver {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransferEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: TransferEvent) {
        // A dropped receiver only means nobody listens anymore.
        let _ = self.tx.send(event);
    }
}

impl TransferObserver for ChannelObserver {
    fn on_start(&self, session: &TransferSession) {
        self.send(TransferEvent::Start {
            id:           session.id(),
            locator:      session
                .resolved_locator()
                .unwrap_or_else(|| session.locator().to_owned()),
            total_length: session.total_length(),
        });
    }

    fn on_data(&self, session: &TransferSession, bytes_received: u64) {
        self.send(TransferEvent::Data {
            id: session.id(),
            bytes_received,
            percent: PercentComplete::from_progress(bytes_received, session.total_length()),
        });
    }

    fn on_done(&self, session: &TransferSession, error: Option<&TransferError>) {
        self.send(TransferEvent::Done {
            id:             session.id(),
            bytes_received: session.bytes_received(),
            error:          error.map(TransferError::kind),
        });
    }
}

/// Thread-safe, ordered observer registry.
///
/// Delivery works on a snapshot of the registered observers, so
/// [`subscribe`](Self::subscribe) and [`unsubscribe`](Self::unsubscribe) may be
/// called concurrently with delivery, including from inside a callback. A
/// panicking observer is logged and skipped; the others still get the event.
#[derive(Default)]
pub struct EventChannel {
    observers: RwLock<Vec<(ObserverId, Arc<dyn TransferObserver>)>>,
}

impl EventChannel {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    pub fn subscribe(&self, observer: Arc<dyn TransferObserver>) -> ObserverId {
        let id = ObserverId::next();
        self.observers.write().push((id, observer));
        id
    }

    /// Returns `false` if `id` was not registered.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(registered, _)| *registered != id);
        observers.len() != before
    }

    #[must_use]
    pub fn len(&self) -> usize { self.observers.read().len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.observers.read().is_empty() }

    pub(crate) fn fire_start(&self, session: &TransferSession) {
        self.deliver(session, "on_start", |observer| observer.on_start(session));
    }

    pub(crate) fn fire_data(&self, session: &TransferSession, bytes_received: u64) {
        self.deliver(session, "on_data", |observer| {
            observer.on_data(session, bytes_received);
        });
    }

    pub(crate) fn fire_done(&self, session: &TransferSession, error: Option<&TransferError>) {
        self.deliver(session, "on_done", |observer| observer.on_done(session, error));
    }

    fn deliver<F>(&self, session: &TransferSession, callback: &'static str, f: F)
    where
        F: Fn(&dyn TransferObserver),
    {
        let snapshot: Vec<_> = self.observers.read().clone();
        trace!(transfer = %session.id(), callback, observers = snapshot.len(), "Delivering event");
        for (id, observer) in snapshot {
            if panic::catch_unwind(AssertUnwindSafe(|| f(observer.as_ref()))).is_err() {
                error!(
                    transfer = %session.id(),
                    observer = %id,
                    callback,
                    "Observer panicked while handling event"
                );
                OBSERVER_PANICS.inc();
            }
        }
    }
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("observers", &self.len())
            .finish()
    }
}
