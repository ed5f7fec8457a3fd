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

//! Background read → write → notify loop of one transfer.

use std::sync::Arc;

use snafu::{ResultExt, ensure};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{
    error::{IoSnafu, LengthExceededSnafu, Result, TransferError, UserCancelledSnafu},
    event::EventChannel,
    metrics::{CLEANUP_FAULTS, TRANSFER_ACTIVE, TRANSFER_BYTES, TRANSFER_FINISHED},
    provider::{RemoteStream, Sink},
    session::TransferSession,
};

/// Owns the remote stream and the sink of a running transfer.
///
/// Nothing else touches either once the worker is built. Both are released
/// exactly once, on every exit path, before the Done event is emitted.
pub(crate) struct TransferWorker {
    session:     TransferSession,
    channel:     Arc<EventChannel>,
    reader:      RemoteStream,
    sink:        Box<dyn Sink>,
    owns_sink:   bool,
    cancel:      CancellationToken,
    buffer_size: usize,
}

impl TransferWorker {
    pub(crate) fn new(
        session: TransferSession,
        channel: Arc<EventChannel>,
        reader: RemoteStream,
        (sink, owns_sink): (Box<dyn Sink>, bool),
        cancel: CancellationToken,
        buffer_size: usize,
    ) -> Self {
        Self {
            session,
            channel,
            reader,
            sink,
            owns_sink,
            cancel,
            buffer_size,
        }
    }

    pub(crate) async fn run(mut self) {
        let id = self.session.id();
        info!(transfer = %id, locator = self.session.locator(), "Transfer worker starting");
        TRANSFER_ACTIVE.inc();

        let result = self.pump().await;
        self.finish(result).await;

        TRANSFER_ACTIVE.dec();
    }

    async fn pump(&mut self) -> Result<()> {
        let mut buf = vec![0u8; self.buffer_size];
        let expected = self.session.total_length();

        loop {
            ensure!(!self.cancel.is_cancelled(), UserCancelledSnafu);
            ensure!(
                self.session.wait_while_paused(&self.cancel).await,
                UserCancelledSnafu
            );

            let read = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return UserCancelledSnafu.fail(),
                read = self.reader.read(&mut buf) => read.context(IoSnafu)?,
            };

            if read == 0 {
                // End of stream seen while pausing completes only on resume.
                ensure!(
                    self.session.wait_while_paused(&self.cancel).await,
                    UserCancelledSnafu
                );
                let received = self.session.bytes_received();
                if let Some(expected) = expected.filter(|expected| *expected != received) {
                    warn!(
                        transfer = %self.session.id(),
                        expected,
                        received,
                        "Stream ended before the advertised length"
                    );
                }
                return Ok(());
            }

            // A chunk read before a pause took effect is held until resume.
            ensure!(
                self.session.wait_while_paused(&self.cancel).await,
                UserCancelledSnafu
            );

            let chunk = read as u64;
            if let Some(expected) = expected {
                let received = self.session.bytes_received() + chunk;
                ensure!(
                    received <= expected,
                    LengthExceededSnafu { expected, received }
                );
            }

            self.sink.write(&buf[..read]).await.context(IoSnafu)?;
            let cumulative = self.session.advance(chunk);
            TRANSFER_BYTES.inc_by(chunk);
            trace!(transfer = %self.session.id(), chunk, cumulative, "Chunk written");
            self.channel.fire_data(&self.session, cumulative);
        }
    }

    async fn finish(self, result: Result<()>) {
        let Self {
            session,
            channel,
            reader,
            mut sink,
            owns_sink,
            ..
        } = self;
        let id = session.id();

        let worker = session.retire_worker();
        drop(reader);
        Self::release_sink(&session, sink.as_mut(), owns_sink).await;
        drop(sink);

        let terminal = session.finish(result.err());
        let outcome: &'static str = terminal.state.into();
        TRANSFER_FINISHED.with_label_values(&[outcome]).inc();
        match terminal.error.as_deref() {
            None => info!(
                transfer = %id,
                bytes = session.bytes_received(),
                "Transfer completed"
            ),
            Some(err) if err.is_cancelled() => info!(
                transfer = %id,
                bytes = session.bytes_received(),
                error = %err,
                "Transfer cancelled"
            ),
            Some(err) => warn!(
                transfer = %id,
                bytes = session.bytes_received(),
                error = %err,
                "Transfer failed"
            ),
        }

        channel.fire_done(&session, terminal.error.as_deref());
        if let Some(observer) = terminal.request_observer {
            channel.unsubscribe(observer);
        }
        session.mark_finished();
        debug!(transfer = %id, worker = ?worker, "Transfer worker released");
    }

    /// Close failures are logged and counted, never escalated, so they cannot
    /// mask the terminal error.
    async fn release_sink(session: &TransferSession, sink: &mut dyn Sink, owns_sink: bool) {
        let (resource, result) = if owns_sink {
            ("sink", sink.close().await)
        } else {
            ("shared sink", sink.flush().await)
        };
        if let Err(source) = result {
            let fault = TransferError::CleanupFault {
                resource,
                source: Arc::new(source),
            };
            warn!(transfer = %session.id(), error = %fault, "Ignoring cleanup fault");
            CLEANUP_FAULTS.inc();
        }
    }
}
