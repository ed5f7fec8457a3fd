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

//! Asynchronous file-retrieval engine.
//!
//! A [`TransferController`] streams bytes from a [`StreamProvider`] into a
//! [`Sink`] on a background tokio task, while callers on any thread can
//! cancel, pause, resume and query progress without blocking:
//!
//! - **Cooperative cancellation**: checked on every loop iteration and raced
//!   against in-flight reads
//! - **Pause/Resume**: the worker parks on a notification; nothing is closed
//! - **Lifecycle events**: Start, Data*, then exactly one Done per transfer,
//!   delivered to every registered [`TransferObserver`]
//! - **Exactly-once cleanup**: the stream and sink are owned by the worker
//!   and released before Done fires
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use retrieve_transfer::{
//!     ChannelObserver, Destination, FileStreamProvider, TransferConfig, TransferController,
//!     TransferRequest,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), retrieve_transfer::TransferError> {
//!     let controller = TransferController::new(FileStreamProvider, TransferConfig::default());
//!     let (observer, mut events) = ChannelObserver::new();
//!
//!     let request = TransferRequest::builder()
//!         .locator("file:///var/data/input.bin")
//!         .destination(Destination::path("/tmp/output.bin"))
//!         .observer(Arc::new(observer))
//!         .build();
//!     controller.start(request).await?;
//!
//!     controller.pause();
//!     controller.resume();
//!
//!     while let Some(event) = events.recv().await {
//!         println!("{event:?}");
//!         if event.is_done() {
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

mod config;
mod controller;
mod error;
mod event;
mod id;
mod metrics;
mod provider;
mod request;
mod session;
mod worker;

pub use config::{DEFAULT_BUFFER_SIZE, TransferConfig};
pub use controller::{TransferController, TransferOutcome};
pub use error::{BoxedError, Result, TransferError, TransferErrorKind};
pub use event::{ChannelObserver, EventChannel, TransferEvent, TransferObserver};
pub use id::{ObserverId, TransferId, WorkerId};
pub use provider::{
    Destination, FileSink, FileStreamProvider, LENGTH_HINT_OPTION, OpenedStream, RemoteStream,
    Sink, StreamProvider, TransferOptions, WriterSink,
};
pub use request::TransferRequest;
pub use session::{PercentComplete, TransferSession, TransferState};
