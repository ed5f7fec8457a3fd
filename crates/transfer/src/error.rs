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

use snafu::Snafu;
use strum_macros::{Display, EnumString};

/// Boxed error returned by collaborators such as a
/// [`StreamProvider`](crate::StreamProvider).
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T, E = TransferError> = std::result::Result<T, E>;

/// Errors produced by a transfer.
///
/// Failures before a worker exists are returned from
/// [`TransferController::start`](crate::TransferController::start); everything
/// after that is reported only through the Done event. Sources are shared so
/// the same error can be returned to the caller and kept on the session.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum TransferError {
    #[snafu(display("Invalid transfer request: {reason}"))]
    InvalidRequest { reason: String },

    #[snafu(display("Transfer already in progress for {locator}"))]
    TransferInProgress { locator: String },

    #[snafu(display("No tokio runtime configured or running to spawn the transfer worker on"))]
    NoRuntime,

    #[snafu(display("Failed to connect to {locator}: {source}"))]
    Connect {
        locator: String,
        #[snafu(source(from(BoxedError, Arc::from)))]
        source:  Arc<dyn std::error::Error + Send + Sync>,
    },

    #[snafu(display("Transfer cancelled by user"))]
    UserCancelled,

    #[snafu(display("I/O fault during transfer: {source}"))]
    Io {
        #[snafu(source(from(std::io::Error, Arc::new)))]
        source: Arc<std::io::Error>,
    },

    #[snafu(display("Stream exceeded advertised length: expected {expected} bytes, got {received}"))]
    LengthExceeded { expected: u64, received: u64 },

    #[snafu(display("Failed to release {resource}: {source}"))]
    CleanupFault {
        resource: &'static str,
        #[snafu(source(from(std::io::Error, Arc::new)))]
        source:   Arc<std::io::Error>,
    },
}

impl TransferError {
    /// Classification carried by the Done event.
    #[must_use]
    pub const fn kind(&self) -> TransferErrorKind {
        match self {
            Self::InvalidRequest { .. } | Self::TransferInProgress { .. } | Self::NoRuntime => {
                TransferErrorKind::InvalidRequest
            }
            Self::Connect { .. } => TransferErrorKind::ConnectError,
            Self::UserCancelled => TransferErrorKind::UserCancelled,
            Self::Io { .. } | Self::LengthExceeded { .. } => TransferErrorKind::IoFault,
            Self::CleanupFault { .. } => TransferErrorKind::ResourceCleanupFault,
        }
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool { matches!(self, Self::UserCancelled) }
}

/// Coarse error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum TransferErrorKind {
    InvalidRequest,
    ConnectError,
    UserCancelled,
    IoFault,
    /// Only ever logged; never the terminal error of a transfer.
    ResourceCleanupFault,
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn test_kind_classification() {
        let err = TransferError::Io {
            source: Arc::new(io::Error::other("disk full")),
        };
        assert_eq!(err.kind(), TransferErrorKind::IoFault);

        let err = TransferError::LengthExceeded {
            expected: 10,
            received: 12,
        };
        assert_eq!(err.kind(), TransferErrorKind::IoFault);

        let err = TransferError::TransferInProgress {
            locator: "file:///tmp/a".to_string(),
        };
        assert_eq!(err.kind(), TransferErrorKind::InvalidRequest);
        assert_eq!(TransferError::NoRuntime.kind(), TransferErrorKind::InvalidRequest);
        assert!(TransferError::UserCancelled.is_cancelled());
    }

    #[test]
    fn test_connect_error_keeps_source() {
        use std::error::Error as _;

        let cause: BoxedError = Box::new(io::Error::new(io::ErrorKind::NotFound, "no such file"));
        let err = TransferError::Connect {
            locator: "file:///missing".to_string(),
            source:  Arc::from(cause),
        };
        assert_eq!(err.kind(), TransferErrorKind::ConnectError);
        assert!(err.to_string().contains("file:///missing"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(TransferErrorKind::UserCancelled.to_string(), "user_cancelled");
        assert_eq!(
            "io_fault".parse::<TransferErrorKind>().ok(),
            Some(TransferErrorKind::IoFault)
        );
    }
}
