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

use std::{fmt, sync::Arc};

use bon::Builder;
use snafu::{OptionExt, ensure};

use crate::{
    error::{InvalidRequestSnafu, Result},
    event::TransferObserver,
    provider::{Destination, TransferOptions},
};

/// A request to retrieve one resource.
///
/// `locator` and `observer` are optional at construction time so that
/// incomplete requests are rejected by
/// [`TransferController::start`](crate::TransferController::start) with an
/// `InvalidRequest` error rather than being unrepresentable.
#[derive(Builder)]
pub struct TransferRequest {
    /// Remote locator handed to the stream provider.
    #[builder(into)]
    pub locator:     Option<String>,
    pub destination: Destination,
    /// Passed to the provider unmodified.
    #[builder(default)]
    pub options:     TransferOptions,
    /// Receives the lifecycle events of the transfer.
    pub observer:    Option<Arc<dyn TransferObserver>>,
}

/// A request that passed validation.
pub(crate) struct ValidRequest {
    pub(crate) locator:     String,
    pub(crate) destination: Destination,
    pub(crate) options:     TransferOptions,
    pub(crate) observer:    Arc<dyn TransferObserver>,
}

impl TransferRequest {
    pub(crate) fn validate(self) -> Result<ValidRequest> {
        let locator = self.locator.context(InvalidRequestSnafu {
            reason: "locator is required",
        })?;
        ensure!(
            !locator.trim().is_empty(),
            InvalidRequestSnafu {
                reason: "locator must not be blank",
            }
        );
        let observer = self.observer.context(InvalidRequestSnafu {
            reason: "observer is required",
        })?;
        Ok(ValidRequest {
            locator,
            destination: self.destination,
            options: self.options,
            observer,
        })
    }
}

impl fmt::Debug for TransferRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferRequest")
            .field("locator", &self.locator)
            .field("destination", &self.destination)
            .field("options", &self.options)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{TransferError, TransferErrorKind},
        provider::WriterSink,
    };

    struct Quiet;

    impl TransferObserver for Quiet {}

    fn destination() -> Destination { Destination::owned(WriterSink::new(Vec::new())) }

    #[test]
    fn test_missing_locator_is_invalid() {
        let request = TransferRequest::builder()
            .destination(destination())
            .observer(Arc::new(Quiet))
            .build();
        let err = request.validate().err().unwrap();
        assert_eq!(err.kind(), TransferErrorKind::InvalidRequest);
        assert!(err.to_string().contains("locator is required"));
    }

    #[test]
    fn test_blank_locator_is_invalid() {
        let request = TransferRequest::builder()
            .locator("   ")
            .destination(destination())
            .observer(Arc::new(Quiet))
            .build();
        assert!(matches!(
            request.validate(),
            Err(TransferError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn test_missing_observer_is_invalid() {
        let request = TransferRequest::builder()
            .locator("file:///tmp/a")
            .destination(destination())
            .build();
        let err = request.validate().err().unwrap();
        assert!(err.to_string().contains("observer is required"));
    }

    #[test]
    fn test_valid_request_keeps_options() {
        let mut options = TransferOptions::new();
        options.insert("token".to_string(), serde_json::json!("secret"));
        let request = TransferRequest::builder()
            .locator("file:///tmp/a")
            .destination(destination())
            .options(options)
            .observer(Arc::new(Quiet))
            .build();
        let valid = request.validate().unwrap();
        assert_eq!(valid.locator, "file:///tmp/a");
        assert_eq!(valid.options.get("token"), Some(&serde_json::json!("secret")));
    }
}
