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

//! Identifiers for transfers, workers and observers.

use std::sync::atomic::{AtomicU64, Ordering};

use derive_more::{Debug, Display};
use uuid::Uuid;

/// Unique identifier for one transfer session.
///
/// Every call to [`TransferController::start`](crate::TransferController::start)
/// creates a new session with a fresh id, which is attached to every log line
/// and event of that session.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
#[debug("TransferId({_0})")]
#[display("{_0}")]
pub struct TransferId(Uuid);

impl TransferId {
    pub(crate) fn new() -> Self { Self(Uuid::new_v4()) }

    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid { &self.0 }
}

/// Identifies the background worker attached to a session.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
#[debug("WorkerId({_0})")]
#[display("{_0}")]
pub struct WorkerId(Uuid);

impl WorkerId {
    pub(crate) fn new() -> Self { Self(Uuid::new_v4()) }
}

/// Registration token returned by
/// [`EventChannel::subscribe`](crate::EventChannel::subscribe).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
#[debug("ObserverId({_0})")]
#[display("{_0}")]
pub struct ObserverId(u64);

impl ObserverId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(TransferId::new(), TransferId::new());
        assert_ne!(ObserverId::next(), ObserverId::next());
    }

    #[test]
    fn test_debug_format() {
        let id = TransferId::new();
        assert_eq!(format!("{id:?}"), format!("TransferId({})", id.as_uuid()));
    }
}
