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

use bon::Builder;
use smart_default::SmartDefault;
use tokio::runtime::Handle;

/// Default size of the read buffer used by the worker loop.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Configuration for a [`TransferController`](crate::TransferController).
#[derive(Debug, Clone, SmartDefault, Builder)]
pub struct TransferConfig {
    /// Upper bound on the bytes read per loop iteration (default: 4096).
    ///
    /// Only trades throughput against per-chunk overhead; it has no effect on
    /// correctness. Zero is rejected by `start`.
    #[default(DEFAULT_BUFFER_SIZE)]
    #[builder(default = DEFAULT_BUFFER_SIZE)]
    pub buffer_size: usize,

    /// Runtime the workers are spawned on. Falls back to the runtime that
    /// calls `start`.
    #[builder(into)]
    pub runtime: Option<Handle>,
}
