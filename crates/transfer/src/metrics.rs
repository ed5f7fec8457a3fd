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

use std::sync::LazyLock;

use prometheus::{
    IntCounter, IntCounterVec, IntGauge, register_int_counter, register_int_counter_vec,
    register_int_gauge,
};

pub const OUTCOME_LABEL: &str = "outcome";

pub static TRANSFER_STARTED: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "transfer_started_total",
        "Total number of transfers whose worker was spawned"
    )
    .unwrap()
});

pub static TRANSFER_FINISHED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "transfer_finished_total",
        "Total number of transfers that reached a terminal state",
        &[OUTCOME_LABEL]
    )
    .unwrap()
});

pub static TRANSFER_CONNECT_ERRORS: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "transfer_connect_errors_total",
        "Total number of transfers that failed before a worker was spawned"
    )
    .unwrap()
});

pub static TRANSFER_BYTES: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "transfer_bytes_received_total",
        "Total number of bytes written to sinks"
    )
    .unwrap()
});

pub static TRANSFER_ACTIVE: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge!("transfer_active", "Number of transfers with a live worker").unwrap()
});

pub static TRANSFER_PAUSED: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "transfer_paused_total",
        "Total number of times transfers were paused"
    )
    .unwrap()
});

pub static TRANSFER_RESUMED: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "transfer_resumed_total",
        "Total number of times transfers were resumed"
    )
    .unwrap()
});

pub static OBSERVER_PANICS: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "transfer_observer_panics_total",
        "Total number of observer callbacks that panicked"
    )
    .unwrap()
});

pub static CLEANUP_FAULTS: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "transfer_cleanup_faults_total",
        "Total number of failures while releasing streams or sinks"
    )
    .unwrap()
});
