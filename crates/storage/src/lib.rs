// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable state for the run engine.
//!
//! All collections live in a [`state::MaterializedState`] rebuilt on
//! startup by replaying an append-only JSON-lines WAL on top of the last
//! zstd-compressed snapshot. Every mutation goes write-ahead: the record is
//! appended to the WAL first, then applied in memory. Applies are
//! idempotent so a replay after a partial write converges on the same
//! state.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod error;
mod record;
mod snapshot;
pub mod state;
mod store;
mod wal;

pub use error::StorageError;
pub use record::{Record, WebhookDelivery};
pub use state::MaterializedState;
pub use store::{ActiveCounts, PruneReport, Store};
