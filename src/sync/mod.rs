//! Durability disciplines.
//!
//! The sync mode decides when an append becomes durable relative to the
//! caller getting its position back:
//!
//! | Mode | Writer blocks on add? | Durability trigger |
//! |------|-----------------------|--------------------|
//! | Batch | Every call | fsync before `add` returns |
//! | Periodic | Never | Background fsync on a fixed interval |
//! | Group | Coalesced | One fsync per epoch: byte threshold or timeout |
//!
//! The mode is fixed for the process lifetime.

pub mod service;

use std::time::Duration;

pub(crate) use service::SyncService;

/// When appended bytes are forced durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Every `add` fsyncs before returning. Worst latency, strongest
    /// per-write guarantee.
    Batch,

    /// A background task fsyncs on a fixed interval; `add` returns as soon
    /// as bytes are appended. Durability lags by at most `interval`;
    /// an explicit `sync` is the only way to force immediate catch-up.
    Periodic {
        /// Time between background durability barriers.
        interval: Duration,
    },

    /// Writers coalesce into epochs; one fsync releases every writer of
    /// the epoch together. The epoch closes when `threshold_bytes` have
    /// accumulated or `timeout` elapses, whichever comes first, so a lone
    /// writer never waits unboundedly.
    Group {
        /// Upper bound on how long an epoch stays open.
        timeout: Duration,
        /// Pending-byte level that closes the epoch early.
        threshold_bytes: u64,
    },
}

impl SyncMode {
    /// Human-readable mode name.
    pub fn name(&self) -> &'static str {
        match self {
            SyncMode::Batch => "batch",
            SyncMode::Periodic { .. } => "periodic",
            SyncMode::Group { .. } => "group",
        }
    }

    /// Whether this mode runs a background durability task.
    pub(crate) fn runs_background_flusher(&self) -> bool {
        !matches!(self, SyncMode::Batch)
    }
}

impl Default for SyncMode {
    fn default() -> Self {
        SyncMode::Periodic {
            interval: Duration::from_secs(10),
        }
    }
}
