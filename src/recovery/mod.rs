//! Commit log replay.
//!
//! Replay reconstructs the entry stream from the segment files at startup,
//! after a crash, before the engine accepts new writes. Entries come back
//! in exactly the order they were appended; replay is deterministic and
//! repeatable over the same files.

pub mod replayer;

pub use replayer::{Replayer, ReplayResult, ReplayStop, TruncateInfo};
