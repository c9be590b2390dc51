//! Shared transfer engine for moving files to and from S3.
//!
//! The commands in this crate all follow the same loop: collect a set of
//! entries, check whether each needs to move at all, and then transfer the
//! remainder with bounded concurrency. This module houses the pieces of
//! that loop which don't depend on the command.
use futures::stream::{self, StreamExt};

use std::future::Future;
use std::ops::AddAssign;
use std::time::Instant;

use crate::types::{UtilError, UtilResult};
use crate::util;

pub mod download;
pub mod upload;

/// Outcome of a single entry passing through a transfer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The entry was moved, with the given number of bytes.
    Transferred(u64),
    /// The entry was already in place and was left alone.
    Skipped,
}

/// Aggregated statistics across a transfer loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub transferred: u64,
    pub skipped: u64,
    pub failed: u64,
    pub bytes: u64,
}

impl TransferStats {
    /// Records the result of a single entry.
    pub fn record(&mut self, result: &UtilResult<Outcome>) {
        match result {
            Ok(Outcome::Transferred(bytes)) => {
                self.transferred += 1;
                self.bytes += bytes;
            }
            Ok(Outcome::Skipped) => self.skipped += 1,
            Err(_) => self.failed += 1,
        }
    }

    /// Total number of entries seen.
    pub fn total(&self) -> u64 {
        self.transferred + self.skipped + self.failed
    }

    /// Logs a summary of these statistics.
    pub fn log_summary(&self, label: &str, started: Instant) {
        info!(
            "{} {} files ({}) in {}, skipped {}, failed {}",
            label,
            self.transferred,
            util::convert_bytes(self.bytes),
            util::convert_elapsed(started.elapsed()),
            self.skipped,
            self.failed
        );
    }

    /// Converts these statistics into a command result.
    ///
    /// Any failure fails the command, after all entries had their chance.
    pub fn into_result(self) -> UtilResult<()> {
        if self.failed == 0 {
            Ok(())
        } else {
            Err(UtilError::from(format!("{} of {} files failed", self.failed, self.total())))
        }
    }
}

impl AddAssign for TransferStats {
    fn add_assign(&mut self, other: Self) {
        self.transferred += other.transferred;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.bytes += other.bytes;
    }
}

/// Determines whether a transfer can be skipped based on sizes.
///
/// Both sizes need to be known and equal; an unknown size on either side
/// always results in a transfer.
pub fn should_skip(source: Option<u64>, target: Option<u64>, force: bool) -> bool {
    if force {
        return false;
    }
    match (source, target) {
        (Some(source), Some(target)) => source == target,
        _ => false,
    }
}

/// Runs a transfer function over all entries with bounded concurrency.
///
/// Each entry is handed its (1-based) position in the queue. Errors are
/// logged and counted; they never stop other entries from running.
pub async fn run_all<T, F, Fut>(entries: Vec<T>, concurrency: usize, transfer: F) -> TransferStats
where
    T: Describe,
    F: Fn(T, usize) -> Fut,
    Fut: Future<Output = UtilResult<Outcome>>,
{
    let transfer = &transfer;

    let results = stream::iter(entries.into_iter().enumerate())
        .map(|(idx, entry)| async move {
            let name = entry.describe();
            let result = transfer(entry, idx + 1).await;
            if let Err(err) = &result {
                error!("Failed to transfer {}: {}", name, err);
            }
            result
        })
        .buffer_unordered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    let mut stats = TransferStats::default();
    for result in &results {
        stats.record(result);
    }
    stats
}

/// Trait for entries which can be described in logs.
pub trait Describe {
    /// Returns a short human readable description of this entry.
    fn describe(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::{Describe, Outcome, TransferStats};
    use crate::types::UtilError;

    impl Describe for u64 {
        fn describe(&self) -> String {
            format!("entry {}", self)
        }
    }

    #[test]
    fn deciding_on_skips() {
        assert!(super::should_skip(Some(10), Some(10), false));
        assert!(!super::should_skip(Some(10), Some(10), true));
        assert!(!super::should_skip(Some(10), Some(11), false));
        assert!(!super::should_skip(None, Some(10), false));
        assert!(!super::should_skip(Some(10), None, false));
    }

    #[test]
    fn merging_statistics() {
        let mut stats = TransferStats::default();

        stats.record(&Ok(Outcome::Transferred(512)));
        stats.record(&Ok(Outcome::Skipped));
        stats.record(&Err(UtilError::from("broken")));
        stats += TransferStats {
            transferred: 1,
            skipped: 0,
            failed: 0,
            bytes: 512,
        };

        assert_eq!(stats.transferred, 2);
        assert_eq!(stats.bytes, 1024);
        assert_eq!(stats.total(), 4);
        assert_eq!(stats.into_result().unwrap_err().to_string(), "1 of 4 files failed");
    }

    #[tokio::test]
    async fn running_all_entries() {
        let stats = super::run_all(vec![1u64, 2, 3, 4], 2, |entry, position| async move {
            assert!(position >= 1 && position <= 4);
            match entry {
                1 => Ok(Outcome::Skipped),
                3 => Err(UtilError::from("broken")),
                n => Ok(Outcome::Transferred(n * 100)),
            }
        })
        .await;

        assert_eq!(
            stats,
            TransferStats {
                transferred: 2,
                skipped: 1,
                failed: 1,
                bytes: 600,
            }
        );
    }
}
