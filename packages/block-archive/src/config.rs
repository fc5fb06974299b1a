use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::*;

/// Configuration of an [crate::ArchiverSelector], fixed for the lifetime of the selector.
#[derive(Clone, Debug)]
pub struct SelectorConfig {
    /// Always merge, never consult the LIB. Used for offline reprocessing.
    pub batch_mode: bool,
    /// Blocks older than this are considered final and merged directly.
    pub merge_threshold_block_age: Duration,
    /// Protocol specific first block, always treated as a boundary.
    pub first_streamable_block: u64,
    /// Directory holding partial bundle files left behind by a previous run.
    pub work_dir: PathBuf,
    pub poller: LibPollerConfig,
}

impl SelectorConfig {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        SelectorConfig {
            batch_mode: false,
            merge_threshold_block_age: Duration::from_secs(12 * 60 * 60),
            first_streamable_block: 0,
            work_dir: work_dir.into(),
            poller: LibPollerConfig::default(),
        }
    }

    pub fn with_batch_mode(mut self, batch_mode: bool) -> Self {
        self.batch_mode = batch_mode;
        self
    }

    pub fn with_merge_threshold_block_age(mut self, age: Duration) -> Self {
        self.merge_threshold_block_age = age;
        self
    }

    pub fn with_first_streamable_block(mut self, num: u64) -> Self {
        self.first_streamable_block = num;
        self
    }

    pub fn with_poller(mut self, poller: LibPollerConfig) -> Self {
        self.poller = poller;
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Is this block number one where the archiving mode is allowed to change?
    pub fn is_boundary(&self, num: u64) -> bool {
        num % BOUNDARY_INTERVAL == 0 || num == self.first_streamable_block
    }
}

/// Cadence of the background LIB poller.
#[derive(Clone, Copy, Debug)]
pub struct LibPollerConfig {
    /// Upper bound on a single LIB fetch.
    pub fetch_timeout: Duration,
    /// Interval used until the LIB has been fetched once.
    pub fast_interval: Duration,
    /// Interval used once the LIB is known, or once retrying fast is pointless.
    pub slow_interval: Duration,
}

impl Default for LibPollerConfig {
    fn default() -> Self {
        LibPollerConfig {
            fetch_timeout: Duration::from_secs(2),
            fast_interval: Duration::from_millis(200),
            slow_interval: Duration::from_secs(30),
        }
    }
}
