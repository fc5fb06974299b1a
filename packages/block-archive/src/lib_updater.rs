//! Background task keeping the selector's view of the LIB up to date.
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use tokio::sync::watch;

use crate::*;

pub(crate) struct LibUpdater<T> {
    tracker: T,
    last_seen_lib: Arc<AtomicU64>,
    phase: watch::Receiver<RoutingPhase>,
    config: LibPollerConfig,
    merge_threshold_block_age: Duration,
}

impl<T: LibTracker> LibUpdater<T> {
    pub(crate) fn new(
        tracker: T,
        last_seen_lib: Arc<AtomicU64>,
        phase: watch::Receiver<RoutingPhase>,
        config: LibPollerConfig,
        merge_threshold_block_age: Duration,
    ) -> Self {
        LibUpdater {
            tracker,
            last_seen_lib,
            phase,
            config,
            merge_threshold_block_age,
        }
    }

    /// Fetch the LIB once and store it on success.
    pub(crate) async fn update(&self) -> Result<u64> {
        let lib = tokio::time::timeout(self.config.fetch_timeout, self.tracker.fetch_lib())
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "LIB fetch timed out after {:?}",
                    self.config.fetch_timeout
                )
            })??;
        self.last_seen_lib.store(lib, Ordering::Relaxed);
        Ok(lib)
    }

    /// Keep polling until the selector is pinned to one-block mode, or goes away.
    ///
    /// `fetched_once` tells whether the initial fetch, done before the
    /// selector was handed out, succeeded.
    pub(crate) async fn run(mut self, mut fetched_once: bool) {
        let mut interval = if fetched_once {
            self.config.slow_interval
        } else {
            self.config.fast_interval
        };
        let mut warned = false;
        let mut last_error: Option<anyhow::Error> = None;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => (),
                changed = self.phase.changed() => {
                    if changed.is_err() {
                        tracing::debug!("Selector is gone, stopping LIB updates");
                        return;
                    }
                }
            }

            let phase = *self.phase.borrow_and_update();
            match phase {
                RoutingPhase::BeforeFirstBoundary => (),
                RoutingPhase::PinnedOneBlock => {
                    if !fetched_once {
                        let reason = last_error
                            .as_ref()
                            .map_or_else(|| "unknown error".to_owned(), |e| format!("{e:?}"));
                        tracing::warn!(
                            "Could not get LIB after several attempts, not merging blocks: {reason}"
                        );
                    }
                    tracing::debug!("Producing one-block files for good, stopping LIB updates");
                    return;
                }
                RoutingPhase::Merging => {
                    interval = self.config.slow_interval;
                    if !fetched_once && !warned {
                        tracing::warn!(
                            "Cannot get LIB, merging blocks based on their age only (threshold {:?}), will keep retrying",
                            self.merge_threshold_block_age
                        );
                        warned = true;
                    }
                }
            }

            match self.update().await {
                Ok(lib) => {
                    if !fetched_once {
                        fetched_once = true;
                        interval = self.config.slow_interval;
                        if warned {
                            tracing::info!("Fetched LIB {lib} after previous failures");
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!("Unable to fetch LIB: {e:?}");
                    last_error = Some(e);
                }
            }
        }
    }
}
