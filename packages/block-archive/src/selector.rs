use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use tokio::{
    sync::{oneshot, watch},
    task::JoinHandle,
};

use crate::{lib_updater::LibUpdater, *};

/// Why a block was, or wasn't, considered safe to merge right away.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeDecision {
    /// Batch mode merges everything.
    BatchMode,
    /// The block is older than the configured threshold, and assumed final.
    OlderThanThreshold { age: Duration },
    /// The block is far enough behind the last irreversible block.
    BehindLib { lib: u64 },
    /// The block is close to the head of the chain and could still be reverted.
    NearHead,
}

impl MergeDecision {
    pub fn evaluate(
        config: &SelectorConfig,
        last_seen_lib: u64,
        block: &Block,
        now: Timestamp,
    ) -> Self {
        if config.batch_mode {
            return MergeDecision::BatchMode;
        }

        // Blocks from the future have no age.
        if let Ok(age) = Duration::try_from(now.duration_since(block.time)) {
            if age > config.merge_threshold_block_age {
                return MergeDecision::OlderThanThreshold { age };
            }
        }

        if block.num.saturating_add(LIB_SAFETY_MARGIN) <= last_seen_lib {
            return MergeDecision::BehindLib { lib: last_seen_lib };
        }

        MergeDecision::NearHead
    }

    pub fn should_merge(self) -> bool {
        !matches!(self, MergeDecision::NearHead)
    }
}

/// Routes every incoming block to either the one-block or the merge archiver.
///
/// The mode is decided on the first block and then only reconsidered on
/// boundary blocks. Once a boundary has been passed while producing one-block
/// files, merging never resumes.
///
/// [Self::store_block] must be called with consecutive block numbers from a
/// single task.
pub struct ArchiverSelector<O, M> {
    one_block: Arc<O>,
    merge: Arc<M>,
    reader_factory: Arc<dyn BlockReaderFactory>,
    config: SelectorConfig,

    first_block_passed: bool,
    first_boundary_passed: bool,
    currently_merging: bool,

    last_seen_lib: Arc<AtomicU64>,
    phase: watch::Sender<RoutingPhase>,
    lib_updater: Option<JoinHandle<()>>,
}

impl<O: Archiver, M: Archiver> ArchiverSelector<O, M> {
    /// Create a new selector.
    ///
    /// Outside of batch mode, this performs a first LIB fetch before returning
    /// and then keeps the LIB updated from a background task.
    pub async fn new<T: LibTracker>(
        one_block: O,
        merge: M,
        reader_factory: Arc<dyn BlockReaderFactory>,
        tracker: T,
        config: SelectorConfig,
    ) -> Self {
        let last_seen_lib = Arc::new(AtomicU64::new(0));
        let (phase, phase_recv) = watch::channel(RoutingPhase::BeforeFirstBoundary);

        let lib_updater = if config.batch_mode {
            None
        } else {
            let updater = LibUpdater::new(
                tracker,
                last_seen_lib.clone(),
                phase_recv,
                config.poller,
                config.merge_threshold_block_age,
            );
            // No warning on this one, the LIB source may still be booting along with us.
            let fetched_once = match updater.update().await {
                Ok(lib) => {
                    tracing::info!("Initial LIB is {lib}");
                    true
                }
                Err(e) => {
                    tracing::debug!("Initial LIB fetch failed: {e:?}");
                    false
                }
            };
            Some(tokio::spawn(updater.run(fetched_once)))
        };

        ArchiverSelector {
            one_block: Arc::new(one_block),
            merge: Arc::new(merge),
            reader_factory,
            config,
            first_block_passed: false,
            first_boundary_passed: false,
            currently_merging: false,
            last_seen_lib,
            phase,
            lib_updater,
        }
    }

    /// Initialize the one-block archiver, then the merge archiver.
    pub fn init(&self) -> Result<()> {
        self.one_block.init()?;
        self.merge.init()
    }

    /// Launch both archivers' run loops in the background.
    pub fn start(&self) {
        tracing::info!("Starting one-block uploads");
        spawn_run_loop("one-block", self.one_block.clone());
        tracing::info!("Starting merged blocks uploads");
        spawn_run_loop("merge", self.merge.clone());
    }

    /// Shut down the merge archiver, then the one-block archiver.
    ///
    /// Assumes no more blocks are coming. The returned receiver resolves once
    /// both archivers are done.
    pub fn terminate(&mut self) -> oneshot::Receiver<()> {
        if let Some(lib_updater) = self.lib_updater.take() {
            lib_updater.abort();
        }

        let (send_done, recv_done) = oneshot::channel();
        let one_block = self.one_block.clone();
        let merge = self.merge.clone();
        tokio::spawn(async move {
            merge.terminate().await;
            one_block.terminate().await;
            send_done.send(()).ok();
        });
        recv_done
    }

    pub async fn store_block(&mut self, block: &Block) -> Result<()> {
        if self.first_boundary_passed && !self.currently_merging {
            // Merging never resumes once one-block files were produced past a boundary.
            return self.one_block.store_block(block).await;
        }

        let is_boundary = self.config.is_boundary(block.num);

        if !self.first_block_passed {
            self.first_block_passed = true;
            self.currently_merging = self.should_merge(block);

            if is_boundary {
                self.pass_boundary();
                return self.route(block).await;
            }

            match recover_partial(
                &self.config.work_dir,
                block.num,
                self.reader_factory.as_ref(),
            ) {
                PartialRecovery::Nothing => (),
                PartialRecovery::Corrupted => {
                    tracing::warn!("Partial bundle lost, producing one-block files from {block}");
                    self.currently_merging = false;
                }
                PartialRecovery::Recovered(blocks) => {
                    for recovered in &blocks {
                        self.route(recovered).await?;
                    }
                }
            }
            return self.route(block).await;
        }

        if !is_boundary {
            // The mode only changes on boundaries, bundles must stay contiguous.
            return self.route(block).await;
        }

        let previously_merging = self.currently_merging;
        self.currently_merging = self.should_merge(block);
        self.pass_boundary();

        if !previously_merging && self.currently_merging {
            // The merge archiver needs this boundary block to open its first
            // bundle, while the one-block files still have to cover it.
            tracing::info!("Switching to merged blocks at {block}, sending it to both archivers");
            self.one_block.store_block(block).await?;
            return self.merge.store_block(block).await;
        }

        self.route(block).await
    }

    pub fn is_merging(&self) -> bool {
        self.currently_merging
    }

    pub fn first_boundary_passed(&self) -> bool {
        self.first_boundary_passed
    }

    pub fn phase(&self) -> RoutingPhase {
        *self.phase.borrow()
    }

    pub fn last_seen_lib(&self) -> u64 {
        self.last_seen_lib.load(Ordering::Relaxed)
    }

    /// Has the background LIB poller stopped? Always true in batch mode.
    pub fn lib_updater_finished(&self) -> bool {
        self.lib_updater
            .as_ref()
            .map_or(true, |lib_updater| lib_updater.is_finished())
    }

    fn should_merge(&self, block: &Block) -> bool {
        let decision = MergeDecision::evaluate(
            &self.config,
            self.last_seen_lib(),
            block,
            Timestamp::now(),
        );
        match decision {
            MergeDecision::BatchMode => {
                tracing::info!("Merging next blocks directly because we are in batch mode")
            }
            MergeDecision::OlderThanThreshold { age } => tracing::info!(
                "Merging next blocks directly because {block} is older than threshold, age {age:?}"
            ),
            MergeDecision::BehindLib { lib } => tracing::info!(
                "Merging next blocks directly because {block} is older than LIB {lib}"
            ),
            MergeDecision::NearHead => tracing::info!("Producing one-block files from {block}"),
        }
        decision.should_merge()
    }

    fn pass_boundary(&mut self) {
        self.first_boundary_passed = true;
        let phase = RoutingPhase::after_boundary(self.currently_merging);
        self.phase.send_if_modified(|current| {
            let modified = *current != phase;
            *current = phase;
            modified
        });
    }

    async fn route(&self, block: &Block) -> Result<()> {
        if self.currently_merging {
            self.merge.store_block(block).await
        } else {
            self.one_block.store_block(block).await
        }
    }
}

fn spawn_run_loop<A: Archiver>(label: &'static str, archiver: Arc<A>) {
    tokio::spawn(async move {
        if let Err(e) = archiver.run().await {
            tracing::error!("The {label} archiver stopped with an error: {e:?}");
        }
    });
}
