use std::future::Future;

use crate::*;

/// A destination for blocks, driven by the [crate::ArchiverSelector].
///
/// Two implementations are used side by side: one writing each block on its
/// own, and one merging contiguous runs of blocks into bundles.
pub trait Archiver: Send + Sync + 'static {
    /// Prepare the archiver before any block is stored.
    fn init(&self) -> Result<()>;

    /// The archiver's run loop. Spawned as its own task by [crate::ArchiverSelector::start].
    fn run(self: Arc<Self>) -> impl Future<Output = Result<()>> + Send + 'static;

    /// Hand a block over to the archiver. Errors are fatal for the caller.
    fn store_block(&self, block: &Block) -> impl Future<Output = Result<()>> + Send;

    /// Stop accepting blocks and resolve once all outstanding work is done.
    fn terminate(&self) -> impl Future<Output = ()> + Send;
}
