use std::{
    future::Future,
    path::{Path, PathBuf},
};

use tokio::io::AsyncWriteExt;

use super::uploader::Uploader;
use crate::*;

/// Accumulates blocks into bundles of [BOUNDARY_INTERVAL] blocks.
///
/// A bundle is closed by the first boundary block following it, and written
/// as `{base:010}.merged.json`. The open bundle is mirrored in a partial file
/// inside the work directory, so that a restarted process can pick it up
/// again through [crate::recover_partial]. Closed bundles still waiting in the
/// staging directory are queued again on [Archiver::init].
pub struct MergeDirArchiver {
    work_dir: PathBuf,
    staging_dir: PathBuf,
    uploader: Uploader,
    bundle: tokio::sync::Mutex<Bundle>,
}

#[derive(Default)]
struct Bundle {
    blocks: Vec<Block>,
    partial: Option<PathBuf>,
}

impl Bundle {
    /// Does this boundary block end the bundle in progress?
    fn closed_by(&self, block: &Block) -> bool {
        block.num % BOUNDARY_INTERVAL == 0
            && self
                .blocks
                .first()
                .is_some_and(|first| first.num < block.num)
    }

    fn base_num(&self) -> Option<u64> {
        self.blocks
            .first()
            .map(|first| first.num - first.num % BOUNDARY_INTERVAL)
    }
}

impl MergeDirArchiver {
    pub fn new(work_dir: impl Into<PathBuf>, dest_dir: impl Into<PathBuf>) -> Self {
        let work_dir = work_dir.into();
        let staging_dir = work_dir.join("merged-staging");
        MergeDirArchiver {
            uploader: Uploader::new("merge", staging_dir.clone(), dest_dir.into()),
            staging_dir,
            work_dir,
            bundle: Default::default(),
        }
    }

    pub fn file_name(base_num: u64) -> String {
        format!("{base_num:010}.merged.json")
    }

    async fn close_bundle(&self, bundle: &mut Bundle) -> Result<()> {
        let Some(base_num) = bundle.base_num() else {
            return Ok(());
        };
        let staged = self.staging_dir.join(Self::file_name(base_num));
        tokio::fs::write(&staged, encode_blocks(&bundle.blocks)?)
            .await
            .with_context(|| format!("Unable to write bundle {}", staged.display()))?;
        tracing::info!(
            "Closed bundle {base_num} with {} blocks",
            bundle.blocks.len()
        );
        self.uploader.enqueue(staged)?;

        bundle.blocks.clear();
        if let Some(partial) = bundle.partial.take() {
            tokio::fs::remove_file(&partial)
                .await
                .with_context(|| format!("Unable to delete {}", partial.display()))?;
        }
        Ok(())
    }

    /// Move the partial file to its new name and add the latest block to it.
    async fn save_partial(&self, bundle: &mut Bundle, block: &Block) -> Result<()> {
        let next = PartialFileName::new(block.num.saturating_add(1))?;
        let path = next.path_in(&self.work_dir);

        match bundle.partial.take() {
            Some(previous) => {
                tokio::fs::rename(&previous, &path).await.with_context(|| {
                    format!(
                        "Unable to rename {} to {}",
                        previous.display(),
                        path.display()
                    )
                })?;
                append(&path, &encode_block(block)?).await?;
            }
            None => {
                tokio::fs::write(&path, encode_blocks(&bundle.blocks)?)
                    .await
                    .with_context(|| format!("Unable to write {}", path.display()))?;
            }
        }
        bundle.partial = Some(path);
        Ok(())
    }
}

async fn append(path: &Path, contents: &str) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("Unable to open {}", path.display()))?;
    file.write_all(contents.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

impl Archiver for MergeDirArchiver {
    fn init(&self) -> Result<()> {
        for dir in [&self.work_dir, &self.staging_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Unable to create {}", dir.display()))?;
        }
        self.uploader.init()
    }

    fn run(self: Arc<Self>) -> impl Future<Output = Result<()>> + Send + 'static {
        async move { self.uploader.run().await }
    }

    async fn store_block(&self, block: &Block) -> Result<()> {
        let mut bundle = self.bundle.lock().await;
        if bundle.closed_by(block) {
            self.close_bundle(&mut bundle).await?;
        }
        bundle.blocks.push(block.clone());
        self.save_partial(&mut bundle, block).await
    }

    async fn terminate(&self) {
        {
            let bundle = self.bundle.lock().await;
            if let Some(partial) = &bundle.partial {
                tracing::info!(
                    "Leaving {} blocks in {} for the next run",
                    bundle.blocks.len(),
                    partial.display()
                );
            }
        }
        self.uploader.terminate().await;
        tracing::info!("Merge archiver terminated");
    }
}
