use std::{future::Future, path::PathBuf};

use super::uploader::Uploader;
use crate::*;

/// Writes every block to its own file, named `{num:010}-{id}.json`.
///
/// Files staged but not yet moved when the process stops are picked up by
/// the next [Archiver::init].
pub struct OneBlockDirArchiver {
    staging_dir: PathBuf,
    uploader: Uploader,
}

impl OneBlockDirArchiver {
    pub fn new(staging_dir: impl Into<PathBuf>, dest_dir: impl Into<PathBuf>) -> Self {
        let staging_dir = staging_dir.into();
        OneBlockDirArchiver {
            uploader: Uploader::new("one-block", staging_dir.clone(), dest_dir.into()),
            staging_dir,
        }
    }

    /// Characters of the block ID that aren't safe in a file name are replaced by `_`.
    pub fn file_name(block: &Block) -> String {
        let id = block
            .id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect::<String>();
        format!("{:010}-{id}.json", block.num)
    }
}

impl Archiver for OneBlockDirArchiver {
    fn init(&self) -> Result<()> {
        std::fs::create_dir_all(&self.staging_dir).with_context(|| {
            format!(
                "Unable to create one-block staging directory {}",
                self.staging_dir.display()
            )
        })?;
        self.uploader.init()
    }

    fn run(self: Arc<Self>) -> impl Future<Output = Result<()>> + Send + 'static {
        async move { self.uploader.run().await }
    }

    async fn store_block(&self, block: &Block) -> Result<()> {
        let staged = self.staging_dir.join(Self::file_name(block));
        tokio::fs::write(&staged, encode_block(block)?)
            .await
            .with_context(|| format!("Unable to write one-block file {}", staged.display()))?;
        self.uploader.enqueue(staged)
    }

    async fn terminate(&self) {
        self.uploader.terminate().await;
        tracing::info!("One-block archiver terminated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(id: &str) -> Block {
        Block::new(42, id, Timestamp::UNIX_EPOCH, vec![])
    }

    #[test]
    fn file_names() {
        assert_eq!(
            OneBlockDirArchiver::file_name(&block("00ab-cd_ef")),
            "0000000042-00ab-cd_ef.json"
        );
        assert_eq!(
            OneBlockDirArchiver::file_name(&block("../a/b\\c.d")),
            "0000000042-___a_b_c_d.json"
        );
    }
}
