use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use block_archive::*;
use clap::Parser;
use reqwest::Url;

#[tokio::main]
async fn main() -> Result<()> {
    main_inner().await
}

/// Route a node's block stream to one-block files or merged bundles.
#[derive(clap::Parser)]
enum Cmd {
    /// Feed blocks from a file through the archiver selector.
    Replay(ReplayOpt),
    /// List partial bundle files left in a work directory.
    Partials {
        #[clap(long, env = "BLOCK_ARCHIVE_WORK_DIR")]
        work_dir: PathBuf,
    },
}

#[derive(clap::Parser)]
struct ReplayOpt {
    /// Newline-delimited JSON blocks, in increasing block number order
    #[clap(long)]
    input: PathBuf,
    /// Working directory, holds partial bundles between runs
    #[clap(long, env = "BLOCK_ARCHIVE_WORK_DIR")]
    work_dir: PathBuf,
    /// Destination of one-block files
    #[clap(long, env = "BLOCK_ARCHIVE_ONE_BLOCKS_DIR")]
    one_blocks_dir: PathBuf,
    /// Destination of merged bundles
    #[clap(long, env = "BLOCK_ARCHIVE_MERGED_DIR")]
    merged_dir: PathBuf,
    /// Merge every block without consulting the LIB
    #[clap(long, env = "BLOCK_ARCHIVE_BATCH_MODE")]
    batch_mode: bool,
    /// Blocks older than this are merged directly
    #[clap(long, env = "BLOCK_ARCHIVE_MERGE_THRESHOLD_BLOCK_AGE", default_value = "12h")]
    merge_threshold_block_age: jiff::SignedDuration,
    /// First block the protocol can stream, always a boundary
    #[clap(long, env = "BLOCK_ARCHIVE_FIRST_STREAMABLE_BLOCK", default_value_t = 0)]
    first_streamable_block: u64,
    /// Endpoint answering with {"lib_num": N}. Without it, only block age decides merging.
    #[clap(long, env = "BLOCK_ARCHIVE_LIB_URL")]
    lib_url: Option<Url>,
    /// Enable debug logging
    #[clap(long, short)]
    verbose: bool,
}

async fn main_inner() -> Result<()> {
    match Cmd::parse() {
        Cmd::Replay(opt) => replay(opt).await?,
        Cmd::Partials { work_dir } => {
            init_logger(false, None);
            list_partials(work_dir)?
        }
    }
    Ok(())
}

enum CliTracker {
    Http(HttpLibTracker),
    Unavailable(NoLibTracker),
}

impl LibTracker for CliTracker {
    async fn fetch_lib(&self) -> Result<u64> {
        match self {
            CliTracker::Http(tracker) => tracker.fetch_lib().await,
            CliTracker::Unavailable(tracker) => tracker.fetch_lib().await,
        }
    }
}

async fn replay(opt: ReplayOpt) -> Result<()> {
    let ReplayOpt {
        input,
        work_dir,
        one_blocks_dir,
        merged_dir,
        batch_mode,
        merge_threshold_block_age,
        first_streamable_block,
        lib_url,
        verbose,
    } = opt;
    init_logger(verbose, None);

    let merge_threshold_block_age = Duration::try_from(merge_threshold_block_age)
        .context("The merge threshold block age cannot be negative")?;
    let config = SelectorConfig::new(&work_dir)
        .with_batch_mode(batch_mode)
        .with_merge_threshold_block_age(merge_threshold_block_age)
        .with_first_streamable_block(first_streamable_block);
    let tracker = match lib_url {
        Some(url) => CliTracker::Http(HttpLibTracker::new(url)?),
        None => CliTracker::Unavailable(NoLibTracker),
    };

    let one_block = OneBlockDirArchiver::new(work_dir.join("one-blocks-staging"), one_blocks_dir);
    let merge = MergeDirArchiver::new(&work_dir, merged_dir);
    let mut selector = ArchiverSelector::new(
        one_block,
        merge,
        Arc::new(JsonBlockReaderFactory),
        tracker,
        config,
    )
    .await;
    selector.init()?;
    selector.start();

    let file = std::fs::File::open(&input)
        .with_context(|| format!("Unable to open {}", input.display()))?;
    let mut reader = JsonBlockReader::new(file);
    let mut count = 0usize;
    while let Some(block) = reader.read()? {
        selector.store_block(&block).await?;
        count += 1;
    }

    selector
        .terminate()
        .await
        .context("Archivers did not shut down cleanly")?;
    tracing::info!(
        "Stored {count} blocks, ended in {} mode",
        if selector.is_merging() {
            "merge"
        } else {
            "one-block"
        }
    );
    Ok(())
}

fn list_partials(work_dir: PathBuf) -> Result<()> {
    let mut names = vec![];
    for entry in std::fs::read_dir(&work_dir)
        .with_context(|| format!("Unable to read {}", work_dir.display()))?
    {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if PartialFileName::looks_like_partial(&name) {
            names.push(name);
        }
    }
    names.sort();

    if names.is_empty() {
        eprintln!("No partial bundles in {}", work_dir.display());
    }
    for name in names {
        match name.parse::<PartialFileName>() {
            Ok(partial) => println!("{name}: next block {}", partial.next_block_num()),
            Err(e) => println!("{name}: {e}"),
        }
    }
    Ok(())
}
