//! Replay of partial bundles left behind by a previous run.
use std::{
    fs::File,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use crate::*;

/// Outcome of looking for a partial bundle matching the first live block.
#[derive(Debug, PartialEq, Eq)]
pub enum PartialRecovery {
    /// No usable partial file. The selector keeps its live decision.
    Nothing,
    /// A matching file was fully decoded and then deleted. Blocks are in file order.
    Recovered(Vec<Block>),
    /// A matching file could not be decoded. It has been deleted.
    Corrupted,
}

/// Look in `work_dir` for a partial bundle ending right before `next_block_num`.
///
/// Stale partial files, whose embedded number doesn't match, are deleted
/// without being read. Files with malformed names are logged and left alone.
/// Nothing here is fatal: every failure degrades to [PartialRecovery::Nothing]
/// or [PartialRecovery::Corrupted].
pub fn recover_partial(
    work_dir: &Path,
    next_block_num: u64,
    reader_factory: &dyn BlockReaderFactory,
) -> PartialRecovery {
    let candidates = match list_partial_candidates(work_dir) {
        Ok(candidates) => candidates,
        Err(e) => {
            tracing::warn!(
                "Unable to look for partial bundles in {}: {e:?}",
                work_dir.display()
            );
            return PartialRecovery::Nothing;
        }
    };

    for (file_name, path) in candidates {
        let saved = match file_name.parse::<PartialFileName>() {
            Ok(saved) => saved,
            Err(e) => {
                tracing::error!("Not restoring partial bundle {}: {e}", path.display());
                continue;
            }
        };

        if saved.next_block_num() != next_block_num {
            tracing::info!(
                "Partial bundle {file_name} ends before block {}, but next block is {next_block_num}, deleting it",
                saved.next_block_num()
            );
            remove_partial(&path);
            continue;
        }

        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) => {
                tracing::error!(
                    "Unable to open partial bundle {}, deleting it: {e}",
                    path.display()
                );
                remove_partial(&path);
                continue;
            }
        };

        let res = read_blocks(file, reader_factory);
        remove_partial(&path);
        return match res {
            Ok(blocks) => {
                tracing::info!(
                    "Recovered {} blocks from partial bundle {file_name}",
                    blocks.len()
                );
                PartialRecovery::Recovered(blocks)
            }
            Err(e) => {
                tracing::error!("Unable to decode partial bundle {file_name}, deleted it: {e}");
                PartialRecovery::Corrupted
            }
        };
    }

    PartialRecovery::Nothing
}

/// Files in `work_dir` shaped like partial bundles, sorted by name.
///
/// A missing directory simply has no candidates.
fn list_partial_candidates(work_dir: &Path) -> std::io::Result<Vec<(String, PathBuf)>> {
    let entries = match std::fs::read_dir(work_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
        Err(e) => return Err(e),
    };

    let mut candidates = vec![];
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Ok(file_name) = entry.file_name().into_string() else {
            continue;
        };
        if PartialFileName::looks_like_partial(&file_name) {
            candidates.push((file_name, entry.path()));
        }
    }
    candidates.sort();
    Ok(candidates)
}

fn read_blocks(
    file: File,
    reader_factory: &dyn BlockReaderFactory,
) -> Result<Vec<Block>, BlockDecodeError> {
    let mut reader = reader_factory.new_reader(Box::new(file))?;
    let mut blocks = vec![];
    while let Some(block) = reader.read()? {
        blocks.push(block);
    }
    Ok(blocks)
}

fn remove_partial(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!("Unable to delete partial bundle {}: {e}", path.display());
    }
}
