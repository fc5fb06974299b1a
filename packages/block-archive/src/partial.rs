//! Naming of partial bundle files.
//!
//! A partial bundle file holds the blocks of a bundle that was still open when
//! the previous process stopped. Its name embeds the number of the next block
//! expected after its contents, zero-padded to ten digits:
//!
//! ```text
//! archiver_0000000150.partial
//! ```
//!
//! Names are always exactly [PARTIAL_FILE_NAME_LEN] bytes long.
use std::{
    fmt::Display,
    path::{Path, PathBuf},
    str::FromStr,
};

pub const PARTIAL_FILE_PREFIX: &str = "archiver_";
pub const PARTIAL_FILE_SUFFIX: &str = ".partial";
const NUM_DIGITS: usize = 10;
pub const PARTIAL_FILE_NAME_LEN: usize =
    PARTIAL_FILE_PREFIX.len() + NUM_DIGITS + PARTIAL_FILE_SUFFIX.len();
const MAX_EMBEDDED_NUM: u64 = 9_999_999_999;

#[derive(thiserror::Error, Debug)]
pub enum PartialFileNameError {
    #[error("Partial file name {name:?} has length {len}, expected {expected}", expected = PARTIAL_FILE_NAME_LEN)]
    InvalidLength { name: String, len: usize },

    #[error(
        "Partial file name {name:?} must look like {prefix}NNNNNNNNNN{suffix}",
        prefix = PARTIAL_FILE_PREFIX,
        suffix = PARTIAL_FILE_SUFFIX
    )]
    MissingAffixes { name: String },

    #[error("Partial file name {name:?} has an invalid block number {digits:?}")]
    InvalidNumber { name: String, digits: String },

    #[error("Block number {num} does not fit in a partial file name")]
    NumberTooLarge { num: u64 },
}

/// Parsed name of a partial bundle file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartialFileName {
    next_block_num: u64,
}

impl PartialFileName {
    pub fn new(next_block_num: u64) -> Result<Self, PartialFileNameError> {
        if next_block_num > MAX_EMBEDDED_NUM {
            return Err(PartialFileNameError::NumberTooLarge {
                num: next_block_num,
            });
        }
        Ok(PartialFileName { next_block_num })
    }

    /// The block expected right after the blocks stored in this file.
    pub fn next_block_num(self) -> u64 {
        self.next_block_num
    }

    pub fn path_in(self, dir: &Path) -> PathBuf {
        dir.join(self.to_string())
    }

    /// Cheap shape test used when scanning a directory, before full validation.
    pub fn looks_like_partial(name: &str) -> bool {
        name.starts_with(PARTIAL_FILE_PREFIX) && name.ends_with(PARTIAL_FILE_SUFFIX)
    }
}

impl Display for PartialFileName {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{PARTIAL_FILE_PREFIX}{:0width$}{PARTIAL_FILE_SUFFIX}",
            self.next_block_num,
            width = NUM_DIGITS
        )
    }
}

impl FromStr for PartialFileName {
    type Err = PartialFileNameError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        if name.len() != PARTIAL_FILE_NAME_LEN {
            return Err(PartialFileNameError::InvalidLength {
                name: name.to_owned(),
                len: name.len(),
            });
        }
        let digits = name
            .strip_prefix(PARTIAL_FILE_PREFIX)
            .and_then(|rest| rest.strip_suffix(PARTIAL_FILE_SUFFIX))
            .ok_or_else(|| PartialFileNameError::MissingAffixes {
                name: name.to_owned(),
            })?;

        // u64::from_str accepts a leading '+', which is not part of the format.
        let invalid = || PartialFileNameError::InvalidNumber {
            name: name.to_owned(),
            digits: digits.to_owned(),
        };
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let next_block_num = digits.parse().map_err(|_| invalid())?;
        Ok(PartialFileName { next_block_num })
    }
}
