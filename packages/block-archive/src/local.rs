//! Archivers writing to local directories.
//!
//! Both stage files in a working directory from `store_block` and let their
//! run loop move finished files into a destination directory.
mod merge;
mod one_block;
mod uploader;

pub use merge::MergeDirArchiver;
pub use one_block::OneBlockDirArchiver;
