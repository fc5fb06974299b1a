mod archiver;
mod block_io;
mod common;
mod config;
mod lib_updater;
mod local;
mod partial;
mod recovery;
mod selector;
mod tracker;
mod types;

pub use archiver::Archiver;
pub use block_io::*;
pub use common::*;
pub use config::*;
pub use local::{MergeDirArchiver, OneBlockDirArchiver};
pub use partial::*;
pub use recovery::{recover_partial, PartialRecovery};
pub use selector::*;
pub use tracker::*;
pub use types::*;

pub(crate) use anyhow::{Context, Result};
pub(crate) use jiff::Timestamp;
pub(crate) use std::sync::Arc;
