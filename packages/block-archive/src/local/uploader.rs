use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use crate::*;

/// Queue of staged files waiting to be moved into their destination directory.
pub(super) struct Uploader {
    label: &'static str,
    staging_dir: PathBuf,
    dest_dir: PathBuf,
    sender: Mutex<Option<mpsc::UnboundedSender<PathBuf>>>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<PathBuf>>>,
    finished: watch::Sender<bool>,
}

impl Uploader {
    pub(super) fn new(label: &'static str, staging_dir: PathBuf, dest_dir: PathBuf) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Uploader {
            label,
            staging_dir,
            dest_dir,
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
            finished: watch::Sender::new(false),
        }
    }

    /// Create the destination, then queue whatever a previous run staged but never moved.
    ///
    /// The staging directory must already exist.
    pub(super) fn init(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dest_dir).with_context(|| {
            format!(
                "Unable to create {} destination {}",
                self.label,
                self.dest_dir.display()
            )
        })?;

        let mut leftovers = vec![];
        for entry in std::fs::read_dir(&self.staging_dir)
            .with_context(|| format!("Unable to read {}", self.staging_dir.display()))?
        {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                leftovers.push(entry.path());
            }
        }
        leftovers.sort();

        if !leftovers.is_empty() {
            tracing::info!(
                "Queueing {} {} files left in {} by a previous run",
                leftovers.len(),
                self.label,
                self.staging_dir.display()
            );
        }
        for staged in leftovers {
            self.enqueue(staged)?;
        }
        Ok(())
    }

    pub(super) fn enqueue(&self, staged: PathBuf) -> Result<()> {
        let guard = self.sender.lock();
        let sender = guard
            .as_ref()
            .with_context(|| format!("The {} uploader was terminated", self.label))?;
        sender
            .send(staged)
            .map_err(|_| anyhow::anyhow!("The {} upload queue is closed", self.label))
    }

    pub(super) async fn run(&self) -> Result<()> {
        let receiver = self.receiver.lock().take();
        let Some(receiver) = receiver else {
            let terminated = self.sender.lock().is_none();
            anyhow::ensure!(terminated, "The {} uploader is already running", self.label);
            // Terminated before this loop got going, terminate drains the queue itself.
            self.wait_finished().await;
            return Ok(());
        };
        self.drain(receiver).await
    }

    /// Close the queue and wait until everything staged so far has been moved.
    pub(super) async fn terminate(&self) {
        self.sender.lock().take();

        // Never started: nobody else will empty the queue.
        let receiver = self.receiver.lock().take();
        if let Some(receiver) = receiver {
            if let Err(e) = self.drain(receiver).await {
                tracing::error!("Unable to flush {} uploads: {e:?}", self.label);
            }
            return;
        }

        self.wait_finished().await;
    }

    async fn wait_finished(&self) {
        let mut finished = self.finished.subscribe();
        finished.wait_for(|finished| *finished).await.ok();
    }

    async fn drain(&self, mut receiver: mpsc::UnboundedReceiver<PathBuf>) -> Result<()> {
        let mut res = Ok(());
        while let Some(staged) = receiver.recv().await {
            if let Err(e) = self.upload(&staged).await {
                tracing::error!("{e:?}");
                res = Err(e);
                break;
            }
        }
        self.finished.send_replace(true);
        res
    }

    async fn upload(&self, staged: &Path) -> Result<()> {
        let file_name = staged
            .file_name()
            .with_context(|| format!("Staged file {} has no name", staged.display()))?;
        let dest = self.dest_dir.join(file_name);

        // Renaming fails across filesystems, fall back to copying.
        if tokio::fs::rename(staged, &dest).await.is_err() {
            tokio::fs::copy(staged, &dest).await.with_context(|| {
                format!("Unable to copy {} to {}", staged.display(), dest.display())
            })?;
            tokio::fs::remove_file(staged).await?;
        }
        tracing::debug!("Uploaded {}", dest.display());
        Ok(())
    }
}
