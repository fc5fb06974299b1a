#![allow(dead_code)]

use std::{
    io::Read,
    path::Path,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Result;
use block_archive::*;
use jiff::{SignedDuration, Timestamp};
use parking_lot::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    OneBlock,
    Merge,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Init(Target),
    Run(Target),
    Stored(Target, u64),
    TerminateStarted(Target),
    Terminated(Target),
}

/// Everything both archivers saw, in the order they saw it.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Event>>>);

impl Journal {
    fn push(&self, event: Event) {
        self.0.lock().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().clone()
    }

    pub fn stored(&self) -> Vec<(Target, u64)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Stored(target, num) => Some((target, num)),
                _ => None,
            })
            .collect()
    }

    pub fn stored_by(&self, target: Target) -> Vec<u64> {
        self.stored()
            .into_iter()
            .filter(|(t, _)| *t == target)
            .map(|(_, num)| num)
            .collect()
    }

    pub fn deliveries_of(&self, num: u64) -> Vec<Target> {
        self.stored()
            .into_iter()
            .filter(|(_, n)| *n == num)
            .map(|(target, _)| target)
            .collect()
    }
}

pub struct RecordingArchiver {
    target: Target,
    journal: Journal,
    fail_init: bool,
    fail_on_block: Option<u64>,
    terminate_delay: Duration,
}

impl RecordingArchiver {
    pub fn new(target: Target, journal: &Journal) -> Self {
        RecordingArchiver {
            target,
            journal: journal.clone(),
            fail_init: false,
            fail_on_block: None,
            terminate_delay: Duration::ZERO,
        }
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn failing_on(mut self, num: u64) -> Self {
        self.fail_on_block = Some(num);
        self
    }

    pub fn with_terminate_delay(mut self, delay: Duration) -> Self {
        self.terminate_delay = delay;
        self
    }
}

impl Archiver for RecordingArchiver {
    fn init(&self) -> Result<()> {
        self.journal.push(Event::Init(self.target));
        if self.fail_init {
            anyhow::bail!("injected init failure");
        }
        Ok(())
    }

    fn run(self: Arc<Self>) -> impl std::future::Future<Output = Result<()>> + Send + 'static {
        async move {
            self.journal.push(Event::Run(self.target));
            Ok(())
        }
    }

    async fn store_block(&self, block: &Block) -> Result<()> {
        if self.fail_on_block == Some(block.num) {
            anyhow::bail!("injected failure at block {}", block.num);
        }
        self.journal.push(Event::Stored(self.target, block.num));
        Ok(())
    }

    async fn terminate(&self) {
        self.journal.push(Event::TerminateStarted(self.target));
        tokio::time::sleep(self.terminate_delay).await;
        self.journal.push(Event::Terminated(self.target));
    }
}

/// A LIB source whose answers are controlled by the test.
#[derive(Clone, Default)]
pub struct ScriptedTracker(Arc<TrackerInner>);

#[derive(Default)]
struct TrackerInner {
    lib: AtomicU64,
    available: AtomicBool,
    calls: AtomicUsize,
    delay: Mutex<Duration>,
}

impl ScriptedTracker {
    pub fn available(lib: u64) -> Self {
        let tracker = ScriptedTracker::default();
        tracker.set_lib(lib);
        tracker.set_available(true);
        tracker
    }

    pub fn unavailable() -> Self {
        ScriptedTracker::default()
    }

    pub fn set_lib(&self, lib: u64) {
        self.0.lib.store(lib, Ordering::SeqCst);
    }

    pub fn set_available(&self, available: bool) {
        self.0.available.store(available, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.0.delay.lock() = delay;
    }

    pub fn calls(&self) -> usize {
        self.0.calls.load(Ordering::SeqCst)
    }
}

impl LibTracker for ScriptedTracker {
    async fn fetch_lib(&self) -> Result<u64> {
        self.0.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.0.delay.lock();
        tokio::time::sleep(delay).await;
        if self.0.available.load(Ordering::SeqCst) {
            Ok(self.0.lib.load(Ordering::SeqCst))
        } else {
            anyhow::bail!("LIB source unavailable")
        }
    }
}

/// Counts how many streams were handed over for decoding.
#[derive(Clone, Default)]
pub struct CountingReaderFactory {
    opened: Arc<AtomicUsize>,
}

impl CountingReaderFactory {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl BlockReaderFactory for CountingReaderFactory {
    fn new_reader(
        &self,
        input: Box<dyn Read + Send>,
    ) -> Result<Box<dyn BlockReader>, BlockDecodeError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        JsonBlockReaderFactory.new_reader(input)
    }
}

/// Fails to even start decoding.
pub struct FailingReaderFactory;

impl BlockReaderFactory for FailingReaderFactory {
    fn new_reader(
        &self,
        _input: Box<dyn Read + Send>,
    ) -> Result<Box<dyn BlockReader>, BlockDecodeError> {
        Err(BlockDecodeError::Io(std::io::Error::other("injected reader failure")))
    }
}

pub type TestSelector = ArchiverSelector<RecordingArchiver, RecordingArchiver>;

pub const THRESHOLD: Duration = Duration::from_secs(60 * 60);

/// Small cadences so poller behavior shows up within a test's lifetime.
pub fn fast_poller() -> LibPollerConfig {
    LibPollerConfig {
        fetch_timeout: Duration::from_millis(100),
        fast_interval: Duration::from_millis(10),
        slow_interval: Duration::from_millis(30),
    }
}

pub fn config(work_dir: &Path) -> SelectorConfig {
    SelectorConfig::new(work_dir)
        .with_merge_threshold_block_age(THRESHOLD)
        .with_poller(fast_poller())
}

pub async fn recording_selector(
    config: SelectorConfig,
    tracker: ScriptedTracker,
) -> (TestSelector, Journal) {
    let journal = Journal::default();
    let selector = ArchiverSelector::new(
        RecordingArchiver::new(Target::OneBlock, &journal),
        RecordingArchiver::new(Target::Merge, &journal),
        Arc::new(JsonBlockReaderFactory),
        tracker,
        config,
    )
    .await;
    (selector, journal)
}

/// A block produced just now, close to the chain head.
pub fn recent_block(num: u64) -> Block {
    Block::new(num, format!("{num:08x}"), Timestamp::now(), vec![])
}

/// A block far older than [THRESHOLD].
pub fn old_block(num: u64) -> Block {
    Block::new(
        num,
        format!("{num:08x}"),
        Timestamp::now() - SignedDuration::from_hours(48),
        vec![],
    )
}

pub async fn store_all(selector: &mut TestSelector, blocks: impl IntoIterator<Item = Block>) {
    for block in blocks {
        selector.store_block(&block).await.unwrap();
    }
}

pub fn write_partial(dir: &Path, next_block_num: u64, blocks: &[Block]) -> std::path::PathBuf {
    let path = PartialFileName::new(next_block_num).unwrap().path_in(dir);
    std::fs::write(&path, encode_blocks(blocks).unwrap()).unwrap();
    path
}

pub fn read_blocks_file(path: &Path) -> Vec<Block> {
    let file = std::fs::File::open(path).unwrap();
    let mut reader = JsonBlockReader::new(file);
    let mut blocks = vec![];
    while let Some(block) = reader.read().unwrap() {
        blocks.push(block);
    }
    blocks
}

/// Poll `cond` until it holds, failing the test after two seconds.
pub async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("Timed out waiting until {what}"));
}
