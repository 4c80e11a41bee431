use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};

use analysis_core::{InfoNode, SourceDescriptor};

use crate::{BitrateModel, PacketModel, ParseError, ParserEvent, RunStatus};

/// Channel a worker reports through.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ParserEvent);
}

pub struct ChannelProgressSink {
    tx: mpsc::Sender<ParserEvent>,
}

impl ChannelProgressSink {
    pub fn new(tx: mpsc::Sender<ParserEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, event: ParserEvent) {
        // The receiver is gone once the handle was released; nothing to report to.
        let _ = self.tx.send(event);
    }
}

/// Capability set of a format-specific analysis engine.
///
/// `run` executes on the worker thread while the other methods are called
/// from the supervising thread, so implementations keep their state behind
/// atomics or locks.
///
/// Contract: `run` must check for an abort request after every syntax unit
/// and return [`RunStatus::Aborted`] promptly once one is seen. The
/// controller waits for `run` to return without a timeout, so a strategy
/// that ignores the request blocks teardown indefinitely.
pub trait ParserStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn run(&self, source: &SourceDescriptor, sink: &dyn ProgressSink)
        -> Result<RunStatus, ParseError>;

    fn request_abort(&self);

    /// Read once when `run` starts.
    fn set_parsing_limit_enabled(&self, enabled: bool);

    fn set_stream_filter(&self, stream: Option<usize>);

    /// Display option; takes effect on the next read of the models.
    fn set_stream_color_coding(&self, enabled: bool);

    /// Last reported progress in `0..=100`.
    fn progress_percent(&self) -> u8;

    fn stream_count(&self) -> usize;

    fn stream_summary(&self, stream: usize) -> Option<String>;

    fn stream_info(&self) -> Vec<InfoNode>;

    fn packet_model(&self) -> Arc<PacketModel>;

    fn bitrate_model(&self) -> Arc<BitrateModel>;
}

const NO_FILTER: usize = usize::MAX;

/// Flags and progress shared by the built-in strategies.
#[derive(Debug)]
pub struct StrategyControls {
    abort: AtomicBool,
    parsing_limit: AtomicBool,
    stream_filter: AtomicUsize,
    color_coding: AtomicBool,
    progress: AtomicU8,
}

impl Default for StrategyControls {
    fn default() -> Self {
        Self {
            abort: AtomicBool::new(false),
            parsing_limit: AtomicBool::new(true),
            stream_filter: AtomicUsize::new(NO_FILTER),
            color_coding: AtomicBool::new(false),
            progress: AtomicU8::new(0),
        }
    }
}

impl StrategyControls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    pub fn abort_requested(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    pub fn set_parsing_limit_enabled(&self, enabled: bool) {
        self.parsing_limit.store(enabled, Ordering::Relaxed);
    }

    pub fn parsing_limit_enabled(&self) -> bool {
        self.parsing_limit.load(Ordering::Relaxed)
    }

    pub fn set_stream_filter(&self, stream: Option<usize>) {
        self.stream_filter
            .store(stream.unwrap_or(NO_FILTER), Ordering::Relaxed);
    }

    pub fn stream_filter(&self) -> Option<usize> {
        match self.stream_filter.load(Ordering::Relaxed) {
            NO_FILTER => None,
            stream => Some(stream),
        }
    }

    pub fn set_stream_color_coding(&self, enabled: bool) {
        self.color_coding.store(enabled, Ordering::Relaxed);
    }

    pub fn stream_color_coding(&self) -> bool {
        self.color_coding.load(Ordering::Relaxed)
    }

    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::Relaxed)
    }

    /// Raises progress to `percent` (clamped to 100) and emits it if it grew.
    pub fn advance_progress(&self, percent: u8, sink: &dyn ProgressSink) {
        let percent = percent.min(100);
        let previous = self.progress.fetch_max(percent, Ordering::Relaxed);
        if percent > previous {
            sink.emit(ParserEvent::Progress(percent));
        }
    }
}

/// Integer percentage of `done` over `total`, 0 when `total` is 0.
pub(crate) fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let scaled = u128::from(done) * 100 / u128::from(total);
    scaled.min(100) as u8
}
