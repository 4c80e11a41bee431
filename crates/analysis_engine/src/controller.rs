//! Job controller: owns at most one parser handle and its worker thread.

use std::sync::mpsc::{self, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use analysis_core::{JobOutcome, SourceDescriptor, StreamInfoSnapshot, NO_SOURCE_PROGRESS};
use analysis_logging::{analysis_debug, analysis_error, analysis_info, analysis_warn};

use crate::{
    AnalysisEvent, AnalysisSettings, BitrateModel, ChannelProgressSink, ControllerError,
    FormatSelector, Generation, JobState, ObserverBinder, ObserverSet, PacketModel, ParserEvent,
    ParserStrategy, ProgressSink, RestartOutcome, RunStatus, StrategySelector,
};

/// One parser strategy plus the worker running it.
///
/// Dropping a handle requests an abort and joins the worker first, so the
/// strategy is never released while `run` is still executing.
struct ParserHandle {
    generation: Generation,
    source: SourceDescriptor,
    strategy: Arc<dyn ParserStrategy>,
    events: mpsc::Receiver<ParserEvent>,
    worker: Option<JoinHandle<()>>,
}

impl ParserHandle {
    fn launch(
        generation: Generation,
        source: SourceDescriptor,
        strategy: Box<dyn ParserStrategy>,
    ) -> Result<Self, ControllerError> {
        let strategy: Arc<dyn ParserStrategy> = Arc::from(strategy);
        let (event_tx, events) = mpsc::channel();

        let worker_strategy = Arc::clone(&strategy);
        let worker_source = source.clone();
        let worker = thread::Builder::new()
            .name(format!("analysis-worker-{generation}"))
            .spawn(move || {
                analysis_logging::set_job_generation(generation.get());
                let sink = ChannelProgressSink::new(event_tx);
                let outcome = run_strategy(worker_strategy.as_ref(), &worker_source, &sink);
                sink.emit(ParserEvent::Completed(outcome));
            })?;

        Ok(Self {
            generation,
            source,
            strategy,
            events,
            worker: Some(worker),
        })
    }

    fn worker_active(&self) -> bool {
        self.worker.is_some()
    }

    /// Waits for the worker thread to return. Must only be called once the
    /// worker has finished or was asked to abort.
    fn join_worker(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        if worker.join().is_err() {
            analysis_error!("analysis worker {} panicked", self.generation);
        }
        analysis_debug!("analysis worker {} exited", self.generation);
    }

    fn abort_and_join(&mut self) {
        if self.worker_active() {
            analysis_info!(
                "stopping {} worker {}",
                self.strategy.name(),
                self.generation
            );
            self.strategy.request_abort();
            self.join_worker();
        }
    }

    fn snapshot(&self) -> StreamInfoSnapshot {
        let strategy = self.strategy.as_ref();
        StreamInfoSnapshot {
            tree: strategy.stream_info(),
            stream_summaries: (0..strategy.stream_count())
                .filter_map(|stream| strategy.stream_summary(stream))
                .collect(),
        }
    }
}

impl Drop for ParserHandle {
    fn drop(&mut self) {
        self.abort_and_join();
        if Arc::strong_count(&self.strategy) != 1 {
            analysis_warn!(
                "parser {} released while still shared",
                self.generation
            );
        }
        analysis_debug!("parser {} released", self.generation);
    }
}

fn run_strategy(
    strategy: &dyn ParserStrategy,
    source: &SourceDescriptor,
    sink: &dyn ProgressSink,
) -> JobOutcome {
    match strategy.run(source, sink) {
        Ok(RunStatus::Finished) | Ok(RunStatus::LimitReached) => {
            analysis_info!("{} finished", strategy.name());
            JobOutcome::Finished
        }
        Ok(RunStatus::Aborted) => {
            analysis_info!("{} aborted", strategy.name());
            JobOutcome::Cancelled
        }
        Err(err) => {
            analysis_warn!("{} failed: {}", strategy.name(), err);
            JobOutcome::Failed(err.to_string())
        }
    }
}

/// Starts, restarts and tears down the single background analysis job.
///
/// Every method must be called from one supervising thread. Worker reports
/// queue up until [`JobController::pump_events`] delivers them to the bound
/// observers on that thread.
pub struct JobController {
    selector: Box<dyn StrategySelector>,
    binder: Box<dyn ObserverBinder>,
    observers: ObserverSet,
    handle: Option<ParserHandle>,
    parsing_limit: bool,
    stream_filter: Option<usize>,
    stream_color_coding: bool,
    next_generation: Generation,
}

impl JobController {
    pub fn new(
        selector: impl StrategySelector + 'static,
        binder: impl ObserverBinder + 'static,
    ) -> Self {
        Self {
            selector: Box::new(selector),
            binder: Box::new(binder),
            observers: ObserverSet::new(),
            handle: None,
            parsing_limit: true,
            stream_filter: None,
            stream_color_coding: false,
            next_generation: Generation::first(),
        }
    }

    /// Controller backed by the built-in strategies.
    pub fn with_settings(
        settings: AnalysisSettings,
        binder: impl ObserverBinder + 'static,
    ) -> Self {
        Self::new(FormatSelector::new(settings), binder)
    }

    pub fn state(&self) -> JobState {
        match &self.handle {
            None => JobState::Idle,
            Some(handle) if handle.worker_active() => JobState::Running,
            Some(_) => JobState::StoppingConfirmed,
        }
    }

    /// Generation of the live handle.
    pub fn generation(&self) -> Option<Generation> {
        self.handle.as_ref().map(|handle| handle.generation)
    }

    pub fn source(&self) -> Option<&SourceDescriptor> {
        self.handle.as_ref().map(|handle| &handle.source)
    }

    pub fn parsing_limit(&self) -> bool {
        self.parsing_limit
    }

    pub fn stream_filter(&self) -> Option<usize> {
        self.stream_filter
    }

    pub fn stream_color_coding(&self) -> bool {
        self.stream_color_coding
    }

    /// Stops the current job, then starts one for `source` if a parser exists.
    ///
    /// Without a source, or without a parser for its format, the controller
    /// stays idle and the host is expected to clear its analysis display.
    pub fn restart(
        &mut self,
        source: Option<SourceDescriptor>,
        parsing_limit: bool,
    ) -> Result<RestartOutcome, ControllerError> {
        self.stop();
        self.parsing_limit = parsing_limit;

        let Some(source) = source else {
            analysis_debug!("restart without source; staying idle");
            return Ok(RestartOutcome::NoSource);
        };
        let format = source.format();
        let Some(strategy) = self.selector.select(format) else {
            analysis_warn!("no parser available for {} ({:?})", format, source.path());
            return Ok(RestartOutcome::Unsupported(format));
        };
        strategy.set_parsing_limit_enabled(parsing_limit);
        strategy.set_stream_filter(self.stream_filter);
        strategy.set_stream_color_coding(self.stream_color_coding);

        let generation = self.next_generation;
        self.next_generation = generation.next();
        self.observers.rebind(generation);
        self.binder.bind(generation, &mut self.observers);

        let name = strategy.name();
        match ParserHandle::launch(generation, source, strategy) {
            Ok(handle) => {
                analysis_info!(
                    "started {} worker {} for {:?} (limit {})",
                    name,
                    generation,
                    handle.source.path(),
                    parsing_limit
                );
                self.handle = Some(handle);
                Ok(RestartOutcome::Started(generation))
            }
            Err(err) => {
                self.observers.unbind();
                analysis_error!("{}", err);
                Err(err)
            }
        }
    }

    /// Unbinds observers, aborts the worker and blocks until it has exited,
    /// then releases the handle. No-op when idle.
    ///
    /// There is no timeout: a strategy that never honours the abort request
    /// blocks this call indefinitely.
    pub fn stop(&mut self) {
        let Some(mut handle) = self.handle.take() else {
            return;
        };
        self.observers.unbind();
        handle.abort_and_join();
        let dropped = handle.events.try_iter().count();
        if dropped > 0 {
            analysis_debug!(
                "discarded {} pending events of parser {}",
                dropped,
                handle.generation
            );
        }
    }

    /// Selects the stream to display. Applied to the live parser immediately
    /// and remembered for the next restart.
    pub fn set_filter(&mut self, stream: Option<usize>) {
        self.stream_filter = stream;
        if let Some(handle) = &self.handle {
            handle.strategy.set_stream_filter(stream);
        }
    }

    /// Tints packet and bitrate rows by stream. Like the filter, it reaches
    /// the live parser without a restart.
    pub fn set_stream_color_coding(&mut self, enabled: bool) {
        self.stream_color_coding = enabled;
        if let Some(handle) = &self.handle {
            handle.strategy.set_stream_color_coding(enabled);
        }
    }

    /// Takes effect on the next restart; a running job keeps its limit.
    pub fn set_parsing_limit(&mut self, enabled: bool) {
        self.parsing_limit = enabled;
    }

    /// [`NO_SOURCE_PROGRESS`] without a handle, else the parser's last progress.
    pub fn progress_percent(&self) -> i32 {
        self.handle
            .as_ref()
            .map_or(NO_SOURCE_PROGRESS, |handle| {
                i32::from(handle.strategy.progress_percent())
            })
    }

    pub fn stream_info(&self) -> Option<StreamInfoSnapshot> {
        self.handle.as_ref().map(ParserHandle::snapshot)
    }

    pub fn packet_model(&self) -> Option<Arc<PacketModel>> {
        self.handle
            .as_ref()
            .map(|handle| handle.strategy.packet_model())
    }

    pub fn bitrate_model(&self) -> Option<Arc<BitrateModel>> {
        self.handle
            .as_ref()
            .map(|handle| handle.strategy.bitrate_model())
    }

    /// Delivers queued worker reports to the bound observers, in the order
    /// the worker produced them. Returns the number of events delivered.
    ///
    /// A `Completed` report is the worker's last act, so the worker is joined
    /// right after it arrives.
    pub fn pump_events(&mut self) -> usize {
        let Self {
            handle, observers, ..
        } = self;
        let Some(handle) = handle.as_mut() else {
            return 0;
        };

        let mut delivered = 0;
        loop {
            let event = match handle.events.try_recv() {
                Ok(ParserEvent::Progress(percent)) => AnalysisEvent::ProgressChanged(percent),
                Ok(ParserEvent::StreamInfoUpdated) => {
                    AnalysisEvent::StreamInfoReady(handle.snapshot())
                }
                Ok(ParserEvent::Completed(outcome)) => {
                    handle.join_worker();
                    AnalysisEvent::Completed(outcome)
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !handle.worker_active() {
                        break;
                    }
                    // The worker died without reporting.
                    handle.join_worker();
                    AnalysisEvent::Completed(JobOutcome::Failed(
                        "analysis worker exited unexpectedly".to_string(),
                    ))
                }
            };
            if observers.deliver(handle.generation, &event) {
                delivered += 1;
            }
        }
        delivered
    }
}

impl Drop for JobController {
    fn drop(&mut self) {
        self.stop();
    }
}
