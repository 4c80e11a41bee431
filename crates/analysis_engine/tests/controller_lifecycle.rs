use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex, Once};
use std::thread;
use std::time::{Duration, Instant};

use analysis_core::{
    update, AppState, Effect, FormatTag, InfoNode, JobOutcome, Msg, SourceDescriptor,
    StreamInfoSnapshot, NO_SOURCE_PROGRESS,
};
use analysis_engine::{
    AnalysisEvent, BitrateModel, EventKind, Generation, JobController, JobState, ObserverSet,
    PacketModel, ParseError, ParserEvent, ParserStrategy, ProgressSink, RestartOutcome,
    RunStatus, StrategyControls, StrategySelector,
};
use pretty_assertions::assert_eq;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(analysis_logging::initialize_for_tests);
}

enum Step {
    Progress(u8),
    StreamInfo,
    Finish,
    Fail,
}

#[derive(Default)]
struct WorkerTally {
    active: AtomicUsize,
    peak: AtomicUsize,
    started: AtomicUsize,
    exited: AtomicUsize,
    limit_seen: AtomicBool,
}

impl WorkerTally {
    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.exited.fetch_add(1, Ordering::SeqCst);
    }
}

/// Strategy driven step by step from the test through a channel.
struct GatedStrategy {
    controls: StrategyControls,
    tally: Arc<WorkerTally>,
    steps: Mutex<mpsc::Receiver<Step>>,
    packets: Arc<PacketModel>,
    bitrate: Arc<BitrateModel>,
}

impl ParserStrategy for GatedStrategy {
    fn name(&self) -> &'static str {
        "gated"
    }

    fn run(
        &self,
        _source: &SourceDescriptor,
        sink: &dyn ProgressSink,
    ) -> Result<RunStatus, ParseError> {
        self.tally
            .limit_seen
            .store(self.controls.parsing_limit_enabled(), Ordering::SeqCst);
        self.tally.enter();
        let steps = self.steps.lock().unwrap();
        let result = loop {
            if self.controls.abort_requested() {
                // Linger so an unjoined worker would overlap with its successor.
                thread::sleep(Duration::from_millis(20));
                break Ok(RunStatus::Aborted);
            }
            match steps.recv_timeout(Duration::from_millis(2)) {
                Ok(Step::Progress(percent)) => self.controls.advance_progress(percent, sink),
                Ok(Step::StreamInfo) => sink.emit(ParserEvent::StreamInfoUpdated),
                Ok(Step::Finish) => {
                    self.controls.advance_progress(100, sink);
                    break Ok(RunStatus::Finished);
                }
                Ok(Step::Fail) => {
                    break Err(ParseError::NoSyncFound {
                        format: FormatTag::AnnexBHevc,
                    })
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    thread::sleep(Duration::from_millis(2))
                }
            }
        };
        self.tally.exit();
        result
    }

    fn request_abort(&self) {
        self.controls.request_abort();
    }

    fn set_parsing_limit_enabled(&self, enabled: bool) {
        self.controls.set_parsing_limit_enabled(enabled);
    }

    fn set_stream_filter(&self, stream: Option<usize>) {
        self.controls.set_stream_filter(stream);
        self.packets.set_filter(stream);
    }

    fn set_stream_color_coding(&self, enabled: bool) {
        self.controls.set_stream_color_coding(enabled);
        self.packets.set_color_coding(enabled);
    }

    fn progress_percent(&self) -> u8 {
        self.controls.progress()
    }

    fn stream_count(&self) -> usize {
        2
    }

    fn stream_summary(&self, stream: usize) -> Option<String> {
        (stream < 2).then(|| format!("gated {stream}"))
    }

    fn stream_info(&self) -> Vec<InfoNode> {
        vec![InfoNode::leaf("Gate", "open")]
    }

    fn packet_model(&self) -> Arc<PacketModel> {
        Arc::clone(&self.packets)
    }

    fn bitrate_model(&self) -> Arc<BitrateModel> {
        Arc::clone(&self.bitrate)
    }
}

#[derive(Clone, Default)]
struct GatedSelector {
    tally: Arc<WorkerTally>,
    gates: Arc<Mutex<Vec<mpsc::Sender<Step>>>>,
}

impl GatedSelector {
    /// Sends a step to the most recently created strategy.
    fn send(&self, step: Step) {
        let gates = self.gates.lock().unwrap();
        // The strategy may already be gone; that is what some tests check.
        let _ = gates.last().expect("a strategy was selected").send(step);
    }
}

impl StrategySelector for GatedSelector {
    fn select(&self, format: FormatTag) -> Option<Box<dyn ParserStrategy>> {
        if format == FormatTag::Unknown {
            return None;
        }
        let (tx, rx) = mpsc::channel();
        self.gates.lock().unwrap().push(tx);
        Some(Box::new(GatedStrategy {
            controls: StrategyControls::new(),
            tally: Arc::clone(&self.tally),
            steps: Mutex::new(rx),
            packets: Arc::new(PacketModel::new()),
            bitrate: Arc::new(BitrateModel::new()),
        }))
    }
}

type EventLog = Rc<RefCell<Vec<(u64, AnalysisEvent)>>>;

fn recording_binder(log: EventLog) -> impl FnMut(Generation, &mut ObserverSet) {
    move |generation, observers| {
        for kind in [
            EventKind::ProgressChanged,
            EventKind::StreamInfoReady,
            EventKind::Completed,
        ] {
            let log = Rc::clone(&log);
            observers.subscribe(kind, move |event| {
                log.borrow_mut().push((generation.get(), event.clone()))
            });
        }
    }
}

fn setup() -> (JobController, GatedSelector, EventLog) {
    init_logging();
    let selector = GatedSelector::default();
    let log = EventLog::default();
    let controller = JobController::new(selector.clone(), recording_binder(Rc::clone(&log)));
    (controller, selector, log)
}

fn source() -> SourceDescriptor {
    SourceDescriptor::new("/media/gated.hevc", FormatTag::AnnexBHevc)
}

fn pump_until(controller: &mut JobController, mut done: impl FnMut(&JobController) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        controller.pump_events();
        if done(controller) {
            return;
        }
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(2));
    }
}

fn logged(log: &EventLog, event: &AnalysisEvent) -> bool {
    log.borrow().iter().any(|(_, seen)| seen == event)
}

#[test]
fn restart_launches_worker_and_delivers_progress() {
    let (mut controller, selector, log) = setup();

    let outcome = controller.restart(Some(source()), true).unwrap();
    assert!(matches!(outcome, RestartOutcome::Started(_)));
    assert_eq!(controller.state(), JobState::Running);
    assert_eq!(controller.progress_percent(), 0);

    selector.send(Step::Progress(30));
    pump_until(&mut controller, |_| {
        logged(&log, &AnalysisEvent::ProgressChanged(30))
    });
    assert_eq!(controller.progress_percent(), 30);
}

#[test]
fn stop_waits_for_worker_and_is_terminal() {
    let (mut controller, selector, log) = setup();
    controller.restart(Some(source()), true).unwrap();
    selector.send(Step::Progress(30));
    pump_until(&mut controller, |c| c.progress_percent() == 30);

    controller.stop();

    assert_eq!(selector.tally.active.load(Ordering::SeqCst), 0);
    assert_eq!(selector.tally.exited.load(Ordering::SeqCst), 1);
    assert_eq!(controller.state(), JobState::Idle);
    assert_eq!(controller.progress_percent(), NO_SOURCE_PROGRESS);

    let events_before = log.borrow().len();
    selector.send(Step::Progress(60));
    thread::sleep(Duration::from_millis(10));
    assert_eq!(controller.pump_events(), 0);
    assert_eq!(log.borrow().len(), events_before);
    assert_eq!(controller.progress_percent(), NO_SOURCE_PROGRESS);
}

#[test]
fn stop_when_idle_is_a_noop() {
    let (mut controller, selector, _log) = setup();
    controller.stop();
    controller.stop();
    assert_eq!(controller.state(), JobState::Idle);
    assert_eq!(selector.tally.started.load(Ordering::SeqCst), 0);
}

#[test]
fn restart_supersedes_previous_worker() {
    let (mut controller, selector, log) = setup();
    let first = match controller.restart(Some(source()), true).unwrap() {
        RestartOutcome::Started(generation) => generation,
        other => panic!("unexpected outcome {other:?}"),
    };

    // Produce an event in the first job but never pump it.
    selector.send(Step::Progress(20));
    let deadline = Instant::now() + Duration::from_secs(5);
    while controller.progress_percent() != 20 {
        assert!(Instant::now() < deadline);
        thread::sleep(Duration::from_millis(2));
    }

    let second = match controller.restart(Some(source()), true).unwrap() {
        RestartOutcome::Started(generation) => generation,
        other => panic!("unexpected outcome {other:?}"),
    };
    assert!(second > first);
    assert_eq!(controller.generation(), Some(second));
    assert_eq!(selector.tally.exited.load(Ordering::SeqCst), 1);
    assert_eq!(controller.progress_percent(), 0);

    selector.send(Step::Progress(5));
    pump_until(&mut controller, |_| {
        logged(&log, &AnalysisEvent::ProgressChanged(5))
    });

    assert!(log.borrow().iter().all(|(generation, _)| *generation == second.get()));
    assert_eq!(selector.tally.peak.load(Ordering::SeqCst), 1);
}

#[test]
fn at_most_one_worker_across_many_restarts() {
    let (mut controller, selector, _log) = setup();

    for round in 0..20 {
        controller.restart(Some(source()), round % 2 == 0).unwrap();
        if round % 3 == 0 {
            selector.send(Step::Progress(round as u8));
        }
        if round % 5 == 0 {
            controller.stop();
        }
    }
    controller.stop();

    assert_eq!(selector.tally.peak.load(Ordering::SeqCst), 1);
    assert_eq!(selector.tally.active.load(Ordering::SeqCst), 0);
    assert_eq!(
        selector.tally.started.load(Ordering::SeqCst),
        selector.tally.exited.load(Ordering::SeqCst)
    );
}

#[test]
fn filter_changes_do_not_restart() {
    let (mut controller, selector, _log) = setup();
    controller.restart(Some(source()), true).unwrap();
    let generation = controller.generation();
    selector.send(Step::Progress(40));
    pump_until(&mut controller, |c| c.progress_percent() == 40);

    controller.set_filter(Some(1));

    assert_eq!(controller.state(), JobState::Running);
    assert_eq!(controller.generation(), generation);
    assert_eq!(controller.progress_percent(), 40);
    assert_eq!(controller.packet_model().unwrap().filter(), Some(1));
    assert_eq!(selector.tally.started.load(Ordering::SeqCst), 1);
}

#[test]
fn filter_set_while_idle_is_applied_on_restart() {
    let (mut controller, _selector, _log) = setup();
    controller.set_filter(Some(3));
    assert_eq!(controller.state(), JobState::Idle);

    controller.restart(Some(source()), true).unwrap();
    assert_eq!(controller.packet_model().unwrap().filter(), Some(3));
}

#[test]
fn color_coding_reaches_running_parser_without_restart() {
    let (mut controller, selector, _log) = setup();
    controller.restart(Some(source()), true).unwrap();
    let generation = controller.generation();
    selector.send(Step::Progress(30));
    pump_until(&mut controller, |c| c.progress_percent() == 30);

    controller.set_stream_color_coding(true);

    assert_eq!(controller.state(), JobState::Running);
    assert_eq!(controller.generation(), generation);
    assert!(controller.packet_model().unwrap().color_coding());
    assert_eq!(selector.tally.started.load(Ordering::SeqCst), 1);
}

#[test]
fn color_coding_survives_restart() {
    let (mut controller, _selector, _log) = setup();
    controller.set_stream_color_coding(true);
    assert!(controller.stream_color_coding());

    controller.restart(Some(source()), true).unwrap();
    assert!(controller.packet_model().unwrap().color_coding());

    controller.set_stream_color_coding(false);
    controller.restart(Some(source()), true).unwrap();
    assert!(!controller.packet_model().unwrap().color_coding());
}

#[test]
fn parsing_limit_applies_on_next_restart_only() {
    let (mut controller, selector, _log) = setup();
    controller.restart(Some(source()), true).unwrap();
    pump_until(&mut controller, |_| {
        selector.tally.started.load(Ordering::SeqCst) == 1
    });
    assert!(selector.tally.limit_seen.load(Ordering::SeqCst));

    controller.set_parsing_limit(false);
    assert!(selector.tally.limit_seen.load(Ordering::SeqCst));

    let limit = controller.parsing_limit();
    controller.restart(Some(source()), limit).unwrap();
    pump_until(&mut controller, |_| {
        selector.tally.started.load(Ordering::SeqCst) == 2
    });
    assert!(!selector.tally.limit_seen.load(Ordering::SeqCst));
}

#[test]
fn natural_completion_confirms_worker_exit_and_keeps_results() {
    let (mut controller, selector, log) = setup();
    controller.restart(Some(source()), false).unwrap();
    selector.send(Step::Progress(50));
    selector.send(Step::Finish);

    pump_until(&mut controller, |_| {
        logged(&log, &AnalysisEvent::Completed(JobOutcome::Finished))
    });

    assert_eq!(controller.state(), JobState::StoppingConfirmed);
    assert_eq!(controller.progress_percent(), 100);
    assert!(controller.packet_model().is_some());
    assert_eq!(controller.source(), Some(&source()));
    assert_eq!(controller.stream_info().unwrap().stream_count(), 2);
    let progress: Vec<_> = log
        .borrow()
        .iter()
        .filter_map(|(_, event)| match event {
            AnalysisEvent::ProgressChanged(p) => Some(*p),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![50, 100]);

    controller.stop();
    assert_eq!(controller.state(), JobState::Idle);
}

#[test]
fn worker_failure_is_reported_as_completion() {
    let (mut controller, selector, log) = setup();
    controller.restart(Some(source()), true).unwrap();
    selector.send(Step::Fail);

    let expected = AnalysisEvent::Completed(JobOutcome::Failed(
        "no Annex-B HEVC sync point found".to_string(),
    ));
    pump_until(&mut controller, |_| logged(&log, &expected));
    assert_eq!(controller.state(), JobState::StoppingConfirmed);
}

#[test]
fn stream_info_event_carries_snapshot() {
    let (mut controller, selector, log) = setup();
    controller.restart(Some(source()), true).unwrap();
    selector.send(Step::StreamInfo);

    let expected = AnalysisEvent::StreamInfoReady(StreamInfoSnapshot {
        tree: vec![InfoNode::leaf("Gate", "open")],
        stream_summaries: vec!["gated 0".to_string(), "gated 1".to_string()],
    });
    pump_until(&mut controller, |_| logged(&log, &expected));
}

#[test]
fn unsupported_format_stays_idle() {
    let (mut controller, selector, _log) = setup();
    let unknown = SourceDescriptor::new("/media/blob.bin", FormatTag::Unknown);

    let outcome = controller.restart(Some(unknown), true).unwrap();

    assert_eq!(outcome, RestartOutcome::Unsupported(FormatTag::Unknown));
    assert_eq!(controller.state(), JobState::Idle);
    assert_eq!(controller.progress_percent(), NO_SOURCE_PROGRESS);
    assert_eq!(selector.tally.started.load(Ordering::SeqCst), 0);
}

#[test]
fn restart_without_source_stops_running_job() {
    let (mut controller, selector, _log) = setup();
    controller.restart(Some(source()), true).unwrap();

    let outcome = controller.restart(None, true).unwrap();

    assert_eq!(outcome, RestartOutcome::NoSource);
    assert_eq!(controller.state(), JobState::Idle);
    assert_eq!(selector.tally.active.load(Ordering::SeqCst), 0);
}

#[test]
fn dropping_controller_joins_worker() {
    let (mut controller, selector, _log) = setup();
    controller.restart(Some(source()), true).unwrap();
    pump_until(&mut controller, |_| {
        selector.tally.started.load(Ordering::SeqCst) == 1
    });

    drop(controller);

    assert_eq!(selector.tally.active.load(Ordering::SeqCst), 0);
    assert_eq!(selector.tally.exited.load(Ordering::SeqCst), 1);
}

fn apply(controller: &mut JobController, effects: Vec<Effect>) {
    for effect in effects {
        match effect {
            Effect::Restart {
                source,
                parsing_limit,
            } => {
                controller.restart(source, parsing_limit).unwrap();
            }
            Effect::Stop => controller.stop(),
            Effect::SetStreamFilter(stream) => controller.set_filter(stream),
            Effect::SetParsingLimit(enabled) => controller.set_parsing_limit(enabled),
            Effect::SetStreamColorCoding(enabled) => controller.set_stream_color_coding(enabled),
        }
    }
}

#[test]
fn hiding_stops_and_showing_starts_fresh() {
    let (mut controller, selector, _log) = setup();
    let (state, effects) = update(AppState::new(), Msg::SourceSelected(Some(source())));
    apply(&mut controller, effects);
    assert_eq!(controller.state(), JobState::Idle, "hidden surface holds no worker");

    let (state, effects) = update(state, Msg::BecameVisible);
    apply(&mut controller, effects);
    assert_eq!(controller.state(), JobState::Running);
    let first = controller.generation();
    selector.send(Step::Progress(70));
    pump_until(&mut controller, |c| c.progress_percent() == 70);

    let (state, effects) = update(state, Msg::BecameHidden);
    apply(&mut controller, effects);
    assert_eq!(controller.state(), JobState::Idle);

    let (_state, effects) = update(state, Msg::BecameVisible);
    apply(&mut controller, effects);
    assert_eq!(controller.state(), JobState::Running);
    assert_ne!(controller.generation(), first);
    assert_eq!(controller.progress_percent(), 0);
}
