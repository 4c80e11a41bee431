use std::sync::mpsc;

use analysis_core::{Effect, Msg};
use analysis_engine::{
    AnalysisEvent, AnalysisSettings, ControllerError, EventKind, Generation, JobController,
    JobState, ObserverSet, RestartOutcome,
};
use analysis_logging::{analysis_debug, analysis_info};

/// Applies lifecycle effects to the job controller and feeds its results
/// back to the update loop as messages.
pub struct EffectRunner {
    controller: JobController,
    msg_tx: mpsc::Sender<Msg>,
}

impl EffectRunner {
    pub fn new(settings: AnalysisSettings, msg_tx: mpsc::Sender<Msg>) -> Self {
        let controller = JobController::with_settings(settings, forward_events(msg_tx.clone()));
        Self { controller, msg_tx }
    }

    pub fn enqueue(&mut self, effects: Vec<Effect>) -> Result<(), ControllerError> {
        for effect in effects {
            match effect {
                Effect::Restart {
                    source,
                    parsing_limit,
                } => {
                    let msg = match self.controller.restart(source, parsing_limit)? {
                        RestartOutcome::Started(generation) => {
                            analysis_debug!("job {} started", generation);
                            Msg::AnalysisStarted
                        }
                        RestartOutcome::NoSource => Msg::AnalysisCleared,
                        RestartOutcome::Unsupported(format) => {
                            analysis_info!("no analysis available for {}", format);
                            Msg::AnalysisUnavailable { format }
                        }
                    };
                    let _ = self.msg_tx.send(msg);
                }
                Effect::Stop => self.controller.stop(),
                Effect::SetStreamFilter(stream) => self.controller.set_filter(stream),
                Effect::SetParsingLimit(enabled) => self.controller.set_parsing_limit(enabled),
                Effect::SetStreamColorCoding(enabled) => {
                    self.controller.set_stream_color_coding(enabled)
                }
            }
        }
        Ok(())
    }

    /// Delivers pending worker reports; observers turn them into messages.
    pub fn pump_events(&mut self) -> usize {
        self.controller.pump_events()
    }

    pub fn job_state(&self) -> JobState {
        self.controller.state()
    }

    pub fn controller(&self) -> &JobController {
        &self.controller
    }
}

/// Subscribes every event kind of each new job and forwards it as a [`Msg`].
fn forward_events(msg_tx: mpsc::Sender<Msg>) -> impl FnMut(Generation, &mut ObserverSet) {
    move |generation, observers| {
        analysis_debug!("binding observers to job {}", generation);
        for kind in [
            EventKind::ProgressChanged,
            EventKind::StreamInfoReady,
            EventKind::Completed,
        ] {
            let msg_tx = msg_tx.clone();
            observers.subscribe(kind, move |event| {
                let _ = msg_tx.send(event_msg(event));
            });
        }
    }
}

fn event_msg(event: &AnalysisEvent) -> Msg {
    match event {
        AnalysisEvent::ProgressChanged(percent) => Msg::AnalysisProgress(*percent),
        AnalysisEvent::StreamInfoReady(snapshot) => Msg::StreamInfoReady(snapshot.clone()),
        AnalysisEvent::Completed(outcome) => Msg::AnalysisCompleted(outcome.clone()),
    }
}
