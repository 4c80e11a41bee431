use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use analysis_core::{update, AppState, FormatTag, Msg, SourceDescriptor};
use analysis_engine::{AnalysisSettings, JobState};
use analysis_logging::{analysis_info, analysis_warn};
use anyhow::Context;

use super::effects::EffectRunner;
use super::render::{self, Report};
use super::settings::{self, Preferences};
use super::{logging, LogDestination};
use crate::Cli;

/// Interval between event pumps; also the render throttle.
const TICK: Duration = Duration::from_millis(75);

pub fn run_app(cli: Cli) -> anyhow::Result<()> {
    let settings_dir =
        std::env::current_dir().context("could not determine working directory")?;
    let stored = settings::load(&settings_dir);
    let destination = cli
        .log
        .or_else(|| stored.as_ref().ok().map(|p| p.log_destination))
        .unwrap_or_default();
    logging::initialize(destination);

    let preferences = match stored {
        Ok(preferences) => preferences,
        Err(err) => {
            analysis_warn!("{}; using default preferences", err);
            Preferences::default()
        }
    };

    let format = cli.format.parse::<FormatTag>().unwrap_or_else(|err| {
        analysis_warn!("{}; no parser will be selected", err);
        FormatTag::Unknown
    });
    let source = SourceDescriptor::new(cli.path.clone(), format);

    let mut host = Host::new(AnalysisSettings::default(), !cli.json);
    host.dispatch(Msg::RestorePreferences {
        parse_entire_source: cli.parse_entire.unwrap_or(preferences.parse_entire_source),
        stream_filter: cli.stream.or(preferences.stream_filter),
        color_code_streams: cli.color_code.unwrap_or(preferences.color_code_streams),
    })?;
    host.dispatch(Msg::SourceSelected(Some(source)))?;
    host.dispatch(Msg::BecameVisible)?;

    let hide_after = cli.hide_after_ms.map(Duration::from_millis);
    if !host.run_until_settled(hide_after)? {
        analysis_info!("hiding analysis before the job completed");
        host.dispatch(Msg::BecameHidden)?;
    }

    let output = host.report(cli.json)?;
    println!("{output}");

    if host.state.visible() {
        host.dispatch(Msg::BecameHidden)?;
    }
    save_preferences(&settings_dir, &host.state, destination);
    Ok(())
}

fn save_preferences(dir: &Path, state: &AppState, log_destination: LogDestination) {
    let preferences = Preferences {
        parse_entire_source: state.parse_entire_source(),
        stream_filter: state.stream_filter(),
        color_code_streams: state.color_code_streams(),
        log_destination,
    };
    if let Err(err) = settings::save(dir, &preferences) {
        analysis_warn!("{}", err);
    }
}

/// Owns the state and drives the update loop on the supervising thread.
struct Host {
    state: AppState,
    runner: EffectRunner,
    msg_rx: mpsc::Receiver<Msg>,
    live_status: bool,
}

impl Host {
    fn new(settings: AnalysisSettings, live_status: bool) -> Self {
        let (msg_tx, msg_rx) = mpsc::channel();
        Self {
            state: AppState::new(),
            runner: EffectRunner::new(settings, msg_tx),
            msg_rx,
            live_status,
        }
    }

    /// Applies `msg` and every message it causes, in order.
    fn dispatch(&mut self, msg: Msg) -> anyhow::Result<()> {
        self.apply(msg)?;
        self.process_pending_messages()
    }

    fn apply(&mut self, msg: Msg) -> anyhow::Result<()> {
        let state = std::mem::take(&mut self.state);
        let (state, effects) = update(state, msg);
        self.state = state;
        self.runner
            .enqueue(effects)
            .context("could not start the analysis worker")
    }

    fn process_pending_messages(&mut self) -> anyhow::Result<()> {
        while let Ok(msg) = self.msg_rx.try_recv() {
            self.apply(msg)?;
        }
        Ok(())
    }

    /// Pumps controller events until the job stops running. Returns false
    /// when `hide_after` elapsed first.
    fn run_until_settled(&mut self, hide_after: Option<Duration>) -> anyhow::Result<bool> {
        let started = Instant::now();
        loop {
            self.runner.pump_events();
            self.process_pending_messages()?;
            self.dispatch(Msg::Tick)?;
            self.render_if_dirty();

            if self.runner.job_state() != JobState::Running {
                return Ok(true);
            }
            if hide_after.is_some_and(|limit| started.elapsed() >= limit) {
                return Ok(false);
            }
            thread::sleep(TICK);
        }
    }

    fn render_if_dirty(&mut self) {
        if self.state.consume_dirty() && self.live_status {
            eprintln!("{}", render::status_line(&self.state.view()));
        }
    }

    fn report(&self, json: bool) -> anyhow::Result<String> {
        let view = self.state.view();
        let controller = self.runner.controller();
        let report = Report {
            view: &view,
            packets: controller.packet_model().map(|model| model.visible_len()),
            bitrate_windows: controller.bitrate_model().map(|model| model.visible_len()),
        };
        if json {
            render::render_json(&report).context("could not serialize report")
        } else {
            Ok(render::render_text(&report))
        }
    }
}
