use crate::{AppState, Effect, JobOutcome, Msg};

/// Pure update function: applies a message to state and returns any effects.
///
/// This is the lifecycle gate. A worker only ever runs while the surface is
/// visible: showing restarts analysis of the current source, hiding stops it,
/// and a source change restarts only when visible.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::SourceSelected(source) => {
            state.select_source(source);
            if state.visible() {
                vec![restart_effect(&state)]
            } else {
                Vec::new()
            }
        }
        Msg::BecameVisible => {
            state.set_visible(true);
            vec![restart_effect(&state)]
        }
        Msg::BecameHidden => {
            state.set_visible(false);
            vec![Effect::Stop]
        }
        Msg::ParseEntireSourceToggled(entire) => {
            if entire == state.parse_entire_source() {
                return (state, Vec::new());
            }
            state.set_parse_entire_source(entire);
            let mut effects = vec![Effect::SetParsingLimit(state.parsing_limit())];
            if state.visible() && state.source().is_some() {
                effects.push(restart_effect(&state));
            }
            effects
        }
        Msg::StreamFilterChosen(entry) => {
            let filter = entry.checked_sub(1);
            if filter == state.stream_filter() {
                Vec::new()
            } else {
                state.set_stream_filter(filter);
                vec![Effect::SetStreamFilter(filter)]
            }
        }
        Msg::ColorCodeStreamsToggled(enabled) => {
            // Display option of the running parser; never restarts.
            if enabled == state.color_code_streams() {
                Vec::new()
            } else {
                state.set_color_code_streams(enabled);
                vec![Effect::SetStreamColorCoding(enabled)]
            }
        }
        Msg::RestorePreferences {
            parse_entire_source,
            stream_filter,
            color_code_streams,
        } => {
            state.set_parse_entire_source(parse_entire_source);
            state.set_stream_filter(stream_filter);
            state.set_color_code_streams(color_code_streams);
            vec![
                Effect::SetParsingLimit(state.parsing_limit()),
                Effect::SetStreamFilter(stream_filter),
                Effect::SetStreamColorCoding(color_code_streams),
            ]
        }
        Msg::AnalysisStarted => {
            state.begin_job();
            Vec::new()
        }
        Msg::AnalysisUnavailable { format } => {
            state.mark_unsupported(format);
            Vec::new()
        }
        Msg::AnalysisCleared => {
            state.clear_analysis();
            Vec::new()
        }
        Msg::AnalysisProgress(percent) => {
            state.apply_progress(percent);
            Vec::new()
        }
        Msg::StreamInfoReady(snapshot) => {
            if state.apply_stream_info(snapshot) {
                vec![Effect::SetStreamFilter(None)]
            } else {
                Vec::new()
            }
        }
        Msg::AnalysisCompleted(outcome) => {
            match outcome {
                JobOutcome::Finished => state.finish(None),
                JobOutcome::Failed(message) => state.finish(Some(message)),
                // A user-initiated stop is silent.
                JobOutcome::Cancelled => {}
            }
            Vec::new()
        }
        Msg::Tick | Msg::NoOp => Vec::new(),
    };

    (state, effects)
}

fn restart_effect(state: &AppState) -> Effect {
    Effect::Restart {
        source: state.source().cloned(),
        parsing_limit: state.parsing_limit(),
    }
}
