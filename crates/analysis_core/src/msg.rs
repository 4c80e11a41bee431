use crate::{FormatTag, JobOutcome, SourceDescriptor, StreamInfoSnapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// Host changed the selected source; `None` when nothing analysable is selected.
    SourceSelected(Option<SourceDescriptor>),
    /// Analysis surface was shown.
    BecameVisible,
    /// Analysis surface was hidden.
    BecameHidden,
    /// User toggled "parse entire source".
    ParseEntireSourceToggled(bool),
    /// User picked an entry of the stream filter list; entry 0 shows all streams.
    StreamFilterChosen(usize),
    /// User toggled "color-code streams".
    ColorCodeStreamsToggled(bool),
    /// Restore user preferences loaded at startup.
    RestorePreferences {
        parse_entire_source: bool,
        stream_filter: Option<usize>,
        color_code_streams: bool,
    },
    /// Controller launched a worker for the current source.
    AnalysisStarted,
    /// Controller found no parser for the source format.
    AnalysisUnavailable { format: FormatTag },
    /// Controller was restarted without a source.
    AnalysisCleared,
    /// Worker progress for the current job.
    AnalysisProgress(u8),
    /// Worker published new stream information.
    StreamInfoReady(StreamInfoSnapshot),
    /// Worker finished.
    AnalysisCompleted(JobOutcome),
    /// UI/render tick to coalesce rendering.
    Tick,
    /// Fallback for placeholder wiring.
    NoOp,
}
