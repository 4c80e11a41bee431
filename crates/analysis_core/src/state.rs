use crate::view_model::{filter_options, AppViewModel};
use crate::{project, FormatTag, InfoNode, SourceDescriptor, StreamInfoSnapshot, NO_SOURCE_PROGRESS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    visible: bool,
    source: Option<SourceDescriptor>,
    parse_entire_source: bool,
    stream_filter: Option<usize>,
    color_code_streams: bool,
    progress: i32,
    failure: Option<String>,
    unsupported: Option<FormatTag>,
    stream_info: Vec<InfoNode>,
    filter_options: Vec<String>,
    dirty: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            visible: false,
            source: None,
            parse_entire_source: false,
            stream_filter: None,
            color_code_streams: false,
            progress: NO_SOURCE_PROGRESS,
            failure: None,
            unsupported: None,
            stream_info: Vec::new(),
            filter_options: Vec::new(),
            dirty: false,
        }
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> AppViewModel {
        AppViewModel {
            visible: self.visible,
            source_name: self.source.as_ref().map(SourceDescriptor::display_name),
            status_text: self.status_text(),
            progress: self.progress,
            analysis_enabled: self.analysis_enabled(),
            parse_entire_source: self.parse_entire_source,
            color_code_streams: self.color_code_streams,
            stream_info: self.stream_info.clone(),
            filter_options: self.filter_options.clone(),
            selected_filter_option: self.stream_filter.map_or(0, |index| index + 1),
            dirty: self.dirty,
        }
    }

    /// Returns whether the state changed since the last call, and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn source(&self) -> Option<&SourceDescriptor> {
        self.source.as_ref()
    }

    pub fn stream_filter(&self) -> Option<usize> {
        self.stream_filter
    }

    pub fn parse_entire_source(&self) -> bool {
        self.parse_entire_source
    }

    pub fn color_code_streams(&self) -> bool {
        self.color_code_streams
    }

    /// Parsing limit flag handed to the controller: the inverse of "parse entire source".
    pub fn parsing_limit(&self) -> bool {
        !self.parse_entire_source
    }

    fn analysis_enabled(&self) -> bool {
        self.source.is_some() && self.unsupported.is_none()
    }

    fn status_text(&self) -> String {
        if let Some(message) = &self.failure {
            return format!("Error parsing the file: {message}");
        }
        if let Some(format) = self.unsupported {
            return format!("No parser available for format {format}.");
        }
        project(self.progress, self.parsing_limit())
    }

    pub(crate) fn set_visible(&mut self, visible: bool) {
        if self.visible != visible {
            self.visible = visible;
            self.dirty = true;
        }
    }

    pub(crate) fn select_source(&mut self, source: Option<SourceDescriptor>) {
        // Results of the previous source never describe the new one.
        self.source = source;
        self.unsupported = None;
        self.progress = NO_SOURCE_PROGRESS;
        self.failure = None;
        self.clear_stream_info();
        self.dirty = true;
    }

    pub(crate) fn set_parse_entire_source(&mut self, entire: bool) {
        self.parse_entire_source = entire;
        self.dirty = true;
    }

    pub(crate) fn set_stream_filter(&mut self, filter: Option<usize>) {
        self.stream_filter = filter;
        self.dirty = true;
    }

    pub(crate) fn set_color_code_streams(&mut self, enabled: bool) {
        self.color_code_streams = enabled;
        self.dirty = true;
    }

    pub(crate) fn begin_job(&mut self) {
        self.progress = 0;
        self.failure = None;
        self.unsupported = None;
        self.clear_stream_info();
        self.dirty = true;
    }

    pub(crate) fn mark_unsupported(&mut self, format: FormatTag) {
        self.unsupported = Some(format);
        self.progress = NO_SOURCE_PROGRESS;
        self.failure = None;
        self.clear_stream_info();
        self.dirty = true;
    }

    pub(crate) fn clear_analysis(&mut self) {
        self.progress = NO_SOURCE_PROGRESS;
        self.failure = None;
        self.clear_stream_info();
        self.dirty = true;
    }

    /// Progress never moves backwards within one job.
    pub(crate) fn apply_progress(&mut self, percent: u8) {
        let percent = i32::from(percent.min(100));
        if percent > self.progress {
            self.progress = percent;
            self.dirty = true;
        }
    }

    /// Returns true when the stream filter pointed past the streams of the
    /// source and was reset to show all streams.
    pub(crate) fn apply_stream_info(&mut self, snapshot: StreamInfoSnapshot) -> bool {
        let stream_count = snapshot.stream_count();
        let mut filter_reset = false;
        // Rebuild the list only when the stream count changed so a user's
        // choice survives repeated updates.
        if self.filter_options.len() != stream_count + 1 {
            self.filter_options = filter_options(&snapshot.stream_summaries);
            // An empty snapshot arrives before the first stream is found.
            if stream_count > 0 && self.stream_filter.is_some_and(|s| s >= stream_count) {
                self.stream_filter = None;
                filter_reset = true;
            }
        }
        self.stream_info = snapshot.tree;
        self.dirty = true;
        filter_reset
    }

    pub(crate) fn finish(&mut self, failure: Option<String>) {
        self.progress = 100;
        self.failure = failure;
        self.dirty = true;
    }

    fn clear_stream_info(&mut self) {
        self.stream_info.clear();
        self.filter_options.clear();
    }
}
