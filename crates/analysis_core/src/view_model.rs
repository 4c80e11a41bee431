use serde::Serialize;

use crate::InfoNode;

/// First entry of the stream filter list.
pub const SHOW_ALL_STREAMS: &str = "Show all streams";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppViewModel {
    pub visible: bool,
    pub source_name: Option<String>,
    pub status_text: String,
    pub progress: i32,
    /// Stream info, packet and bitrate surfaces are usable.
    pub analysis_enabled: bool,
    pub parse_entire_source: bool,
    pub color_code_streams: bool,
    pub stream_info: Vec<InfoNode>,
    pub filter_options: Vec<String>,
    pub selected_filter_option: usize,
    #[serde(skip)]
    pub dirty: bool,
}

/// Builds the stream filter list: "show all" followed by one entry per stream.
pub fn filter_options(stream_summaries: &[String]) -> Vec<String> {
    let mut options = Vec::with_capacity(stream_summaries.len() + 1);
    options.push(SHOW_ALL_STREAMS.to_string());
    options.extend(
        stream_summaries
            .iter()
            .enumerate()
            .map(|(index, summary)| format!("Stream {index} - {summary}")),
    );
    options
}
