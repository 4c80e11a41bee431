/// Tuning knobs shared by the built-in parser strategies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisSettings {
    /// NAL units / start codes parsed when the parsing limit is enabled.
    pub unit_limit: usize,
    /// Transport packets parsed when the parsing limit is enabled.
    pub packet_limit: usize,
    pub read_chunk_size: usize,
    /// Syntax units aggregated into one bitrate record.
    pub bitrate_window: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            unit_limit: 1_000,
            packet_limit: 20_000,
            read_chunk_size: 64 * 1024,
            bitrate_window: 30,
        }
    }
}
