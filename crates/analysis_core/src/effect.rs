use crate::SourceDescriptor;

/// Controller calls requested by the lifecycle gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Stop any running job, then start one for `source` if present.
    Restart {
        source: Option<SourceDescriptor>,
        parsing_limit: bool,
    },
    /// Stop the running job and wait for its worker to exit.
    Stop,
    SetStreamFilter(Option<usize>),
    SetParsingLimit(bool),
    /// Tint packet and bitrate rows by stream; applies without a restart.
    SetStreamColorCoding(bool),
}
