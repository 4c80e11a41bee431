//! Analysis engine: job controller, parser strategies and observer bindings.
mod annexb;
mod controller;
mod models;
mod observers;
mod selector;
mod settings;
mod strategy;
mod transport;
mod types;

pub use annexb::{AnnexBParser, NalCodec};
pub use controller::JobController;
pub use models::{BitrateModel, BitrateRecord, PacketModel, PacketRecord, RecordModel, StreamRecord};
pub use observers::{AnalysisEvent, EventKind, ObserverBinder, ObserverSet};
pub use selector::{select_strategy, FormatSelector, StrategySelector};
pub use settings::AnalysisSettings;
pub use strategy::{ChannelProgressSink, ParserStrategy, ProgressSink, StrategyControls};
pub use transport::TransportStreamDemuxer;
pub use types::{
    ControllerError, Generation, JobState, ParseError, ParserEvent, RestartOutcome, RunStatus,
};
