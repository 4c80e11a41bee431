//! Analysis core: pure data model, status projection and the lifecycle gate.
mod effect;
mod msg;
mod source;
mod state;
mod status;
mod stream_info;
mod update;
mod view_model;

pub use effect::Effect;
pub use msg::Msg;
pub use source::{FormatTag, FormatTagError, SourceDescriptor};
pub use state::AppState;
pub use status::{project, NO_SOURCE_PROGRESS};
pub use stream_info::{InfoNode, JobOutcome, StreamInfoSnapshot};
pub use update::update;
pub use view_model::{filter_options, AppViewModel, SHOW_ALL_STREAMS};
