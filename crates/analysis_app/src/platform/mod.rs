mod app;
mod effects;
mod logging;
mod render;
mod settings;

pub(crate) use app::run_app;
pub(crate) use logging::LogDestination;
