#![deny(missing_docs)]
//! Shared logging utilities for the analysis workspace.
//!
//! This crate provides the `analysis_*` logging macros used across the codebase
//! and a minimal test initializer for the global logger.
//!
//! Worker threads record the generation of the job they run through
//! [`set_job_generation`]; every macro prefixes its message with `[job N]`
//! while a non-zero generation is set on the current thread.

use std::cell::Cell;

thread_local! {
    /// Thread-local storage for the generation of the job running on this thread.
    static JOB_GENERATION: Cell<u64> = const { Cell::new(0) };
}

/// Sets the job generation for the current thread.
/// Worker threads call this once before running a parser strategy.
pub fn set_job_generation(generation: u64) {
    JOB_GENERATION.with(|v| v.set(generation));
}

/// Retrieves the job generation for the current thread.
/// Returns 0 on threads that do not run a job.
pub fn job_generation() -> u64 {
    JOB_GENERATION.with(|v| v.get())
}

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! analysis_trace {
    ($($arg:tt)*) => {{
        match $crate::job_generation() {
            0 => log::trace!($($arg)*),
            generation => log::trace!("[job {}] {}", generation, format_args!($($arg)*)),
        }
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! analysis_info {
    ($($arg:tt)*) => {{
        match $crate::job_generation() {
            0 => log::info!($($arg)*),
            generation => log::info!("[job {}] {}", generation, format_args!($($arg)*)),
        }
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! analysis_debug {
    ($($arg:tt)*) => {{
        match $crate::job_generation() {
            0 => log::debug!($($arg)*),
            generation => log::debug!("[job {}] {}", generation, format_args!($($arg)*)),
        }
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! analysis_warn {
    ($($arg:tt)*) => {{
        match $crate::job_generation() {
            0 => log::warn!($($arg)*),
            generation => log::warn!("[job {}] {}", generation, format_args!($($arg)*)),
        }
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! analysis_error {
    ($($arg:tt)*) => {{
        match $crate::job_generation() {
            0 => log::error!($($arg)*),
            generation => log::error!("[job {}] {}", generation, format_args!($($arg)*)),
        }
    }};
}

/// Initializes a simple terminal logger for use in unit tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}
