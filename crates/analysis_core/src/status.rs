/// Progress value meaning "no source is being analysed".
pub const NO_SOURCE_PROGRESS: i32 = -1;

const NO_SOURCE_TEXT: &str =
    "No bitstream file selected - Select a bitstream file to start bitstream analysis.";
const PARTIAL_DONE_TEXT: &str = "Partial parsing done. Enable full parsing if needed.";
const DONE_TEXT: &str = "Parsing done.";

/// Renders the parsing status line for a progress value.
///
/// Total over `i32`: anything below zero reads as "no source", anything from
/// 100 upwards reads as done.
pub fn project(progress: i32, parsing_limit: bool) -> String {
    match progress {
        p if p < 0 => NO_SOURCE_TEXT.to_string(),
        p if p < 100 => format!("Parsing file ({p}%)"),
        _ if parsing_limit => PARTIAL_DONE_TEXT.to_string(),
        _ => DONE_TEXT.to_string(),
    }
}
