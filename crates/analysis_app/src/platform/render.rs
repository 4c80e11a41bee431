use std::fmt::Write;

use analysis_core::{AppViewModel, InfoNode};
use serde::Serialize;

/// Final results printed when the run ends.
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    #[serde(flatten)]
    pub view: &'a AppViewModel,
    /// Packet rows visible under the current stream filter.
    pub packets: Option<usize>,
    /// Bitrate windows visible under the current stream filter.
    pub bitrate_windows: Option<usize>,
}

/// One-line progress display.
pub fn status_line(view: &AppViewModel) -> String {
    if view.progress < 0 {
        view.status_text.clone()
    } else {
        format!("[{:>3}%] {}", view.progress, view.status_text)
    }
}

pub fn render_text(report: &Report<'_>) -> String {
    let view = report.view;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Source:   {}",
        view.source_name.as_deref().unwrap_or("(none)")
    );
    let _ = writeln!(out, "Status:   {}", view.status_text);
    if view.progress >= 0 {
        let _ = writeln!(out, "Progress: {}%", view.progress);
    }
    let _ = writeln!(
        out,
        "Mode:     {}",
        if view.parse_entire_source {
            "entire file"
        } else {
            "limited"
        }
    );
    if view.color_code_streams {
        out.push_str("Colors:   by stream\n");
    }
    if !view.analysis_enabled {
        return out;
    }

    if !view.stream_info.is_empty() {
        out.push_str("Stream info:\n");
        for node in &view.stream_info {
            write_node(&mut out, node, 1);
        }
    }
    if !view.filter_options.is_empty() {
        out.push_str("Streams:\n");
        for (index, option) in view.filter_options.iter().enumerate() {
            let marker = if index == view.selected_filter_option {
                '*'
            } else {
                ' '
            };
            let _ = writeln!(out, "  {marker} {option}");
        }
    }
    if let Some(packets) = report.packets {
        let _ = writeln!(out, "Packets:  {packets}");
    }
    if let Some(windows) = report.bitrate_windows {
        let _ = writeln!(out, "Bitrate:  {windows} windows");
    }
    out
}

pub fn render_json(report: &Report<'_>) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

fn write_node(out: &mut String, node: &InfoNode, depth: usize) {
    let indent = "  ".repeat(depth);
    if node.value.is_empty() {
        let _ = writeln!(out, "{indent}{}", node.label);
    } else {
        let _ = writeln!(out, "{indent}{}: {}", node.label, node.value);
    }
    for child in &node.children {
        write_node(out, child, depth + 1);
    }
}
