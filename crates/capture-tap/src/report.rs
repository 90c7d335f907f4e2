//! Plain-text capture report.

use std::collections::BTreeMap;
use std::fmt::Write;

use replay_core_types::{Capture, CaptureType};

const DATA_PREVIEW_CHARS: usize = 120;

pub struct CaptureReport;

impl CaptureReport {
    /// Renders captures grouped by type, each group in time order, with a
    /// count per group.
    pub fn render(captures: &[Capture]) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Capture report: {} capture(s)", captures.len());
        if captures.is_empty() {
            return out;
        }

        let mut ordered: Vec<&Capture> = captures.iter().collect();
        ordered.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.seq.cmp(&b.seq)));
        if let (Some(first), Some(last)) = (ordered.first(), ordered.last()) {
            let _ = writeln!(
                out,
                "Span: {} .. {}",
                first.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
                last.timestamp.format("%Y-%m-%d %H:%M:%S%.3f")
            );
        }

        let mut groups: BTreeMap<CaptureType, Vec<&Capture>> = BTreeMap::new();
        for capture in ordered {
            groups.entry(capture.capture_type).or_default().push(capture);
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "Counts:");
        for (capture_type, items) in &groups {
            let _ = writeln!(out, "  {:<18} {}", capture_type.as_str(), items.len());
        }

        for (capture_type, items) in &groups {
            let _ = writeln!(out);
            let _ = writeln!(out, "== {} ({}) ==", capture_type, items.len());
            for capture in items {
                let _ = writeln!(
                    out,
                    "  {} {}",
                    capture.timestamp.format("%H:%M:%S%.3f"),
                    capture.summary()
                );
                if !capture.data.is_empty() {
                    let _ = writeln!(out, "      {}", preview(&capture.data));
                }
            }
        }
        out
    }
}

fn preview(data: &str) -> String {
    let flat: String = data
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    if flat.chars().count() <= DATA_PREVIEW_CHARS {
        flat
    } else {
        let mut cut: String = flat.chars().take(DATA_PREVIEW_CHARS).collect();
        cut.push_str("...");
        cut
    }
}
