//! Formatted output helpers for CLI commands.

use std::io::Write;

use chrono::{DateTime, Utc};
use podrun_common::types::PodId;
use podrun_runtime::layout::CorruptEntry;

/// Writes a pod UUID as a single line, for scripts to capture.
///
/// # Errors
///
/// Returns an error if the writer fails.
pub fn write_pod_id(out: &mut impl Write, id: &PodId) -> std::io::Result<()> {
    writeln!(out, "{id}")?;
    out.flush()
}

/// Formats the time since `since` as a compact age (e.g., "42s", "3h").
///
/// Unknown or future times print as "-".
#[must_use]
pub fn format_age(since: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    const MINUTE: i64 = 60;
    const HOUR: i64 = 60 * MINUTE;
    const DAY: i64 = 24 * HOUR;

    let Some(since) = since else {
        return "-".to_string();
    };
    let secs = now.signed_duration_since(since).num_seconds();
    if secs < 0 {
        "-".to_string()
    } else if secs >= DAY {
        format!("{}d", secs / DAY)
    } else if secs >= HOUR {
        format!("{}h", secs / HOUR)
    } else if secs >= MINUTE {
        format!("{}m", secs / MINUTE)
    } else {
        format!("{secs}s")
    }
}

/// Prints entries that are not well-formed pods to stderr.
pub fn print_corrupt(entries: &[CorruptEntry]) {
    for entry in entries {
        eprintln!("corrupt entry {}: {}", entry.path.display(), entry.reason);
    }
}
