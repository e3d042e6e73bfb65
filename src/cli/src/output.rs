//! Output helpers shared by CLI commands.

use std::time::SystemTime;

use chrono::{DateTime, Utc};
use comfy_table::{ContentArrangement, Table};
use serde::Serialize;

/// Create a borderless table with the given headers.
pub fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.load_preset(comfy_table::presets::NOTHING);
    table.set_header(headers);
    table
}

/// Pretty-print a value as JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Render a file timestamp as RFC 3339 plus a coarse age, e.g.
/// `2024-01-01T00:00:00Z (3 days ago)`.
pub fn format_timestamp(time: SystemTime) -> String {
    let dt: DateTime<Utc> = time.into();
    format!(
        "{} ({})",
        dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        format_age(&dt, Utc::now())
    )
}

fn format_age(dt: &DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(*dt);
    let secs = elapsed.num_seconds();

    if secs < 0 {
        "in the future".to_string()
    } else if secs < 60 {
        "just now".to_string()
    } else if elapsed.num_hours() < 1 {
        format!("{} minutes ago", elapsed.num_minutes())
    } else if elapsed.num_days() < 1 {
        format!("{} hours ago", elapsed.num_hours())
    } else {
        format!("{} days ago", elapsed.num_days())
    }
}
