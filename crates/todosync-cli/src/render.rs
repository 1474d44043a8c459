//! Plain-text rendering of joined todo snapshots.

use chrono::{DateTime, Local};
use todosync_core::models::Versioned;
use todosync_core::{Joined, Snapshot, Todo, User};

// ============================================================================
// Constants
// ============================================================================

/// Column widths for the todo table
const ID_WIDTH: usize = 4;
const TITLE_WIDTH: usize = 32;
const UPDATED_WIDTH: usize = 15;
const USER_WIDTH: usize = 20;

pub type TodoSnapshot = Snapshot<Joined<Todo, User>>;

/// Render a snapshot as a header line followed by one row per todo.
pub fn render_table(snapshot: &TodoSnapshot) -> String {
    let mut out = format!(
        "-- generation {} ({}) - {} todo{} --\n",
        snapshot.generation(),
        snapshot.origin(),
        snapshot.len(),
        if snapshot.len() == 1 { "" } else { "s" }
    );
    out.push_str(&format!(
        "{:>ID_WIDTH$}  {:<TITLE_WIDTH$}  {:<UPDATED_WIDTH$}  {:<USER_WIDTH$}\n",
        "id", "title", "updated", "user"
    ));
    for row in snapshot.rows() {
        out.push_str(&render_row(row));
        out.push('\n');
    }
    out
}

pub fn render_row(row: &Joined<Todo, User>) -> String {
    format!(
        "{:>ID_WIDTH$}  {:<TITLE_WIDTH$}  {:<UPDATED_WIDTH$}  {:<USER_WIDTH$}",
        row.record.id,
        truncate_string(&row.record.title, TITLE_WIDTH),
        format_timestamp(row.record.version().as_str()),
        truncate_string(&row.lookup.display_name(), USER_WIDTH),
    )
}

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Format an RFC 3339 timestamp in local time; anything else is shown as-is.
pub fn format_timestamp(stamp: &str) -> String {
    match DateTime::parse_from_rfc3339(stamp) {
        Ok(dt) => dt.with_timezone(&Local).format("%b %d %H:%M:%S").to_string(),
        Err(_) => stamp.to_string(),
    }
}
