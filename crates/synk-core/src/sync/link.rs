//! Cross-system correlation markers.
//!
//! A calendar event created from a Notion page carries a marker line in its
//! description naming the page (`[synk:<page id>]`). That line is the only
//! link from the calendar side back to Notion; there is no local mapping
//! table. Everything that reads or writes the marker goes through here.

use std::sync::LazyLock;

use regex::Regex;

static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[synk:([A-Za-z0-9-]+)\]").expect("marker pattern is valid")
});

/// Build the marker line for a Notion page.
pub fn marker_line(page_id: &str, page_url: &str) -> String {
    if page_url.is_empty() {
        format!("Notion: [synk:{page_id}]")
    } else {
        format!("Notion: {page_url} [synk:{page_id}]")
    }
}

/// Append the marker for `page_id` to `description`, replacing any
/// marker already present.
pub fn embed(description: Option<&str>, page_id: &str, page_url: &str) -> String {
    let body = strip(description.unwrap_or_default());
    let marker = marker_line(page_id, page_url);
    if body.is_empty() {
        marker
    } else {
        format!("{body}\n\n{marker}")
    }
}

/// Extract the page id embedded in a description, if any.
pub fn extract(description: &str) -> Option<String> {
    MARKER
        .captures(description)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Remove marker lines, returning the user-authored part of the description.
pub fn strip(description: &str) -> String {
    description
        .lines()
        .filter(|line| !MARKER.is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
