use regex::Regex;
use std::sync::LazyLock;

// `@handle` preceded by start of text or a non-word character, so email
// addresses like `jane@example.com` are not read as mentions.
static MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^\w@])@([A-Za-z0-9_][A-Za-z0-9_.-]{0,38})").expect("mention pattern"));

/// Extract unique `@username` handles in order of first appearance.
/// Handles are lowercased; trailing dots from sentence punctuation are dropped.
pub fn extract_mentions(text: &str) -> Vec<String> {
    let mut handles: Vec<String> = Vec::new();
    for caps in MENTION.captures_iter(text) {
        let handle = caps[1].trim_end_matches(['.', '-']).to_lowercase();
        if !handle.is_empty() && !handles.contains(&handle) {
            handles.push(handle);
        }
    }
    handles
}
