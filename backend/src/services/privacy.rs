// GDPR helpers: PII masking, free-text scrubbing and candidate anonymization

use chrono::Utc;
use recruit_shared::{Activity, Candidate};
use regex::Regex;
use std::sync::LazyLock;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email pattern")
});

static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+?\d[\d\s().-]{7,}\d").expect("phone pattern"));

static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s]+").expect("url pattern"));

pub const REDACTED: &str = "[redacted]";

/// `jane.doe@example.com` -> `j*******@example.com`
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() => {
            let mut chars = local.chars();
            let first = chars.next().unwrap_or('*');
            format!("{}{}@{}", first, "*".repeat(chars.count()), domain)
        }
        _ => REDACTED.to_string(),
    }
}

/// Keeps the last two digits: `+44 7700 900123` -> `**********23`
pub fn mask_phone(phone: &str) -> String {
    let digits: Vec<char> = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() <= 2 {
        return REDACTED.to_string();
    }
    let visible: String = digits[digits.len() - 2..].iter().collect();
    format!("{}{}", "*".repeat(digits.len() - 2), visible)
}

/// Remove emails, phone numbers and URLs from free text
pub fn scrub_text(text: &str) -> String {
    let text = EMAIL.replace_all(text, REDACTED);
    let text = URL.replace_all(&text, REDACTED);
    PHONE.replace_all(&text, REDACTED).into_owned()
}

/// Replace identity fields in place. Tags, status and pipeline placement are
/// kept for reporting; notes and activity descriptions are scrubbed.
pub fn anonymize_candidate(candidate: &mut Candidate) {
    let now = Utc::now();
    let short_id = candidate.id.simple().to_string();

    candidate.first_name = "Anonymized".to_string();
    candidate.last_name = format!("Candidate {}", &short_id[..8]);
    candidate.email = None;
    candidate.phone = None;
    candidate.source = None;

    for note in candidate.notes.iter_mut() {
        note.body = scrub_text(&note.body);
    }
    for score in candidate.quick_scores.iter_mut() {
        score.comment = score.comment.as_deref().map(scrub_text);
    }
    for activity in candidate.activities.iter_mut() {
        activity.description = scrub_text(&activity.description);
        activity.metadata = serde_json::Value::Null;
    }

    candidate
        .activities
        .push(Activity::new("anonymized", "Personal data removed"));
    candidate.anonymized_at = Some(now);
    candidate.updated_at = Some(now);
}
