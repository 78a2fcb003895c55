// Candidate pipeline: mapping process stage names to candidate statuses

use recruit_shared::CandidateStatus;

/// Ordered keyword table. The first entry matching the stage name wins, so
/// closing stages are listed before the stages whose words they might
/// contain ("offer declined" is rejected, not offer). Keywords match whole
/// words; a trailing `*` matches any word starting with the stem.
const STAGE_KEYWORDS: &[(&str, CandidateStatus)] = &[
    ("withdr*", CandidateStatus::Withdrawn),
    ("declin*", CandidateStatus::Rejected),
    ("reject*", CandidateStatus::Rejected),
    ("disqualif*", CandidateStatus::Rejected),
    ("hired", CandidateStatus::Hired),
    ("onboard*", CandidateStatus::Hired),
    ("offer*", CandidateStatus::Offer),
    ("on hold", CandidateStatus::OnHold),
    ("assessment*", CandidateStatus::Assessment),
    ("case study", CandidateStatus::Assessment),
    ("test*", CandidateStatus::Assessment),
    ("interview*", CandidateStatus::Interview),
    ("screen*", CandidateStatus::Screening),
    ("phone", CandidateStatus::Screening),
    ("applied", CandidateStatus::New),
    ("sourced", CandidateStatus::New),
    ("new", CandidateStatus::New),
];

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn matches_keyword(stage: &[String], keyword: &str) -> bool {
    let parts: Vec<&str> = keyword.split(' ').collect();
    stage.windows(parts.len()).any(|window| {
        window.iter().zip(&parts).all(|(word, part)| match part.strip_suffix('*') {
            Some(stem) => word.starts_with(stem),
            None => word.as_str() == *part,
        })
    })
}

/// Infer the candidate status implied by a stage name, if any
pub fn infer_status(stage: &str) -> Option<CandidateStatus> {
    let stage = words(stage);
    STAGE_KEYWORDS
        .iter()
        .find(|(keyword, _)| matches_keyword(&stage, keyword))
        .map(|(_, status)| *status)
}

/// Status a stage move should result in: an explicit status wins, then the
/// inferred one, otherwise the candidate keeps `current`.
pub fn resolve_stage_status(
    stage: &str,
    explicit: Option<CandidateStatus>,
    current: &str,
) -> Option<CandidateStatus> {
    explicit
        .or_else(|| infer_status(stage))
        .filter(|status| status.as_str() != current)
}
