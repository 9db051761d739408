use crate::engine::response::Source;

/// Keyword match score at or above which an answer counts as correct.
pub const CORRECTNESS_THRESHOLD: f64 = 0.5;

/// True when the expected filename appears (case-insensitively) inside the
/// filename of at least one retrieved source.
pub fn check_retrieval_hit(sources: &[Source], expected_pdf: &str) -> bool {
    if expected_pdf.is_empty() {
        return false;
    }
    let expected = expected_pdf.to_lowercase();
    sources
        .iter()
        .any(|s| s.filename.to_lowercase().contains(&expected))
}

/// Fraction of comma-separated keywords found in `answer`, ignoring case.
///
/// Blank keyword entries are skipped; no keywords scores 0.0.
pub fn keyword_match_score(answer: &str, keywords: &str) -> f64 {
    let terms: Vec<String> = keywords
        .split(',')
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    if terms.is_empty() {
        return 0.0;
    }

    let answer = answer.to_lowercase();
    let matched = terms.iter().filter(|k| answer.contains(k.as_str())).count();
    matched as f64 / terms.len() as f64
}

pub fn is_correct(keyword_score: f64) -> bool {
    keyword_score >= CORRECTNESS_THRESHOLD
}
