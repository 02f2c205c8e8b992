use crate::models::{ScoreSummary, StoredScore};

/// Match percentage from which a score counts as a high fit.
pub const HIGH_FIT_THRESHOLD: i32 = 70;

/// Averages and high-fit share over a set of scores. Empty input gives all zeros.
pub fn summarize_scores(scores: &[StoredScore]) -> ScoreSummary {
    if scores.is_empty() {
        return ScoreSummary::default();
    }

    let total = scores.len();
    let match_sum: i64 = scores.iter().map(|s| s.match_percent as i64).sum();
    let prob_sum: i64 = scores.iter().map(|s| s.probabilidade as i64).sum();
    let high_fit_count = scores
        .iter()
        .filter(|s| s.match_percent >= HIGH_FIT_THRESHOLD)
        .count();

    ScoreSummary {
        total,
        average_match: round1(match_sum as f64 / total as f64),
        average_probabilidade: round1(prob_sum as f64 / total as f64),
        high_fit_count,
        high_fit_percent: round1(high_fit_count as f64 * 100.0 / total as f64),
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
