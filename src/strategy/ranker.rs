//! Candidate ranking.

use crate::types::Candidate;

/// Sort by score descending and keep the best `top_n`.
///
/// `sort_by` is stable, so equal scores keep their evaluation order.
pub fn rank(mut candidates: Vec<Candidate>, top_n: usize) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.cmp(&a.score));
    candidates.truncate(top_n);
    candidates
}
