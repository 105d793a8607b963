//! Logistic squashing of vote counts.
//!
//! Vote counts are unbounded, so the credibility formula maps each count
//! through `sigmoid(k * votes)` before weighting. With zero votes the output
//! is exactly 0.5 and it approaches 1.0 as votes accumulate; steepness `k`
//! controls how quickly.

/// `1 / (1 + e^-x)`.
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Squash a vote count with steepness `k`.
pub fn normalize_votes(votes: u32, k: f64) -> f64 {
    sigmoid(k * f64::from(votes))
}
