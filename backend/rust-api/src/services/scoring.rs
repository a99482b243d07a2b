//! Turns a set of per-question outcomes into a score in [0, 1].
//!
//! Per question: a speed factor is ramped linearly over the configured
//! `[min_time, max_time]` window, success is `correct / (wrong + hints + 1)`,
//! and the contribution is `0.7*success + 0.2*(correct*speed) +
//! 0.1*(1/(1+ln(attempts_count)))`. The final score is the mean of the
//! contributions, clamped. Earlier weightings (0.9/0.1, 0.8/0.2, no decay)
//! are deprecated and must not be reintroduced.

use crate::config::ScoringConfig;
use crate::models::attempt::QuestionAnswer;

/// Speed factor for one question: 1 below the window, 0 above it, linear
/// in between.
fn speed_factor(duration: i64, cfg: &ScoringConfig) -> f64 {
    let t = duration as f64;
    let min_time = cfg.min_time_secs as f64;
    let max_time = cfg.max_time_secs as f64;

    let speed = if t < min_time {
        1.0
    } else if t <= max_time && max_time > min_time {
        1.0 - (t - min_time) / (max_time - min_time)
    } else {
        0.0
    };
    speed.clamp(0.0, 1.0)
}

/// Weighted success for one question. The +1 floor keeps the denominator
/// positive and discounts correct answers reached through hints or retries.
fn success_term(answer: &QuestionAnswer) -> f64 {
    f64::from(answer.correct) / f64::from(answer.wrong + answer.hints + 1)
}

/// Score an answer set. Returns `(score, success_rate)`, both in [0, 1];
/// an empty answer set scores (0.0, 0.0).
pub fn score(answers: &[QuestionAnswer], attempts_count: u32, cfg: &ScoringConfig) -> (f64, f64) {
    if answers.is_empty() {
        return (0.0, 0.0);
    }

    let attempts = f64::from(attempts_count.max(1));
    let decay = 1.0 / (1.0 + attempts.ln());

    let mut sum_contribution = 0.0;
    let mut sum_success = 0.0;

    for answer in answers {
        let success = success_term(answer);
        let speed = speed_factor(answer.duration, cfg);
        let correct = f64::from(answer.correct.min(1));

        sum_contribution += 0.7 * success + 0.2 * (correct * speed) + 0.1 * decay;
        sum_success += success;
    }

    let n = answers.len() as f64;
    let score = (sum_contribution / n).clamp(0.0, 1.0);
    let success_rate = sum_success / n;

    (score, success_rate)
}
