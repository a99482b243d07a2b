//! Aggregates a kid's attempt history into behavioral metrics.
//!
//! Every metric is a pure function over the loaded attempts (plus quiz
//! metadata where subjects matter), so the math is unit-testable without a
//! store. All functions return zero/neutral defaults for empty input.

use chrono::{DateTime, Duration, Utc};
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::Database;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::{Config, MasteryConfig};
use crate::error::CoreError;
use crate::models::attempt::{AttemptRecord, AttemptStatus};
use crate::models::metrics::{
    AbandonmentRate, ChapterStats, CompletionRate, Engagement, GradeDistribution,
    GradeSubjectStats, MetricsSnapshot, Period, Perseverance, SubjectStats,
};
use crate::models::quiz::QuizInfo;
use crate::services::attempt_service::ATTEMPTS_COLLECTION;
use crate::services::metadata_service::QuizMetadataProvider;
use crate::utils::time::chrono_to_bson;

const UNKNOWN: &str = "unknown";

pub struct MetricsService {
    mongo: Database,
    config: Config,
    metadata: Arc<dyn QuizMetadataProvider>,
}

impl MetricsService {
    pub fn new(mongo: Database, config: Config, metadata: Arc<dyn QuizMetadataProvider>) -> Self {
        Self {
            mongo,
            config,
            metadata,
        }
    }

    pub async fn get_metrics(
        &self,
        user_id: &str,
        kid_index: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        period: Period,
    ) -> Result<MetricsSnapshot, CoreError> {
        let (from, to) = resolve_window(from, to, period)?;

        let attempts = self.load_attempts(user_id, kid_index, from, to).await?;

        // Previous window of the same width, for the progress ratio.
        let width = to - from;
        let prev_attempts = self
            .load_attempts(user_id, kid_index, from - width, from - Duration::seconds(1))
            .await?;

        let quiz_ids: Vec<String> = attempts
            .iter()
            .map(|a| a.quiz_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let infos = self.metadata.get(&quiz_ids).await;

        Ok(build_snapshot(
            user_id,
            kid_index,
            from,
            to,
            &attempts,
            &prev_attempts,
            &infos,
            &self.config.mastery,
        ))
    }

    async fn load_attempts(
        &self,
        user_id: &str,
        kid_index: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AttemptRecord>, CoreError> {
        let mut cursor = self
            .mongo
            .collection::<AttemptRecord>(ATTEMPTS_COLLECTION)
            .find(doc! {
                "user_id": user_id,
                "kid_index": kid_index,
                "start_time": { "$gte": chrono_to_bson(from), "$lte": chrono_to_bson(to) },
            })
            .await?;

        let mut attempts = Vec::new();
        while let Some(attempt) = cursor.try_next().await? {
            attempts.push(attempt);
        }
        Ok(attempts)
    }
}

/// Window resolution: `to` defaults to now; `from` defaults to the period's
/// width back from `to` (7 days for week, 30 for month, 60 otherwise).
pub fn resolve_window(
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    period: Period,
) -> Result<(DateTime<Utc>, DateTime<Utc>), CoreError> {
    let to = to.unwrap_or_else(Utc::now);
    let from = from.unwrap_or_else(|| to - Duration::days(period.default_days()));
    if from > to {
        return Err(CoreError::InvalidInput("from must not exceed to".into()));
    }
    Ok((from, to))
}

#[allow(clippy::too_many_arguments)]
pub fn build_snapshot(
    user_id: &str,
    kid_index: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    attempts: &[AttemptRecord],
    prev_attempts: &[AttemptRecord],
    infos: &HashMap<String, QuizInfo>,
    mastery_cfg: &MasteryConfig,
) -> MetricsSnapshot {
    let stats = subject_stats(attempts, infos);
    let completed_now = attempts
        .iter()
        .filter(|a| a.status == AttemptStatus::Completed)
        .count() as u32;
    let completed_prev = prev_attempts
        .iter()
        .filter(|a| a.status == AttemptStatus::Completed)
        .count() as u32;

    MetricsSnapshot {
        user_id: user_id.to_string(),
        kid_index: kid_index.to_string(),
        from,
        to,
        engagement: calculate_engagement(attempts, from, to),
        streak: calculate_streak(attempts),
        completion_rate: calculate_completion_rate(attempts),
        abandonment_rate: abandonment_rate(attempts),
        time_spent: total_time_spent_minutes(attempts),
        progress: calculate_progress(completed_now, completed_prev),
        mastery: calculate_mastery(attempts, infos, mastery_cfg),
        perseverance: calculate_perseverance(attempts),
        subject_balance: calculate_balance_score(&stats),
        recommendation: recommend_subject(&stats),
        subject_stats: stats,
        persistent_failures: persistent_failures(attempts),
        grade_distribution: grade_distribution(attempts, infos),
    }
}

fn subject_of<'a>(quiz_id: &str, infos: &'a HashMap<String, QuizInfo>) -> &'a str {
    infos
        .get(quiz_id)
        .and_then(|i| i.subject.as_deref())
        .unwrap_or(UNKNOWN)
}

fn sorted_by_start(attempts: &[AttemptRecord]) -> Vec<&AttemptRecord> {
    let mut sorted: Vec<&AttemptRecord> = attempts.iter().collect();
    sorted.sort_by_key(|a| a.start_time);
    sorted
}

/// Distinct practice days within the window vs calendar days spanned by it.
pub fn calculate_engagement(
    attempts: &[AttemptRecord],
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Engagement {
    let practice_days: HashSet<_> = attempts
        .iter()
        .filter(|a| a.start_time >= from && a.start_time <= to)
        .map(|a| a.start_time.date_naive())
        .collect();

    let total_days = (to.date_naive() - from.date_naive()).num_days() + 1;
    Engagement {
        days_practiced: practice_days.len() as u32,
        total_days: total_days.max(0) as u32,
    }
}

/// Longest run of consecutive completed attempts, chronological order.
pub fn calculate_streak(attempts: &[AttemptRecord]) -> u32 {
    let mut current = 0u32;
    let mut best = 0u32;
    for attempt in sorted_by_start(attempts) {
        if attempt.status == AttemptStatus::Completed {
            current += 1;
            best = best.max(current);
        } else {
            current = 0;
        }
    }
    best
}

pub fn calculate_completion_rate(attempts: &[AttemptRecord]) -> CompletionRate {
    CompletionRate {
        completed: attempts
            .iter()
            .filter(|a| a.status == AttemptStatus::Completed)
            .count() as u32,
        started: attempts.len() as u32,
    }
}

pub fn abandonment_rate(attempts: &[AttemptRecord]) -> AbandonmentRate {
    AbandonmentRate {
        aborted: attempts
            .iter()
            .filter(|a| a.status == AttemptStatus::Aborted)
            .count() as u32,
        total: attempts.len() as u32,
    }
}

/// Minutes of practice; timed-out attempts carry no real signal and are
/// excluded.
pub fn total_time_spent_minutes(attempts: &[AttemptRecord]) -> f64 {
    let seconds: i64 = attempts
        .iter()
        .filter(|a| a.status != AttemptStatus::TimedOut)
        .map(|a| a.duration)
        .sum();
    seconds as f64 / 60.0
}

/// Completed-quiz count vs the previous window. No previous activity reads
/// as full progress.
pub fn calculate_progress(current_completed: u32, prev_completed: u32) -> f64 {
    if prev_completed == 0 {
        return 1.0;
    }
    (f64::from(current_completed) - f64::from(prev_completed)) / f64::from(prev_completed)
}

/// Subjects whose mean score clears the mastery threshold, gated by a
/// minimum sample count.
pub fn calculate_mastery(
    attempts: &[AttemptRecord],
    infos: &HashMap<String, QuizInfo>,
    cfg: &MasteryConfig,
) -> HashMap<String, f64> {
    let mut scores: HashMap<&str, Vec<f64>> = HashMap::new();
    for attempt in attempts {
        scores
            .entry(subject_of(&attempt.quiz_id, infos))
            .or_default()
            .push(attempt.score);
    }

    scores
        .into_iter()
        .filter(|(_, s)| s.len() >= cfg.min_samples.max(1))
        .filter_map(|(subject, s)| {
            let mean = s.iter().sum::<f64>() / s.len() as f64;
            (mean >= cfg.threshold).then(|| (subject.to_string(), mean))
        })
        .collect()
}

/// Retry/improvement pattern over consecutive attempts at the same quiz.
/// A retry follows an abort or a score below 0.5; it counts as improved when
/// the later attempt completes with a ≥0.2 score gain (or the earlier one
/// never completed at all).
pub fn calculate_perseverance(attempts: &[AttemptRecord]) -> Perseverance {
    let sorted = sorted_by_start(attempts);
    let mut retries = 0u32;
    let mut improved = 0u32;

    for pair in sorted.windows(2) {
        let (prev, current) = (pair[0], pair[1]);
        if prev.quiz_id != current.quiz_id {
            continue;
        }
        if prev.status == AttemptStatus::Aborted || prev.score < 0.5 {
            retries += 1;
            let prev_incomplete = prev.status != AttemptStatus::Completed;
            if current.status == AttemptStatus::Completed
                && (current.score - prev.score >= 0.2 || prev_incomplete)
            {
                improved += 1;
            }
        }
    }

    Perseverance {
        retries,
        improved,
        score: (improved * 20).min(100),
    }
}

/// Per-subject attempt counts and average score. Only completed attempts
/// contribute score, but the mean is taken over all attempts, so abandoned
/// or failed runs drag the average down.
pub fn subject_stats(
    attempts: &[AttemptRecord],
    infos: &HashMap<String, QuizInfo>,
) -> HashMap<String, SubjectStats> {
    let mut stats: HashMap<String, SubjectStats> = HashMap::new();
    let mut totals: HashMap<String, f64> = HashMap::new();

    for attempt in attempts {
        let subject = subject_of(&attempt.quiz_id, infos).to_string();
        let entry = stats.entry(subject.clone()).or_default();
        entry.count += 1;
        if attempt.status == AttemptStatus::Completed {
            entry.completed += 1;
            *totals.entry(subject).or_default() += attempt.score;
        }
    }

    for (subject, entry) in stats.iter_mut() {
        if entry.count > 0 {
            entry.average_score =
                totals.get(subject).copied().unwrap_or(0.0) / f64::from(entry.count);
        }
    }
    stats
}

/// 100 when attempts are evenly spread across subjects, dropping as one
/// subject dominates: `100 - max_share * 50`, clamped to [0, 100].
pub fn calculate_balance_score(stats: &HashMap<String, SubjectStats>) -> u32 {
    let total: u32 = stats.values().map(|s| s.count).sum();
    if total == 0 {
        return 0;
    }
    let max_share = stats
        .values()
        .map(|s| f64::from(s.count) / f64::from(total))
        .fold(0.0f64, f64::max);
    (100.0 - max_share * 50.0).clamp(0.0, 100.0) as u32
}

/// Least-practiced subject, ties broken by lowest average score.
pub fn recommend_subject(stats: &HashMap<String, SubjectStats>) -> String {
    stats
        .iter()
        .min_by(|(_, a), (_, b)| {
            a.count.cmp(&b.count).then(
                a.average_score
                    .partial_cmp(&b.average_score)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
        })
        .map(|(subject, _)| subject.clone())
        .unwrap_or_else(|| "none".to_string())
}

/// Quiz ids failed at least three times within the window.
pub fn persistent_failures(attempts: &[AttemptRecord]) -> HashMap<String, u32> {
    let mut failures: HashMap<String, u32> = HashMap::new();
    for attempt in attempts {
        if attempt.status == AttemptStatus::Failed {
            *failures.entry(attempt.quiz_id.clone()).or_default() += 1;
        }
    }
    failures.retain(|_, count| *count >= 3);
    failures
}

/// grade → subject → chapter rollup for drill-down views.
pub fn grade_distribution(
    attempts: &[AttemptRecord],
    infos: &HashMap<String, QuizInfo>,
) -> GradeDistribution {
    let mut distribution: GradeDistribution = HashMap::new();
    let mut subject_totals: HashMap<(String, String), f64> = HashMap::new();
    let mut chapter_totals: HashMap<(String, String, String), f64> = HashMap::new();

    for attempt in attempts {
        let info = infos.get(&attempt.quiz_id);
        let grade = info
            .and_then(|i| i.grade.clone())
            .unwrap_or_else(|| UNKNOWN.to_string());
        let subject = info
            .and_then(|i| i.subject.clone())
            .unwrap_or_else(|| UNKNOWN.to_string());
        let chapter = info
            .and_then(|i| i.chapter.clone())
            .unwrap_or_else(|| UNKNOWN.to_string());
        let completed = u32::from(attempt.status == AttemptStatus::Completed);

        let subject_entry = distribution
            .entry(grade.clone())
            .or_default()
            .entry(subject.clone())
            .or_insert_with(GradeSubjectStats::default);
        subject_entry.count += 1;
        subject_entry.completed += completed;
        *subject_totals
            .entry((grade.clone(), subject.clone()))
            .or_default() += attempt.score;

        let chapter_entry = subject_entry
            .chapters
            .entry(chapter.clone())
            .or_insert_with(ChapterStats::default);
        chapter_entry.count += 1;
        chapter_entry.completed += completed;
        *chapter_totals.entry((grade, subject, chapter)).or_default() += attempt.score;
    }

    for (grade, subjects) in distribution.iter_mut() {
        for (subject, stats) in subjects.iter_mut() {
            if stats.count > 0 {
                stats.average_score =
                    subject_totals[&(grade.clone(), subject.clone())] / f64::from(stats.count);
            }
            for (chapter, chapter_stats) in stats.chapters.iter_mut() {
                if chapter_stats.count > 0 {
                    chapter_stats.average_score = chapter_totals
                        [&(grade.clone(), subject.clone(), chapter.clone())]
                        / f64::from(chapter_stats.count);
                }
            }
        }
    }

    distribution
}
