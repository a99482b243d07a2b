use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reporting window. `week` and `month` pick the default window width when
/// explicit bounds are absent; anything else falls back to 60 days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Week,
    Month,
    Custom,
}

impl Period {
    pub fn parse(value: Option<&str>) -> Period {
        match value {
            Some("week") => Period::Week,
            Some("month") => Period::Month,
            _ => Period::Custom,
        }
    }

    pub fn default_days(self) -> i64 {
        match self {
            Period::Week => 7,
            Period::Month => 30,
            Period::Custom => 60,
        }
    }
}

/// (days practiced, calendar days spanned by the window)
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Engagement {
    pub days_practiced: u32,
    pub total_days: u32,
}

impl Engagement {
    pub fn rate(&self) -> f64 {
        if self.total_days == 0 {
            0.0
        } else {
            f64::from(self.days_practiced) / f64::from(self.total_days)
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionRate {
    pub completed: u32,
    pub started: u32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AbandonmentRate {
    pub aborted: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Perseverance {
    /// Quizzes retried after an abort or a score below 0.5.
    pub retries: u32,
    /// Retries that completed with a markedly better outcome.
    pub improved: u32,
    /// min(100, improved * 20)
    pub score: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SubjectStats {
    pub count: u32,
    pub completed: u32,
    pub average_score: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChapterStats {
    pub count: u32,
    pub completed: u32,
    pub average_score: f64,
}

/// Per-subject rollup inside the grade distribution drill-down.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GradeSubjectStats {
    pub count: u32,
    pub completed: u32,
    pub average_score: f64,
    pub chapters: HashMap<String, ChapterStats>,
}

pub type GradeDistribution = HashMap<String, HashMap<String, GradeSubjectStats>>;

/// Behavioral metrics over one kid's attempts in a window. Recomputed per
/// request, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub user_id: String,
    pub kid_index: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,

    pub engagement: Engagement,
    pub streak: u32,
    pub completion_rate: CompletionRate,
    pub abandonment_rate: AbandonmentRate,
    /// Minutes, excluding timed-out attempts.
    pub time_spent: f64,
    /// Completed-quiz ratio vs the previous window of the same width.
    pub progress: f64,
    /// Subjects whose mean score clears the mastery threshold.
    pub mastery: HashMap<String, f64>,
    pub perseverance: Perseverance,
    pub subject_stats: HashMap<String, SubjectStats>,
    /// 0-100; 100 = evenly spread across subjects.
    pub subject_balance: u32,
    /// Least-practiced subject, or "none".
    pub recommendation: String,
    /// Quiz ids failed at least three times in the window.
    pub persistent_failures: HashMap<String, u32>,
    pub grade_distribution: GradeDistribution,
}

/// Symbolic feedback derived from a snapshot. Generated fresh per query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationCodes {
    pub achievements: Vec<String>,
    pub alerts: Vec<String>,
    pub recommendations: Vec<String>,
}
