use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::utils::time::opt_bson_datetime;

/// Lifecycle state of an attempt. Exactly one variant is ever set; the
/// four terminal variants are mutually exclusive by construction and no
/// transition leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Completed,
    Failed,
    Aborted,
    TimedOut,
}

impl AttemptStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, AttemptStatus::InProgress)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Failed => "failed",
            AttemptStatus::Aborted => "aborted",
            AttemptStatus::TimedOut => "timed_out",
        }
    }
}

/// One try at a single question. An event with no `end_time` is open:
/// it was created by begin_question and awaits the matching submit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionAttemptEvent {
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "opt_bson_datetime", default)]
    pub end_time: Option<DateTime<Utc>>,
    pub is_correct: bool,
    pub is_wrong: bool,
    pub hint_used: bool,
    /// Seconds, as reported by the client for this try.
    pub duration: i64,
}

/// Per-question rollup. The counters are always recomputed as sums over
/// `events`, never incremented in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestionAnswer {
    #[serde(default)]
    pub events: Vec<QuestionAttemptEvent>,
    pub correct: u32,
    pub wrong: u32,
    pub hints: u32,
    pub duration: i64,
    #[serde(with = "opt_bson_datetime", default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(with = "opt_bson_datetime", default)]
    pub end_time: Option<DateTime<Utc>>,
}

impl QuestionAnswer {
    pub fn is_solved(&self) -> bool {
        self.correct >= 1
    }

    /// Last event if it is still open.
    pub fn open_event_mut(&mut self) -> Option<&mut QuestionAttemptEvent> {
        self.events.last_mut().filter(|e| e.end_time.is_none())
    }

    pub fn recompute_rollups(&mut self) {
        self.correct = self.events.iter().filter(|e| e.is_correct).count() as u32;
        self.wrong = self.events.iter().filter(|e| e.is_wrong).count() as u32;
        self.hints = self.events.iter().filter(|e| e.hint_used).count() as u32;
        self.duration = self.events.iter().map(|e| e.duration).sum();
    }
}

/// One learner's pass at one quiz.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub kid_index: String,
    pub quiz_id: String,

    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "opt_bson_datetime", default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Total seconds across all answers.
    pub duration: i64,

    pub answers: Vec<QuestionAnswer>,

    /// Nth attempt at this quiz by this kid, 1-based.
    pub attempts_count: u32,
    pub answered_questions: u32,
    pub success_rate: f64,
    pub score: f64,

    pub status: AttemptStatus,

    pub device_type: Option<String>,
    pub device: Option<String>,

    // Audit
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
    pub version: u32,
}

impl AttemptRecord {
    pub fn new(
        id: String,
        user_id: String,
        kid_index: String,
        quiz_id: String,
        question_count: usize,
        attempts_count: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            kid_index,
            quiz_id,
            start_time: now,
            end_time: None,
            duration: 0,
            answers: (0..question_count).map(|_| QuestionAnswer::default()).collect(),
            attempts_count,
            answered_questions: 0,
            success_rate: 0.0,
            score: 0.0,
            status: AttemptStatus::InProgress,
            device_type: None,
            device: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn total_wrong(&self) -> u32 {
        self.answers.iter().map(|a| a.wrong).sum()
    }

    pub fn solved_questions(&self) -> u32 {
        self.answers.iter().filter(|a| a.is_solved()).count() as u32
    }
}

// ---------- Request / response DTOs ----------

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAttemptRequest {
    #[validate(length(min = 1, message = "user_id is required"))]
    pub user_id: String,
    #[validate(length(min = 1, message = "kid_index is required"))]
    pub kid_index: String,
    #[validate(length(min = 1, message = "quiz_id is required"))]
    pub quiz_id: String,
    pub device_type: Option<String>,
    pub device: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateAttemptResponse {
    pub attempt_id: String,
    pub question_count: usize,
    pub attempts_count: u32,
}

#[derive(Debug, Deserialize)]
pub struct SubmitQuestionRequest {
    #[serde(default)]
    pub is_correct: bool,
    #[serde(default)]
    pub is_wrong: bool,
    #[serde(default)]
    pub hint_used: bool,
    #[serde(default)]
    pub duration: i64,
}

#[derive(Debug, Serialize)]
pub struct SubmitQuestionResponse {
    pub attempt_id: String,
    pub status: AttemptStatus,
    pub score: f64,
    pub answered_questions: u32,
}

/// Attempt row for kid-level listings, enriched with quiz metadata.
#[derive(Debug, Serialize)]
pub struct AttemptSummary {
    pub id: String,
    pub quiz_id: String,
    pub subject: Option<String>,
    pub chapter: Option<String>,
    pub grade: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub score: f64,
    pub status: AttemptStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_attempt_presizes_answers() {
        let now = Utc::now();
        let attempt = AttemptRecord::new(
            "a1".into(),
            "u1".into(),
            "0".into(),
            "q1".into(),
            4,
            1,
            now,
        );
        assert_eq!(attempt.answers.len(), 4);
        assert_eq!(attempt.status, AttemptStatus::InProgress);
        assert!(!attempt.is_terminal());
        assert_eq!(attempt.answered_questions, 0);
        assert!(attempt.answers.iter().all(|a| a.events.is_empty()));
    }

    #[test]
    fn rollups_are_sums_over_events() {
        let now = Utc::now();
        let mut answer = QuestionAnswer::default();
        answer.events.push(QuestionAttemptEvent {
            start_time: now,
            end_time: Some(now),
            is_correct: false,
            is_wrong: true,
            hint_used: true,
            duration: 12,
        });
        answer.events.push(QuestionAttemptEvent {
            start_time: now,
            end_time: Some(now),
            is_correct: true,
            is_wrong: false,
            hint_used: false,
            duration: 8,
        });
        answer.recompute_rollups();
        assert_eq!(answer.correct, 1);
        assert_eq!(answer.wrong, 1);
        assert_eq!(answer.hints, 1);
        assert_eq!(answer.duration, 20);
        assert!(answer.is_solved());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&AttemptStatus::TimedOut).unwrap();
        assert_eq!(json, "\"timed_out\"");
        assert_eq!(AttemptStatus::TimedOut.as_str(), "timed_out");
    }
}
