use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::Database;
use uuid::Uuid;
use validator::Validate;

use crate::config::{Config, ScoringConfig};
use crate::error::CoreError;
use crate::metrics::{ATTEMPTS_FINALIZED_TOTAL, ATTEMPTS_STARTED_TOTAL, QUESTIONS_SUBMITTED_TOTAL};
use crate::models::attempt::{
    AttemptRecord, AttemptStatus, AttemptSummary, CreateAttemptRequest, CreateAttemptResponse,
    QuestionAttemptEvent, SubmitQuestionRequest, SubmitQuestionResponse,
};
use crate::models::quiz::QuizDocument;
use crate::services::metadata_service::QuizMetadataProvider;
use crate::services::scoring;
use crate::utils::retry::{retry_async_with_config, RetryConfig};
use crate::utils::time::chrono_to_bson;

pub const ATTEMPTS_COLLECTION: &str = "attempts";
pub const QUIZZES_COLLECTION: &str = "quizzes";

/// State machine for a single quiz attempt. Owns transition legality,
/// invokes the scoring engine and persists through guarded writes so a
/// live mutation and the timeout sweeper can never both finalize one
/// attempt.
pub struct AttemptService {
    mongo: Database,
    config: Config,
}

impl AttemptService {
    pub fn new(mongo: Database, config: Config) -> Self {
        Self { mongo, config }
    }

    pub async fn start_attempt(
        &self,
        req: CreateAttemptRequest,
    ) -> Result<CreateAttemptResponse, CoreError> {
        req.validate()
            .map_err(|e| CoreError::InvalidInput(e.to_string()))?;

        let quiz = self
            .mongo
            .collection::<QuizDocument>(QUIZZES_COLLECTION)
            .find_one(doc! { "_id": &req.quiz_id })
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("quiz {}", req.quiz_id)))?;

        let prior_attempts = self
            .mongo
            .collection::<AttemptRecord>(ATTEMPTS_COLLECTION)
            .count_documents(doc! {
                "user_id": &req.user_id,
                "kid_index": &req.kid_index,
                "quiz_id": &req.quiz_id,
            })
            .await?;

        let now = Utc::now();
        let mut attempt = AttemptRecord::new(
            Uuid::new_v4().to_string(),
            req.user_id,
            req.kid_index,
            req.quiz_id,
            quiz.question_count(),
            prior_attempts as u32 + 1,
            now,
        );
        attempt.device_type = req.device_type;
        attempt.device = req.device;

        let collection = self.mongo.collection::<AttemptRecord>(ATTEMPTS_COLLECTION);
        retry_async_with_config(RetryConfig::default(), || async {
            collection.insert_one(&attempt).await.map(|_| ())
        })
        .await?;

        ATTEMPTS_STARTED_TOTAL.inc();
        tracing::info!(
            attempt_id = %attempt.id,
            quiz_id = %attempt.quiz_id,
            attempts_count = attempt.attempts_count,
            "Attempt started"
        );

        Ok(CreateAttemptResponse {
            attempt_id: attempt.id,
            question_count: attempt.answers.len(),
            attempts_count: attempt.attempts_count,
        })
    }

    pub async fn begin_question(
        &self,
        attempt_id: &str,
        index: usize,
    ) -> Result<SubmitQuestionResponse, CoreError> {
        let mut attempt = self.load_attempt(attempt_id).await?;
        apply_begin_question(&mut attempt, index, Utc::now())?;
        self.save_in_progress_guarded(&mut attempt).await?;

        Ok(SubmitQuestionResponse {
            attempt_id: attempt.id,
            status: attempt.status,
            score: attempt.score,
            answered_questions: attempt.answered_questions,
        })
    }

    pub async fn submit_question(
        &self,
        attempt_id: &str,
        index: usize,
        req: SubmitQuestionRequest,
    ) -> Result<SubmitQuestionResponse, CoreError> {
        let mut attempt = self.load_attempt(attempt_id).await?;
        apply_submit_question(&mut attempt, index, &req, Utc::now(), &self.config.scoring)?;
        self.save_in_progress_guarded(&mut attempt).await?;

        QUESTIONS_SUBMITTED_TOTAL
            .with_label_values(&[if req.is_correct { "true" } else { "false" }])
            .inc();
        if attempt.is_terminal() {
            ATTEMPTS_FINALIZED_TOTAL
                .with_label_values(&[attempt.status.as_str()])
                .inc();
            tracing::info!(
                attempt_id = %attempt.id,
                status = attempt.status.as_str(),
                score = attempt.score,
                "Attempt finalized"
            );
        }

        Ok(SubmitQuestionResponse {
            attempt_id: attempt.id,
            status: attempt.status,
            score: attempt.score,
            answered_questions: attempt.answered_questions,
        })
    }

    pub async fn abandon(&self, attempt_id: &str) -> Result<SubmitQuestionResponse, CoreError> {
        let mut attempt = self.load_attempt(attempt_id).await?;
        apply_abandon(&mut attempt, Utc::now())?;
        self.save_in_progress_guarded(&mut attempt).await?;

        ATTEMPTS_FINALIZED_TOTAL
            .with_label_values(&[AttemptStatus::Aborted.as_str()])
            .inc();
        tracing::info!(attempt_id = %attempt.id, "Attempt abandoned");

        Ok(SubmitQuestionResponse {
            attempt_id: attempt.id,
            status: attempt.status,
            score: attempt.score,
            answered_questions: attempt.answered_questions,
        })
    }

    pub async fn get_attempt(&self, attempt_id: &str) -> Result<AttemptRecord, CoreError> {
        self.load_attempt(attempt_id).await
    }

    /// Attempts for one kid with start_time inside the inclusive window,
    /// enriched with quiz metadata for listing views.
    pub async fn list_attempts(
        &self,
        user_id: &str,
        kid_index: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        metadata: &dyn QuizMetadataProvider,
    ) -> Result<Vec<AttemptSummary>, CoreError> {
        if from > to {
            return Err(CoreError::InvalidInput("from must not exceed to".into()));
        }

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

        let quiz_ids: Vec<String> = attempts
            .iter()
            .map(|a| a.quiz_id.clone())
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .collect();
        let infos = metadata.get(&quiz_ids).await;

        Ok(attempts
            .into_iter()
            .map(|a| {
                let info = infos.get(&a.quiz_id);
                AttemptSummary {
                    id: a.id,
                    quiz_id: a.quiz_id,
                    subject: info.and_then(|i| i.subject.clone()),
                    chapter: info.and_then(|i| i.chapter.clone()),
                    grade: info.and_then(|i| i.grade.clone()),
                    start_time: a.start_time,
                    end_time: a.end_time,
                    score: a.score,
                    status: a.status,
                }
            })
            .collect())
    }

    /// Maintenance pass rescoring every stored attempt with the canonical
    /// formula. Used after scoring-window config changes.
    pub async fn recalculate_scores(&self) -> Result<u64, CoreError> {
        let collection = self.mongo.collection::<AttemptRecord>(ATTEMPTS_COLLECTION);
        let mut cursor = collection.find(doc! {}).await?;
        let mut updated = 0u64;

        while let Some(mut attempt) = cursor.try_next().await? {
            let (score, success_rate) =
                scoring::score(&attempt.answers, attempt.attempts_count, &self.config.scoring);
            attempt.score = score;
            attempt.success_rate = success_rate;
            attempt.updated_at = Utc::now();
            attempt.version += 1;

            collection
                .replace_one(doc! { "_id": &attempt.id }, &attempt)
                .await?;
            updated += 1;
        }

        tracing::info!(updated, "Scores recalculated");
        Ok(updated)
    }

    async fn load_attempt(&self, attempt_id: &str) -> Result<AttemptRecord, CoreError> {
        self.mongo
            .collection::<AttemptRecord>(ATTEMPTS_COLLECTION)
            .find_one(doc! { "_id": attempt_id })
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("attempt {}", attempt_id)))
    }

    /// Replaces the record only if it is still in progress in the store.
    /// The status guard lives in the write's filter, so a concurrent
    /// terminal transition (submit/abandon vs sweeper) loses cleanly with
    /// `InvalidState` instead of double-finalizing.
    async fn save_in_progress_guarded(&self, attempt: &mut AttemptRecord) -> Result<(), CoreError> {
        attempt.updated_at = Utc::now();
        attempt.version += 1;
        let attempt: &AttemptRecord = attempt;

        let collection = self.mongo.collection::<AttemptRecord>(ATTEMPTS_COLLECTION);
        let filter = doc! {
            "_id": &attempt.id,
            "status": AttemptStatus::InProgress.as_str(),
        };

        let result = retry_async_with_config(RetryConfig::aggressive(), || async {
            collection.replace_one(filter.clone(), attempt).await
        })
        .await?;

        if result.matched_count == 0 {
            tracing::warn!(attempt_id = %attempt.id, "Lost terminal-transition race");
            return Err(CoreError::InvalidState);
        }
        Ok(())
    }
}

// ---------- Pure transition logic ----------

pub(crate) fn apply_begin_question(
    attempt: &mut AttemptRecord,
    index: usize,
    now: DateTime<Utc>,
) -> Result<(), CoreError> {
    if attempt.is_terminal() {
        return Err(CoreError::InvalidState);
    }
    if index >= attempt.answers.len() {
        return Err(CoreError::OutOfRange(index));
    }
    // Questions are gated sequentially: index-1 must be solved first.
    if index > 0 && !attempt.answers[index - 1].is_solved() {
        return Err(CoreError::SequenceViolation {
            requested: index,
            missing: index - 1,
        });
    }
    if attempt.answers[index].is_solved() {
        return Err(CoreError::AlreadySolved(index));
    }

    let answer = &mut attempt.answers[index];
    answer.events.push(QuestionAttemptEvent {
        start_time: now,
        end_time: None,
        is_correct: false,
        is_wrong: false,
        hint_used: false,
        duration: 0,
    });
    if answer.start_time.is_none() {
        answer.start_time = Some(now);
    }
    Ok(())
}

pub(crate) fn apply_submit_question(
    attempt: &mut AttemptRecord,
    index: usize,
    req: &SubmitQuestionRequest,
    now: DateTime<Utc>,
    cfg: &ScoringConfig,
) -> Result<(), CoreError> {
    if attempt.is_terminal() {
        return Err(CoreError::InvalidState);
    }
    if index >= attempt.answers.len() {
        return Err(CoreError::OutOfRange(index));
    }
    // Gating mirrors begin_question: a skipped-ahead submit is a sequence
    // violation, not a missing open event.
    if index > 0 && !attempt.answers[index - 1].is_solved() {
        return Err(CoreError::SequenceViolation {
            requested: index,
            missing: index - 1,
        });
    }
    if attempt.answers[index].is_solved() {
        return Err(CoreError::AlreadySolved(index));
    }

    let answer = &mut attempt.answers[index];
    let event = answer
        .open_event_mut()
        .ok_or(CoreError::NoOpenAttempt(index))?;

    event.end_time = Some(now);
    event.is_correct = req.is_correct;
    event.is_wrong = req.is_wrong;
    event.hint_used = req.hint_used;
    event.duration = if req.duration > 0 {
        req.duration
    } else {
        (now - event.start_time).num_seconds().max(0)
    };

    answer.end_time = Some(now);
    answer.recompute_rollups();

    attempt.answered_questions = attempt.solved_questions();
    let question_count = attempt.answers.len() as u32;
    let total_wrong = attempt.total_wrong();

    if attempt.answered_questions == question_count {
        attempt.status = AttemptStatus::Completed;
        attempt.end_time = Some(now);
    } else if total_wrong >= cfg.fail_threshold {
        attempt.status = AttemptStatus::Failed;
        attempt.end_time = Some(now);
    }

    attempt.duration = attempt.answers.iter().map(|a| a.duration).sum();
    let (score, success_rate) = scoring::score(&attempt.answers, attempt.attempts_count, cfg);
    attempt.score = score;
    attempt.success_rate = success_rate;

    Ok(())
}

pub(crate) fn apply_abandon(
    attempt: &mut AttemptRecord,
    now: DateTime<Utc>,
) -> Result<(), CoreError> {
    if attempt.is_terminal() {
        return Err(CoreError::InvalidState);
    }
    attempt.status = AttemptStatus::Aborted;
    attempt.end_time = Some(now);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::attempt::SubmitQuestionRequest;

    fn scoring_cfg() -> ScoringConfig {
        ScoringConfig {
            min_time_secs: 0,
            max_time_secs: 90,
            fail_threshold: 3,
        }
    }

    fn new_attempt(questions: usize) -> AttemptRecord {
        AttemptRecord::new(
            "a1".into(),
            "u1".into(),
            "0".into(),
            "quiz-1".into(),
            questions,
            1,
            Utc::now(),
        )
    }

    fn submit(correct: bool, wrong: bool, hint: bool, duration: i64) -> SubmitQuestionRequest {
        SubmitQuestionRequest {
            is_correct: correct,
            is_wrong: wrong,
            hint_used: hint,
            duration,
        }
    }

    fn solve_question(attempt: &mut AttemptRecord, index: usize) {
        apply_begin_question(attempt, index, Utc::now()).unwrap();
        apply_submit_question(
            attempt,
            index,
            &submit(true, false, false, 30),
            Utc::now(),
            &scoring_cfg(),
        )
        .unwrap();
    }

    #[test]
    fn full_run_completes_with_reference_score() {
        let mut attempt = new_attempt(3);
        for i in 0..3 {
            solve_question(&mut attempt, i);
        }
        assert_eq!(attempt.status, AttemptStatus::Completed);
        assert!(attempt.end_time.is_some());
        assert_eq!(attempt.answered_questions, 3);
        let expected = 0.7 + 0.2 * (1.0 - 30.0 / 90.0) + 0.1;
        assert!((attempt.score - expected).abs() < 1e-9);
    }

    #[test]
    fn three_wrong_answers_fail_the_attempt() {
        let mut attempt = new_attempt(3);
        for _ in 0..3 {
            apply_begin_question(&mut attempt, 0, Utc::now()).unwrap();
            apply_submit_question(
                &mut attempt,
                0,
                &submit(false, true, false, 10),
                Utc::now(),
                &scoring_cfg(),
            )
            .unwrap();
        }
        assert_eq!(attempt.status, AttemptStatus::Failed);
        assert!(attempt.end_time.is_some());
        assert_eq!(attempt.total_wrong(), 3);
    }

    #[test]
    fn wrong_answers_across_questions_accumulate() {
        let mut attempt = new_attempt(3);
        // one wrong try on question 0, then solve it
        apply_begin_question(&mut attempt, 0, Utc::now()).unwrap();
        apply_submit_question(
            &mut attempt,
            0,
            &submit(false, true, false, 5),
            Utc::now(),
            &scoring_cfg(),
        )
        .unwrap();
        solve_question(&mut attempt, 0);
        // two wrong tries on question 1 push the total to three
        for _ in 0..2 {
            apply_begin_question(&mut attempt, 1, Utc::now()).unwrap();
            apply_submit_question(
                &mut attempt,
                1,
                &submit(false, true, false, 5),
                Utc::now(),
                &scoring_cfg(),
            )
            .unwrap();
        }
        assert_eq!(attempt.status, AttemptStatus::Failed);
    }

    #[test]
    fn sequence_gating_rejects_skipping_ahead() {
        let mut attempt = new_attempt(3);
        let err = apply_begin_question(&mut attempt, 1, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            CoreError::SequenceViolation {
                requested: 1,
                missing: 0
            }
        ));

        solve_question(&mut attempt, 0);
        let err = apply_begin_question(&mut attempt, 2, Utc::now()).unwrap_err();
        assert!(matches!(err, CoreError::SequenceViolation { .. }));
        assert!(apply_begin_question(&mut attempt, 1, Utc::now()).is_ok());
    }

    #[test]
    fn submit_ahead_of_sequence_rejected() {
        let mut attempt = new_attempt(3);
        let err = apply_submit_question(
            &mut attempt,
            1,
            &submit(true, false, false, 1),
            Utc::now(),
            &scoring_cfg(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CoreError::SequenceViolation {
                requested: 1,
                missing: 0
            }
        ));

        solve_question(&mut attempt, 0);
        let err = apply_submit_question(
            &mut attempt,
            2,
            &submit(true, false, false, 1),
            Utc::now(),
            &scoring_cfg(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::SequenceViolation { .. }));

        // a solved question rejects submits before the open-event lookup
        let err = apply_submit_question(
            &mut attempt,
            0,
            &submit(true, false, false, 1),
            Utc::now(),
            &scoring_cfg(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::AlreadySolved(0)));
    }

    #[test]
    fn solved_question_rejects_further_events() {
        let mut attempt = new_attempt(2);
        solve_question(&mut attempt, 0);
        let err = apply_begin_question(&mut attempt, 0, Utc::now()).unwrap_err();
        assert!(matches!(err, CoreError::AlreadySolved(0)));
    }

    #[test]
    fn out_of_range_index_rejected() {
        let mut attempt = new_attempt(2);
        assert!(matches!(
            apply_begin_question(&mut attempt, 2, Utc::now()).unwrap_err(),
            CoreError::OutOfRange(2)
        ));
        assert!(matches!(
            apply_submit_question(
                &mut attempt,
                5,
                &submit(true, false, false, 1),
                Utc::now(),
                &scoring_cfg()
            )
            .unwrap_err(),
            CoreError::OutOfRange(5)
        ));
    }

    #[test]
    fn submit_without_begin_rejected() {
        let mut attempt = new_attempt(2);
        let err = apply_submit_question(
            &mut attempt,
            0,
            &submit(true, false, false, 1),
            Utc::now(),
            &scoring_cfg(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::NoOpenAttempt(0)));
    }

    #[test]
    fn terminal_attempt_rejects_all_mutations() {
        let mut attempt = new_attempt(1);
        apply_abandon(&mut attempt, Utc::now()).unwrap();
        assert_eq!(attempt.status, AttemptStatus::Aborted);

        assert!(matches!(
            apply_begin_question(&mut attempt, 0, Utc::now()).unwrap_err(),
            CoreError::InvalidState
        ));
        assert!(matches!(
            apply_submit_question(
                &mut attempt,
                0,
                &submit(true, false, false, 1),
                Utc::now(),
                &scoring_cfg()
            )
            .unwrap_err(),
            CoreError::InvalidState
        ));
        assert!(matches!(
            apply_abandon(&mut attempt, Utc::now()).unwrap_err(),
            CoreError::InvalidState
        ));
        // still exactly one terminal state
        assert_eq!(attempt.status, AttemptStatus::Aborted);
    }

    #[test]
    fn missing_duration_computed_from_event_start() {
        let mut attempt = new_attempt(1);
        let started = Utc::now();
        apply_begin_question(&mut attempt, 0, started).unwrap();
        let finished = started + chrono::Duration::seconds(42);
        apply_submit_question(
            &mut attempt,
            0,
            &submit(true, false, false, 0),
            finished,
            &scoring_cfg(),
        )
        .unwrap();
        assert_eq!(attempt.answers[0].duration, 42);
        assert_eq!(attempt.duration, 42);
    }
}
