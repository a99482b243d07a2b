//! End-to-end pipeline over in-memory attempts: snapshot the window, then
//! classify it, asserting the full set of feedback codes.

use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;

use quiztrack_api::config::MasteryConfig;
use quiztrack_api::models::attempt::{AttemptRecord, AttemptStatus};
use quiztrack_api::models::metrics::Period;
use quiztrack_api::models::quiz::QuizInfo;
use quiztrack_api::services::classifier;
use quiztrack_api::services::metrics_service::build_snapshot;

fn day(n: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, n, 12, 0, 0).unwrap()
}

fn attempt(
    quiz_id: &str,
    status: AttemptStatus,
    score: f64,
    start: DateTime<Utc>,
    duration: i64,
) -> AttemptRecord {
    let mut a = AttemptRecord::new(
        uuid::Uuid::new_v4().to_string(),
        "u1".into(),
        "0".into(),
        quiz_id.into(),
        3,
        1,
        start,
    );
    a.status = status;
    a.score = score;
    a.duration = duration;
    a
}

fn quiz_info(subject: &str) -> QuizInfo {
    QuizInfo {
        subject: Some(subject.to_string()),
        chapter: Some("ch1".into()),
        grade: Some("g3".into()),
    }
}

#[test]
fn week_of_practice_produces_expected_codes() {
    // Five practice days: three completions in a row, an abort, then a
    // successful retry of the aborted quiz.
    let attempts = vec![
        attempt("q_math1", AttemptStatus::Completed, 0.9, day(1), 2400),
        attempt("q_math2", AttemptStatus::Completed, 0.8, day(2), 2400),
        attempt("q_sci1", AttemptStatus::Completed, 0.75, day(3), 2400),
        attempt("q_sci2", AttemptStatus::Aborted, 0.0, day(4), 2400),
        attempt("q_sci2", AttemptStatus::Completed, 0.8, day(5), 2400),
    ];
    let infos: HashMap<String, QuizInfo> = [
        ("q_math1".to_string(), quiz_info("Math")),
        ("q_math2".to_string(), quiz_info("Math")),
        ("q_sci1".to_string(), quiz_info("Science")),
        ("q_sci2".to_string(), quiz_info("Science")),
    ]
    .into_iter()
    .collect();

    let snapshot = build_snapshot(
        "u1",
        "0",
        day(1),
        day(7),
        &attempts,
        &[],
        &infos,
        &MasteryConfig {
            threshold: 0.7,
            min_samples: 1,
        },
    );

    assert_eq!(snapshot.engagement.days_practiced, 5);
    assert_eq!(snapshot.engagement.total_days, 7);
    assert_eq!(snapshot.streak, 3);
    assert_eq!(snapshot.completion_rate.completed, 4);
    assert_eq!(snapshot.completion_rate.started, 5);
    assert_eq!(snapshot.abandonment_rate.aborted, 1);
    assert!((snapshot.time_spent - 200.0).abs() < 1e-9);
    // no previous window reads as full progress
    assert!((snapshot.progress - 1.0).abs() < 1e-9);
    assert_eq!(snapshot.perseverance.retries, 1);
    assert_eq!(snapshot.perseverance.improved, 1);
    assert_eq!(snapshot.subject_balance, 70);
    assert_eq!(snapshot.recommendation, "Math");
    assert!(snapshot.persistent_failures.is_empty());
    assert!((snapshot.mastery["Math"] - 0.85).abs() < 1e-9);
    assert!(!snapshot.mastery.contains_key("Science"));
    assert_eq!(snapshot.grade_distribution["g3"]["Math"].count, 2);
    assert_eq!(snapshot.grade_distribution["g3"]["Science"].count, 3);

    let codes = classifier::classify(&snapshot, Period::Week);

    for expected in [
        "ENGAGEMENT_GOOD",
        "STREAK_3",
        "COMPLETION_GOOD",
        "MASTERY_GOOD_Math",
        "PERSEVERANCE_RETRIES",
        "TIME_MEDIUM",
        "INSPIRATION_WEEK",
    ] {
        assert!(
            codes.achievements.contains(&expected.to_string()),
            "missing achievement {expected}, got {:?}",
            codes.achievements
        );
    }

    assert_eq!(codes.alerts, vec!["ABANDON_ALERT".to_string()]);
    assert_eq!(codes.recommendations, vec!["RECOMMEND_Math".to_string()]);
}

#[test]
fn persistent_failures_survive_the_pipeline() {
    let attempts = vec![
        attempt("q_hard", AttemptStatus::Failed, 0.1, day(1), 300),
        attempt("q_hard", AttemptStatus::Failed, 0.15, day(2), 300),
        attempt("q_hard", AttemptStatus::Failed, 0.1, day(3), 300),
        attempt("q_easy", AttemptStatus::Completed, 0.9, day(4), 300),
    ];
    let infos = HashMap::new();

    let snapshot = build_snapshot(
        "u1",
        "0",
        day(1),
        day(7),
        &attempts,
        &[],
        &infos,
        &MasteryConfig {
            threshold: 0.7,
            min_samples: 1,
        },
    );

    assert_eq!(snapshot.persistent_failures.get("q_hard"), Some(&3));
    assert_eq!(snapshot.persistent_failures.get("q_easy"), None);
    // missing metadata rolls everything into one unknown subject
    assert_eq!(snapshot.subject_stats["unknown"].count, 4);
}

#[test]
fn empty_window_classifies_as_no_activity() {
    let snapshot = build_snapshot(
        "u1",
        "0",
        day(1),
        day(7),
        &[],
        &[],
        &HashMap::new(),
        &MasteryConfig {
            threshold: 0.7,
            min_samples: 1,
        },
    );

    assert_eq!(snapshot.subject_balance, 0);
    assert_eq!(snapshot.recommendation, "none");

    let codes = classifier::classify(&snapshot, Period::Week);
    assert!(codes.achievements.is_empty());
    assert!(codes.alerts.is_empty());
    assert_eq!(codes.recommendations, vec!["DEFAULT_NO_ACTIVITY"]);
}
