pub mod attempt;
pub mod metrics;
pub mod quiz;

pub use attempt::{AttemptRecord, AttemptStatus, QuestionAnswer, QuestionAttemptEvent};
pub use metrics::{ClassificationCodes, MetricsSnapshot, Period};
pub use quiz::{QuizDocument, QuizInfo};
