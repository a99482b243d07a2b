use axum::http::StatusCode;
use thiserror::Error;

/// Domain errors for the attempt lifecycle and analytics services. Handlers
/// translate these into HTTP responses via [`CoreError::into_response_parts`].
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The attempt is already in a terminal state.
    #[error("Attempt is not in progress")]
    InvalidState,

    /// Questions must be answered in order; `missing` is the first unsolved
    /// question before the requested one.
    #[error("Question {requested} is locked, question {missing} must be solved first")]
    SequenceViolation { requested: usize, missing: usize },

    #[error("Question {0} is already solved")]
    AlreadySolved(usize),

    #[error("Question index {0} is out of range")]
    OutOfRange(usize),

    #[error("Question {0} has no open attempt event")]
    NoOpenAttempt(usize),

    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(#[from] mongodb::error::Error),
}

impl CoreError {
    pub fn status(&self) -> StatusCode {
        match self {
            CoreError::InvalidInput(_)
            | CoreError::SequenceViolation { .. }
            | CoreError::AlreadySolved(_)
            | CoreError::OutOfRange(_)
            | CoreError::NoOpenAttempt(_) => StatusCode::BAD_REQUEST,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::InvalidState => StatusCode::CONFLICT,
            CoreError::DependencyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn into_response_parts(self) -> (StatusCode, String) {
        (self.status(), self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            CoreError::InvalidInput("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CoreError::NotFound("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(CoreError::InvalidState.status(), StatusCode::CONFLICT);
        assert_eq!(
            CoreError::SequenceViolation {
                requested: 2,
                missing: 0
            }
            .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CoreError::AlreadySolved(1).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(CoreError::OutOfRange(9).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            CoreError::NoOpenAttempt(0).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CoreError::DependencyUnavailable("mongo".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn messages_name_the_question() {
        let err = CoreError::SequenceViolation {
            requested: 3,
            missing: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains('3'));
        assert!(msg.contains('1'));
    }
}
