use talkto_models::room::PolicyViolation;
use talkto_util::validation::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found")]
    NotFound,
    #[error("forbidden")]
    Forbidden,
    #[error("invalid cursor")]
    InvalidCursor,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Policy(#[from] PolicyViolation),
    #[error("invalid content: {0}")]
    Validation(#[from] ValidationError),
    #[error("rate limited")]
    RateLimited,
    #[error("database error: {0}")]
    Database(#[from] talkto_db::DbError),
    #[error("internal error: {0}")]
    Internal(String),
}
