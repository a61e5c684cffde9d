use thiserror::Error;

/// Why an authorization check refused an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Refusal {
    #[error("insufficient role for this command")]
    InsufficientRole,
    #[error("only a superuser can add another superuser")]
    SuperOnly,
    #[error("members cannot remove themselves")]
    RemoveSelf,
    #[error("only a superuser can remove a superuser")]
    RemoveSuper,
    #[error("the last superuser cannot be removed")]
    RemoveLastSuper,
}

/// Errors produced by roster, log, and translation operations.
///
/// Every variant is reported back to the member who triggered it as plain
/// text; none of them abort the serving process.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Bad command syntax, arity, or argument format
    #[error("{0}")]
    Validation(String),

    /// The acting member's role does not allow the operation
    #[error("Forbidden: {0}")]
    Forbidden(Refusal),

    #[error("User not found: {0}")]
    NotFound(String),

    #[error("User already exists: {0}")]
    DuplicateMember(String),

    #[error("Unknown language code: '{0}'")]
    InvalidLanguage(String),

    #[error("Unknown role: '{0}'")]
    InvalidRole(String),

    /// Every translation mirror failed or timed out
    #[error("Translation unavailable: {0}")]
    TranslationUnavailable(String),

    /// The roster/log document could not be written
    #[error("Failed to persist state: {0}")]
    Persistence(String),
}

pub type RelayResult<T> = Result<T, RelayError>;
