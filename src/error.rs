use thiserror::Error;

/// Why a user action was refused or failed.
///
/// Commands return these inside `anyhow::Error`; callers that care about the
/// category can `downcast_ref::<ActionError>()`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("request failed: {0}")]
    Api(String),
}

impl ActionError {
    pub fn login_required() -> Self {
        ActionError::Unauthorized("You must be logged in. Run 'civic login' first.".to_string())
    }

    pub fn issue_not_found(id: i64) -> Self {
        ActionError::NotFound(format!("Issue #{}", id))
    }

    /// Whether the action should send the user back to the login step.
    pub fn requires_login(&self) -> bool {
        matches!(self, ActionError::Unauthorized(_))
    }
}
