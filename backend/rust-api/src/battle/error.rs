//! Error taxonomy for the battle core.

use thiserror::Error;

/// The question source could not produce a usable question set.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("question source unavailable: {0}")]
    Unavailable(String),

    #[error("question source returned malformed output: {0}")]
    Malformed(String),

    #[error("question source returned no usable questions")]
    Empty,
}

/// The answer oracle could not produce an answer. Recovered locally: the AI
/// is scored as wrong for that question.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("answer oracle unavailable: {0}")]
    Unavailable(String),

    #[error("answer oracle returned malformed output: {0}")]
    Malformed(String),

    #[error("answer oracle chose {0:?}, which is not one of the options")]
    UnknownOption(String),
}

impl OracleError {
    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            OracleError::Unavailable(_) => "unavailable",
            OracleError::Malformed(_) => "malformed",
            OracleError::UnknownOption(_) => "unknown_option",
        }
    }
}

/// Saving a completed battle failed. Never reverts the completed state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("battle result rejected: {0}")]
    Rejected(String),

    #[error("persistence store unavailable: {0}")]
    Unavailable(String),
}

/// Errors returned to callers of the battle state machine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BattleError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("cannot {operation} while battle is {state}")]
    InvalidTransition {
        operation: &'static str,
        state: String,
    },

    #[error("{0:?} is not one of the current question's options")]
    UnknownOption(String),

    #[error("invalid battle settings: {0}")]
    InvalidSettings(String),

    #[error("battle changed before {0} completed")]
    Superseded(&'static str),
}

impl BattleError {
    pub(crate) fn invalid(operation: &'static str, phase: super::Phase) -> Self {
        BattleError::InvalidTransition {
            operation,
            state: phase.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BattleError>;
