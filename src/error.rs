use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors raised by the working set and its collaborators.
///
/// `UserInput` and `TransactionState` surface synchronously at the calling
/// site without touching session state. `Transport` during commit marks the
/// driver transaction failed; the caller must roll back before further use.
/// `Consistency` is reported at commit time and fails the whole transaction.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("invalid input: {0}")]
    UserInput(String),
    #[error("transaction state: {0}")]
    TransactionState(&'static str),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("consistency violation: {0}")]
    Consistency(String),
    #[error("multiple properties exist for key '{0}'")]
    MultipleProperties(String),
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(&'static str),
}

impl GraphError {
    pub(crate) fn user_input(message: impl Into<String>) -> Self {
        GraphError::UserInput(message.into())
    }

    pub(crate) fn transport(message: impl Into<String>) -> Self {
        GraphError::Transport(message.into())
    }

    pub(crate) fn consistency(message: impl Into<String>) -> Self {
        GraphError::Consistency(message.into())
    }
}
