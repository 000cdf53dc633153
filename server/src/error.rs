use thiserror::Error;

/// Typed error kinds from spec §7. Each variant maps to exactly one wire
/// shape at the gateway; nothing here ever crosses a room boundary on its
/// own — the room actor that raised it is also the one that reports it.
#[derive(Debug, Error, Clone)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    State(String),
    #[error("{0}")]
    Authorization(String),
    #[error("{0}")]
    BudgetExceeded(String),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    pub fn budget_exceeded(msg: impl Into<String>) -> Self {
        Self::BudgetExceeded(msg.into())
    }

    pub fn message(&self) -> String {
        self.to_string()
    }
}
