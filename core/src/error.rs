use thiserror::Error;

/// Crate-wide error type. Long-running role loops (Planner, Agent-Validator) log these
/// and continue rather than propagate them; setup-time calls return them to the caller.
#[derive(Error, Debug)]
pub enum ShellError {
    #[error("llm gateway error: {0}")]
    Gateway(String),

    #[error("bus error: {0}")]
    Bus(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("planning error: {0}")]
    Planning(String),

    #[error("cancelled: {0}")]
    Cancelled(String),
}

pub type ShellResult<T> = Result<T, ShellError>;
