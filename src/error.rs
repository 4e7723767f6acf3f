use thiserror::Error;

/// Every failure the simulator can report. All of them are fatal to the
/// current run or sweep; nothing is retried.
#[derive(Debug, Error)]
pub enum NesError {
    /// Unsupported discrete parameter (U*, mode) or a missing/unreadable input file.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Out-of-range index, negative ratio, malformed grid, broken ordering or closure.
    #[error("validation error: {0}")]
    Validation(String),
    /// An internal invariant did not hold (wrong batch cardinality).
    #[error("consistency error: {0}")]
    Consistency(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type NesResult<T> = Result<T, NesError>;

impl NesError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn consistency(message: impl Into<String>) -> Self {
        Self::Consistency(message.into())
    }

    /// Process exit code the command line maps this error to.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 2,
            Self::Validation(_) => 3,
            Self::Consistency(_) => 4,
            Self::Io(_) => 5,
        }
    }
}
