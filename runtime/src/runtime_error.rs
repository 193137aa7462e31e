use std::fmt;
use std::fmt::Display;

use thiserror::Error;

use streamql_common::histogram::HistogramError;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Debug, PartialEq, Clone, Error)]
pub enum RuntimeError {
    /// A fatal inconsistency while evaluating the operator tree.
    #[error("execution error: {0}")]
    Execution(String),
    #[error("the query would use more memory than permitted: requested {requested} bytes, limit {limit} bytes, currently {current} bytes")]
    ResourceExhausted {
        requested: u64,
        limit: u64,
        current: u64,
    },
    #[error("query was cancelled")]
    Cancelled,
    #[error("query deadline exceeded")]
    DeadlineExceeded,
    #[error("Argument error: {0}")]
    ArgumentError(String),
    #[error(transparent)]
    InvalidArgCount(ArgCountError),
    #[error("Unknown function `{0}`")]
    UnknownFunction(String),
    #[error("function '{0}' has already been registered")]
    FunctionAlreadyRegistered(String),
    #[error("histogram error: {0}")]
    Histogram(HistogramError),
    #[error("Invalid regex: {0}")]
    InvalidRegex(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RuntimeError {
    /// Whether the error was caused by the caller aborting the query rather than
    /// by a failure inside the engine.
    pub fn is_caller_abort(&self) -> bool {
        matches!(self, RuntimeError::Cancelled | RuntimeError::DeadlineExceeded)
    }

    pub fn execution<S: Into<String>>(msg: S) -> Self {
        RuntimeError::Execution(msg.into())
    }
}

impl From<HistogramError> for RuntimeError {
    fn from(err: HistogramError) -> Self {
        RuntimeError::Histogram(err)
    }
}

/// Occurs when a function is called with the wrong number of arguments
#[derive(Debug, PartialEq, Clone, Error)]
pub struct ArgCountError {
    min: usize,
    max: usize,
    actual: usize,
    signature: String,
}

impl ArgCountError {
    /// Create a new instance of the error
    ///
    /// # Arguments
    /// * `signature` - Function name
    /// * `min` - Smallest allowed number of arguments
    /// * `max` - Largest allowed number of arguments
    /// * `actual` - Number of arguments received
    pub fn new(signature: &str, min: usize, max: usize, actual: usize) -> Self {
        Self {
            min,
            max,
            actual,
            signature: signature.to_string(),
        }
    }

    /// Function name
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn min(&self) -> usize {
        self.min
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn actual(&self) -> usize {
        self.actual
    }
}

impl Display for ArgCountError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.min == self.max {
            write!(f, "expected exactly {} argument(s) for {}", self.min, self.signature)?;
        } else {
            write!(
                f,
                "expected {}-{} arguments for {}",
                self.min, self.max, self.signature
            )?;
        }
        write!(f, ", got {}", self.actual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arg_count_error_message() {
        let err = RuntimeError::InvalidArgCount(ArgCountError::new("rate", 1, 1, 2));
        assert_eq!(err.to_string(), "expected exactly 1 argument(s) for rate, got 2");

        let err = ArgCountError::new("round", 1, 2, 3);
        assert_eq!(err.to_string(), "expected 1-2 arguments for round, got 3");
    }

    #[test]
    fn caller_aborts_are_distinguished() {
        assert!(RuntimeError::Cancelled.is_caller_abort());
        assert!(RuntimeError::DeadlineExceeded.is_caller_abort());
        assert!(!RuntimeError::execution("boom").is_caller_abort());
    }

    #[test]
    fn registration_collision_message() {
        let err = RuntimeError::FunctionAlreadyRegistered("acos".to_string());
        assert_eq!(err.to_string(), "function 'acos' has already been registered");
    }
}
