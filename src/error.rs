use thiserror::Error;

/// Failures raised by the landmark-to-control core.
///
/// Every core function surfaces these directly to its caller; none of them
/// fall back to a default value.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ControlError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("hand index {requested} out of range ({available} hands detected)")]
    IndexOutOfRange { requested: usize, available: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("missing landmarks: {0}")]
    MissingLandmarks(String),
}

impl ControlError {
    /// Configuration errors can never succeed on a later frame.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ControlError::InvalidConfiguration(_))
    }
}

pub type ControlResult<T> = Result<T, ControlError>;
