use std::any::Any;
use std::fmt;

/// Hard failures that reject a whole batch.
///
/// Partial failures (fetch, transform, publish) are reported in
/// [`crate::PublishReport`] instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    MalformedEvent { index: usize, reason: String },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::MalformedEvent { index, reason } => {
                write!(f, "event {index} is malformed: {reason}")
            }
        }
    }
}

impl std::error::Error for EngineError {}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
