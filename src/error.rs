//! Error type carried by failed routines.
//!
//! A fault inside a routine never propagates to the host's `step` call: it is
//! caught at the step boundary, logged, and delivered to the routine's
//! completion channel as a [`RoutineError`]. The error is cloneable because a
//! channel may hand it to several failure listeners.

use std::sync::Arc;
use thiserror::Error;

/// The reason a routine failed.
#[derive(Debug, Clone, Error)]
pub enum RoutineError {
    /// The routine's stepper returned an error value.
    #[error("routine failed: {0}")]
    Failed(Arc<dyn std::error::Error + Send + Sync + 'static>),

    /// An ad-hoc failure message.
    #[error("{0}")]
    Message(Arc<str>),

    /// The routine's stepper (or a collaborator invoked on its behalf)
    /// panicked; the payload is stringified.
    #[error("routine panicked: {0}")]
    Panicked(Arc<str>),
}

impl RoutineError {
    /// Wraps a concrete error value.
    pub fn from_error(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        RoutineError::Failed(Arc::new(err))
    }

    /// Builds a message-only error.
    pub fn msg(message: impl Into<String>) -> Self {
        RoutineError::Message(Arc::from(message.into()))
    }

    pub(crate) fn panicked(message: String) -> Self {
        RoutineError::Panicked(Arc::from(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms() {
        let err = RoutineError::msg("out of fuel");
        assert_eq!(err.to_string(), "out of fuel");

        let err = RoutineError::panicked("boom".to_owned());
        assert_eq!(err.to_string(), "routine panicked: boom");

        let io = std::io::Error::other("disk gone");
        let err = RoutineError::from_error(io);
        assert_eq!(err.to_string(), "routine failed: disk gone");
    }

    #[test]
    fn errors_clone_cheaply() {
        let err = RoutineError::msg("shared");
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
    }
}
