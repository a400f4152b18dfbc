//! Error types for the settlement layer.

use thiserror::Error;

/// Misuse of a [`Promise`](crate::Promise).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettleError {
    /// A resolve or reject continuation was attached after finalization.
    #[error("invalid state: cannot call {operation} on a finalized promise")]
    InvalidState { operation: &'static str },

    /// Every holder dropped the promise while it was still pending.
    #[error("promise dropped before it was settled")]
    Abandoned,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_state_display() {
        let e = SettleError::InvalidState {
            operation: "on_resolve",
        };
        let display = e.to_string();
        assert!(display.contains("invalid state"));
        assert!(display.contains("on_resolve"));
    }

    #[test]
    fn abandoned_display() {
        assert_eq!(
            SettleError::Abandoned.to_string(),
            "promise dropped before it was settled"
        );
    }
}
