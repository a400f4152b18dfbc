//! Error types for the messenger.

use std::time::Duration;

use thiserror::Error;

use crate::fault::PeerInvocationError;
use crate::transport::TransportError;

/// Errors surfaced by messenger operations themselves (construction,
/// sending, bookkeeping).
#[derive(Debug, Error)]
pub enum MessengerError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The correlation table already holds this id.
    #[error("duplicate request id: {id}")]
    DuplicateRequestId { id: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The rejection delivered for an outbound invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvokeError {
    /// The peer ran the function and reported a failure.
    #[error(transparent)]
    Peer(#[from] PeerInvocationError),

    /// The `invoke` envelope could not be handed to the transport.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The arguments could not be encoded as JSON.
    #[error("could not encode invocation: {message}")]
    Encode { message: String },

    /// The result could not be decoded into the requested type.
    #[error("could not decode result: {message}")]
    Decode { message: String },

    /// No reply arrived within the configured request timeout.
    #[error("request {id} timed out after {after:?}")]
    TimedOut { id: String, after: Duration },

    /// The host gave up on every outstanding request.
    #[error("request {id} abandoned")]
    Abandoned { id: String },

    /// Bookkeeping failure inside the messenger.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl InvokeError {
    /// The peer-reported failure, if that is what this is.
    pub fn as_peer(&self) -> Option<&PeerInvocationError> {
        match self {
            InvokeError::Peer(error) => Some(error),
            _ => None,
        }
    }
}

impl From<MessengerError> for InvokeError {
    fn from(error: MessengerError) -> Self {
        match error {
            MessengerError::Transport(error) => InvokeError::Transport(error),
            MessengerError::Json(error) => InvokeError::Encode {
                message: error.to_string(),
            },
            other => InvokeError::Internal {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_is_transparent() {
        let e = MessengerError::Transport(TransportError::new("pipe closed"));
        assert_eq!(e.to_string(), "transport error: pipe closed");
    }

    #[test]
    fn duplicate_id_display() {
        let e = MessengerError::DuplicateRequestId {
            id: "client_3".to_string(),
        };
        assert!(e.to_string().contains("client_3"));
    }

    #[test]
    fn messenger_error_maps_into_invoke_error() {
        let e: InvokeError = MessengerError::Transport(TransportError::new("gone")).into();
        assert_eq!(e, InvokeError::Transport(TransportError::new("gone")));

        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let e: InvokeError = MessengerError::Json(json_err).into();
        assert!(matches!(e, InvokeError::Encode { .. }));

        let e: InvokeError = MessengerError::DuplicateRequestId { id: "x".into() }.into();
        assert!(matches!(e, InvokeError::Internal { .. }));
    }

    #[test]
    fn as_peer() {
        let peer = PeerInvocationError::new("exception", "boom", "boom");
        let e = InvokeError::Peer(peer.clone());
        assert_eq!(e.as_peer(), Some(&peer));
        assert_eq!(e.to_string(), peer.to_string());

        let e = InvokeError::Abandoned { id: "client_0".into() };
        assert!(e.as_peer().is_none());
    }

    #[test]
    fn timed_out_display() {
        let e = InvokeError::TimedOut {
            id: "client_1".into(),
            after: Duration::from_millis(250),
        };
        assert_eq!(e.to_string(), "request client_1 timed out after 250ms");
    }
}
