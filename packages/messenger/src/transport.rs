//! The outbound transport seam.
//!
//! The embedding host supplies something that can push a string to the peer
//! (a WebView `postMessage`, a pipe, a socket). Inbound delivery goes the
//! other way, through [`Messenger::on_message`](crate::Messenger::on_message).

use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

use crate::envelope::Envelope;

/// The transport refused or failed to deliver a payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transport error: {message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// One-way channel to the peer.
///
/// Implementations must be callable from any thread. Closures of the right
/// shape implement it directly:
///
/// ```rust
/// use duplex_messenger::{Transport, TransportError};
///
/// let transport = |payload: &str| -> Result<(), TransportError> {
///     println!("to peer: {payload}");
///     Ok(())
/// };
/// transport.send("{}").unwrap();
/// ```
pub trait Transport: Send + Sync {
    /// Deliver one payload to the peer.
    fn send(&self, payload: &str) -> Result<(), TransportError>;
}

impl<F> Transport for F
where
    F: Fn(&str) -> Result<(), TransportError> + Send + Sync,
{
    fn send(&self, payload: &str) -> Result<(), TransportError> {
        self(payload)
    }
}

/// A transport that records every payload in memory.
///
/// Clones share the same buffer, so a host (or a test) can keep one handle
/// and give another to the messenger.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    sent: Arc<Mutex<Vec<String>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent send fail with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.into());
    }

    /// Undo [`fail_with`](Self::fail_with).
    pub fn recover(&self) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// All payloads sent so far.
    pub fn sent(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove and return all payloads sent so far.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.sent.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Remove and return the sent payloads that parse as envelopes.
    pub fn take_envelopes(&self) -> Vec<Envelope> {
        self.take()
            .iter()
            .filter_map(|payload| Envelope::decode(payload).ok())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Transport for MemoryTransport {
    fn send(&self, payload: &str) -> Result<(), TransportError> {
        if let Some(message) = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return Err(TransportError::new(message.clone()));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(payload.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_payloads_in_order() {
        let transport = MemoryTransport::new();
        let handle = transport.clone();
        transport.send("a").unwrap();
        transport.send("b").unwrap();

        assert_eq!(handle.len(), 2);
        assert_eq!(handle.sent(), vec!["a", "b"]);
        assert_eq!(handle.take(), vec!["a", "b"]);
        assert!(handle.is_empty());
    }

    #[test]
    fn failure_switch() {
        let transport = MemoryTransport::new();
        transport.fail_with("disconnected");

        let err = transport.send("a").unwrap_err();
        assert_eq!(err.message(), "disconnected");
        assert!(transport.is_empty());

        transport.recover();
        transport.send("b").unwrap();
        assert_eq!(transport.sent(), vec!["b"]);
    }

    #[test]
    fn take_envelopes_skips_garbage() {
        let transport = MemoryTransport::new();
        transport.send("garbage").unwrap();
        transport
            .send(&Envelope::ready().encode().unwrap())
            .unwrap();
        let envelopes = transport.take_envelopes();
        assert_eq!(envelopes, vec![Envelope::ready()]);
    }

    #[test]
    fn closures_are_transports() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let transport = move |payload: &str| -> Result<(), TransportError> {
            sink.lock().unwrap().push(payload.len());
            Ok(())
        };
        transport.send("four").unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![4]);
    }
}
