//! The correlation table: outbound requests awaiting a reply.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use duplex_settle::Promise;
use serde_json::Value;

use crate::error::{InvokeError, MessengerError};

/// The promise handed to the caller of an outbound invocation.
pub type Reply = Promise<Value, InvokeError>;

struct PendingRequest {
    reply: Reply,
    issued_at: Instant,
}

/// Thread-safe map from request id to the promise awaiting its reply.
///
/// Lookup and removal happen under one lock, so a reply can settle its
/// promise at most once even if the transport delivers it twice.
#[derive(Default)]
pub struct CorrelationTable {
    entries: Mutex<HashMap<String, PendingRequest>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingRequest>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a fresh pending promise under `id`.
    pub fn register(&self, id: &str) -> Result<Reply, MessengerError> {
        let mut entries = self.lock();
        if entries.contains_key(id) {
            return Err(MessengerError::DuplicateRequestId { id: id.to_string() });
        }
        let reply = Reply::new();
        entries.insert(
            id.to_string(),
            PendingRequest {
                reply: reply.clone(),
                issued_at: Instant::now(),
            },
        );
        Ok(reply)
    }

    /// Atomically find and remove the entry for `id`.
    pub fn take(&self, id: &str) -> Option<Reply> {
        self.lock().remove(id).map(|pending| pending.reply)
    }

    /// Remove every entry issued more than `timeout` before `now`.
    pub fn take_expired(&self, now: Instant, timeout: Duration) -> Vec<(String, Reply)> {
        let mut entries = self.lock();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, pending)| now.saturating_duration_since(pending.issued_at) >= timeout)
            .map(|(id, _)| id.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|id| entries.remove(&id).map(|pending| (id, pending.reply)))
            .collect()
    }

    /// Remove every entry.
    pub fn drain(&self) -> Vec<(String, Reply)> {
        self.lock()
            .drain()
            .map(|(id, pending)| (id, pending.reply))
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_take() {
        let table = CorrelationTable::new();
        let reply = table.register("client_0").unwrap();
        assert!(table.contains("client_0"));
        assert_eq!(table.len(), 1);

        let taken = table.take("client_0").unwrap();
        assert!(taken.ptr_eq(&reply));
        assert!(table.is_empty());
        assert!(table.take("client_0").is_none());
    }

    #[test]
    fn duplicate_registration_fails() {
        let table = CorrelationTable::new();
        table.register("client_0").unwrap();
        let err = table.register("client_0").unwrap_err();
        assert!(matches!(err, MessengerError::DuplicateRequestId { id } if id == "client_0"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn take_unknown_is_none() {
        let table = CorrelationTable::new();
        assert!(table.take("never").is_none());
    }

    #[test]
    fn take_expired_only_removes_old_entries() {
        let table = CorrelationTable::new();
        table.register("old").unwrap();
        std::thread::sleep(Duration::from_millis(30));
        table.register("new").unwrap();

        let expired = table.take_expired(Instant::now(), Duration::from_millis(20));
        let ids: Vec<_> = expired.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["old"]);
        assert!(table.contains("new"));
        assert!(!table.contains("old"));
    }

    #[test]
    fn drain_empties_table() {
        let table = CorrelationTable::new();
        table.register("a").unwrap();
        table.register("b").unwrap();
        let mut drained: Vec<_> = table.drain().into_iter().map(|(id, _)| id).collect();
        drained.sort();
        assert_eq!(drained, vec!["a", "b"]);
        assert!(table.is_empty());
    }
}
