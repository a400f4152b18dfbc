//! The messenger: host-facing API and outbound invocation.
//!
//! A [`Messenger`] owns the id counter, the correlation table and the
//! function registry for one connection. Clones are handles to the same
//! connection.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::thread;
use std::time::Instant;

use duplex_settle::Promise;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::config::MessengerConfig;
use crate::diagnostics::{Diagnostics, LogSink};
use crate::dispatch::Outbox;
use crate::envelope::Envelope;
use crate::error::{InvokeError, MessengerError};
use crate::fault::HandlerError;
use crate::pending::{CorrelationTable, Reply};
use crate::registry::{FunctionRegistry, Handler, SyncFn, TypedFn};
use crate::transport::Transport;

/// Receives every inbound `control` envelope as `(id, body)`.
pub type ControlHandler = Arc<dyn Fn(&str, &Value) + Send + Sync>;

pub(crate) struct Shared {
    pub(crate) outbox: Outbox,
    pub(crate) pending: CorrelationTable,
    pub(crate) functions: FunctionRegistry,
    pub(crate) control: RwLock<Option<ControlHandler>>,
    pub(crate) peer_ready: AtomicBool,
    next_id: AtomicU64,
    config: MessengerConfig,
}

impl Shared {
    fn next_request_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("{}{}", self.config.id_prefix, n)
    }

    fn expire_overdue(&self, now: Instant) -> usize {
        let Some(timeout) = self.config.request_timeout() else {
            return 0;
        };
        let expired = self.pending.take_expired(now, timeout);
        let count = expired.len();
        for (id, reply) in expired {
            self.outbox
                .diagnostics
                .warn(&id, &format!("timed out: {}", id));
            reply.reject(InvokeError::TimedOut { id, after: timeout });
        }
        count
    }
}

/// Builder for a [`Messenger`].
pub struct MessengerBuilder {
    transport: Arc<dyn Transport>,
    config: MessengerConfig,
    log_sink: Option<LogSink>,
    control: Option<ControlHandler>,
}

impl MessengerBuilder {
    /// Replace the default configuration.
    pub fn config(mut self, config: MessengerConfig) -> Self {
        self.config = config;
        self
    }

    /// Install a callback for diagnostic lines, in addition to `tracing`.
    pub fn log_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.log_sink = Some(Arc::new(sink));
        self
    }

    /// Install a callback for inbound `control` envelopes.
    pub fn control_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        self.control = Some(Arc::new(handler));
        self
    }

    /// Create the messenger and announce it to the peer.
    ///
    /// Sends the `ready` control envelope before returning; a transport
    /// failure there fails construction. Starts the reaper thread if a
    /// request timeout is configured and `spawn_reaper` is set.
    pub fn build(self) -> Result<Messenger, MessengerError> {
        let diagnostics = Diagnostics::new(self.log_sink);
        let outbox = Outbox::new(
            self.transport,
            diagnostics,
            self.config.include_error_sources,
        );

        let shared = Arc::new(Shared {
            outbox,
            pending: CorrelationTable::new(),
            functions: FunctionRegistry::new(),
            control: RwLock::new(self.control),
            peer_ready: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
            config: self.config,
        });

        shared.outbox.send(&Envelope::ready())?;
        shared.outbox.diagnostics.debug("ready", "ready");

        if shared.config.request_timeout().is_some() && shared.config.spawn_reaper {
            spawn_reaper(Arc::downgrade(&shared), &shared.config)?;
        }

        Ok(Messenger { shared })
    }
}

fn spawn_reaper(shared: Weak<Shared>, config: &MessengerConfig) -> Result<(), MessengerError> {
    let interval = config.reaper_interval();
    thread::Builder::new()
        .name("duplex-reaper".to_string())
        .spawn(move || loop {
            thread::sleep(interval);
            let Some(shared) = shared.upgrade() else {
                break;
            };
            shared.expire_overdue(Instant::now());
        })?;
    Ok(())
}

/// One end of a duplex invoke/reply connection.
///
/// # Example
///
/// ```rust
/// use duplex_messenger::{HandlerError, MemoryTransport, Messenger};
/// use serde_json::json;
///
/// let transport = MemoryTransport::new();
/// let messenger = Messenger::new(transport.clone())?;
///
/// messenger.register_typed("math.add", |(a, b): (i64, i64)| {
///     Ok::<_, HandlerError>(a + b)
/// });
///
/// messenger.on_message(r#"{"id":"host_1","type":"invoke","body":{"name":"math.add","args":[2,3]}}"#);
///
/// let sent = transport.take_envelopes();
/// assert_eq!(sent.last().unwrap().body, json!(5));
/// # Ok::<(), duplex_messenger::MessengerError>(())
/// ```
#[derive(Clone)]
pub struct Messenger {
    pub(crate) shared: Arc<Shared>,
}

impl fmt::Debug for Messenger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Messenger")
            .field("config", &self.shared.config)
            .field("pending", &self.shared.pending.len())
            .field("functions", &self.shared.functions)
            .field("peer_ready", &self.is_peer_ready())
            .finish()
    }
}

impl Messenger {
    /// Create a messenger with the default configuration.
    pub fn new<T>(transport: T) -> Result<Self, MessengerError>
    where
        T: Transport + 'static,
    {
        Self::builder(transport).build()
    }

    /// Start configuring a messenger that sends through `transport`.
    pub fn builder<T>(transport: T) -> MessengerBuilder
    where
        T: Transport + 'static,
    {
        MessengerBuilder {
            transport: Arc::new(transport),
            config: MessengerConfig::default(),
            log_sink: None,
            control: None,
        }
    }

    /// The configuration this messenger was built with.
    pub fn config(&self) -> &MessengerConfig {
        &self.shared.config
    }

    // Host-facing registration

    /// Make `handler` invocable by the peer under `name`, replacing any
    /// existing registration. Returns true if one was replaced.
    pub fn register_function<H>(&self, name: impl Into<String>, handler: H) -> bool
    where
        H: Handler + 'static,
    {
        self.shared.functions.register(name, Arc::new(handler))
    }

    /// Register a synchronous function over raw JSON arguments.
    pub fn register_fn<F>(&self, name: impl Into<String>, function: F) -> bool
    where
        F: Fn(Vec<Value>) -> Result<Value, HandlerError> + Send + Sync + 'static,
    {
        self.register_function(name, SyncFn(function))
    }

    /// Register a synchronous function over typed arguments.
    ///
    /// The peer's argument array is decoded into `A`; a mismatch is reported
    /// to the peer as `invalidFieldName`.
    pub fn register_typed<A, R, F>(&self, name: impl Into<String>, function: F) -> bool
    where
        A: DeserializeOwned + 'static,
        R: Serialize + 'static,
        F: Fn(A) -> Result<R, HandlerError> + Send + Sync + 'static,
    {
        self.register_function(name, TypedFn::new(function))
    }

    /// Remove a registration. Returns false if `name` was not registered.
    pub fn unregister_function(&self, name: &str) -> bool {
        self.shared.functions.unregister(name)
    }

    /// Registered function names, sorted.
    pub fn registered_functions(&self) -> Vec<String> {
        self.shared.functions.names()
    }

    /// Replace the callback for inbound `control` envelopes.
    pub fn set_control_handler<F>(&self, handler: F)
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        *self
            .shared
            .control
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(handler));
    }

    // Outbound invocation

    /// Invoke `name` on the peer.
    ///
    /// Returns immediately with a pending promise. It resolves with the
    /// peer's result, or rejects with the peer's failure, a transport error
    /// (if the `invoke` envelope could not be sent) or, when configured, a
    /// timeout.
    pub fn invoke(&self, name: &str, args: Vec<Value>) -> Reply {
        let id = self.shared.next_request_id();
        let reply = match self.shared.pending.register(&id) {
            Ok(reply) => reply,
            Err(error) => return Reply::rejected(error.into()),
        };

        self.shared
            .outbox
            .diagnostics
            .debug(&id, &format!("invoke: {}(...)", name));

        if let Err(error) = self.shared.outbox.send(&Envelope::invoke(&id, name, args)) {
            // A failed send cannot have produced a reply, so the entry is
            // still ours unless the reaper got there first.
            if let Some(reply) = self.shared.pending.take(&id) {
                reply.reject(error.into());
            }
        }
        reply
    }

    /// Invoke with arguments taken from any serializable value.
    ///
    /// A sequence (array, tuple, `Vec`) supplies the argument list, `()` or
    /// `None` supplies none, and anything else is passed as the single
    /// argument.
    pub fn invoke_with<A>(&self, name: &str, args: A) -> Reply
    where
        A: Serialize,
    {
        match serde_json::to_value(args) {
            Ok(Value::Array(args)) => self.invoke(name, args),
            Ok(Value::Null) => self.invoke(name, Vec::new()),
            Ok(single) => self.invoke(name, vec![single]),
            Err(error) => Reply::rejected(InvokeError::Encode {
                message: error.to_string(),
            }),
        }
    }

    /// Invoke and decode the result into `R`.
    pub fn invoke_as<R, A>(&self, name: &str, args: A) -> Promise<R, InvokeError>
    where
        R: DeserializeOwned + Send + Sync + 'static,
        A: Serialize,
    {
        self.invoke_with(name, args).then(|outcome| match outcome {
            Ok(value) => serde_json::from_value(value.clone()).map_err(|e| InvokeError::Decode {
                message: e.to_string(),
            }),
            Err(error) => Err(error.clone()),
        })
    }

    /// Send a `control` envelope to the peer.
    pub fn send_control(&self, id: &str, body: Value) -> Result<(), MessengerError> {
        self.shared.outbox.send(&Envelope::control(id, body))
    }

    // Bookkeeping

    /// Number of outbound requests still awaiting a reply.
    pub fn pending_count(&self) -> usize {
        self.shared.pending.len()
    }

    /// Whether the peer has announced itself with a `ready` control envelope.
    pub fn is_peer_ready(&self) -> bool {
        self.shared.peer_ready.load(Ordering::Acquire)
    }

    /// Reject every request older than the configured timeout with
    /// [`InvokeError::TimedOut`]. Returns how many were rejected; always 0
    /// when no timeout is configured.
    pub fn expire_overdue(&self) -> usize {
        self.shared.expire_overdue(Instant::now())
    }

    /// Reject every outstanding request with [`InvokeError::Abandoned`].
    ///
    /// Dropping the messenger without calling this leaves waiting
    /// continuations unfired.
    pub fn abandon_pending(&self) -> usize {
        let drained = self.shared.pending.drain();
        let count = drained.len();
        for (id, reply) in drained {
            self.shared
                .outbox
                .diagnostics
                .debug(&id, &format!("abandoned: {}", id));
            reply.reject(InvokeError::Abandoned { id });
        }
        count
    }
}
