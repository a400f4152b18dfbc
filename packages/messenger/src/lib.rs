//! # duplex-messenger
//!
//! Bidirectional function invocation between two runtimes that share nothing
//! but a string transport, such as a native host and the script engine in its
//! WebView.
//!
//! Each side holds a [`Messenger`]. It can:
//!
//! - **invoke** functions on the peer, getting back a
//!   [`Promise`](duplex_settle::Promise) that settles when the reply arrives
//! - **serve** functions the peer invokes, registered by dotted name
//! - **dispatch** every inbound payload through [`Messenger::on_message`]
//!
//! ## Wire format
//!
//! Each payload is one JSON envelope `{id, type, body}` where `type` is
//! `invoke`, `succeeded`, `failed` or `control`. See [`envelope`].
//!
//! ## Example
//!
//! ```rust
//! use duplex_messenger::{HandlerError, MemoryTransport, Messenger};
//! use serde_json::json;
//!
//! let to_peer = MemoryTransport::new();
//! let messenger = Messenger::new(to_peer.clone())?;
//!
//! // Serve a function to the peer
//! messenger.register_typed("greet", |(name,): (String,)| {
//!     Ok::<_, HandlerError>(format!("hello, {name}"))
//! });
//!
//! // Call one on the peer
//! let reply = messenger.invoke("ui.title", vec![]);
//! reply.on_resolve(|title| println!("title is {title}"))?;
//!
//! // The host feeds whatever the peer sends back in
//! messenger.on_message(r#"{"id":"client_0","type":"succeeded","body":"Inbox"}"#);
//! assert_eq!(reply.try_outcome(), Some(Ok(json!("Inbox"))));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Limitations
//!
//! Without a configured request timeout, a request whose reply never arrives
//! stays pending until the messenger is dropped, at which point its
//! continuations are silently abandoned. Call
//! [`Messenger::abandon_pending`] first to reject them instead.

pub mod config;
pub mod envelope;
pub mod error;
pub mod fault;
pub mod pending;
pub mod registry;
pub mod transport;

mod diagnostics;
mod dispatch;
mod messenger;

pub use config::MessengerConfig;
pub use diagnostics::LogSink;
pub use envelope::{Envelope, EnvelopeKind, InvokeBody};
pub use error::{InvokeError, MessengerError};
pub use fault::{ErrorBody, HandlerError, PeerInvocationError};
pub use messenger::{ControlHandler, Messenger, MessengerBuilder};
pub use pending::{CorrelationTable, Reply};
pub use registry::{FunctionRegistry, Handler, HandlerResult, SyncFn, TypedFn};
pub use transport::{MemoryTransport, Transport, TransportError};

// Re-export for handler signatures
pub use duplex_settle::{Promise, SettleError, State};
pub use serde_json::Value;
