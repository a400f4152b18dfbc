//! Duplex: call functions on the other side of a string channel, and let it call yours.
//!
//! Each side owns a [`Messenger`]. Outbound calls return a [`Promise`] that
//! settles when the peer replies; inbound calls are routed to functions
//! registered by name. The layers are usable on their own:
//!
//! - [`settle`]: the settle-once promise.
//! - [`messenger`]: envelopes, correlation, dispatch and error marshaling.

pub use duplex_messenger as messenger;
pub use duplex_settle as settle;

pub use duplex_messenger::{
    ErrorBody, HandlerError, InvokeError, Messenger, MessengerBuilder, MessengerConfig,
    MessengerError, PeerInvocationError, Reply, Transport, TransportError,
};
pub use duplex_settle::{Promise, SettleError, State};
