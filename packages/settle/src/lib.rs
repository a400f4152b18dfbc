//! # duplex-settle
//!
//! A settle-once promise for callback-driven code that may complete on any
//! thread.
//!
//! - `Promise<T, E>`: pending until resolved with a `T` or rejected with an `E`
//! - Continuations attached before settlement are queued; attached after, they
//!   run immediately with the stored outcome
//! - Finalize continuations run exactly once, after the outcome is known
//!
//! The messaging layer uses one promise per outstanding remote call and one
//! per locally handled call.
//!
//! ## Features
//!
//! - `async`: adds `Promise::settled()` for awaiting an outcome on tokio

mod error;
mod promise;

pub use error::SettleError;
pub use promise::{Promise, State};
