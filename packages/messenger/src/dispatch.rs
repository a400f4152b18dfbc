//! Inbound dispatch and outbound replies.
//!
//! [`Messenger::on_message`] is the single entry point for payloads from the
//! peer. Replies are settled against the correlation table; invocations are
//! routed to the function registry and answered through the [`Outbox`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::{Arc, PoisonError};

use serde_json::Value;

use crate::diagnostics::Diagnostics;
use crate::envelope::{Envelope, EnvelopeKind, READY_ID};
use crate::error::{InvokeError, MessengerError};
use crate::fault::{names, panic_message, ErrorBody, PeerInvocationError};
use crate::messenger::{Messenger, Shared};
use crate::transport::Transport;

/// The sending half shared by the messenger and by reply continuations.
///
/// Continuations capture an `Outbox` rather than the messenger, so a handler
/// that never settles keeps nothing but the transport alive.
#[derive(Clone)]
pub(crate) struct Outbox {
    transport: Arc<dyn Transport>,
    pub(crate) diagnostics: Diagnostics,
    include_error_sources: bool,
}

impl Outbox {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        diagnostics: Diagnostics,
        include_error_sources: bool,
    ) -> Self {
        Self {
            transport,
            diagnostics,
            include_error_sources,
        }
    }

    pub(crate) fn send(&self, envelope: &Envelope) -> Result<(), MessengerError> {
        let payload = envelope.encode()?;
        self.transport.send(&payload)?;
        Ok(())
    }

    /// Answer an invocation with its result. There is no caller to report a
    /// transport failure to, so it is logged.
    fn reply_succeeded(&self, id: &str, result: &Value) {
        if let Err(error) = self.send(&Envelope::succeeded(id, result.clone())) {
            self.diagnostics
                .warn(id, &format!("could not send result for {}: {}", id, error));
        }
    }

    fn reply_failed(&self, id: &str, error: &ErrorBody) {
        self.diagnostics
            .debug(id, &format!("replying failed ({}): {}", error.name, error.message));
        if let Err(send_error) = self.send(&Envelope::failed(id, error)) {
            self.diagnostics.warn(
                id,
                &format!("could not send failure for {}: {}", id, send_error),
            );
        }
    }
}

impl Messenger {
    /// Handle one payload delivered by the peer.
    ///
    /// Safe to call from any thread, concurrently. Never fails: malformed
    /// payloads and replies nobody is waiting for are logged and dropped, and
    /// a panic in a handler or in a caller's continuation is logged instead of
    /// unwinding into the transport.
    pub fn on_message(&self, payload: &str) {
        self.shared.dispatch(payload);
    }
}

impl Shared {
    fn dispatch(&self, payload: &str) {
        let envelope = match Envelope::decode(payload) {
            Ok(envelope) => envelope,
            Err(error) => {
                self.outbox.diagnostics.error(&format!(
                    "unknown message format: {}: {}",
                    error, payload
                ));
                return;
            }
        };

        match envelope.kind {
            EnvelopeKind::Succeeded | EnvelopeKind::Failed => self.settle_reply(envelope, payload),
            EnvelopeKind::Invoke => self.run_invocation(envelope),
            EnvelopeKind::Control => self.route_control(envelope),
        }
    }

    fn settle_reply(&self, envelope: Envelope, payload: &str) {
        let Envelope { id, kind, body } = envelope;
        self.outbox
            .diagnostics
            .debug(&id, &format!("{}: {}", kind.as_str(), id));

        // Removed before settling, so a duplicate delivery finds nothing.
        let Some(reply) = self.pending.take(&id) else {
            self.outbox
                .diagnostics
                .warn(&id, &format!("spurious message received: {}", payload));
            return;
        };

        // Settling runs the caller's continuations on this thread; a panic
        // there must not unwind into the transport.
        let settled = panic::catch_unwind(AssertUnwindSafe(|| {
            if kind == EnvelopeKind::Succeeded {
                reply.resolve(body);
            } else {
                let error = PeerInvocationError::from(ErrorBody::from_value(body));
                reply.reject(InvokeError::Peer(error));
            }
        }));
        if let Err(panic) = settled {
            self.outbox.diagnostics.error(&format!(
                "continuation for {} panicked: {}",
                id,
                panic_message(panic.as_ref())
            ));
        }
    }

    fn run_invocation(&self, envelope: Envelope) {
        let id = envelope.id.clone();
        let call = match envelope.invoke_body() {
            Ok(call) => call,
            Err(error) => {
                self.outbox.reply_failed(
                    &id,
                    &ErrorBody::new(
                        names::INVALID_FIELD_NAME,
                        format!("malformed invoke body: {}", error),
                    ),
                );
                return;
            }
        };

        self.outbox
            .diagnostics
            .debug(&id, &format!("invoke: {}(...)", call.name));

        let Some(handler) = self.functions.lookup(&call.name) else {
            self.outbox.reply_failed(
                &id,
                &ErrorBody::new(
                    names::INVALID_FUNCTION_NAME,
                    format!("Function \"{}\" is not found.", call.name),
                ),
            );
            return;
        };

        let include_sources = self.outbox.include_error_sources;
        let result = match panic::catch_unwind(AssertUnwindSafe(|| handler.call(call.args))) {
            Ok(Ok(result)) => result,
            Ok(Err(error)) => {
                self.outbox.reply_failed(&id, &error.to_body(include_sources));
                return;
            }
            Err(payload) => {
                self.outbox.reply_failed(&id, &ErrorBody::from_panic(payload));
                return;
            }
        };

        // Observed rather than on_resolve/on_reject: the handler may have
        // finalized its own promise already.
        let outbox = self.outbox.clone();
        result.on_settled(move |outcome| match outcome {
            Ok(value) => outbox.reply_succeeded(&id, value),
            Err(error) => outbox.reply_failed(&id, &error.to_body(include_sources)),
        });
    }

    fn route_control(&self, envelope: Envelope) {
        self.outbox
            .diagnostics
            .debug(&envelope.id, &format!("control: {}", envelope.id));

        if envelope.id == READY_ID {
            self.peer_ready.store(true, Ordering::Release);
        }

        let handler = self
            .control
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(handler) = handler {
            handler(&envelope.id, &envelope.body);
        }
    }
}
