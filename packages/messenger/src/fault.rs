//! Error marshaling across the peer boundary.
//!
//! Failures travel as a `{name, message, detail}` triple ([`ErrorBody`]).
//! Locally, a handler fails with a [`HandlerError`]; remotely reported
//! failures come back as a [`PeerInvocationError`].

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known values of the `name` field.
pub mod names {
    /// Default classifier for untyped errors.
    pub const EXCEPTION: &str = "exception";
    /// An `invoke` named a function that is not registered.
    pub const INVALID_FUNCTION_NAME: &str = "invalidFunctionName";
    /// An `invoke` body or its arguments did not have the expected shape.
    pub const INVALID_FIELD_NAME: &str = "invalidFieldName";
    /// The peer cancelled the operation.
    pub const OPERATION_CANCELLED: &str = "OperationCancelledError";
}

/// Wire form of a failure: the body of a `failed` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub detail: String,
}

impl ErrorBody {
    /// A body whose `detail` repeats the message.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            name: name.into(),
            detail: message.clone(),
            message,
        }
    }

    /// Read a body leniently from whatever the peer sent.
    ///
    /// Missing fields default to empty strings (and `name` to `exception`).
    /// A bare string becomes the message; any other shape is rendered as
    /// JSON text into the message.
    pub fn from_value(body: Value) -> Self {
        let mut parsed = match body {
            Value::Object(_) => match serde_json::from_value::<ErrorBody>(body.clone()) {
                Ok(parsed) => parsed,
                Err(_) => Self::new(names::EXCEPTION, body.to_string()),
            },
            Value::String(message) => Self::new(names::EXCEPTION, message),
            Value::Null => Self::new(names::EXCEPTION, ""),
            other => Self::new(names::EXCEPTION, other.to_string()),
        };
        if parsed.name.is_empty() {
            parsed.name = names::EXCEPTION.to_string();
        }
        parsed
    }

    /// Describe a handler panic caught at the dispatch boundary.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self::new(
            names::EXCEPTION,
            format!("handler panicked: {}", panic_message(payload.as_ref())),
        )
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "message": self.message,
            "detail": self.detail,
        })
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// The error a local handler fails with.
///
/// Any `std::error::Error` converts into it, so handlers can use `?` freely:
///
/// ```rust
/// use duplex_messenger::HandlerError;
///
/// fn parse(text: &str) -> Result<i64, HandlerError> {
///     Ok(text.parse::<i64>()?)
/// }
///
/// let err = parse("x").unwrap_err();
/// assert_eq!(err.name(), "exception");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    name: String,
    message: String,
    detail: Option<String>,
    sources: Vec<String>,
}

impl HandlerError {
    /// An untyped failure, classified as `exception`.
    pub fn new(message: impl Into<String>) -> Self {
        Self::named(names::EXCEPTION, message)
    }

    /// A failure with an explicit machine-readable classifier.
    pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            detail: None,
            sources: Vec::new(),
        }
    }

    /// Attach diagnostic text sent as `detail`.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Convert to the wire triple.
    ///
    /// `detail` is the explicit detail if one was set; otherwise, with
    /// `include_sources`, the message followed by the error's source chain;
    /// otherwise the message again.
    pub fn to_body(&self, include_sources: bool) -> ErrorBody {
        let detail = match &self.detail {
            Some(detail) => detail.clone(),
            None if include_sources && !self.sources.is_empty() => {
                let mut detail = self.message.clone();
                for source in &self.sources {
                    detail.push_str("\ncaused by: ");
                    detail.push_str(source);
                }
                detail
            }
            None => self.message.clone(),
        };
        ErrorBody {
            name: self.name.clone(),
            message: self.message.clone(),
            detail,
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl<E> From<E> for HandlerError
where
    E: std::error::Error,
{
    fn from(error: E) -> Self {
        let mut sources = Vec::new();
        let mut next = error.source();
        while let Some(source) = next {
            sources.push(source.to_string());
            next = source.source();
        }
        Self {
            name: names::EXCEPTION.to_string(),
            message: error.to_string(),
            detail: None,
            sources,
        }
    }
}

/// A failure reported by the peer for one of our invocations.
///
/// The three fields stay distinct so callers can branch on [`name`](Self::name)
/// instead of matching message text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("peer invocation failed ({name}): {message}")]
pub struct PeerInvocationError {
    name: String,
    message: String,
    detail: String,
}

impl PeerInvocationError {
    pub fn new(
        name: impl Into<String>,
        message: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            detail: detail.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// The peer reported that it cancelled the operation.
    pub fn is_cancelled(&self) -> bool {
        self.name == names::OPERATION_CANCELLED
    }

    pub fn is_invalid_function(&self) -> bool {
        self.name == names::INVALID_FUNCTION_NAME
    }
}

impl From<ErrorBody> for PeerInvocationError {
    fn from(body: ErrorBody) -> Self {
        Self {
            name: body.name,
            message: body.message,
            detail: body.detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug)]
    struct Outer(Inner);

    #[derive(Debug)]
    struct Inner;

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "outer failed")
        }
    }

    impl fmt::Display for Inner {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "disk full")
        }
    }

    impl std::error::Error for Inner {}

    impl std::error::Error for Outer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn untyped_error_duplicates_message_in_detail() {
        let body = HandlerError::new("boom").to_body(false);
        assert_eq!(body, ErrorBody::new("exception", "boom"));
        assert_eq!(body.detail, "boom");
    }

    #[test]
    fn explicit_detail_wins() {
        let body = HandlerError::named("quota", "over limit")
            .with_detail("limit=10 used=11")
            .to_body(true);
        assert_eq!(body.name, "quota");
        assert_eq!(body.message, "over limit");
        assert_eq!(body.detail, "limit=10 used=11");
    }

    #[test]
    fn std_error_converts_with_source_chain() {
        let err: HandlerError = Outer(Inner).into();
        assert_eq!(err.name(), "exception");
        assert_eq!(err.message(), "outer failed");

        assert_eq!(err.to_body(false).detail, "outer failed");
        assert_eq!(
            err.to_body(true).detail,
            "outer failed\ncaused by: disk full"
        );
    }

    #[test]
    fn error_body_from_object() {
        let body = ErrorBody::from_value(json!({
            "name": "TypeError",
            "message": "x is undefined",
            "detail": "at line 3"
        }));
        assert_eq!(body.name, "TypeError");
        assert_eq!(body.message, "x is undefined");
        assert_eq!(body.detail, "at line 3");
    }

    #[test]
    fn error_body_defaults_missing_fields() {
        let body = ErrorBody::from_value(json!({ "message": "partial" }));
        assert_eq!(body.name, "exception");
        assert_eq!(body.message, "partial");
        assert_eq!(body.detail, "");
    }

    #[test]
    fn error_body_from_other_shapes() {
        assert_eq!(ErrorBody::from_value(json!("plain")).message, "plain");
        assert_eq!(ErrorBody::from_value(json!(42)).message, "42");
        assert_eq!(ErrorBody::from_value(Value::Null).name, "exception");
        assert_eq!(
            ErrorBody::from_value(json!({ "message": 5 })).message,
            "{\"message\":5}"
        );
    }

    #[test]
    fn error_body_to_value() {
        let value = ErrorBody::new("exception", "boom").to_value();
        assert_eq!(
            value,
            json!({ "name": "exception", "message": "boom", "detail": "boom" })
        );
    }

    #[test]
    fn panic_payloads_are_described() {
        let body = ErrorBody::from_panic(Box::new("bad index"));
        assert_eq!(body.message, "handler panicked: bad index");

        let body = ErrorBody::from_panic(Box::new(String::from("owned")));
        assert_eq!(body.message, "handler panicked: owned");

        let body = ErrorBody::from_panic(Box::new(7_u8));
        assert!(body.message.contains("unknown panic payload"));
    }

    #[test]
    fn peer_error_keeps_fields_distinct() {
        let err = PeerInvocationError::from(ErrorBody {
            name: "invalidFunctionName".into(),
            message: "Function \"x\" is not found.".into(),
            detail: "".into(),
        });
        assert_eq!(err.name(), "invalidFunctionName");
        assert!(err.is_invalid_function());
        assert!(!err.is_cancelled());
        assert_eq!(err.message(), "Function \"x\" is not found.");
        assert!(err.to_string().contains("invalidFunctionName"));
    }

    #[test]
    fn peer_cancellation_is_recognized() {
        let err = PeerInvocationError::new(names::OPERATION_CANCELLED, "cancelled", "");
        assert!(err.is_cancelled());
    }
}
