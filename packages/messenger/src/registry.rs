//! The function registry: handlers the peer may invoke by name.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};

use duplex_settle::Promise;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::fault::{names, HandlerError};

/// The promise a handler returns for its result.
pub type HandlerResult = Promise<Value, HandlerError>;

/// A function the peer can call.
///
/// `call` returns a promise so synchronous and asynchronous handlers look the
/// same to the dispatcher. An `Err` return means the call failed before it
/// produced a promise.
pub trait Handler: Send + Sync {
    fn call(&self, args: Vec<Value>) -> Result<HandlerResult, HandlerError>;
}

impl<F> Handler for F
where
    F: Fn(Vec<Value>) -> Result<HandlerResult, HandlerError> + Send + Sync,
{
    fn call(&self, args: Vec<Value>) -> Result<HandlerResult, HandlerError> {
        self(args)
    }
}

/// Adapts a synchronous function over raw JSON arguments.
pub struct SyncFn<F>(pub F);

impl<F> Handler for SyncFn<F>
where
    F: Fn(Vec<Value>) -> Result<Value, HandlerError> + Send + Sync,
{
    fn call(&self, args: Vec<Value>) -> Result<HandlerResult, HandlerError> {
        Ok(Promise::from_result((self.0)(args)))
    }
}

/// Adapts a synchronous function over typed arguments.
///
/// The argument array is decoded into `A` (usually a tuple, so `[2, 3]`
/// becomes `(i64, i64)`) and the result is encoded from `R`.
pub struct TypedFn<A, R, F> {
    function: F,
    _types: PhantomData<fn(A) -> R>,
}

impl<A, R, F> TypedFn<A, R, F>
where
    F: Fn(A) -> Result<R, HandlerError>,
{
    pub fn new(function: F) -> Self {
        Self {
            function,
            _types: PhantomData,
        }
    }
}

impl<A, R, F> Handler for TypedFn<A, R, F>
where
    A: DeserializeOwned,
    R: Serialize,
    F: Fn(A) -> Result<R, HandlerError> + Send + Sync,
{
    fn call(&self, args: Vec<Value>) -> Result<HandlerResult, HandlerError> {
        let args: A = serde_json::from_value(Value::Array(args)).map_err(|e| {
            HandlerError::named(names::INVALID_FIELD_NAME, format!("invalid arguments: {}", e))
        })?;
        let result = (self.function)(args)?;
        let value = serde_json::to_value(result)?;
        Ok(Promise::resolved(value))
    }
}

/// Thread-safe map from function name to handler.
///
/// Names are opaque strings; dots carry no meaning here.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: RwLock<HashMap<String, Arc<dyn Handler>>>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous one.
    ///
    /// Returns true if a handler was replaced.
    pub fn register(&self, name: impl Into<String>, handler: Arc<dyn Handler>) -> bool {
        self.functions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), handler)
            .is_some()
    }

    /// Remove the handler under `name`. Returns false if there was none.
    pub fn unregister(&self, name: &str) -> bool {
        self.functions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    /// The handler under `name`. The registry lock is released before the
    /// caller invokes it.
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.functions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .functions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.functions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
