//! Canned responses that stand in for a live server.
//!
//! A [`StoredResponses`] registry maps a service name to a [`Stub`]. Each stub
//! answers with the producer registered for the exact params it is called
//! with, falling back to its default producer (an empty map `200` unless
//! replaced). Producers run only when a call is made, never at registration.
//!
//! # Producers
//!
//! - [`Producer::value`]: the closure returns the payload; the response is a
//!   `200` with no status message.
//! - [`Producer::builder`]: the closure receives a [`ResponseBuilder`] and
//!   sets code, message and payload itself.
use std::{collections::HashMap, fmt, sync::Arc};

use log::trace;

use crate::{
    Value,
    protocol::{Response, ResponseBuilder},
};

type ValueFn = dyn Fn() -> Value + Send + Sync;
type BuilderFn = dyn Fn(&mut ResponseBuilder) + Send + Sync;

#[derive(Clone)]
pub enum Producer {
    Value(Arc<ValueFn>),
    Builder(Arc<BuilderFn>),
}

impl Producer {
    pub fn value<F, V>(f: F) -> Self
    where
        F: Fn() -> V + Send + Sync + 'static,
        V: Into<Value>,
    {
        let produce: Arc<ValueFn> = Arc::new(move || -> Value { f().into() });
        Producer::Value(produce)
    }

    pub fn builder<F>(f: F) -> Self
    where
        F: Fn(&mut ResponseBuilder) + Send + Sync + 'static,
    {
        let produce: Arc<BuilderFn> = Arc::new(f);
        Producer::Builder(produce)
    }

    pub fn produce(&self) -> Response {
        let mut builder = ResponseBuilder::new();
        match self {
            Producer::Value(f) => {
                builder.data(f());
            }
            Producer::Builder(f) => f(&mut builder),
        }
        builder.build()
    }
}

impl Default for Producer {
    fn default() -> Self {
        Producer::builder(|_| {})
    }
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Producer::Value(_) => write!(f, "Producer::Value"),
            Producer::Builder(_) => write!(f, "Producer::Builder"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Stub {
    default: Producer,
    by_params: HashMap<Value, Producer>,
}

impl Stub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `producer` for exactly `params`, replacing any earlier one.
    pub fn with(&mut self, params: impl Into<Value>, producer: Producer) -> &mut Self {
        self.by_params.insert(normalize(params.into()), producer);
        self
    }

    /// Replaces the producer used when no exact params match.
    pub fn set_default(&mut self, producer: Producer) -> &mut Self {
        self.default = producer;
        self
    }

    /// The producer `params` resolves to.
    pub fn producer(&self, params: &Value) -> &Producer {
        self.by_params.get(params).unwrap_or(&self.default)
    }

    pub fn call(&self, params: impl Into<Value>) -> Response {
        self.producer(&normalize(params.into())).produce()
    }
}

/// Stubs keyed by service name.
#[derive(Debug, Clone, Default)]
pub struct StoredResponses {
    stubs: HashMap<String, Stub>,
}

impl StoredResponses {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stub for `name`, created empty if absent.
    pub fn add(&mut self, name: impl Into<String>) -> &mut Stub {
        self.stubs.entry(name.into()).or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stubs.contains_key(name)
    }

    /// Answers `name` with its stub, creating an empty one if needed.
    pub fn get(&mut self, name: &str, params: impl Into<Value>) -> Response {
        self.add(name).call(params)
    }

    /// Answers `name` only if a stub was registered for it.
    pub fn find(&self, name: &str, params: impl Into<Value>) -> Option<Response> {
        self.resolve(name, params).map(|producer| producer.produce())
    }

    /// The producer that would answer `name` and `params`, if any stub exists.
    ///
    /// Cloning the producer out lets callers run it without holding a borrow
    /// of the registry.
    pub fn resolve(&self, name: &str, params: impl Into<Value>) -> Option<Producer> {
        let stub = self.stubs.get(name)?;
        trace!("resolving stored response for {name:?}");
        Some(stub.producer(&normalize(params.into())).clone())
    }

    pub fn remove(&mut self, name: &str) -> Option<Stub> {
        self.stubs.remove(name)
    }

    pub fn remove_all(&mut self) {
        self.stubs.clear();
    }

    pub fn len(&self) -> usize {
        self.stubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stubs.is_empty()
    }
}

/// No params and an empty map are the same lookup key.
fn normalize(params: Value) -> Value {
    if params.is_null() {
        Value::empty_map()
    } else {
        params
    }
}
