//! The entry point applications hold.
//!
//! A [`Client`] keeps the defaults every call starts from (address, timeout,
//! mode, codec) and, for test mode, the stored responses and the log of
//! calls they answered. It never changes when configured: every
//! [`Configurable`] method on `&Client` returns a new [`CallRunner`].
//!
//! # Example
//! ```rust,no_run
//! use courier::{Client, ClientConfig, Configurable, Value};
//!
//! let client = Client::new(ClientConfig::from_env("127.0.0.1", 8000));
//! let balance = client
//!     .timeout(5.0)
//!     .params([("account", 42)])?
//!     .call("get_balance", Value::Null)?;
//! println!("{balance}");
//! # Ok::<(), courier::Error>(())
//! ```
use std::{
    hash::{Hash, Hasher},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{
    CallRunner, Configurable, Error, Params, Value,
    config::{ClientConfig, Mode},
    protocol::{BincodeCodec, ProtocolCodec, Response},
    stored::{Producer, StoredResponses},
};

/// A call answered by a stored response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub name: String,
    pub params: Params,
    pub response: Response,
}

#[derive(Debug, Default)]
pub(crate) struct TestState {
    pub(crate) responses: StoredResponses,
    pub(crate) calls: Vec<CallRecord>,
}

#[derive(Clone)]
pub struct Client {
    config: ClientConfig,
    codec: Arc<dyn ProtocolCodec>,
    state: Arc<Mutex<TestState>>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_codec(config, Arc::new(BincodeCodec::new()))
    }

    pub fn with_codec(config: ClientConfig, codec: Arc<dyn ProtocolCodec>) -> Self {
        Client {
            config,
            codec,
            state: Arc::default(),
        }
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Calls `name` with a fresh default runner; see [`CallRunner::call`].
    pub fn call(&self, name: &str, params: impl Into<Value>) -> Result<Value, Error> {
        self.call_runner().call(name, params)
    }

    /// Calls `name` with a fresh default runner; see [`CallRunner::call_with`].
    pub fn call_with<F, R>(&self, name: &str, params: impl Into<Value>, handler: F) -> Result<R, Error>
    where
        F: FnOnce(Response) -> R,
    {
        self.call_runner().call_with(name, params, handler)
    }

    /// Starts (or extends) the stored responses for `name`.
    pub fn add_response(&self, name: impl Into<String>) -> StubHandle {
        let name = name.into();
        self.state().responses.add(name.clone());
        StubHandle {
            state: Arc::clone(&self.state),
            name,
        }
    }

    pub fn remove_responses(&self, name: &str) {
        self.state().responses.remove(name);
    }

    /// Locks and returns the stored responses.
    ///
    /// Hold the guard briefly; calls in test mode need the same lock.
    pub fn responses(&self) -> ResponsesGuard<'_> {
        ResponsesGuard {
            guard: self.state(),
        }
    }

    /// Calls answered by stored responses, oldest first.
    pub fn calls(&self) -> Vec<CallRecord> {
        self.state().calls.clone()
    }

    /// Forgets every recorded call and every stored response.
    pub fn reset(&self) {
        let mut state = self.state();
        state.calls.clear();
        state.responses.remove_all();
    }

    fn state(&self) -> MutexGuard<'_, TestState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Configurable for &Client {
    type Runner = CallRunner;

    fn call_runner(self) -> CallRunner {
        CallRunner::from_config(&self.config, Arc::clone(&self.codec), Arc::clone(&self.state))
    }
}

impl PartialEq for Client {
    fn eq(&self, other: &Self) -> bool {
        self.call_runner() == other.call_runner()
    }
}

impl Eq for Client {}

impl Hash for Client {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.call_runner().hash(state);
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Registers producers on one service's stub inside a client.
#[derive(Clone)]
pub struct StubHandle {
    state: Arc<Mutex<TestState>>,
    name: String,
}

impl StubHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// See [`Stub::with`](crate::Stub::with).
    pub fn with(&self, params: impl Into<Value>, producer: Producer) -> &Self {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .responses
            .add(self.name.clone())
            .with(params, producer);
        self
    }

    /// See [`Stub::set_default`](crate::Stub::set_default).
    pub fn set_default(&self, producer: Producer) -> &Self {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .responses
            .add(self.name.clone())
            .set_default(producer);
        self
    }
}

/// Locked view of a client's stored responses.
pub struct ResponsesGuard<'a> {
    guard: MutexGuard<'a, TestState>,
}

impl std::ops::Deref for ResponsesGuard<'_> {
    type Target = StoredResponses;

    fn deref(&self) -> &StoredResponses {
        &self.guard.responses
    }
}

impl std::ops::DerefMut for ResponsesGuard<'_> {
    fn deref_mut(&mut self) -> &mut StoredResponses {
        &mut self.guard.responses
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;

    use crate::Logger;

    use super::*;

    fn test_client() -> Client {
        Client::new(ClientConfig::new("localhost", 1).with_mode(Mode::Test))
    }

    fn hash_of(client: &Client) -> u64 {
        let mut hasher = DefaultHasher::new();
        client.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn runners_start_from_client_defaults() {
        let client = Client::new(ClientConfig::new("localhost", 9000).with_timeout(3.0));

        let runner = client.call_runner();
        assert_eq!(runner.host(), "localhost");
        assert_eq!(runner.port(), 9000);
        assert_eq!(runner.timeout_value(), 3.0);
        assert!(runner.params_value().is_empty());
        assert_eq!(runner.mode(), Mode::Live);
    }

    #[test]
    fn configuring_a_client_returns_new_runners() {
        let client = test_client();

        let runner = client.timeout(9.0);
        assert_eq!(runner.timeout_value(), 9.0);
        assert_eq!(client.call_runner().timeout_value(), client.config().timeout);

        let runner = client.params([("k", "v")]).unwrap();
        assert_eq!(runner.params_value().len(), 1);
        assert!(client.call_runner().params_value().is_empty());

        assert!(matches!(client.params("nope"), Err(Error::Validation(_))));
    }

    #[test]
    fn comparable_and_hashable() {
        let client = Client::new(ClientConfig::new("localhost", 9000));
        let matching = Client::new(ClientConfig::new("localhost", 9000));
        assert_eq!(client, matching);
        assert_eq!(hash_of(&client), hash_of(&matching));
        assert_ne!(client, Client::new(ClientConfig::new("other", 9000)));
        assert_ne!(client, Client::new(ClientConfig::new("localhost", 9001)));
        assert_ne!(
            client,
            Client::new(ClientConfig::new("localhost", 9000).with_timeout(1.0))
        );

        let mut logged = matching.call_runner();
        logged.logger(Logger::new(crate::LogLogger));
        assert_eq!(client.call_runner(), matching.call_runner());
        assert_ne!(client.call_runner(), logged);
    }

    #[test]
    fn stored_response_data_is_returned() {
        let client = test_client();
        client
            .add_response("echo")
            .with([("message", "hi")], Producer::value(|| "hi"));

        assert_eq!(client.call("echo", [("message", "hi")]).unwrap(), Value::from("hi"));
        assert_eq!(client.call("echo", Value::Null).unwrap(), Value::empty_map());
    }

    #[test]
    fn raw_stored_responses_are_yielded() {
        let client = test_client();
        client.add_response("svc").set_default(Producer::value(|| 5));

        let response = client.call_with("svc", Value::Null, |r| r).unwrap();
        assert_eq!(response, client.responses().get("svc", Value::Null));
    }

    #[test]
    fn calls_are_recorded_and_reset() {
        let client = test_client();
        client.add_response("svc");

        client.call("svc", [("id", 1)]).unwrap();
        let calls = client.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "svc");
        assert_eq!(calls[0].params, Value::from([("id", 1)]).into_params().unwrap());
        assert_eq!(calls[0].response, Response::ok(Value::empty_map()));

        client
            .add_response("svc")
            .with([("id", 1)], Producer::value(|| "stored"));
        client.reset();
        assert!(client.calls().is_empty());
        assert!(client.responses().is_empty());
    }

    #[test]
    fn removing_responses_restores_the_default() {
        let client = test_client();
        client
            .add_response("svc")
            .with([("id", 1)], Producer::value(|| "stored"));
        assert_eq!(
            client.responses().get("svc", [("id", 1)]).data,
            Value::from("stored")
        );

        client.remove_responses("svc");
        assert!(!client.responses().contains("svc"));
        assert_ne!(
            client.responses().get("svc", [("id", 1)]).data,
            Value::from("stored")
        );
    }

    #[test]
    fn runners_share_the_client_registry() {
        let client = test_client();
        let runner = client.params([("token", "t")]).unwrap();
        client
            .add_response("svc")
            .with([("token", "t")], Producer::value(|| "authorized"));

        assert_eq!(runner.call("svc", Value::Null).unwrap(), Value::from("authorized"));
        assert_eq!(client.calls().len(), 1);
    }

    #[test]
    fn stored_error_codes_classify() {
        let client = test_client();
        client.add_response("400").set_default(Producer::builder(|r| {
            r.code(400).data(false);
        }));

        let err = client.call("400", Value::Null).unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
        assert_eq!(err.response().map(|r| r.code), Some(400));
    }
}
