//! Execution of a single call.
//!
//! A [`CallRunner`] holds everything one call needs: where to connect, how
//! long to wait, params merged beneath the call's own params, the summary
//! logger and the before/after hooks. It is configured through the
//! [`Configurable`] trait, which both the runner and the
//! [`Client`](crate::Client) implement:
//!
//! - on `&mut CallRunner` every method mutates the runner and returns it, so
//!   calls chain;
//! - on `&Client` every method starts a fresh runner from the client's
//!   defaults, leaving the client untouched.
//!
//! # Call sequence
//!
//! 1. Params are validated (must be a map or null) before any I/O.
//! 2. The runner's params overlay is merged with the call params; call params
//!    win on conflicting keys.
//! 3. Before-call hooks run in registration order.
//! 4. The response comes from a stored response (test mode, when one is
//!    registered for the service) or from a live exchange.
//! 5. After-call hooks run in registration order, even if step 4 failed.
//! 6. One summary line goes to the logger.
//! 7. The response is classified into data or a typed error, unless the
//!    caller asked for the raw response with [`CallRunner::call_with`].
use std::{
    borrow::BorrowMut,
    fmt,
    hash::{Hash, Hasher},
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use log::debug;

use crate::{
    Error, Logger, Params, Value,
    client::{CallRecord, TestState},
    config::{ClientConfig, DEFAULT_TIMEOUT, Mode},
    connection::Connection,
    protocol::{BincodeCodec, ProtocolCodec, Request, Response},
    value::write_params,
};

/// Called with the service name, the merged params and the running runner.
pub type Hook = Arc<dyn Fn(&str, &Params, &CallRunner) + Send + Sync>;

/// Chainable call configuration shared by clients and runners.
pub trait Configurable: Sized {
    type Runner: BorrowMut<CallRunner>;

    /// The runner the configuration methods act on.
    fn call_runner(self) -> Self::Runner;

    /// Sets the seconds to wait for a response.
    fn timeout(self, seconds: f64) -> Self::Runner {
        configure(self.call_runner(), |r| r.timeout = seconds)
    }

    /// Merges `params` into the overlay sent with every call.
    ///
    /// # Errors
    /// [`Error::Validation`] when `params` is not a map.
    fn params(self, params: impl Into<Value>) -> Result<Self::Runner, Error> {
        let params = match params.into() {
            Value::Null => {
                return Err(Error::Validation(
                    "expected params to be a map instead of a null".to_string(),
                ));
            }
            other => other.into_params()?,
        };
        Ok(configure(self.call_runner(), |r| r.params.extend(params)))
    }

    fn logger(self, logger: impl Into<Logger>) -> Self::Runner {
        let logger = logger.into();
        configure(self.call_runner(), |r| r.logger = logger)
    }

    fn before_call<F>(self, hook: F) -> Self::Runner
    where
        F: Fn(&str, &Params, &CallRunner) + Send + Sync + 'static,
    {
        configure(self.call_runner(), |r| r.before_call.push(Arc::new(hook)))
    }

    fn after_call<F>(self, hook: F) -> Self::Runner
    where
        F: Fn(&str, &Params, &CallRunner) + Send + Sync + 'static,
    {
        configure(self.call_runner(), |r| r.after_call.push(Arc::new(hook)))
    }
}

fn configure<R, F>(mut runner: R, f: F) -> R
where
    R: BorrowMut<CallRunner>,
    F: FnOnce(&mut CallRunner),
{
    f(runner.borrow_mut());
    runner
}

#[derive(Clone)]
pub struct CallRunner {
    host: String,
    port: u16,
    timeout: f64,
    params: Params,
    logger: Logger,
    before_call: Vec<Hook>,
    after_call: Vec<Hook>,
    mode: Mode,
    codec: Arc<dyn ProtocolCodec>,
    state: Arc<Mutex<TestState>>,
}

impl<'a> Configurable for &'a mut CallRunner {
    type Runner = &'a mut CallRunner;

    fn call_runner(self) -> Self::Runner {
        self
    }
}

impl CallRunner {
    /// A live runner for `host:port` with the default timeout.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        CallRunner {
            host: host.into(),
            port,
            timeout: DEFAULT_TIMEOUT,
            params: Params::new(),
            logger: Logger::null(),
            before_call: Vec::new(),
            after_call: Vec::new(),
            mode: Mode::Live,
            codec: Arc::new(BincodeCodec::new()),
            state: Arc::default(),
        }
    }

    pub(crate) fn from_config(
        config: &ClientConfig,
        codec: Arc<dyn ProtocolCodec>,
        state: Arc<Mutex<TestState>>,
    ) -> Self {
        CallRunner {
            timeout: config.timeout,
            mode: config.mode,
            codec,
            state,
            ..CallRunner::new(config.host.clone(), config.port)
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn ProtocolCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn timeout_value(&self) -> f64 {
        self.timeout
    }

    pub fn params_value(&self) -> &Params {
        &self.params
    }

    pub fn logger_value(&self) -> &Logger {
        &self.logger
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn before_call_hooks(&self) -> &[Hook] {
        &self.before_call
    }

    pub fn after_call_hooks(&self) -> &[Hook] {
        &self.after_call
    }

    /// Calls `name` and returns the classified response data.
    ///
    /// # Errors
    /// Validation, connection, timeout and protocol errors from the exchange,
    /// or the status-code error the response classifies as.
    pub fn call(&self, name: &str, params: impl Into<Value>) -> Result<Value, Error> {
        self.run(name, params.into())?.into_data()
    }

    /// Calls `name` and hands the raw response to `handler`; no status-code
    /// classification happens on this path.
    pub fn call_with<F, R>(&self, name: &str, params: impl Into<Value>, handler: F) -> Result<R, Error>
    where
        F: FnOnce(Response) -> R,
    {
        let response = self.run(name, params.into())?;
        Ok(handler(response))
    }

    fn run(&self, name: &str, params: Value) -> Result<Response, Error> {
        let params = params.into_params()?;
        let mut merged = self.params.clone();
        merged.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));

        for hook in &self.before_call {
            hook(name, &merged, self);
        }

        let started = Instant::now();
        let result = self.dispatch(name, &merged);
        let elapsed = started.elapsed();

        for hook in &self.after_call {
            hook(name, &merged, self);
        }

        let line = SummaryLine {
            host: &self.host,
            port: self.port,
            service: name,
            params: &params,
            status: result.as_ref().ok().map(|response| response.code),
            duration: elapsed,
        };
        self.logger.info(&format!("[courier] {line}"));

        result
    }

    fn dispatch(&self, name: &str, params: &Params) -> Result<Response, Error> {
        if self.mode == Mode::Test {
            if let Some(response) = self.stored_response(name, params) {
                return Ok(response);
            }
            debug!("no stored response for {name:?}, calling {}:{}", self.host, self.port);
        }

        let request = Request::new(name, params.clone());
        Connection::exchange(
            &self.host,
            self.port,
            self.timeout,
            self.codec.as_ref(),
            &request,
        )
    }

    fn stored_response(&self, name: &str, params: &Params) -> Option<Response> {
        let producer = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .responses
            .resolve(name, params.clone())?;

        // Producers run unlocked so they may use the registry themselves.
        let response = producer.produce();
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .calls
            .push(CallRecord {
                name: name.to_string(),
                params: params.clone(),
                response: response.clone(),
            });
        Some(response)
    }
}

impl PartialEq for CallRunner {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host
            && self.port == other.port
            && self.timeout.to_bits() == other.timeout.to_bits()
            && self.params == other.params
            && self.logger == other.logger
    }
}

impl Eq for CallRunner {}

impl Hash for CallRunner {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
        self.timeout.to_bits().hash(state);
        self.params.hash(state);
        self.logger.hash(state);
    }
}

impl fmt::Debug for CallRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallRunner")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("timeout", &self.timeout)
            .field("params", &self.params)
            .field("logger", &self.logger)
            .field("mode", &self.mode)
            .field("before_call", &self.before_call.len())
            .field("after_call", &self.after_call.len())
            .finish()
    }
}

struct SummaryLine<'a> {
    host: &'a str,
    port: u16,
    service: &'a str,
    params: &'a Params,
    status: Option<u16>,
    duration: Duration,
}

impl fmt::Display for SummaryLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "host=\"{}:{}\" service={:?} params=",
            self.host, self.port, self.service
        )?;
        write_params(f, self.params)?;
        if let Some(status) = self.status {
            write!(f, " status={status}")?;
        }
        write!(f, " duration={}", rounded_millis(self.duration))
    }
}

/// Milliseconds rounded to two decimal places.
fn rounded_millis(duration: Duration) -> f64 {
    (duration.as_secs_f64() * 100_000.0).round() / 100.0
}
