//! A blocking RPC client for a framed request/response protocol over TCP.
//!
//! Every call opens its own socket, writes one request, waits a bounded time
//! for one response and closes the socket again. Responses are classified by
//! status code into data or a typed [`Error`]. In test mode a client answers
//! from locally registered [stored responses](stored) instead of the network.
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod logger;
pub mod protocol;
pub mod runner;
pub mod stored;
pub mod value;

pub use client::{CallRecord, Client, ResponsesGuard, StubHandle};
pub use config::{ClientConfig, Mode};
pub use error::Error;
pub use logger::{CallLogger, LogLogger, Logger};
pub use protocol::{Response, ResponseBuilder};
pub use runner::{CallRunner, Configurable, Hook};
pub use stored::{Producer, StoredResponses, Stub};
pub use value::{Params, Value};
