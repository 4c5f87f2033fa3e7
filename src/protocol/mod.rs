//! Wire-level request and response types and the codec that frames them.
//!
//! The call machinery never looks at bytes directly. It hands a [`Request`]
//! to a [`ProtocolCodec`] to get the bytes to send, and asks the codec to
//! parse a [`Response`] out of the socket once it becomes readable.
//!
//! # Binary Format
//!
//! [`BincodeCodec`] frames every message the same way:
//!
//! - 1 byte protocol version (currently `1`).
//! - 4 byte big-endian length of the body.
//! - The body, bincode-encoded with big-endian fixed-width integers.
//!
//! Requests carry the service name and its params; responses carry a status
//! code, an optional status message and a payload [`Value`](crate::Value).
//!
//! # See Also
//!
//! - [`connection`](crate::connection): moves frames over a TCP socket.
//! - [`stored`](crate::stored): builds responses locally through [`ResponseBuilder`].
mod codec;
mod request;
mod response;

pub use codec::{BincodeCodec, MAX_BODY_LEN, PROTOCOL_VERSION, ProtocolCodec, ProtocolError};
pub use request::Request;
pub use response::{Response, ResponseBuilder};
