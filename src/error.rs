use std::io;

use thiserror::Error;

use crate::protocol::{ProtocolError, Response};

/// Everything a call can fail with.
///
/// The four status-code variants (`BadRequest`, `NotFound`, `Client` and
/// `Server`) carry the response that triggered them and are only produced on
/// the classified data path. `BadRequest`, `NotFound` and `Client` form the
/// client error family, see [`Error::is_client_error`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid call: {0}")]
    Validation(String),

    #[error("The server closed the connection, no response was written.")]
    ConnectionClosed,

    #[error("the call to {name:?} didn't respond in {timeout} seconds or less")]
    Timeout { name: String, timeout: f64 },

    #[error("{}", status_message(.0))]
    BadRequest(Response),

    #[error("{}", status_message(.0))]
    NotFound(Response),

    #[error("{}", status_message(.0))]
    Client(Response),

    #[error("{}", status_message(.0))]
    Server(Response),

    #[error("connection io error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl Error {
    /// True for any 4xx classification, including `BadRequest` and `NotFound`.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::BadRequest(_) | Error::NotFound(_) | Error::Client(_)
        )
    }

    /// The response carried by a status-code error.
    pub fn response(&self) -> Option<&Response> {
        match self {
            Error::BadRequest(r) | Error::NotFound(r) | Error::Client(r) | Error::Server(r) => {
                Some(r)
            }
            _ => None,
        }
    }
}

fn status_message(response: &Response) -> String {
    match &response.message {
        Some(message) => message.clone(),
        None => format!("request failed with status {}", response.code),
    }
}
