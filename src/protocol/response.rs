use bincode::{Decode, Encode};

use crate::{Error, Value};

/// A decoded reply: status code, optional status message and payload.
#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub message: Option<String>,
    pub data: Value,
}

impl Response {
    pub fn new(code: u16, message: Option<String>, data: Value) -> Self {
        Self {
            code,
            message,
            data,
        }
    }

    /// A `200` response with no status message.
    pub fn ok(data: impl Into<Value>) -> Self {
        Self::new(200, None, data.into())
    }

    pub fn is_5xx(&self) -> bool {
        (500..600).contains(&self.code)
    }

    pub fn is_404(&self) -> bool {
        self.code == 404
    }

    pub fn is_400(&self) -> bool {
        self.code == 400
    }

    pub fn is_4xx(&self) -> bool {
        (400..500).contains(&self.code)
    }

    /// Returns the payload, or the typed error the status code maps to.
    ///
    /// Codes are checked in order: 5xx, 404, 400, any other 4xx. Everything
    /// else is a success and yields the payload untouched.
    ///
    /// # Errors
    /// [`Error::Server`], [`Error::NotFound`], [`Error::BadRequest`] or
    /// [`Error::Client`], each carrying this response.
    pub fn into_data(self) -> Result<Value, Error> {
        if self.is_5xx() {
            Err(Error::Server(self))
        } else if self.is_404() {
            Err(Error::NotFound(self))
        } else if self.is_400() {
            Err(Error::BadRequest(self))
        } else if self.is_4xx() {
            Err(Error::Client(self))
        } else {
            Ok(self.data)
        }
    }
}

/// Mutable response under construction.
///
/// Starts as a `200` with no message and an empty map payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseBuilder {
    code: u16,
    message: Option<String>,
    data: Value,
}

impl Default for ResponseBuilder {
    fn default() -> Self {
        Self {
            code: 200,
            message: None,
            data: Value::empty_map(),
        }
    }
}

impl ResponseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn code(&mut self, code: u16) -> &mut Self {
        self.code = code;
        self
    }

    pub fn message(&mut self, message: impl Into<String>) -> &mut Self {
        self.message = Some(message.into());
        self
    }

    pub fn data(&mut self, data: impl Into<Value>) -> &mut Self {
        self.data = data.into();
        self
    }

    pub fn build(self) -> Response {
        Response::new(self.code, self.message, self.data)
    }
}
