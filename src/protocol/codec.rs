use std::{
    fmt,
    io::{self, Read, Write},
};

use bincode::{
    config::{BigEndian, Configuration, Fixint},
    decode_from_slice, encode_to_vec,
};
use log::trace;
use thiserror::Error;

use super::{Request, Response};

pub const PROTOCOL_VERSION: u8 = 1;

/// Bodies larger than this are rejected before any allocation.
pub const MAX_BODY_LEN: u32 = 16 * 1024 * 1024;

const HEADER_LEN: usize = 5;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to encode message: {0}")]
    Serialize(#[from] bincode::error::EncodeError),
    #[error("failed to decode message: {0}")]
    Deserialize(#[from] bincode::error::DecodeError),
    #[error("unsupported protocol version {0}, expected {v}", v = PROTOCOL_VERSION)]
    Version(u8),
    #[error("message body of {0} bytes exceeds the {m} byte limit", m = MAX_BODY_LEN)]
    BodyTooLarge(usize),
    #[error("Transport IO Error: {0}")]
    Io(#[from] io::Error),
}

/// Turns requests into bytes and bytes into responses.
///
/// The connection only relies on this contract; the byte layout belongs to
/// the implementation.
pub trait ProtocolCodec: Send + Sync {
    fn serialize(&self, request: &Request) -> Result<Vec<u8>, ProtocolError>;

    /// Reads exactly one response frame from `reader`.
    fn parse(&self, reader: &mut dyn Read) -> Result<Response, ProtocolError>;
}

#[derive(Clone, Copy)]
pub struct BincodeCodec {
    config: Configuration<BigEndian, Fixint>,
}

impl fmt::Debug for BincodeCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BincodeCodec")
            .field("version", &PROTOCOL_VERSION)
            .field("max_body_len", &MAX_BODY_LEN)
            .finish()
    }
}

impl Default for BincodeCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl BincodeCodec {
    pub fn new() -> Self {
        let config = bincode::config::standard()
            .with_big_endian()
            .with_fixed_int_encoding();
        Self { config }
    }

    fn frame<T: bincode::Encode>(&self, message: T) -> Result<Vec<u8>, ProtocolError> {
        let body = encode_to_vec(message, self.config)?;
        let len = u32::try_from(body.len())
            .ok()
            .filter(|len| *len <= MAX_BODY_LEN)
            .ok_or(ProtocolError::BodyTooLarge(body.len()))?;

        let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
        frame.push(PROTOCOL_VERSION);
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    fn read_frame<T: bincode::Decode<()>>(
        &self,
        reader: &mut dyn Read,
    ) -> Result<T, ProtocolError> {
        let mut header = [0u8; HEADER_LEN];
        reader.read_exact(&mut header)?;
        if header[0] != PROTOCOL_VERSION {
            return Err(ProtocolError::Version(header[0]));
        }

        let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
        if len > MAX_BODY_LEN {
            return Err(ProtocolError::BodyTooLarge(len as usize));
        }
        trace!("reading {len} byte message body");

        let mut body = vec![0u8; len as usize];
        reader.read_exact(&mut body)?;
        let (message, _) = decode_from_slice(&body, self.config)?;
        Ok(message)
    }

    /// Server side: reads one request frame.
    pub fn read_request(&self, reader: &mut dyn Read) -> Result<Request, ProtocolError> {
        self.read_frame(reader)
    }

    /// Server side: writes one response frame and flushes it.
    pub fn write_response(
        &self,
        writer: &mut dyn Write,
        response: &Response,
    ) -> Result<(), ProtocolError> {
        let frame = self.frame(response)?;
        writer.write_all(&frame)?;
        writer.flush()?;
        Ok(())
    }
}

impl ProtocolCodec for BincodeCodec {
    fn serialize(&self, request: &Request) -> Result<Vec<u8>, ProtocolError> {
        self.frame(request)
    }

    fn parse(&self, reader: &mut dyn Read) -> Result<Response, ProtocolError> {
        self.read_frame(reader)
    }
}
