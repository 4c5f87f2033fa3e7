//! One TCP socket, one request, one response.
//!
//! A [`Connection`] is opened for a single exchange and closed when the scope
//! handed to [`Connection::open`] ends, whichever way it ends. Within that
//! scope the request is written, the write side is shut down so the peer
//! knows the request is complete, and the socket is polled for readability.
//!
//! The call's timeout is one deadline fixed when the connection opens.
//! Connecting, writing, waiting and reading each get only what is left of it,
//! so a peer trickling bytes cannot stretch the call.
//!
//! `TCP_NODELAY` is set on every socket: the whole request is known up front
//! and the write side closes right after, so there is nothing to coalesce.
use std::{
    io::{self, ErrorKind, Read, Write},
    net::{Shutdown, TcpStream, ToSocketAddrs},
    time::{Duration, Instant},
};

use log::{debug, trace};

use crate::{
    Error,
    protocol::{ProtocolCodec, ProtocolError, Request, Response},
};

pub struct Connection {
    stream: TcpStream,
    name: String,
    timeout: f64,
    deadline: Instant,
}

impl Connection {
    /// Connects to `host:port`, runs `f` with the open connection, then
    /// closes the socket. `name` identifies the call in timeout errors.
    ///
    /// # Errors
    /// [`Error::Validation`] for a negative or non-finite timeout (checked
    /// before connecting), [`Error::Timeout`] if the connect outlasts the
    /// deadline, [`Error::Io`] if it fails otherwise, or whatever `f` returns.
    pub fn open<F, R>(host: &str, port: u16, name: &str, timeout: f64, f: F) -> Result<R, Error>
    where
        F: FnOnce(&mut Connection) -> Result<R, Error>,
    {
        let deadline = Instant::now()
            .checked_add(call_budget(timeout)?)
            .ok_or_else(|| Error::Validation(format!("timeout of {timeout} seconds is too large")))?;

        debug!("connecting to {host}:{port}");
        let stream = connect(host, port, deadline).map_err(|e| match e.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => Error::Timeout {
                name: name.to_string(),
                timeout,
            },
            _ => Error::Io(e),
        })?;
        stream.set_nodelay(true)?;

        let mut connection = Connection {
            stream,
            name: name.to_string(),
            timeout,
            deadline,
        };
        f(&mut connection)
    }

    /// Runs a complete exchange: write, half-close, wait, parse.
    pub fn exchange(
        host: &str,
        port: u16,
        timeout: f64,
        codec: &dyn ProtocolCodec,
        request: &Request,
    ) -> Result<Response, Error> {
        Self::open(host, port, &request.name, timeout, |connection| {
            connection.write_request(codec, request)?;
            connection.close_write()?;
            connection.wait_readable()?;
            connection.read_response(codec)
        })
    }

    pub fn write_request(
        &mut self,
        codec: &dyn ProtocolCodec,
        request: &Request,
    ) -> Result<(), Error> {
        let bytes = codec.serialize(request)?;
        trace!("writing {} byte request for {:?}", bytes.len(), request.name);

        let mut writer = Bounded::new(&mut self.stream, self.deadline);
        let written = writer.write_all(&bytes).and_then(|()| writer.flush());
        written.map_err(|e| self.map_io_error(e))
    }

    /// Shuts down the write half, signalling the request is complete.
    pub fn close_write(&mut self) -> Result<(), Error> {
        self.stream
            .shutdown(Shutdown::Write)
            .map_err(|e| self.map_io_error(e))
    }

    /// Blocks until data is readable or the deadline passes.
    ///
    /// # Errors
    /// [`Error::ConnectionClosed`] if the peer closed or reset the socket
    /// without writing, [`Error::Timeout`] if nothing arrived in time.
    pub fn wait_readable(&mut self) -> Result<(), Error> {
        let mut first = [0u8; 1];
        let peeked = remaining(self.deadline).and_then(|left| {
            self.stream.set_read_timeout(Some(left))?;
            self.stream.peek(&mut first)
        });
        match peeked {
            Ok(0) => Err(Error::ConnectionClosed),
            Ok(_) => Ok(()),
            Err(e) => Err(self.map_io_error(e)),
        }
    }

    pub fn read_response(&mut self, codec: &dyn ProtocolCodec) -> Result<Response, Error> {
        let parsed = codec.parse(&mut Bounded::new(&mut self.stream, self.deadline));
        match parsed {
            Ok(response) => Ok(response),
            Err(ProtocolError::Io(e)) => Err(self.map_io_error(e)),
            Err(e) => Err(e.into()),
        }
    }

    fn map_io_error(&self, err: io::Error) -> Error {
        match err.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => Error::Timeout {
                name: self.name.clone(),
                timeout: self.timeout,
            },
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected => Error::ConnectionClosed,
            _ => Error::Io(err),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // The socket closes when the stream drops; a failed shutdown only
        // means the peer is already gone.
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// Socket reads and writes limited to what is left before `deadline`.
struct Bounded<'a> {
    stream: &'a mut TcpStream,
    deadline: Instant,
}

impl<'a> Bounded<'a> {
    fn new(stream: &'a mut TcpStream, deadline: Instant) -> Self {
        Bounded { stream, deadline }
    }
}

impl Read for Bounded<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.set_read_timeout(Some(remaining(self.deadline)?))?;
        self.stream.read(buf)
    }
}

impl Write for Bounded<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.set_write_timeout(Some(remaining(self.deadline)?))?;
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

/// Tries each resolved address until one accepts before the deadline.
///
/// Name resolution itself is not bounded; std offers no timeout for it.
fn connect(host: &str, port: u16, deadline: Instant) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, remaining(deadline)?) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            ErrorKind::AddrNotAvailable,
            format!("{host}:{port} did not resolve to any address"),
        )
    }))
}

/// Time left before `deadline`, or `TimedOut` once it has passed.
fn remaining(deadline: Instant) -> io::Result<Duration> {
    deadline
        .checked_duration_since(Instant::now())
        .filter(|left| !left.is_zero())
        .ok_or_else(|| io::Error::from(ErrorKind::TimedOut))
}

/// Converts a timeout in seconds into the budget for a whole call.
///
/// std rejects zero socket timeouts, so zero is clamped to one millisecond.
fn call_budget(timeout: f64) -> Result<Duration, Error> {
    let budget = Duration::try_from_secs_f64(timeout).map_err(|_| {
        Error::Validation(format!(
            "timeout must be a non-negative number of seconds, got {timeout}"
        ))
    })?;
    Ok(budget.max(Duration::from_millis(1)))
}

#[cfg(test)]
mod tests {
    use std::{net::TcpListener, thread};

    use crate::{Value, protocol::BincodeCodec};

    use super::*;

    #[test]
    fn budget_rejects_negative_and_nan() {
        assert!(matches!(call_budget(-1.0), Err(Error::Validation(_))));
        assert!(matches!(call_budget(f64::NAN), Err(Error::Validation(_))));
        assert_eq!(call_budget(0.0).unwrap(), Duration::from_millis(1));
        assert_eq!(call_budget(2.5).unwrap(), Duration::from_millis(2500));
    }

    #[test]
    fn exchange_round_trips_through_a_server() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let codec = BincodeCodec::new();
            let (mut stream, _) = listener.accept().unwrap();
            let request = codec.read_request(&mut stream).unwrap();

            // Half-close on the client side means the request is followed by EOF.
            let mut rest = Vec::new();
            stream.read_to_end(&mut rest).unwrap();
            assert!(rest.is_empty());

            let data = request.param("message").cloned().unwrap_or_default();
            codec
                .write_response(&mut stream, &Response::ok(data))
                .unwrap();
        });

        let codec = BincodeCodec::new();
        let request = Request::new("echo", Value::from([("message", "hi")]).into_params().unwrap());
        let response = Connection::exchange("127.0.0.1", port, 5.0, &codec, &request).unwrap();

        assert_eq!(response, Response::ok("hi"));
        server.join().unwrap();
    }

    #[test]
    fn peer_closing_without_reply_is_connection_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            stream.read_to_end(&mut request).unwrap();
        });

        let codec = BincodeCodec::new();
        let request = Request::new("silent", Default::default());
        let err = Connection::exchange("127.0.0.1", port, 5.0, &codec, &request).unwrap_err();

        assert!(matches!(err, Error::ConnectionClosed), "{err:?}");
        server.join().unwrap();
    }

    #[test]
    fn slow_peer_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(500));
            drop(stream);
        });

        let codec = BincodeCodec::new();
        let request = Request::new("slow", Default::default());
        let err = Connection::exchange("127.0.0.1", port, 0.1, &codec, &request).unwrap_err();

        match err {
            Error::Timeout { name, timeout } => {
                assert_eq!(name, "slow");
                assert_eq!(timeout, 0.1);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        server.join().unwrap();
    }

    #[test]
    fn peer_resetting_mid_request_is_connection_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            // Closing with unread bytes makes the kernel answer with a reset.
            let mut first = [0u8; 1];
            stream.read_exact(&mut first).unwrap();
            thread::sleep(Duration::from_millis(50));
            drop(stream);
        });

        let codec = BincodeCodec::new();
        let request = Request::new("never", Value::from([("k", "v")]).into_params().unwrap());
        let err = Connection::exchange("127.0.0.1", port, 5.0, &codec, &request).unwrap_err();

        assert!(matches!(err, Error::ConnectionClosed), "{err:?}");
        server.join().unwrap();
    }

    #[test]
    fn trickling_response_is_bounded_by_the_deadline() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let codec = BincodeCodec::new();
            let (mut stream, _) = listener.accept().unwrap();
            codec.read_request(&mut stream).unwrap();

            let mut frame = Vec::new();
            codec
                .write_response(&mut frame, &Response::ok("a fairly long payload string"))
                .unwrap();
            for byte in frame {
                thread::sleep(Duration::from_millis(60));
                if stream.write_all(&[byte]).is_err() {
                    break;
                }
            }
        });

        let codec = BincodeCodec::new();
        let request = Request::new("drip", Default::default());
        let started = Instant::now();
        let err = Connection::exchange("127.0.0.1", port, 0.3, &codec, &request).unwrap_err();

        assert!(matches!(err, Error::Timeout { ref name, .. } if name == "drip"), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(1));
        server.join().unwrap();
    }
}
