use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::net::{SocketAddr, TcpStream};

use crate::common::{HTTPVersion, Header, Method, StatusCode};
use crate::log::debug;
use crate::request::{self, Request};
use crate::response::Response;

// longest request line or header line accepted
const MAX_LINE_LENGTH: u64 = 8 * 1024;

// most headers accepted in a single request
const MAX_HEADERS: usize = 128;

/// A ClientConnection is an object that will store a socket to a client
/// and return the single Request it carries.
///
/// Every connection is closed once its response is written, so a client
/// only ever gets one request per connection.
pub struct ClientConnection {
    // address of the client
    remote_addr: Option<SocketAddr>,

    // buffered reader on the socket; the request body is read from it too
    source: BufReader<TcpStream>,

    // the socket, used to write the response
    sink: TcpStream,

    // appended to every response, error responses included
    response_headers: Vec<Header>,
}

/// Error that can happen when reading a request.
#[derive(Debug)]
enum ReadError {
    WrongRequestLine,
    WrongHeader(HTTPVersion),

    /// the client sent an unrecognized `Expect` header
    ExpectationFailed(HTTPVersion),

    ReadIoError(io::Error),
}

impl ClientConnection {
    /// Creates a new `ClientConnection` that takes ownership of the `TcpStream`.
    pub fn new(socket: TcpStream, response_headers: Vec<Header>) -> io::Result<ClientConnection> {
        let remote_addr = socket.peer_addr().ok();
        let sink = socket.try_clone()?;

        Ok(ClientConnection {
            remote_addr,
            source: BufReader::new(socket),
            sink,
            response_headers,
        })
    }

    /// Reads the next line from the socket.
    ///
    /// Reads until `LF` is reached and strips the trailing `CRLF`. The next read
    /// will start at the first byte of the new line.
    fn read_next_line(&mut self) -> io::Result<String> {
        let mut buf = Vec::new();
        let read = (&mut self.source)
            .take(MAX_LINE_LENGTH)
            .read_until(b'\n', &mut buf)?;

        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before the line ended",
            ));
        }

        if buf.last() != Some(&b'\n') {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "line too long"));
        }

        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }

        String::from_utf8(buf)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "line is not UTF-8"))
    }

    /// Reads a request from the stream.
    /// Blocks until the header has been read.
    fn read(&mut self) -> Result<Request, ReadError> {
        // reading the request line
        let (method, path, version) = {
            let line = match self.read_next_line() {
                Ok(line) => line,
                Err(ref err) if err.kind() == io::ErrorKind::InvalidData => {
                    return Err(ReadError::WrongRequestLine)
                }
                Err(err) => return Err(ReadError::ReadIoError(err)),
            };

            parse_request_line(line.trim())?
        };

        // getting all headers
        let headers = {
            let mut headers = Vec::new();
            loop {
                let line = match self.read_next_line() {
                    Ok(line) => line,
                    Err(ref err) if err.kind() == io::ErrorKind::InvalidData => {
                        return Err(ReadError::WrongHeader(version))
                    }
                    Err(err) => return Err(ReadError::ReadIoError(err)),
                };

                if line.trim().is_empty() {
                    break;
                }

                if headers.len() == MAX_HEADERS {
                    return Err(ReadError::WrongHeader(version));
                }

                headers.push(match line.trim().parse::<Header>() {
                    Ok(h) => h,
                    _ => return Err(ReadError::WrongHeader(version)),
                });
            }

            headers
        };

        let source = self.source.get_ref().try_clone().map_err(ReadError::ReadIoError)?;
        let data_source = BufReader::new(source);
        // bytes of the body that are already buffered must not be lost
        let buffered = self.source.buffer().to_vec();
        let data_source = io::Cursor::new(buffered).chain(data_source);

        let writer = BufWriter::new(self.sink.try_clone().map_err(ReadError::ReadIoError)?);

        request::new_request(
            method,
            path,
            version,
            headers,
            self.remote_addr,
            data_source,
            writer,
            self.response_headers.clone(),
        )
        .map_err(|e| match e {
            request::RequestCreationError::CreationIoError(e) => ReadError::ReadIoError(e),
            request::RequestCreationError::ExpectationFailed => {
                ReadError::ExpectationFailed(version)
            }
        })
    }

    /// Blocks until the request is available.
    ///
    /// Returns `None` if the client sent something that is not a valid request; in that
    /// case an error response has already been written and the connection is done.
    pub fn into_request(mut self) -> Option<Request> {
        let rq = match self.read() {
            Err(ReadError::WrongRequestLine) => {
                self.reject(StatusCode(400), HTTPVersion(1, 1));
                return None;
            }

            Err(ReadError::WrongHeader(ver)) => {
                self.reject(StatusCode(400), ver);
                return None;
            }

            Err(ReadError::ExpectationFailed(ver)) => {
                self.reject(StatusCode(417), ver);
                return None;
            }

            Err(ReadError::ReadIoError(err)) => {
                debug!("Dropping connection from {:?}: {}", self.remote_addr, err);
                return None;
            }

            Ok(rq) => rq,
        };

        // checking HTTP version
        if rq.http_version() > HTTPVersion(1, 1) {
            let response =
                Response::from_string("This server only supports HTTP versions 1.0 and 1.1")
                    .with_status_code(505);
            rq.respond(response).ok();
            return None;
        }

        Some(rq)
    }

    fn reject(&mut self, status: StatusCode, version: HTTPVersion) {
        let version = version.min(HTTPVersion(1, 1));
        let response = Response::empty(status);
        response
            .raw_print(&mut self.sink, version, &self.response_headers, false)
            .ok();
        self.sink.flush().ok();
    }
}

/// Parses a "HTTP/1.1" string.
fn parse_http_version(version: &str) -> Result<HTTPVersion, ReadError> {
    let version = version
        .strip_prefix("HTTP/")
        .ok_or(ReadError::WrongRequestLine)?;

    let mut elems = version.splitn(2, '.');
    let major = elems.next().and_then(|e| e.parse().ok());
    let minor = elems.next().and_then(|e| e.parse().ok());

    match (major, minor) {
        (Some(major), Some(minor)) => Ok(HTTPVersion(major, minor)),
        _ => Err(ReadError::WrongRequestLine),
    }
}

/// Parses the request line of the request.
/// eg. GET / HTTP/1.1
fn parse_request_line(line: &str) -> Result<(Method, String, HTTPVersion), ReadError> {
    let mut parts = line.split(' ');

    let method = parts.next().and_then(|w| w.parse().ok());
    let path = parts.next().filter(|p| !p.is_empty()).map(ToOwned::to_owned);
    let version = parts.next().and_then(|w| parse_http_version(w).ok());

    if parts.next().is_some() {
        return Err(ReadError::WrongRequestLine);
    }

    method
        .and_then(|method| Some((method, path?, version?)))
        .ok_or(ReadError::WrongRequestLine)
}
