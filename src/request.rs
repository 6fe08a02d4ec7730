use std::fmt;
use std::io::{self, Read, Write};
use std::net::SocketAddr;

use crate::common::{HTTPVersion, Header, Method, StatusCode};
use crate::log::{debug, error};
use crate::response::Response;
use crate::util::EqualReader;

/// Represents an HTTP request made by a client.
///
/// A `Request` object is what is produced by the server, and is what
/// your code must analyse and answer.
///
/// # Automatic cleanup
///
/// If a `Request` object is destroyed without `respond` being called,
/// an empty response with a 500 status code (internal server error) will automatically be
/// sent back to the client.
/// This means that if your code fails during the handling of a request, this "internal server
/// error" response will automatically be sent during the stack unwinding.
pub struct Request {
    // where to read the body from
    data_reader: Option<Box<dyn Read + Send + 'static>>,

    // if this writer is empty, then the request has been answered
    response_writer: Option<Box<dyn Write + Send + 'static>>,

    remote_addr: Option<SocketAddr>,

    method: Method,

    path: String,

    http_version: HTTPVersion,

    headers: Vec<Header>,

    body_length: Option<usize>,

    // true if a `100 Continue` response must be sent when `as_reader()` is called
    must_send_continue: bool,

    // appended to every response sent through this request
    response_headers: Vec<Header>,
}

/// Error that can happen when building a `Request` object.
#[derive(Debug)]
pub enum RequestCreationError {
    /// The client sent an `Expect` header that was not recognized.
    ExpectationFailed,

    /// Error while reading data from the socket during the creation of the `Request`.
    CreationIoError(io::Error),
}

impl From<io::Error> for RequestCreationError {
    fn from(err: io::Error) -> RequestCreationError {
        RequestCreationError::CreationIoError(err)
    }
}

/// Builds a new request.
///
/// After the request line and headers have been read from the socket, a new `Request` object
/// is built.
///
/// You must pass a `Read` that will allow the `Request` object to read from the incoming data.
/// It is the responsibility of the `Request` to read only the data of the request and not further.
///
/// The `Write` object will be used by the `Request` to write the response.
#[allow(clippy::too_many_arguments)]
pub fn new_request<R, W>(
    method: Method,
    path: String,
    version: HTTPVersion,
    headers: Vec<Header>,
    remote_addr: Option<SocketAddr>,
    source_data: R,
    writer: W,
    response_headers: Vec<Header>,
) -> Result<Request, RequestCreationError>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    // finding the transfer-encoding header
    let transfer_encoding = headers
        .iter()
        .find(|h: &&Header| h.field.equiv("Transfer-Encoding"))
        .map(|h| h.value.clone());

    // finding the content-length header
    let content_length = if transfer_encoding.is_some() {
        // if transfer-encoding is specified, the Content-Length
        // header must be ignored (RFC2616 #4.4)
        None
    } else {
        headers
            .iter()
            .find(|h: &&Header| h.field.equiv("Content-Length"))
            .and_then(|h| h.value.as_str().trim().parse::<usize>().ok())
    };

    // true if the client sent a `Expect: 100-continue` header
    let expects_continue = {
        match headers.iter().find(|h: &&Header| h.field.equiv("Expect")) {
            None => false,
            Some(h) if h.value.as_str().eq_ignore_ascii_case("100-continue") => true,
            _ => return Err(RequestCreationError::ExpectationFailed),
        }
    };

    // building the reader depending on
    // transfer-encoding and content-length
    let reader: Box<dyn Read + Send + 'static> = if let Some(content_length) = content_length {
        if content_length == 0 {
            Box::new(io::empty())
        } else {
            Box::new(EqualReader::new(source_data, content_length))
        }
    } else if transfer_encoding.is_some() {
        // if a transfer-encoding was specified, then "chunked"
        // is ALWAYS applied over the message (RFC2616 #3.6)
        Box::new(chunked_transfer::Decoder::new(source_data))
    } else {
        // if we have neither a Content-Length nor a Transfer-Encoding,
        // assuming that we have no data
        Box::new(io::empty())
    };

    Ok(Request {
        data_reader: Some(reader),
        response_writer: Some(Box::new(writer)),
        remote_addr,
        method,
        path,
        http_version: version,
        headers,
        body_length: content_length,
        must_send_continue: expects_continue,
        response_headers,
    })
}

impl Request {
    /// Returns the method requested by the client (eg. `GET`, `POST`, etc.).
    #[inline]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the resource requested by the client, query string included.
    #[inline]
    pub fn url(&self) -> &str {
        &self.path
    }

    /// Returns a list of all headers sent by the client.
    #[inline]
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// Returns the HTTP version of the request.
    #[inline]
    pub fn http_version(&self) -> HTTPVersion {
        self.http_version
    }

    /// Returns the length of the body in bytes.
    ///
    /// Returns `None` if the length is unknown.
    #[inline]
    pub fn body_length(&self) -> Option<usize> {
        self.body_length
    }

    /// Returns the address of the client that sent this request.
    ///
    /// The address is `None` for requests that were not built from a socket.
    #[inline]
    pub fn remote_addr(&self) -> Option<&SocketAddr> {
        self.remote_addr.as_ref()
    }

    /// Allows to read the body of the request.
    ///
    /// If the client sent a `Expect: 100-continue` header with the request, calling this
    /// function will send back a `100 Continue` response.
    #[inline]
    pub fn as_reader(&mut self) -> &mut dyn Read {
        if self.must_send_continue {
            if let Some(writer) = self.response_writer.as_mut() {
                let interim = format!(
                    "HTTP/{} 100 Continue\r\n\r\n",
                    self.http_version.min(HTTPVersion(1, 1))
                );
                writer.write_all(interim.as_bytes()).ok();
                writer.flush().ok();
            }
            self.must_send_continue = false;
        }

        match self.data_reader.as_mut() {
            Some(reader) => reader.as_mut(),
            None => unreachable!("request body reader is only taken when responding"),
        }
    }

    /// Sends a response to this request.
    #[inline]
    pub fn respond<R>(mut self, response: Response<R>) -> io::Result<()>
    where
        R: Read,
    {
        let res = self.respond_impl(response);
        if let Err(ref err) = res {
            error!("Error occured while sending the response: {}", err);
        }
        res
    }

    fn respond_impl<R>(&mut self, response: Response<R>) -> io::Result<()>
    where
        R: Read,
    {
        let mut writer = match self.response_writer.take() {
            Some(writer) => writer,
            None => return Ok(()),
        };

        // the rest of the body must leave the socket before it is closed, unless
        // the client is still waiting for a `100 Continue` and never sent it
        if let Some(mut reader) = self.data_reader.take() {
            if !self.must_send_continue {
                if let Err(err) = io::copy(&mut reader, &mut io::sink()) {
                    debug!("Could not drain request body: {}", err);
                }
            }
        }

        let do_not_send_body = self.method == Method::Head;

        // never answer with a version this server does not speak
        let version = self.http_version.min(HTTPVersion(1, 1));

        match response.raw_print(
            writer.by_ref(),
            version,
            &self.response_headers,
            do_not_send_body,
        ) {
            Ok(()) => Ok(()),
            Err(ref err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
            Err(ref err) if err.kind() == io::ErrorKind::ConnectionAborted => Ok(()),
            Err(ref err) if err.kind() == io::ErrorKind::ConnectionRefused => Ok(()),
            Err(ref err) if err.kind() == io::ErrorKind::ConnectionReset => Ok(()),
            Err(err) => Err(err),
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            formatter,
            "Request({} {} from {:?})",
            self.method, self.path, self.remote_addr
        )
    }
}

impl Drop for Request {
    fn drop(&mut self) {
        if self.response_writer.is_some() {
            let response = Response::empty(StatusCode(500));
            let _ = self.respond_impl(response); // ignoring any potential error
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Request;
    use crate::common::{Header, Method};
    use crate::response::Response;
    use crate::test::MockRequest;
    use std::io::Read;

    #[test]
    fn must_be_send() {
        #![allow(dead_code)]
        fn f<T: Send>(_: &T) {}
        fn bar(rq: &Request) {
            f(rq);
        }
    }

    #[test]
    fn reads_content_length_body() {
        let mut request: Request = MockRequest::new()
            .with_method(Method::Post)
            .with_body("hello")
            .into();

        let mut output = String::new();
        request.as_reader().read_to_string(&mut output).unwrap();
        assert_eq!(output, "hello");
        assert_eq!(request.body_length(), Some(5));
    }

    #[test]
    fn decodes_chunked_body() {
        let mut request: Request = MockRequest::new()
            .with_method(Method::Post)
            .with_header("Transfer-Encoding: chunked".parse::<Header>().unwrap())
            .with_body("5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n")
            .into();

        let mut output = String::new();
        request.as_reader().read_to_string(&mut output).unwrap();
        assert_eq!(output, "hello world");
        assert_eq!(request.body_length(), None);
    }

    #[test]
    fn unknown_expectation_is_rejected() {
        let result = MockRequest::new()
            .with_header("Expect: 189-dummy".parse::<Header>().unwrap())
            .try_build();

        assert!(result.is_err());
    }

    #[test]
    fn respond_succeeds_without_socket() {
        let request: Request = MockRequest::new().with_path("/index.html").into();

        assert_eq!(request.url(), "/index.html");
        assert!(request.respond(Response::from_string("ok")).is_ok());
    }
}
