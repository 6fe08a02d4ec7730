//! # tiny_drop
//!
//! Two small operational tools sharing one crate:
//!
//! - a static file server ([`serve`], [`files`]) that exposes a directory over HTTP and
//!   decorates every response with permissive cross-origin headers;
//! - a one-shot uploader ([`upload`]) that installs the `gdrive` command-line tool on
//!   demand, pushes a single file through it and scrapes the shareable link from its
//!   output.
//!
//! The HTTP layer underneath the file server is deliberately small: it is synchronous,
//! answers one connection at a time and closes every connection after its response.
//!
//! # Simple usage
//!
//! ```no_run
//! use tiny_drop::{Response, Server};
//!
//! let server = Server::http("0.0.0.0:0").unwrap();
//!
//! for request in server.incoming_requests() {
//!     println!("received request! method: {:?}, url: {:?}",
//!         request.method(),
//!         request.url(),
//!     );
//!
//!     let response = Response::from_string("hello world");
//!     request.respond(response).unwrap();
//! }
//! ```
#![forbid(unsafe_code)]

use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};

use client::ClientConnection;

pub use common::{HTTPVersion, Header, HeaderField, Method, StatusCode};
pub use request::Request;
pub use response::{Response, ResponseBox};
pub use test::MockRequest;

mod client;
mod common;
mod log;
mod request;
mod response;
mod util;

pub mod files;
pub mod serve;
pub mod upload;

use crate::log::debug;

/// The main class of this library.
///
/// Destroying this object will immediately close the listening socket.
///
/// Unlike a threaded server, `recv()` accepts a connection and reads its request
/// on the calling thread: a slow client delays every client behind it.
pub struct Server {
    listener: TcpListener,
    response_headers: Vec<Header>,
}

/// Iterator over received `Request`s from a `Server`.
pub struct IncomingRequests<'a> {
    server: &'a Server,
}

/// Represents the parameters required to create a server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The address to listen to.
    pub addr: SocketAddr,

    /// Headers appended to every response the server sends, including
    /// the ones it generates itself for malformed requests.
    pub response_headers: Vec<Header>,
}

impl Server {
    /// Shortcut for a simple server on a specific address.
    #[inline]
    pub fn http<A>(addr: A) -> io::Result<Server>
    where
        A: ToSocketAddrs,
    {
        let listener = TcpListener::bind(addr)?;
        Ok(Server::from_listener(listener, Vec::new()))
    }

    /// Builds a new server that listens on the specified address.
    pub fn new(config: ServerConfig) -> io::Result<Server> {
        let listener = TcpListener::bind(config.addr)?;
        Ok(Server::from_listener(listener, config.response_headers))
    }

    /// Builds a new server using the specified TCP listener.
    ///
    /// This is useful if you've constructed the listener yourself, for
    /// example to pick a random port for testing.
    pub fn from_listener(listener: TcpListener, response_headers: Vec<Header>) -> Server {
        if let Ok(addr) = listener.local_addr() {
            debug!("Server listening on {}", addr);
        }

        Server {
            listener,
            response_headers,
        }
    }

    /// Returns an iterator for all the incoming requests.
    ///
    /// The iterator will stop if the listening socket fails.
    #[inline]
    pub fn incoming_requests(&self) -> IncomingRequests<'_> {
        IncomingRequests { server: self }
    }

    /// Returns the address the server is listening to.
    #[inline]
    pub fn server_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Blocks until an HTTP request has been submitted and returns it.
    ///
    /// Connections that do not carry a valid request are answered (or dropped)
    /// internally and never show up here.
    pub fn recv(&self) -> io::Result<Request> {
        loop {
            let (socket, _) = self.listener.accept()?;

            let client = match ClientConnection::new(socket, self.response_headers.clone()) {
                Ok(client) => client,
                Err(err) => {
                    debug!("Could not set up connection: {}", err);
                    continue;
                }
            };

            if let Some(rq) = client.into_request() {
                return Ok(rq);
            }
        }
    }
}

impl Iterator for IncomingRequests<'_> {
    type Item = Request;

    fn next(&mut self) -> Option<Request> {
        self.server.recv().ok()
    }
}
