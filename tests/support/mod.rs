use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::thread;

use tiny_drop::files::StaticFiles;
use tiny_drop::serve::{self, ServeConfig};

/// Starts the cross-origin file server on a random port, serving `root`.
///
/// The server thread runs until the test process exits.
pub fn serve_dir(root: &Path) -> SocketAddr {
    let config = ServeConfig {
        port: 0,
        root: root.to_path_buf(),
        ..ServeConfig::default()
    };
    let server = serve::bind(&config).unwrap();
    let port = server.server_addr().unwrap().port();

    let files = StaticFiles::new(config.root);
    thread::spawn(move || serve::serve_forever(&server, &files));

    SocketAddr::from(([127, 0, 0, 1], port))
}

/// A response as read back from the socket.
pub struct RawResponse {
    pub status_line: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn assert_cors(&self) {
        assert_eq!(self.header("Access-Control-Allow-Origin"), Some("*"));
        assert_eq!(
            self.header("Access-Control-Allow-Methods"),
            Some("GET, POST, OPTIONS")
        );
        assert_eq!(
            self.header("Access-Control-Allow-Headers"),
            Some("Content-Type")
        );
    }
}

/// Sends raw bytes and reads until the server closes the connection.
pub fn send(addr: SocketAddr, raw: &[u8]) -> RawResponse {
    let mut client = TcpStream::connect(addr).unwrap();
    client.write_all(raw).unwrap();
    client.flush().unwrap();

    let mut out = Vec::new();
    client.read_to_end(&mut out).unwrap();
    parse(&out)
}

/// Sends a bodiless request for `path`.
pub fn request(addr: SocketAddr, method: &str, path: &str) -> RawResponse {
    let raw = format!(
        "{} {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        method, path
    );
    send(addr, raw.as_bytes())
}

fn parse(raw: &[u8]) -> RawResponse {
    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response has no header terminator");
    let head = String::from_utf8(raw[..split].to_vec()).unwrap();
    let body = raw[split + 4..].to_vec();

    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap();
    let status = status_line
        .split(' ')
        .nth(1)
        .and_then(|code| code.parse().ok())
        .expect("malformed status line");

    let headers = lines
        .filter_map(|line| {
            let mut parts = line.splitn(2, ':');
            Some((
                parts.next()?.trim().to_string(),
                parts.next()?.trim().to_string(),
            ))
        })
        .collect();

    RawResponse {
        status_line: status_line.to_string(),
        status,
        headers,
        body,
    }
}
