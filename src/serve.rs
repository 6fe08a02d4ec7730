//! The cross-origin static file server.
//!
//! ```no_run
//! tiny_drop::serve::run(tiny_drop::serve::ServeConfig::default()).unwrap();
//! ```

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::files::{cors_headers, StaticFiles};
use crate::log::{info, warn};
use crate::{Server, ServerConfig};

/// Port the server listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 9000;

/// Host printed in the startup banner's download link.
///
/// It is a fixed address that is not looked up from the machine, so the printed
/// link can be stale.
pub const DOWNLOAD_HOST: &str = "21.0.6.133";

/// File named in the startup banner's download link.
pub const DOWNLOAD_FILE: &str = "call-center-dashboard.zip";

#[derive(Debug, Clone)]
pub struct ServeConfig {
    /// Port to listen to on all interfaces; `0` picks a free one.
    pub port: u16,

    /// Directory whose contents are served.
    pub root: PathBuf,

    /// Host of the download link printed at startup.
    pub download_host: String,

    /// File of the download link printed at startup.
    pub download_file: String,
}

impl Default for ServeConfig {
    fn default() -> Self {
        ServeConfig {
            port: DEFAULT_PORT,
            root: PathBuf::from("."),
            download_host: DOWNLOAD_HOST.to_string(),
            download_file: DOWNLOAD_FILE.to_string(),
        }
    }
}

impl ServeConfig {
    /// The address the server binds: every interface, on the configured port.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }

    /// The download link printed at startup.
    ///
    /// Built from the configuration alone, never from the running server.
    pub fn download_link(&self) -> String {
        format!(
            "http://{}:{}/{}",
            self.download_host, self.port, self.download_file
        )
    }

    /// The two lines printed once the socket is bound.
    pub fn banner(&self) -> String {
        format!(
            "Server running at http://0.0.0.0:{}/\nDownload link: {}",
            self.port,
            self.download_link()
        )
    }
}

/// Binds the listening socket. Every response of the returned server carries
/// the cross-origin headers.
pub fn bind(config: &ServeConfig) -> io::Result<Server> {
    Server::new(ServerConfig {
        addr: config.listen_addr(),
        response_headers: cors_headers().to_vec(),
    })
}

/// Answers requests one after the other, forever.
pub fn serve_forever(server: &Server, files: &StaticFiles) -> ! {
    loop {
        let request = match server.recv() {
            Ok(request) => request,
            Err(err) => {
                warn!("Failed to accept a connection: {}", err);
                continue;
            }
        };

        let response = files.handle(&request);

        info!(
            "{} \"{} {} HTTP/{}\" {}",
            request
                .remote_addr()
                .map(|addr| addr.ip().to_string())
                .unwrap_or_else(|| "-".to_string()),
            request.method(),
            request.url(),
            request.http_version(),
            response.status_code().0
        );

        if let Err(err) = request.respond(response) {
            warn!("Failed to send response: {}", err);
        }
    }
}

/// Binds, prints the banner and serves `config.root` until the process is killed.
///
/// Only returns when binding fails.
pub fn run(config: ServeConfig) -> io::Result<()> {
    let server = bind(&config)?;
    println!("{}", config.banner());

    let files = StaticFiles::new(config.root);
    serve_forever(&server, &files)
}
