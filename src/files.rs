//! Static file handling.
//!
//! [`StaticFiles`] maps request paths onto a root directory and answers with file
//! contents, directory listings, redirects or error pages. The cross-origin headers
//! from [`cors_headers`] are not added here: the server appends them to every
//! response it writes, so error pages it generates on its own carry them as well.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use httpdate::HttpDate;

use crate::common::{Header, Method, StatusCode};
use crate::log::debug;
use crate::request::Request;
use crate::response::{Response, ResponseBox};

/// Methods advertised to cross-origin callers.
pub const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";

/// Request headers advertised to cross-origin callers.
pub const ALLOWED_HEADERS: &str = "Content-Type";

const INDEX_FILES: [&str; 2] = ["index.html", "index.htm"];

/// The three cross-origin headers carried by every response.
pub fn cors_headers() -> [Header; 3] {
    [
        Header::from_static("Access-Control-Allow-Origin", "*"),
        Header::from_static("Access-Control-Allow-Methods", ALLOWED_METHODS),
        Header::from_static("Access-Control-Allow-Headers", ALLOWED_HEADERS),
    ]
}

/// Serves the files found under a root directory.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    pub fn new<P>(root: P) -> StaticFiles
    where
        P: Into<PathBuf>,
    {
        StaticFiles { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Builds the response for a request.
    ///
    /// `GET` and `HEAD` are resolved against the root and every other method is
    /// refused with `501`. `OPTIONS` is the exception: it gets an empty `204` so that
    /// cross-origin preflights succeed, where a plain `SimpleHTTPRequestHandler`
    /// would refuse it as well.
    pub fn handle(&self, request: &Request) -> ResponseBox {
        match request.method() {
            Method::Get | Method::Head => self.resolve(request),
            Method::Options => Response::empty(204).boxed(),
            other => error_page(
                StatusCode(501),
                &format!("Unsupported method ('{}')", other),
            ),
        }
    }

    fn resolve(&self, request: &Request) -> ResponseBox {
        let (path, query) = split_url(request.url());
        let fs_path = self.translate_path(path);

        if fs_path.is_dir() {
            if !path.ends_with('/') {
                let location = match query {
                    Some(query) => format!("{}/?{}", path, query),
                    None => format!("{}/", path),
                };
                return redirect(&location);
            }

            for index in INDEX_FILES.iter() {
                let index = fs_path.join(index);
                if index.is_file() {
                    return serve_file(&index, request);
                }
            }

            return list_directory(&fs_path, path);
        }

        // a trailing slash names a directory, never a file
        if path.ends_with('/') {
            return error_page(StatusCode(404), "File not found");
        }

        serve_file(&fs_path, request)
    }

    /// Translates a `/`-separated URL path to a path under the root.
    ///
    /// Empty, `.` and `..` segments are dropped, so the result never leaves the root.
    pub fn translate_path(&self, url_path: &str) -> PathBuf {
        let decoded = urlencoding::decode_binary(url_path.as_bytes());
        let decoded = String::from_utf8_lossy(&decoded);

        let mut path = self.root.clone();
        for segment in decoded.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                continue;
            }
            // a decoded backslash must not smuggle in a separator
            if segment.contains('\\') || segment.contains('\0') {
                continue;
            }
            path.push(segment);
        }

        path
    }
}

/// Splits the query string and fragment away from the path.
fn split_url(url: &str) -> (&str, Option<&str>) {
    let url = url.split('#').next().unwrap_or(url);
    let mut parts = url.splitn(2, '?');
    let path = parts.next().unwrap_or("");
    (path, parts.next())
}

fn serve_file(path: &Path, request: &Request) -> ResponseBox {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            debug!("Cannot open {}: {}", path.display(), err);
            return error_page(StatusCode(404), "File not found");
        }
    };

    let modified = file.metadata().and_then(|meta| meta.modified()).ok();

    if let Some(modified) = modified {
        if not_modified_since(request, modified) {
            return Response::empty(304).boxed();
        }
    }

    let response = match Response::from_file(file) {
        Ok(response) => response,
        Err(err) => {
            debug!("Cannot stat {}: {}", path.display(), err);
            return error_page(StatusCode(404), "File not found");
        }
    };

    let mut response = response.with_header(Header::from_static(
        "Content-Type",
        &content_type(path),
    ));

    if let Some(modified) = modified {
        response.add_header(Header::from_static(
            "Last-Modified",
            &httpdate::fmt_http_date(modified),
        ));
    }

    response.boxed()
}

/// True when the client's cached copy, dated by `If-Modified-Since`, is still current.
///
/// `If-None-Match` takes precedence, and this server emits no entity tags, so its
/// presence always means a full answer. Dates that fail to parse are ignored.
fn not_modified_since(request: &Request, modified: SystemTime) -> bool {
    let header = |name: &str| {
        request
            .headers()
            .iter()
            .find(|h| h.field.equiv(name))
            .map(|h| h.value.as_str())
    };

    if header("If-None-Match").is_some() {
        return false;
    }

    let since = match header("If-Modified-Since").map(|value| value.trim().parse::<HttpDate>()) {
        Some(Ok(since)) => since,
        _ => return false,
    };

    // compared at the one-second resolution of the header
    HttpDate::from(modified) <= since
}

/// Guesses the `Content-Type` of a file from its extension.
pub fn content_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string()
}

fn list_directory(dir: &Path, url_path: &str) -> ResponseBox {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!("Cannot list {}: {}", dir.display(), err);
            return error_page(StatusCode(404), "No permission to list directory");
        }
    };

    let mut names: Vec<(String, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| (entry.file_name().to_string_lossy().into_owned(), entry.path()))
        .collect();
    names.sort_by_key(|(name, _)| name.to_lowercase());

    let display_path = html_escape(&String::from_utf8_lossy(&urlencoding::decode_binary(
        url_path.as_bytes(),
    )));
    let title = format!("Directory listing for {}", display_path);

    let mut body = String::new();
    body.push_str("<!DOCTYPE HTML>\n<html lang=\"en\">\n<head>\n");
    body.push_str("<meta charset=\"utf-8\">\n");
    body.push_str(&format!("<title>{}</title>\n</head>\n<body>\n", title));
    body.push_str(&format!("<h1>{}</h1>\n<hr>\n<ul>\n", title));

    for (name, full_path) in names {
        let mut display_name = name.clone();
        let mut link_name = urlencoding::encode(&name).into_owned();

        if full_path.is_dir() {
            display_name.push('/');
            link_name.push('/');
        }

        // a symlink is marked as such, even when it points at a directory
        if full_path
            .symlink_metadata()
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false)
        {
            display_name = format!("{}@", name);
        }

        body.push_str(&format!(
            "<li><a href=\"{}\">{}</a></li>\n",
            link_name,
            html_escape(&display_name)
        ));
    }

    body.push_str("</ul>\n<hr>\n</body>\n</html>\n");

    Response::from_data(body)
        .with_header(Header::from_static(
            "Content-Type",
            "text/html; charset=utf-8",
        ))
        .boxed()
}

fn redirect(location: &str) -> ResponseBox {
    let location = Header::from_static("Location", &escape_location(location));

    Response::empty(301).with_header(location).boxed()
}

/// Percent-encodes the bytes of a request target that cannot appear in a header
/// value, leaving everything else (including existing escapes) as the client sent it.
fn escape_location(location: &str) -> String {
    let mut escaped = String::with_capacity(location.len());
    for byte in location.bytes() {
        if byte.is_ascii_graphic() {
            escaped.push(char::from(byte));
        } else {
            escaped.push_str(&urlencoding::encode_binary(&[byte]));
        }
    }
    escaped
}

/// Builds the small HTML page sent along with error statuses.
pub fn error_page(status: StatusCode, message: &str) -> ResponseBox {
    let body = format!(
        "<!DOCTYPE HTML>\n\
         <html lang=\"en\">\n    \
         <head>\n        \
         <meta charset=\"utf-8\">\n        \
         <title>Error response</title>\n    \
         </head>\n    \
         <body>\n        \
         <h1>Error response</h1>\n        \
         <p>Error code: {}</p>\n        \
         <p>Message: {}.</p>\n    \
         </body>\n\
         </html>\n",
        status.0,
        html_escape(message)
    );

    Response::from_data(body)
        .with_status_code(status)
        .with_header(Header::from_static(
            "Content-Type",
            "text/html;charset=utf-8",
        ))
        .boxed()
}

fn html_escape(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '<' => "&lt;".to_string(),
            '>' => "&gt;".to_string(),
            '&' => "&amp;".to_string(),
            '"' => "&quot;".to_string(),
            '\'' => "&#x27;".to_string(),
            _ => c.to_string(),
        })
        .collect()
}
