use crate::common::{HTTPVersion, Header, StatusCode};

use std::fs::File;
use std::io::{self, Cursor, Read, Write};
use std::time::SystemTime;

/// Object representing an HTTP response whose purpose is to be given to a `Request`.
///
/// Some headers cannot be changed. Trying to define the value
/// of one of these will have no effect:
///
///  - `Connection`: every connection is closed once its response is written
///  - `Content-Length`: always computed from the body
///
/// Some headers have special behaviors:
///
///  - `Date`: if you don't specify it, it will automatically be filled in
///  - `Server`: if you don't specify it, it will automatically be filled in
///
/// The headers passed as `extra_headers` to `raw_print` are appended last,
/// unless the response already carries a header with the same field.
pub struct Response<R> {
    reader: R,
    status_code: StatusCode,
    headers: Vec<Header>,
    data_length: usize,
}

/// A `Response` without a template parameter.
pub type ResponseBox = Response<Box<dyn Read + Send>>;

impl<R> Response<R>
where
    R: Read,
{
    /// Creates a new Response object.
    ///
    /// The `data_length` parameter is the number of bytes `data` will yield.
    pub fn new(
        status_code: StatusCode,
        headers: Vec<Header>,
        data: R,
        data_length: usize,
    ) -> Response<R> {
        let mut response = Response {
            reader: data,
            status_code,
            headers: Vec::with_capacity(headers.len()),
            data_length,
        };

        for h in headers {
            response.add_header(h);
        }

        response
    }

    /// Adds a header to the list.
    /// Does all the checks.
    pub fn add_header<H>(&mut self, header: H)
    where
        H: Into<Header>,
    {
        let header = header.into();

        if header.field.equiv("Connection") || header.field.equiv("Content-Length") {
            return;
        }

        self.headers.push(header);
    }

    /// Returns the same request, but with an additional header.
    ///
    /// Some headers cannot be modified and some other have a
    /// special behavior. See the documentation above.
    #[inline]
    pub fn with_header<H>(mut self, header: H) -> Response<R>
    where
        H: Into<Header>,
    {
        self.add_header(header.into());
        self
    }

    /// Returns the same request, but with a different status code.
    #[inline]
    pub fn with_status_code<S>(mut self, code: S) -> Response<R>
    where
        S: Into<StatusCode>,
    {
        self.status_code = code.into();
        self
    }

    /// Retrieves the current value of the `Response` status code
    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    /// Retrieves the current list of `Response` headers
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// Retrieves the length of the body
    pub fn data_length(&self) -> usize {
        self.data_length
    }

    /// Returns the value of the first header matching `field`, if any.
    pub fn header(&self, field: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.field.equiv(field))
            .map(|h| h.value.as_str())
    }

    /// Prints the HTTP response to a writer.
    ///
    /// This function is the one used to send the response to the client's socket.
    /// Therefore you shouldn't expect anything pretty-printed or even readable.
    ///
    /// The body is skipped when `do_not_send_body` is true (eg. `HEAD` requests)
    /// and for statuses that never carry one.
    pub fn raw_print<W: Write>(
        mut self,
        mut writer: W,
        http_version: HTTPVersion,
        extra_headers: &[Header],
        do_not_send_body: bool,
    ) -> io::Result<()> {
        // add `Date` if not in the headers
        if !self.headers.iter().any(|h| h.field.equiv("Date")) {
            let date = httpdate::fmt_http_date(SystemTime::now());
            self.headers.insert(0, Header::from_static("Date", &date));
        }

        // add `Server` if not in the headers
        if !self.headers.iter().any(|h| h.field.equiv("Server")) {
            self.headers
                .insert(0, Header::from_static("Server", "tiny_drop (Rust)"));
        }

        for extra in extra_headers {
            if !self.headers.iter().any(|h| h.field == extra.field) {
                self.headers.push(extra.clone());
            }
        }

        let forbids_body = self.status_code.forbids_body();
        if !forbids_body {
            self.headers.push(Header::from_static(
                "Content-Length",
                &self.data_length.to_string(),
            ));
        }
        self.headers.push(Header::from_static("Connection", "close"));

        // writing status line
        write!(
            writer,
            "HTTP/{} {} {}\r\n",
            http_version,
            self.status_code.0,
            self.status_code.default_reason_phrase()
        )?;

        // writing headers
        for header in &self.headers {
            writer.write_all(header.field.as_str().as_bytes())?;
            writer.write_all(b": ")?;
            writer.write_all(header.value.as_bytes())?;
            writer.write_all(b"\r\n")?;
        }

        // separator between header and data
        writer.write_all(b"\r\n")?;

        // writing data
        if !do_not_send_body && !forbids_body && self.data_length > 0 {
            let mut body = self.reader.take(self.data_length as u64);
            io::copy(&mut body, &mut writer)?;
        }

        writer.flush()
    }
}

impl<R> Response<R>
where
    R: Read + Send + 'static,
{
    /// Turns this response into a `Response<Box<dyn Read + Send>>`.
    pub fn boxed(self) -> ResponseBox {
        Response {
            reader: Box::new(self.reader) as Box<dyn Read + Send>,
            status_code: self.status_code,
            headers: self.headers,
            data_length: self.data_length,
        }
    }
}

impl Response<File> {
    /// Builds a new `Response` from a `File`.
    ///
    /// The `Content-Type` will **not** be automatically detected,
    /// you must set it yourself.
    pub fn from_file(file: File) -> io::Result<Response<File>> {
        let file_size = file.metadata()?.len() as usize;

        Ok(Response::new(StatusCode(200), Vec::new(), file, file_size))
    }
}

impl Response<Cursor<Vec<u8>>> {
    pub fn from_data<D>(data: D) -> Response<Cursor<Vec<u8>>>
    where
        D: Into<Vec<u8>>,
    {
        let data = data.into();
        let data_len = data.len();

        Response::new(StatusCode(200), Vec::new(), Cursor::new(data), data_len)
    }

    pub fn from_string<S>(data: S) -> Response<Cursor<Vec<u8>>>
    where
        S: Into<String>,
    {
        let data = data.into();
        let data_len = data.len();

        Response::new(
            StatusCode(200),
            vec![Header::from_static(
                "Content-Type",
                "text/plain; charset=UTF-8",
            )],
            Cursor::new(data.into_bytes()),
            data_len,
        )
    }
}

impl Response<io::Empty> {
    /// Builds an empty `Response` with the given status code.
    pub fn empty<S>(status_code: S) -> Response<io::Empty>
    where
        S: Into<StatusCode>,
    {
        Response::new(status_code.into(), Vec::new(), io::empty(), 0)
    }
}

#[cfg(test)]
mod test {
    use super::Response;
    use crate::common::{HTTPVersion, Header};

    fn print(response: Response<impl std::io::Read>, extra: &[Header], head: bool) -> String {
        let mut out = Vec::new();
        response
            .raw_print(&mut out, HTTPVersion(1, 1), extra, head)
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn prints_status_line_headers_and_body() {
        let text = print(Response::from_string("hello"), &[], false);

        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 5\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.contains("Date: "));
        assert!(text.ends_with("\r\n\r\nhello"));
    }

    #[test]
    fn extra_headers_are_appended_once() {
        let extra: Header = "X-Extra: yes".parse().unwrap();
        let response = Response::from_string("x").with_header(extra.clone());
        let text = print(response, &[extra], false);

        assert_eq!(text.matches("X-Extra: yes").count(), 1);
    }

    #[test]
    fn connection_and_length_cannot_be_overridden() {
        let response = Response::from_string("abc")
            .with_header("Connection: keep-alive".parse::<Header>().unwrap())
            .with_header("Content-Length: 99".parse::<Header>().unwrap());
        let text = print(response, &[], false);

        assert!(!text.contains("keep-alive"));
        assert!(!text.contains("Content-Length: 99"));
        assert!(text.contains("Content-Length: 3\r\n"));
    }

    #[test]
    fn body_is_skipped_when_asked() {
        let text = print(Response::from_string("hello"), &[], true);

        assert!(text.contains("Content-Length: 5\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn no_content_has_no_length() {
        let text = print(Response::empty(204), &[], false);

        assert!(text.starts_with("HTTP/1.1 204 No Content\r\n"));
        assert!(!text.contains("Content-Length"));
    }
}
