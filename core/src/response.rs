//! Response model shared by every notification stage of one request.
//!
//! # Design
//! The transfer engine keeps one `Response` per request and overwrites its
//! `result` stage by stage. Each notification hands handlers a clone, so a
//! retained `Response` is a snapshot of the stage it was delivered with.
//! The only payload that cannot be cloned, the raw body stream, is wrapped
//! in a take-once `ResponseStream` shared by all snapshots.

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::http::HttpMethod;

type BoxedReader = Box<dyn Read + Send>;

/// An open response body handed to the caller. The first `take` wins;
/// dropping the reader closes the underlying connection.
#[derive(Clone)]
pub struct ResponseStream {
    inner: Arc<Mutex<Option<BoxedReader>>>,
}

impl ResponseStream {
    pub fn new(reader: impl Read + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(Box::new(reader)))),
        }
    }

    /// Take ownership of the body reader, if nobody has yet.
    pub fn take(&self) -> Option<BoxedReader> {
        match self.inner.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    pub fn is_taken(&self) -> bool {
        match self.inner.lock() {
            Ok(guard) => guard.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}

impl fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseStream")
            .field("taken", &self.is_taken())
            .finish()
    }
}

/// Payload carried by a notification.
#[derive(Debug, Clone, Default)]
pub enum ResponseResult {
    #[default]
    None,
    /// Decoded text body, or a human-readable stage/error message.
    Text(String),
    /// Where a downloaded body was stored.
    FilePath(PathBuf),
    Stream(ResponseStream),
}

impl ResponseResult {
    pub fn is_none(&self) -> bool {
        matches!(self, ResponseResult::None)
    }
}

impl From<String> for ResponseResult {
    fn from(text: String) -> Self {
        ResponseResult::Text(text)
    }
}

impl From<&str> for ResponseResult {
    fn from(text: &str) -> Self {
        ResponseResult::Text(text.to_string())
    }
}

impl From<PathBuf> for ResponseResult {
    fn from(path: PathBuf) -> Self {
        ResponseResult::FilePath(path)
    }
}

impl From<ResponseStream> for ResponseResult {
    fn from(stream: ResponseStream) -> Self {
        ResponseResult::Stream(stream)
    }
}

/// Metadata and payload of one HTTP exchange.
#[derive(Debug, Clone, Default)]
pub struct Response {
    headers: HashMap<String, Vec<String>>,
    content_type: Option<String>,
    content_encoding: Option<String>,
    request_method: Option<HttpMethod>,
    url: Option<String>,
    response_code: u16,
    connect_timeout: Duration,
    read_timeout: Duration,
    content_length: i64,
    result: ResponseResult,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the payload, returning `self` for chaining into a notification.
    pub fn set_result(&mut self, result: impl Into<ResponseResult>) -> &mut Self {
        self.result = result.into();
        self
    }

    pub(crate) fn record_request(
        &mut self,
        method: HttpMethod,
        url: &str,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) {
        self.request_method = Some(method);
        self.url = Some(url.to_string());
        self.connect_timeout = connect_timeout;
        self.read_timeout = read_timeout;
    }

    /// Copy status and header metadata from a received exchange. Header names
    /// are stored lower-case.
    pub(crate) fn record_exchange(
        &mut self,
        response_code: u16,
        headers: HashMap<String, Vec<String>>,
        content_length: i64,
    ) {
        self.response_code = response_code;
        self.content_type = first_value(&headers, "content-type");
        self.content_encoding = first_value(&headers, "content-encoding");
        self.content_length = content_length;
        self.headers = headers;
    }

    pub fn result(&self) -> &ResponseResult {
        &self.result
    }

    /// The payload as text, when it is text.
    pub fn text(&self) -> Option<&str> {
        match &self.result {
            ResponseResult::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn file_path(&self) -> Option<&Path> {
        match &self.result {
            ResponseResult::FilePath(path) => Some(path),
            _ => None,
        }
    }

    pub fn stream(&self) -> Option<&ResponseStream> {
        match &self.result {
            ResponseResult::Stream(stream) => Some(stream),
            _ => None,
        }
    }

    pub fn headers(&self) -> &HashMap<String, Vec<String>> {
        &self.headers
    }

    /// Every value of a response header, looked up case-insensitively.
    pub fn header_all_values(&self, name: &str) -> Option<&[String]> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
    }

    pub fn header_first_value(&self, name: &str) -> Option<&str> {
        self.header_all_values(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// As sent by the server. Bodies are delivered without decompression.
    pub fn content_encoding(&self) -> Option<&str> {
        self.content_encoding.as_deref()
    }

    pub fn request_method(&self) -> Option<HttpMethod> {
        self.request_method
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Status code, or 0 before a status has been read.
    pub fn response_code(&self) -> u16 {
        self.response_code
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Declared body length: 0 before the exchange, -1 when the server did
    /// not announce one.
    pub fn content_length(&self) -> i64 {
        self.content_length
    }
}

fn first_value(headers: &HashMap<String, Vec<String>>, name: &str) -> Option<String> {
    headers.get(name).and_then(|values| values.first()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn headers() -> HashMap<String, Vec<String>> {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), vec!["image/png".to_string()]);
        headers.insert(
            "set-cookie".to_string(),
            vec!["a=1".to_string(), "b=2".to_string()],
        );
        headers
    }

    #[test]
    fn defaults_before_exchange() {
        let response = Response::new();
        assert_eq!(response.content_length(), 0);
        assert_eq!(response.response_code(), 0);
        assert!(response.result().is_none());
        assert!(response.content_type().is_none());
    }

    #[test]
    fn record_exchange_extracts_metadata() {
        let mut response = Response::new();
        response.record_request(
            HttpMethod::Get,
            "http://example/file",
            Duration::from_secs(3),
            Duration::from_secs(3),
        );
        response.record_exchange(200, headers(), 1024);

        assert_eq!(response.response_code(), 200);
        assert_eq!(response.content_type(), Some("image/png"));
        assert_eq!(response.content_length(), 1024);
        assert_eq!(response.request_method(), Some(HttpMethod::Get));
        assert_eq!(response.url(), Some("http://example/file"));
        assert_eq!(response.header_first_value("Content-Type"), Some("image/png"));
        assert_eq!(response.header_all_values("SET-COOKIE").map(|v| v.len()), Some(2));
        assert!(response.header_first_value("etag").is_none());
    }

    #[test]
    fn result_is_overwritten_per_stage() {
        let mut response = Response::new();
        response.set_result("Request accepted");
        let snapshot = response.clone();
        response.set_result(PathBuf::from("/tmp/download.png"));

        assert_eq!(snapshot.text(), Some("Request accepted"));
        assert_eq!(response.file_path(), Some(Path::new("/tmp/download.png")));
        assert!(response.text().is_none());
    }

    #[test]
    fn stream_is_taken_once_across_clones() {
        let mut response = Response::new();
        response.set_result(ResponseStream::new(Cursor::new(b"body".to_vec())));
        let snapshot = response.clone();

        let mut reader = snapshot.stream().unwrap().take().unwrap();
        let mut body = String::new();
        reader.read_to_string(&mut body).unwrap();
        assert_eq!(body, "body");

        assert!(response.stream().unwrap().is_taken());
        assert!(response.stream().unwrap().take().is_none());
    }
}
