//! URL validation and per-request connection setup.
//!
//! # Design
//! A `Connection` is configured up front and consumed by [`Connection::send`],
//! which connects, writes the spooled request body and reads the status
//! line. Bodies are spooled rather than streamed so the transfer engine can
//! write them (and report failures) before any network I/O happens; small
//! bodies stay in memory, large ones roll over to a temporary file.
//!
//! Each connection owns its own ureq agent and, for multipart requests, its
//! own boundary, so concurrent requests share no mutable state. ureq is
//! built without its `gzip` feature, so `Content-Encoding` and
//! `Content-Length` reach the `Response` as the server sent them.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};
use std::time::Duration;

use log::{debug, warn};
use tempfile::SpooledTempFile;
use ureq::http;
use ureq::typestate::WithBody;
use ureq::{Agent, BodyReader, RequestBuilder, SendBody};
use url::Url;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{HttpCallError, HttpCallResult};
use crate::header::{media_types, names, RequestHeader};
use crate::http::{DataType, HttpMethod};

/// Request bodies larger than this are spooled to a temporary file.
const SPOOL_IN_MEMORY_LIMIT: usize = 1024 * 1024;

/// Parse `raw` into an absolute `http`/`https` URL. Relative references are
/// resolved against `base` when one is configured.
pub fn parse_url(raw: &str, base: Option<&str>) -> HttpCallResult<Url> {
    let trimmed = raw.trim();
    let malformed = |reason: String| HttpCallError::MalformedUrl {
        url: raw.to_string(),
        reason,
    };
    if trimmed.is_empty() {
        return Err(malformed("empty url".to_string()));
    }

    let url = match (Url::parse(trimmed), base) {
        (Ok(url), _) => url,
        (Err(url::ParseError::RelativeUrlWithoutBase), Some(base)) => Url::parse(base)
            .and_then(|base| base.join(trimmed))
            .map_err(|e| malformed(e.to_string()))?,
        (Err(e), _) => return Err(malformed(e.to_string())),
    };

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(HttpCallError::UnsupportedScheme(other.to_string())),
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(malformed("missing host".to_string()));
    }
    Ok(url)
}

/// A fresh multipart boundary token.
pub fn new_boundary() -> String {
    format!("httpcall{}", Uuid::new_v4().simple())
}

/// A configured, not yet connected request.
pub struct Connection {
    agent: Agent,
    method: HttpMethod,
    url: Url,
    headers: Vec<(String, String)>,
    boundary: Option<String>,
    output: Option<SpooledTempFile>,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl Connection {
    /// Configure a request: timeouts, headers in registry order, and an
    /// output buffer for every method except GET. Multipart requests get a
    /// fresh boundary and the matching `Content-Type`.
    pub fn open(
        url: Url,
        method: HttpMethod,
        header: Option<&RequestHeader>,
        data_type: DataType,
        config: &EngineConfig,
    ) -> Self {
        let connect_timeout = config.connect_timeout();
        let read_timeout = config.read_timeout();
        let agent: Agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_connect(Some(connect_timeout))
            .timeout_recv_response(Some(read_timeout))
            .build()
            .new_agent();

        let boundary = (data_type == DataType::MultipartForm).then(new_boundary);
        let mut headers: Vec<(String, String)> = Vec::new();
        for field in header.into_iter().flatten() {
            if boundary.is_some() && field.name().eq_ignore_ascii_case(names::CONTENT_TYPE) {
                warn!(
                    "Ignoring Content-Type `{}` on multipart request to {}",
                    field.value(),
                    url
                );
                continue;
            }
            headers.push((field.name().to_string(), field.value().to_string()));
        }

        let has_header = |name: &str| headers.iter().any(|(n, _)| n.eq_ignore_ascii_case(name));
        let mut defaults = Vec::new();
        if !has_header(names::USER_AGENT) {
            defaults.push((names::USER_AGENT.to_string(), config.user_agent.clone()));
        }
        if let Some(boundary) = &boundary {
            defaults.push((
                names::CONTENT_TYPE.to_string(),
                format!("{}; {}={}", media_types::MULTIPART_FORM_DATA, names::BOUNDARY, boundary),
            ));
        } else if method.has_output() && data_type == DataType::Text && !has_header(names::CONTENT_TYPE)
        {
            defaults.push((
                names::CONTENT_TYPE.to_string(),
                format!("{}; charset={}", media_types::TEXT_PLAIN, config.charset),
            ));
        }
        headers.extend(defaults);

        let output = method
            .has_output()
            .then(|| SpooledTempFile::new(SPOOL_IN_MEMORY_LIMIT));

        debug!("Opened {} connection to {} ({} headers)", method, url, headers.len());
        Self {
            agent,
            method,
            url,
            headers,
            boundary,
            output,
            connect_timeout,
            read_timeout,
        }
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Request headers in the order they will be sent.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// The multipart boundary, for multipart requests only.
    pub fn boundary(&self) -> Option<&str> {
        self.boundary.as_deref()
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Buffer the request body is written into.
    pub fn output(&mut self) -> HttpCallResult<&mut SpooledTempFile> {
        let method = self.method.as_str();
        self.output.as_mut().ok_or(HttpCallError::OutputDisabled(method))
    }

    /// Connect, send the request and body, and read the response head.
    /// Non-success status codes are returned as data, not errors.
    pub fn send(self) -> HttpCallResult<Exchange> {
        let Connection {
            agent,
            method,
            url,
            headers,
            output,
            ..
        } = self;
        let target = url.as_str();

        let response = match method {
            HttpMethod::Get => with_headers(agent.get(target), &headers).call()?,
            HttpMethod::Post => send_body(with_headers(agent.post(target), &headers), output)?,
            HttpMethod::Put => send_body(with_headers(agent.put(target), &headers), output)?,
            HttpMethod::Patch => send_body(with_headers(agent.patch(target), &headers), output)?,
            HttpMethod::Delete => send_body(
                with_headers(agent.delete(target), &headers).force_send_body(),
                output,
            )?,
        };

        let (parts, body) = response.into_parts();
        let headers = header_map(&parts.headers);
        let content_length = headers
            .get("content-length")
            .and_then(|values| values.first())
            .and_then(|value| value.trim().parse::<i64>().ok())
            .unwrap_or(-1);

        Ok(Exchange {
            status: parts.status.as_u16(),
            headers,
            content_length,
            body: body.into_reader(),
        })
    }
}

fn with_headers<B>(mut builder: RequestBuilder<B>, headers: &[(String, String)]) -> RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn send_body(
    builder: RequestBuilder<WithBody>,
    output: Option<SpooledTempFile>,
) -> HttpCallResult<http::Response<ureq::Body>> {
    let Some(mut spool) = output else {
        return Ok(builder.send_empty()?);
    };
    spool.seek(SeekFrom::Start(0))?;
    if spool.is_rolled() {
        Ok(builder.send(SendBody::from_reader(&mut spool))?)
    } else {
        let mut buf = Vec::new();
        spool.read_to_end(&mut buf)?;
        Ok(builder.send(&buf[..])?)
    }
}

fn header_map(headers: &http::HeaderMap) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in headers {
        let value = match value.to_str() {
            Ok(value) => value.to_string(),
            Err(_) => String::from_utf8_lossy(value.as_bytes()).into_owned(),
        };
        map.entry(name.as_str().to_ascii_lowercase())
            .or_default()
            .push(value);
    }
    map
}

/// Status, headers and open body of a sent request.
pub struct Exchange {
    pub status: u16,
    /// Lower-case header names to every value received.
    pub headers: HashMap<String, Vec<String>>,
    /// `Content-Length`, or -1 when the server did not send one.
    pub content_length: i64,
    body: BodyReader<'static>,
}

impl Exchange {
    pub fn body(&mut self) -> &mut BodyReader<'static> {
        &mut self.body
    }

    /// Hand the body to a new owner; dropping it closes the connection.
    pub fn into_body(self) -> BodyReader<'static> {
        self.body
    }
}
