//! The transfer engine: drives one request from URL to final notification.
//!
//! # Overview
//! A [`Transfer`] runs on its worker thread and walks
//! `Start -> UrlValidated -> Connected -> StatusChecked -> {Streaming | Error} -> Closed`.
//! Every path ends in exactly one terminal flag; errors never escape
//! [`Transfer::run`].
//!
//! # Design
//! Reads and writes go through `Connection`/`Exchange`, which own the
//! transport. Whatever branch returns, the exchange (and with it the
//! connection) is dropped before `run` returns, except for raw-stream
//! results, where the caller takes ownership of the open body.

use std::io::Write;
use std::sync::Arc;

use log::{debug, error, trace, warn};

use crate::config::EngineConfig;
use crate::connection::{parse_url, Connection, Exchange};
use crate::dispatch::Notifier;
use crate::error::{HttpCallError, HttpCallResult};
use crate::field::Field;
use crate::flag::Flag;
use crate::header::RequestHeader;
use crate::http::{DataType, HttpMethod, ResponseKind};
use crate::multipart::MultipartEncoder;
use crate::progress::ProgressMeter;
use crate::response::{Response, ResponseResult, ResponseStream};
use crate::storage::{random_file_name, FileSaver};
use crate::text::read_text;

/// What a request sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Empty,
    /// Sent trimmed.
    Text(String),
    /// Encoded as `multipart/form-data`.
    Multipart(Vec<Field>),
}

/// Everything a worker needs to run one request.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub method: HttpMethod,
    pub url: String,
    pub header: Option<RequestHeader>,
    pub body: RequestBody,
    pub response: ResponseKind,
}

impl TransferRequest {
    pub fn get(url: impl Into<String>, header: Option<RequestHeader>, response: ResponseKind) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            header,
            body: RequestBody::Empty,
            response,
        }
    }

    fn data_type(&self) -> DataType {
        match self.body {
            RequestBody::Multipart(_) => DataType::MultipartForm,
            RequestBody::Text(_) | RequestBody::Empty if self.method.has_output() => DataType::Text,
            _ => self.response.data_type(),
        }
    }
}

/// Lifecycle of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Start,
    UrlValidated,
    Connected,
    StatusChecked,
    Streaming,
    Error,
    Closed,
}

/// One request's worker state.
pub struct Transfer {
    config: Arc<EngineConfig>,
    notifier: Notifier,
    saver: Arc<dyn FileSaver>,
    response: Response,
    stage: Stage,
    url: String,
}

impl Transfer {
    pub fn new(config: Arc<EngineConfig>, notifier: Notifier, saver: Arc<dyn FileSaver>) -> Self {
        Self {
            config,
            notifier,
            saver,
            response: Response::new(),
            stage: Stage::Start,
            url: String::new(),
        }
    }

    /// Run the request to completion and return the terminal flag emitted.
    pub fn run(mut self, request: TransferRequest) -> Flag {
        self.url = request.url.clone();
        let flag = match self.execute(request) {
            Ok(flag) => flag,
            Err(err) => self.fail(err),
        };
        self.enter(Stage::Closed);
        flag
    }

    fn execute(&mut self, request: TransferRequest) -> HttpCallResult<Flag> {
        let data_type = request.data_type();
        let url = parse_url(&request.url, self.config.base_url.as_deref())?;
        self.url = url.to_string();
        self.response.record_request(
            request.method,
            url.as_str(),
            self.config.connect_timeout(),
            self.config.read_timeout(),
        );
        self.enter(Stage::UrlValidated);

        let mut connection = Connection::open(
            url,
            request.method,
            request.header.as_ref(),
            data_type,
            &self.config,
        );
        match &request.body {
            RequestBody::Empty => {}
            RequestBody::Text(text) => {
                let output = connection.output()?;
                output.write_all(text.trim().as_bytes())?;
                output.flush()?;
            }
            RequestBody::Multipart(fields) => self.encode_multipart(&mut connection, fields)?,
        }

        let mut exchange = connection.send()?;
        self.enter(Stage::Connected);
        self.response.record_exchange(
            exchange.status,
            exchange.headers.clone(),
            exchange.content_length,
        );

        if exchange.status != self.config.successful_response_code {
            return Ok(self.reject(&mut exchange));
        }
        self.enter(Stage::StatusChecked);

        if request.method.has_output() {
            self.emit(Flag::RequestAccepted, "Request accepted");
            self.emit(Flag::DataSent, "Data sent");
        } else {
            let message = format!("Started download of {} bytes", exchange.content_length);
            self.emit(Flag::RequestAccepted, message);
        }

        self.enter(Stage::Streaming);
        self.deliver(exchange, &request.response)
    }

    fn encode_multipart(&self, connection: &mut Connection, fields: &[Field]) -> HttpCallResult<()> {
        let boundary = connection
            .boundary()
            .map(str::to_string)
            .ok_or_else(|| HttpCallError::Config("multipart connection has no boundary".into()))?;
        let mut encoder = MultipartEncoder::new(connection.output()?, boundary, self.config.charset.as_str());
        for field in fields {
            encoder.add_field(field)?;
        }
        encoder.finish()?;
        Ok(())
    }

    /// Decode the error body and report the status code.
    fn reject(&mut self, exchange: &mut Exchange) -> Flag {
        let status = exchange.status;
        let total = exchange.content_length;
        let body = match read_text(exchange.body(), total, |_| {}) {
            Ok(body) => body,
            Err(err) => {
                warn!("Could not read error body from {}: {}", self.url, err);
                String::new()
            }
        };
        warn!("{} answered {} (expected {})", self.url, status, self.config.successful_response_code);
        self.enter(Stage::Error);
        self.emit(Flag::RequestUnaccepted, format!("{body} Response Code: {status}"))
    }

    fn deliver(&mut self, mut exchange: Exchange, kind: &ResponseKind) -> HttpCallResult<Flag> {
        let notifier = &self.notifier;
        let total = exchange.content_length;

        let result: ResponseResult = match kind {
            ResponseKind::Text => {
                match read_text(exchange.body(), total, |progress| notifier.progress(progress)) {
                    Ok(text) => text.into(),
                    Err(err) => {
                        error!("Reading body from {} failed: {}", self.url, err);
                        self.enter(Stage::Error);
                        return Ok(self.emit(
                            Flag::ErrorMessage,
                            format!("No response from server beyond accepting the request: {err}"),
                        ));
                    }
                }
            }
            ResponseKind::File { directory } => {
                let name = random_file_name(&self.config.download_prefix, self.response.content_type());
                let mut meter = ProgressMeter::new(total);
                let path = self.saver.save(directory, &name, exchange.body(), &mut |bytes| {
                    if let Some(progress) = meter.advance(bytes) {
                        notifier.progress(progress);
                    }
                })?;
                if let Some(progress) = meter.finish() {
                    notifier.progress(progress);
                }
                debug!("Download from {} finished after {} bytes", self.url, meter.bytes_read());
                path.into()
            }
            ResponseKind::Stream => ResponseStream::new(exchange.into_body()).into(),
        };

        Ok(self.emit(Flag::ResponseIsReady, result))
    }

    fn fail(&mut self, err: HttpCallError) -> Flag {
        let failed_at = self.stage;
        self.enter(Stage::Error);
        let flag = err.flag();
        match failed_at {
            Stage::Start => {
                warn!("Rejected url `{}`: {}", self.url, err);
                self.emit(flag, format!("Invalid URL: {err}"))
            }
            Stage::UrlValidated => {
                error!("Request to {} failed: {}", self.url, err);
                self.emit(flag, format!("Request to {} failed: {err}", self.url))
            }
            _ => {
                error!("Transfer from {} failed: {}", self.url, err);
                self.emit(flag, ResponseResult::None)
            }
        }
    }

    fn emit(&mut self, flag: Flag, result: impl Into<ResponseResult>) -> Flag {
        self.response.set_result(result);
        self.notifier.flag(flag, &self.response);
        flag
    }

    fn enter(&mut self, stage: Stage) {
        if stage == Stage::Closed {
            trace!("{}: {:?} -> closed", self.url, self.stage);
        } else {
            debug!("{}: {:?} -> {:?}", self.url, self.stage, stage);
        }
        self.stage = stage;
    }
}
