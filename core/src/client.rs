//! The public request API.
//!
//! # Design
//! `HttpCall` is cheap to clone and holds no per-request state: each verb
//! builds a [`TransferRequest`], spawns one named worker thread for it and
//! returns immediately. Results arrive only through the handler's
//! notifications. There is no worker pool, no bound on concurrent requests
//! and no cancellation; the returned [`RequestHandle`] can only be joined.

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, warn};

use crate::config::{EngineConfig, WorkerPriority};
use crate::dispatch::{Foreground, Notifier, ResponseHandler};
use crate::error::HttpCallResult;
use crate::field::Field;
use crate::flag::Flag;
use crate::header::RequestHeader;
use crate::http::{HttpMethod, ResponseKind};
use crate::response::Response;
use crate::storage::{DiskFileSaver, FileSaver};
use crate::transfer::{RequestBody, Transfer, TransferRequest};

static WORKER_ID: AtomicUsize = AtomicUsize::new(0);

/// Issues requests on worker threads and reports them to a handler.
#[derive(Clone)]
pub struct HttpCall {
    config: Arc<EngineConfig>,
    foreground: Foreground,
    handler: Arc<dyn ResponseHandler>,
    saver: Arc<dyn FileSaver>,
}

impl HttpCall {
    /// Build a client. An invalid `config` is accepted with a warning; its
    /// requests then fail at run time. Use [`try_new`](Self::try_new) to
    /// reject it up front.
    pub fn new(
        config: EngineConfig,
        foreground: Foreground,
        handler: Arc<dyn ResponseHandler>,
    ) -> Self {
        if let Err(err) = config.validate() {
            warn!("HttpCall created with {}", err);
        }
        Self::unchecked(config, foreground, handler)
    }

    /// Build a client, failing on an invalid `config`.
    pub fn try_new(
        config: EngineConfig,
        foreground: Foreground,
        handler: Arc<dyn ResponseHandler>,
    ) -> HttpCallResult<Self> {
        config.validate()?;
        Ok(Self::unchecked(config, foreground, handler))
    }

    fn unchecked(
        config: EngineConfig,
        foreground: Foreground,
        handler: Arc<dyn ResponseHandler>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            foreground,
            handler,
            saver: Arc::new(DiskFileSaver),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Same configuration and foreground context, different handler.
    pub fn with_handler(&self, handler: Arc<dyn ResponseHandler>) -> Self {
        Self {
            handler,
            ..self.clone()
        }
    }

    /// Replace the storage used by file downloads.
    pub fn with_file_saver(mut self, saver: Arc<dyn FileSaver>) -> Self {
        self.saver = saver;
        self
    }

    /// GET, delivering the body as text.
    pub fn get_text(&self, url: &str, header: Option<RequestHeader>) -> RequestHandle {
        self.execute(TransferRequest::get(url, header, ResponseKind::Text))
    }

    /// GET, storing the body in a new file under `directory`.
    pub fn get_file(
        &self,
        url: &str,
        header: Option<RequestHeader>,
        directory: impl Into<PathBuf>,
    ) -> RequestHandle {
        self.execute(TransferRequest::get(url, header, ResponseKind::file(directory)))
    }

    /// GET, handing the open body stream to the handler.
    pub fn get_input_stream(&self, url: &str, header: Option<RequestHeader>) -> RequestHandle {
        self.execute(TransferRequest::get(url, header, ResponseKind::Stream))
    }

    pub fn post_text(
        &self,
        url: &str,
        header: Option<RequestHeader>,
        text: Option<&str>,
        response: ResponseKind,
    ) -> RequestHandle {
        self.send_text(HttpMethod::Post, url, header, text, response)
    }

    pub fn put_text(
        &self,
        url: &str,
        header: Option<RequestHeader>,
        text: Option<&str>,
        response: ResponseKind,
    ) -> RequestHandle {
        self.send_text(HttpMethod::Put, url, header, text, response)
    }

    pub fn patch_text(
        &self,
        url: &str,
        header: Option<RequestHeader>,
        text: Option<&str>,
        response: ResponseKind,
    ) -> RequestHandle {
        self.send_text(HttpMethod::Patch, url, header, text, response)
    }

    pub fn delete_text(
        &self,
        url: &str,
        header: Option<RequestHeader>,
        text: Option<&str>,
        response: ResponseKind,
    ) -> RequestHandle {
        self.send_text(HttpMethod::Delete, url, header, text, response)
    }

    /// Send `text` (trimmed; empty when `None`) with any write method.
    pub fn send_text(
        &self,
        method: HttpMethod,
        url: &str,
        header: Option<RequestHeader>,
        text: Option<&str>,
        response: ResponseKind,
    ) -> RequestHandle {
        self.execute(TransferRequest {
            method,
            url: url.to_string(),
            header,
            body: RequestBody::Text(text.unwrap_or_default().to_string()),
            response,
        })
    }

    /// POST a `multipart/form-data` body. Fields whose value is the path of
    /// an existing file are sent as file parts.
    pub fn post_multipart_form(
        &self,
        url: &str,
        header: Option<RequestHeader>,
        response: ResponseKind,
        fields: Vec<Field>,
    ) -> RequestHandle {
        self.execute(TransferRequest {
            method: HttpMethod::Post,
            url: url.to_string(),
            header,
            body: RequestBody::Multipart(fields),
            response,
        })
    }

    /// Spawn a worker for an arbitrary request.
    pub fn execute(&self, request: TransferRequest) -> RequestHandle {
        let notifier = Notifier::new(Arc::clone(&self.handler), self.foreground.clone());
        let transfer = Transfer::new(
            Arc::clone(&self.config),
            notifier.clone(),
            Arc::clone(&self.saver),
        );
        let priority = self.config.priority;
        let name = format!("httpcall-{}", WORKER_ID.fetch_add(1, Ordering::Relaxed));
        debug!("Spawning {} for {} {}", name, request.method, request.url);

        let worker_notifier = notifier.clone();
        let spawned = thread::Builder::new().name(name).spawn(move || {
            apply_priority(priority);
            match panic::catch_unwind(AssertUnwindSafe(|| transfer.run(request))) {
                Ok(flag) => flag,
                Err(_) => {
                    error!("Request worker panicked");
                    let mut response = Response::new();
                    response.set_result("Request worker panicked");
                    worker_notifier.flag(Flag::ErrorMessage, &response);
                    Flag::ErrorMessage
                }
            }
        });

        match spawned {
            Ok(handle) => RequestHandle {
                state: HandleState::Running(handle),
            },
            Err(err) => {
                error!("Could not spawn request worker: {}", err);
                let mut response = Response::new();
                response.set_result(format!("Could not start request: {err}"));
                notifier.flag(Flag::ErrorMessage, &response);
                RequestHandle {
                    state: HandleState::Failed(Flag::ErrorMessage),
                }
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn apply_priority(priority: WorkerPriority) {
    let nice = priority.niceness();
    if nice == 0 {
        return;
    }
    // On Linux, PRIO_PROCESS with who == 0 targets the calling thread.
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, nice) };
    if rc != 0 {
        warn!(
            "Could not lower worker priority: {}",
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(target_os = "linux"))]
fn apply_priority(priority: WorkerPriority) {
    if priority != WorkerPriority::Foreground {
        debug!("Worker priority is not supported on this platform");
    }
}

enum HandleState {
    Running(JoinHandle<Flag>),
    Failed(Flag),
}

/// Join-only handle to a spawned request.
pub struct RequestHandle {
    state: HandleState,
}

impl RequestHandle {
    /// Wait for the worker and return the terminal flag it emitted.
    pub fn join(self) -> Flag {
        match self.state {
            HandleState::Running(handle) => handle.join().unwrap_or(Flag::ErrorMessage),
            HandleState::Failed(flag) => flag,
        }
    }

    pub fn is_finished(&self) -> bool {
        match &self.state {
            HandleState::Running(handle) => handle.is_finished(),
            HandleState::Failed(_) => true,
        }
    }
}
