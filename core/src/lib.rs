//! Asynchronous HTTP request engine with staged notifications.
//!
//! # Overview
//! Each verb on [`HttpCall`] (`get_text`, `get_file`, `get_input_stream`,
//! `post_text`/`put_text`/`patch_text`/`delete_text`,
//! `post_multipart_form`) spawns one worker thread and returns at once.
//! The worker reports its progress as a sequence of [`Flag`]s, each with a
//! [`Response`] snapshot, to a [`ResponseHandler`]: synchronously on the
//! worker, then again on the host's single [`Foreground`] context.
//!
//! # Design
//! - Errors are never returned to the caller. URL problems end a request
//!   with `WRONG_URL`, transport and I/O failures with `ERROR_MESSAGE`,
//!   non-success status codes with `REQUEST_UNACCEPTED`.
//! - A successful request emits `REQUEST_ACCEPTED`, then `DATA_SENT` for
//!   write methods, then exactly one `RESPONSE_IS_READY`.
//! - Requests share no mutable state: each owns its connection, agent and
//!   multipart boundary.
//! - Storage of downloads goes through the [`FileSaver`] trait so hosts can
//!   redirect it.

pub mod client;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod field;
pub mod flag;
pub mod header;
pub mod http;
pub mod multipart;
pub mod progress;
pub mod response;
pub mod storage;
pub mod text;
pub mod transfer;

pub use client::{HttpCall, RequestHandle};
pub use config::{EngineConfig, WorkerPriority};
pub use dispatch::{Event, EventStream, Foreground, MainLoop, NoopHandler, ResponseHandler};
pub use error::{HttpCallError, HttpCallResult};
pub use field::Field;
pub use flag::Flag;
pub use header::RequestHeader;
pub use http::{DataType, HttpMethod, ResponseKind};
pub use progress::Progress;
pub use response::{Response, ResponseResult, ResponseStream};
pub use storage::{DiskFileSaver, FileSaver};
pub use transfer::{RequestBody, TransferRequest};
