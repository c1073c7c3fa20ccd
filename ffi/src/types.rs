//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Notifications cross the boundary as C callbacks receiving a borrowed
//! `FfiResponse`. Every pointer inside it refers to a `CString` owned by the
//! Rust side and is only valid until the callback returns; hosts copy what
//! they need. Conversion helpers live here to keep `lib.rs` focused on the
//! `extern "C"` surface.

use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::path::PathBuf;
use std::ptr;
use std::sync::Arc;

use httpcall_core::{
    EngineConfig, Field, Flag, Foreground, HttpCall, MainLoop, Progress, RequestHeader, Response,
    ResponseHandler, ResponseKind, ResponseResult,
};

/// Opaque handle to an `HttpCall` and its foreground queue. C callers
/// receive a pointer to this and pass it back into every FFI function.
pub struct FfiHttpCall {
    pub(crate) inner: HttpCall,
    pub(crate) config: EngineConfig,
    pub(crate) handler: Arc<dyn ResponseHandler>,
    pub(crate) foreground: Foreground,
    pub(crate) main_loop: MainLoop,
}

impl FfiHttpCall {
    pub(crate) fn new(config: EngineConfig, callbacks: FfiCallbacks) -> Self {
        let (foreground, main_loop) = Foreground::channel();
        let handler: Arc<dyn ResponseHandler> = Arc::new(CallbackHandler { callbacks });
        let inner = HttpCall::new(config.clone(), foreground.clone(), Arc::clone(&handler));
        Self {
            inner,
            config,
            handler,
            foreground,
            main_loop,
        }
    }

    /// Rebuild the client after a configuration change; requests already in
    /// flight keep the configuration they started with.
    pub(crate) fn reconfigure(&mut self, config: EngineConfig) {
        self.inner = HttpCall::new(
            config.clone(),
            self.foreground.clone(),
            Arc::clone(&self.handler),
        );
        self.config = config;
    }
}

// ---------------------------------------------------------------------------
// Callbacks
// ---------------------------------------------------------------------------

/// Called with a flag code (see `httpcall_flag_name`) and a borrowed response.
pub type FfiFlagCallback =
    Option<extern "C" fn(user_data: *mut c_void, flag: i32, response: *const FfiResponse)>;

/// Called on the foreground context with a percentage in 1..=100.
pub type FfiProgressCallback =
    Option<extern "C" fn(user_data: *mut c_void, percentage: u8, total_size: i64, bytes_read: u64)>;

/// Host callbacks. Any of them may be null.
///
/// `on_background` runs on the request's worker thread; `on_foreground`
/// and `on_progress` run inside `httpcall_dispatch_pending`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FfiCallbacks {
    pub user_data: *mut c_void,
    pub on_background: FfiFlagCallback,
    pub on_foreground: FfiFlagCallback,
    pub on_progress: FfiProgressCallback,
}

// The host guarantees `user_data` may be used from the worker threads.
unsafe impl Send for FfiCallbacks {}
unsafe impl Sync for FfiCallbacks {}

pub(crate) struct CallbackHandler {
    callbacks: FfiCallbacks,
}

impl ResponseHandler for CallbackHandler {
    fn on_background(&self, flag: Flag, response: &Response) {
        if let Some(callback) = self.callbacks.on_background {
            with_ffi_response(response, |ffi| callback(self.callbacks.user_data, flag.code(), ffi));
        }
    }

    fn on_foreground(&self, flag: Flag, response: &Response) {
        if let Some(callback) = self.callbacks.on_foreground {
            with_ffi_response(response, |ffi| callback(self.callbacks.user_data, flag.code(), ffi));
        }
    }

    fn on_progress(&self, progress: Progress) {
        if let Some(callback) = self.callbacks.on_progress {
            callback(
                self.callbacks.user_data,
                progress.percentage,
                progress.total_size,
                progress.bytes_read,
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Response view
// ---------------------------------------------------------------------------

/// What `FfiResponse::result` holds.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiResultTag {
    None = 0,
    Text = 1,
    FilePath = 2,
    /// Raw body streams are not exposed over the C ABI; `result` is null.
    Stream = 3,
}

/// Borrowed view of a response, valid for the duration of one callback.
#[repr(C)]
pub struct FfiResponse {
    pub response_code: u16,
    /// -1 when the server sent no length, 0 before the exchange.
    pub content_length: i64,
    pub result_tag: FfiResultTag,
    pub result: *const c_char,
    pub url: *const c_char,
    pub method: *const c_char,
    pub content_type: *const c_char,
}

/// Build an `FfiResponse` whose strings live for the duration of `f`.
pub(crate) fn with_ffi_response<R>(response: &Response, f: impl FnOnce(*const FfiResponse) -> R) -> R {
    let (result_tag, result) = match response.result() {
        ResponseResult::None => (FfiResultTag::None, None),
        ResponseResult::Text(text) => (FfiResultTag::Text, Some(c_string(text))),
        ResponseResult::FilePath(path) => (
            FfiResultTag::FilePath,
            Some(c_string(&path.to_string_lossy())),
        ),
        ResponseResult::Stream(_) => (FfiResultTag::Stream, None),
    };
    let url = response.url().map(c_string);
    let method = response.request_method().map(|m| c_string(m.as_str()));
    let content_type = response.content_type().map(c_string);

    let ffi = FfiResponse {
        response_code: response.response_code(),
        content_length: response.content_length(),
        result_tag,
        result: opt_ptr(&result),
        url: opt_ptr(&url),
        method: opt_ptr(&method),
        content_type: opt_ptr(&content_type),
    };
    f(&ffi as *const FfiResponse)
}

/// `CString` from text that may contain interior NULs, which are dropped.
pub(crate) fn c_string(text: &str) -> CString {
    CString::new(text).unwrap_or_else(|err| {
        let mut bytes = err.into_vec();
        bytes.retain(|b| *b != 0);
        CString::new(bytes).unwrap_or_default()
    })
}

fn opt_ptr(value: &Option<CString>) -> *const c_char {
    value.as_ref().map_or(ptr::null(), |s| s.as_ptr())
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// A name/value pair of C strings, used for headers and form fields.
#[repr(C)]
pub struct FfiField {
    pub name: *const c_char,
    pub value: *const c_char,
}

/// Status returned by every request-issuing function.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiStatus {
    Ok = 0,
    NullArg = 1,
    InvalidArg = 2,
    Panic = 3,
}

/// Borrow a C string argument. Null and non-UTF-8 strings yield `None`.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that outlives `'a`.
pub(crate) unsafe fn str_arg<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

/// Copy an array of `FfiField`s. Entries with a null or non-UTF-8 name are
/// skipped; a null value becomes the empty string.
///
/// # Safety
/// `ptr` must be null or point to `len` valid `FfiField`s.
pub(crate) unsafe fn fields_arg(ptr: *const FfiField, len: u32) -> Vec<Field> {
    if ptr.is_null() || len == 0 {
        return Vec::new();
    }
    let raw = unsafe { std::slice::from_raw_parts(ptr, len as usize) };
    raw.iter()
        .filter_map(|f| {
            let name = unsafe { str_arg(f.name) }?;
            let value = unsafe { str_arg(f.value) }.unwrap_or("");
            Some(Field::new(name, value))
        })
        .collect()
}

/// # Safety
/// Same as [`fields_arg`].
pub(crate) unsafe fn header_arg(ptr: *const FfiField, len: u32) -> Option<RequestHeader> {
    let fields = unsafe { fields_arg(ptr, len) };
    if fields.is_empty() {
        None
    } else {
        Some(fields.into_iter().collect())
    }
}

/// Null directory: deliver text. Otherwise store the body under it.
///
/// # Safety
/// Same as [`str_arg`].
pub(crate) unsafe fn response_kind_arg(directory: *const c_char) -> Option<ResponseKind> {
    if directory.is_null() {
        return Some(ResponseKind::Text);
    }
    unsafe { str_arg(directory) }.map(|dir| ResponseKind::file(PathBuf::from(dir)))
}
