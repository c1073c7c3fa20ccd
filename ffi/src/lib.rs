//! C-ABI wrapper around `httpcall-core`.
//!
//! # Overview
//! Exposes the request verbs through `extern "C"` functions so a host
//! application written in any language with a C FFI can issue requests and
//! receive staged notifications through plain C callbacks.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - Request functions return as soon as the worker is spawned. Outcomes
//!   arrive through `FfiCallbacks`.
//! - The foreground context is driven by the host: `on_foreground` and
//!   `on_progress` only run inside `httpcall_dispatch_pending`, on the thread
//!   that calls it (typically the host's UI thread).
//! - The host owns the `FfiHttpCall` and releases it with
//!   `httpcall_client_free`. No other pointer returned by this library needs
//!   freeing.

pub mod types;

use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use httpcall_core::{EngineConfig, Flag, HttpMethod, TransferRequest};

use types::*;

// ---------------------------------------------------------------------------
// Client lifecycle
// ---------------------------------------------------------------------------

/// Create a client. `base_url` may be null; when set, relative request URLs
/// are resolved against it.
///
/// Returns null if `base_url` is not valid UTF-8 or if an internal panic
/// occurs. The caller must free the returned pointer with
/// `httpcall_client_free`.
#[unsafe(no_mangle)]
pub extern "C" fn httpcall_client_new(
    base_url: *const c_char,
    callbacks: FfiCallbacks,
) -> *mut FfiHttpCall {
    catch_unwind(|| {
        let mut config = EngineConfig::default();
        if !base_url.is_null() {
            match unsafe { str_arg(base_url) } {
                Some(url) => config.base_url = Some(url.to_string()),
                None => return std::ptr::null_mut(),
            }
        }
        Box::into_raw(Box::new(FfiHttpCall::new(config, callbacks)))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free a client created by `httpcall_client_new`. Safe to call with null.
///
/// Requests still in flight run to completion; their foreground
/// notifications are dropped.
#[unsafe(no_mangle)]
pub extern "C" fn httpcall_client_free(client: *mut FfiHttpCall) {
    if !client.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(client) });
        }));
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Set connect and read timeouts in milliseconds. Both must be positive.
#[unsafe(no_mangle)]
pub extern "C" fn httpcall_set_timeouts(
    client: *mut FfiHttpCall,
    connect_timeout_ms: u64,
    read_timeout_ms: u64,
) -> FfiStatus {
    guarded(|| {
        let client = unsafe { client.as_mut() }.ok_or(FfiStatus::NullArg)?;
        let config = client
            .config
            .clone()
            .with_connect_timeout(Duration::from_millis(connect_timeout_ms))
            .with_read_timeout(Duration::from_millis(read_timeout_ms));
        config.validate().map_err(|_| FfiStatus::InvalidArg)?;
        client.reconfigure(config);
        Ok(())
    })
}

/// Set the one status code treated as success (default 200).
#[unsafe(no_mangle)]
pub extern "C" fn httpcall_set_success_code(client: *mut FfiHttpCall, code: u16) -> FfiStatus {
    guarded(|| {
        let client = unsafe { client.as_mut() }.ok_or(FfiStatus::NullArg)?;
        let config = client.config.clone().with_successful_response_code(code);
        config.validate().map_err(|_| FfiStatus::InvalidArg)?;
        client.reconfigure(config);
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// GET `url` and deliver the body as text.
///
/// `headers` may be null when `headers_len` is 0.
#[unsafe(no_mangle)]
pub extern "C" fn httpcall_get_text(
    client: *const FfiHttpCall,
    url: *const c_char,
    headers: *const FfiField,
    headers_len: u32,
) -> FfiStatus {
    guarded(|| {
        let client = unsafe { client.as_ref() }.ok_or(FfiStatus::NullArg)?;
        let url = required_str(url)?;
        let header = unsafe { header_arg(headers, headers_len) };
        client.inner.get_text(url, header);
        Ok(())
    })
}

/// GET `url` and store the body in a new file under `directory`.
#[unsafe(no_mangle)]
pub extern "C" fn httpcall_get_file(
    client: *const FfiHttpCall,
    url: *const c_char,
    headers: *const FfiField,
    headers_len: u32,
    directory: *const c_char,
) -> FfiStatus {
    guarded(|| {
        let client = unsafe { client.as_ref() }.ok_or(FfiStatus::NullArg)?;
        let url = required_str(url)?;
        let directory = required_str(directory)?;
        let header = unsafe { header_arg(headers, headers_len) };
        client.inner.get_file(url, header, directory);
        Ok(())
    })
}

/// Send `text` with `method` (`POST`, `PUT`, `PATCH` or `DELETE`).
///
/// `text` may be null (an empty body is sent). When `response_directory` is
/// null the response body is delivered as text, otherwise it is stored in a
/// new file under that directory.
#[unsafe(no_mangle)]
pub extern "C" fn httpcall_send_text(
    client: *const FfiHttpCall,
    method: *const c_char,
    url: *const c_char,
    headers: *const FfiField,
    headers_len: u32,
    text: *const c_char,
    response_directory: *const c_char,
) -> FfiStatus {
    guarded(|| {
        let client = unsafe { client.as_ref() }.ok_or(FfiStatus::NullArg)?;
        let method = HttpMethod::parse(required_str(method)?)
            .filter(HttpMethod::has_output)
            .ok_or(FfiStatus::InvalidArg)?;
        let url = required_str(url)?;
        let text = if text.is_null() {
            None
        } else {
            Some(unsafe { str_arg(text) }.ok_or(FfiStatus::InvalidArg)?)
        };
        let response = unsafe { response_kind_arg(response_directory) }.ok_or(FfiStatus::InvalidArg)?;
        let header = unsafe { header_arg(headers, headers_len) };
        client.inner.send_text(method, url, header, text, response);
        Ok(())
    })
}

/// POST a `multipart/form-data` body. A field whose value is the path of
/// an existing file is sent as a file part.
#[unsafe(no_mangle)]
pub extern "C" fn httpcall_post_multipart(
    client: *const FfiHttpCall,
    url: *const c_char,
    headers: *const FfiField,
    headers_len: u32,
    fields: *const FfiField,
    fields_len: u32,
    response_directory: *const c_char,
) -> FfiStatus {
    guarded(|| {
        let client = unsafe { client.as_ref() }.ok_or(FfiStatus::NullArg)?;
        let url = required_str(url)?;
        let response = unsafe { response_kind_arg(response_directory) }.ok_or(FfiStatus::InvalidArg)?;
        let header = unsafe { header_arg(headers, headers_len) };
        let fields = unsafe { fields_arg(fields, fields_len) };
        client.inner.execute(TransferRequest {
            method: HttpMethod::Post,
            url: url.to_string(),
            header,
            body: httpcall_core::RequestBody::Multipart(fields),
            response,
        });
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Foreground dispatch
// ---------------------------------------------------------------------------

/// Run the foreground notifications queued so far on the calling thread.
/// Returns how many ran; 0 for a null client.
#[unsafe(no_mangle)]
pub extern "C" fn httpcall_dispatch_pending(client: *const FfiHttpCall) -> u32 {
    catch_unwind(AssertUnwindSafe(|| match unsafe { client.as_ref() } {
        Some(client) => client.main_loop.run_pending() as u32,
        None => 0,
    }))
    .unwrap_or(0)
}

/// Static name of a flag code (`"RESPONSE_IS_READY"`, ...), or null for an
/// unknown code. The string must not be freed.
#[unsafe(no_mangle)]
pub extern "C" fn httpcall_flag_name(flag: i32) -> *const c_char {
    match Flag::from_code(flag) {
        Some(Flag::WrongUrl) => c"WRONG_URL".as_ptr(),
        Some(Flag::ErrorMessage) => c"ERROR_MESSAGE".as_ptr(),
        Some(Flag::RequestUnaccepted) => c"REQUEST_UNACCEPTED".as_ptr(),
        Some(Flag::RequestAccepted) => c"REQUEST_ACCEPTED".as_ptr(),
        Some(Flag::ResponseIsReady) => c"RESPONSE_IS_READY".as_ptr(),
        Some(Flag::DataSent) => c"DATA_SENT".as_ptr(),
        None => std::ptr::null(),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn guarded(f: impl FnOnce() -> Result<(), FfiStatus>) -> FfiStatus {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => FfiStatus::Ok,
        Ok(Err(status)) => status,
        Err(_) => {
            log::error!("panic caught at the FFI boundary");
            FfiStatus::Panic
        }
    }
}

fn required_str<'a>(ptr: *const c_char) -> Result<&'a str, FfiStatus> {
    if ptr.is_null() {
        return Err(FfiStatus::NullArg);
    }
    unsafe { str_arg(ptr) }.ok_or(FfiStatus::InvalidArg)
}
