//! Stub HTTP server for exercising the request engine end to end.
//!
//! Every route returns a fixed, known payload so tests can assert on
//! exact bodies, lengths and status codes.

use std::collections::BTreeMap;
use std::convert::Infallible;

use axum::{
    body::Body,
    extract::{Multipart, Path},
    http::{header, HeaderMap, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures_util::stream;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

/// Size of the `/file` payload.
pub const FILE_SIZE: usize = 1024;
/// Number of lines served by `/lines`.
pub const LINE_COUNT: usize = 100;
/// Body sent with every `/status/{code}` response.
pub const FAILURE_BODY: &str = "failure body";

/// One part received by `/upload`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedPart {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub size: usize,
    /// Part body, for parts without a file name.
    pub text: Option<String>,
}

pub fn app() -> Router {
    Router::new()
        .route("/ok", get(ok))
        .route("/file", get(file))
        .route("/lines", get(lines))
        .route("/chunked", get(chunked))
        .route("/status/{code}", get(status))
        .route("/headers", get(headers))
        .route("/echo", post(echo).put(echo).patch(echo).delete(echo))
        .route("/created", post(created))
        .route("/upload", post(upload))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        log::debug!("mock server serving on {addr}");
    }
    axum::serve(listener, app()).await
}

/// The bytes served by `/file`.
pub fn file_bytes() -> Vec<u8> {
    (0..FILE_SIZE).map(|i| (i % 251) as u8).collect()
}

/// The text served by `/lines`.
pub fn lines_text() -> String {
    (0..LINE_COUNT).map(|i| format!("line {i:03}\n")).collect()
}

async fn ok() -> &'static str {
    "hello"
}

async fn file() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/png")], file_bytes())
}

async fn lines() -> String {
    lines_text()
}

/// Same text as `/lines`, streamed without a `Content-Length`.
async fn chunked() -> impl IntoResponse {
    let chunks: Vec<Result<String, Infallible>> = lines_text()
        .split_inclusive('\n')
        .map(|line| Ok(line.to_string()))
        .collect();
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(stream::iter(chunks)),
    )
}

async fn status(Path(code): Path<u16>) -> Result<(StatusCode, &'static str), StatusCode> {
    let status = StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok((status, FAILURE_BODY))
}

/// Request headers as a lower-case name to value map.
async fn headers(headers: HeaderMap) -> Json<BTreeMap<String, String>> {
    Json(
        headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect(),
    )
}

async fn echo(method: Method, body: String) -> String {
    format!("{method}:{body}")
}

async fn created(body: String) -> (StatusCode, String) {
    (StatusCode::CREATED, format!("created:{body}"))
}

async fn upload(mut multipart: Multipart) -> Result<Json<Vec<UploadedPart>>, StatusCode> {
    let mut parts = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
        let text = match file_name {
            None => Some(String::from_utf8_lossy(&data).into_owned()),
            Some(_) => None,
        };
        parts.push(UploadedPart {
            name,
            file_name,
            content_type,
            size: data.len(),
            text,
        });
    }
    log::debug!("received {} multipart parts", parts.len());
    Ok(Json(parts))
}
