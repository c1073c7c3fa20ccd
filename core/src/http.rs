//! HTTP method and data-type selectors.
//!
//! # Design
//! `HttpMethod` decides whether a connection gets an output stream (every
//! method except GET does). `DataType` keeps the integer codes of the
//! original library so hosts talking through the C ABI can keep using them.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// The method token as sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Parse a method token, case-insensitively.
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" => Some(HttpMethod::Delete),
            _ => None,
        }
    }

    /// Whether connections for this method are opened with an output stream.
    pub fn has_output(&self) -> bool {
        !matches!(self, HttpMethod::Get)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a request sends, or how its response body is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Text,
    File,
    MultipartForm,
    InputStream,
}

impl DataType {
    pub const TEXT: i32 = 0;
    pub const FILE: i32 = 3;
    pub const MULTIPART_FORM: i32 = 7;
    pub const INPUT_STREAM: i32 = 10;

    pub fn code(&self) -> i32 {
        match self {
            DataType::Text => Self::TEXT,
            DataType::File => Self::FILE,
            DataType::MultipartForm => Self::MULTIPART_FORM,
            DataType::InputStream => Self::INPUT_STREAM,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            Self::TEXT => Some(DataType::Text),
            Self::FILE => Some(DataType::File),
            Self::MULTIPART_FORM => Some(DataType::MultipartForm),
            Self::INPUT_STREAM => Some(DataType::InputStream),
            _ => None,
        }
    }
}

/// How the body of a successful response is handed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseKind {
    /// Decode the body as UTF-8 text.
    Text,
    /// Stream the body into a new file under `directory`.
    File { directory: PathBuf },
    /// Hand the open body stream to the caller.
    Stream,
}

impl ResponseKind {
    pub fn file(directory: impl Into<PathBuf>) -> Self {
        ResponseKind::File {
            directory: directory.into(),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            ResponseKind::Text => DataType::Text,
            ResponseKind::File { .. } => DataType::File,
            ResponseKind::Stream => DataType::InputStream,
        }
    }
}
