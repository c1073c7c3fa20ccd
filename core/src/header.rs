//! Ordered request-header registry.
//!
//! # Design
//! Headers are kept as an insertion-ordered `Vec<Field>` because that is the
//! order they are written to the wire. The `HashMap` view is derived on
//! demand and is last-write-wins for repeated names; nothing in the engine
//! relies on its iteration order. Names and values are not validated here;
//! the transport rejects malformed ones when the request is sent.

use std::collections::HashMap;

use crate::field::Field;

/// Insertion-ordered collection of request header fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeader {
    fields: Vec<Field>,
}

impl RequestHeader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one field.
    pub fn add(&mut self, field: impl Into<Field>) -> &mut Self {
        self.fields.push(field.into());
        self
    }

    /// Append several fields, keeping their order.
    pub fn add_all<I, F>(&mut self, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Field>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Builder-style variant of [`add`](Self::add).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(Field::new(name, value));
        self
    }

    /// Fields in wire order.
    pub fn as_sequence(&self) -> &[Field] {
        &self.fields
    }

    /// Name to value mapping; the last field wins on duplicate names.
    pub fn as_map(&self) -> HashMap<String, String> {
        self.fields
            .iter()
            .map(|f| (f.name().to_string(), f.value().to_string()))
            .collect()
    }

    /// Whether a field with this name is present (case-insensitive).
    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name().eq_ignore_ascii_case(name))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Field> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<F: Into<Field>> FromIterator<F> for RequestHeader {
    fn from_iter<I: IntoIterator<Item = F>>(iter: I) -> Self {
        let mut header = RequestHeader::new();
        header.add_all(iter);
        header
    }
}

impl<'a> IntoIterator for &'a RequestHeader {
    type Item = &'a Field;
    type IntoIter = std::slice::Iter<'a, Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

/// Well-known request header names.
pub mod names {
    pub const ACCEPT: &str = "Accept";
    pub const ACCEPT_CHARSET: &str = "Accept-Charset";
    pub const ACCEPT_ENCODING: &str = "Accept-Encoding";
    pub const ACCEPT_LANGUAGE: &str = "Accept-Language";
    pub const AUTHORIZATION: &str = "Authorization";
    pub const BOUNDARY: &str = "boundary";
    pub const CACHE_CONTROL: &str = "Cache-Control";
    pub const CONTENT_DISPOSITION: &str = "Content-Disposition";
    pub const CONTENT_ENCODING: &str = "Content-Encoding";
    pub const CONTENT_LANGUAGE: &str = "Content-Language";
    pub const CONTENT_LENGTH: &str = "Content-Length";
    pub const CONTENT_LOCATION: &str = "Content-Location";
    pub const CONTENT_TRANSFER_ENCODING: &str = "Content-Transfer-Encoding";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const COOKIE: &str = "Cookie";
    pub const DATE: &str = "Date";
    pub const ETAG: &str = "ETag";
    pub const EXPIRES: &str = "Expires";
    pub const HOST: &str = "Host";
    pub const IF_MATCH: &str = "If-Match";
    pub const IF_MODIFIED_SINCE: &str = "If-Modified-Since";
    pub const IF_NONE_MATCH: &str = "If-None-Match";
    pub const IF_UNMODIFIED_SINCE: &str = "If-Unmodified-Since";
    pub const LAST_MODIFIED: &str = "Last-Modified";
    pub const LOCATION: &str = "Location";
    pub const SET_COOKIE: &str = "Set-Cookie";
    pub const USER_AGENT: &str = "User-Agent";
    pub const VARY: &str = "Vary";
    pub const WWW_AUTHENTICATE: &str = "WWW-Authenticate";
}

/// Common media types for `Content-Type` and `Accept` values.
pub mod media_types {
    pub const APPLICATION_ATOM_XML: &str = "application/atom+xml";
    pub const APPLICATION_FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
    pub const APPLICATION_JSON: &str = "application/json";
    pub const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";
    pub const APPLICATION_PDF: &str = "application/pdf";
    pub const APPLICATION_XHTML_XML: &str = "application/xhtml+xml";
    pub const APPLICATION_XML: &str = "application/xml";
    pub const APPLICATION_ANDROID: &str = "application/vnd.android.package-archive";
    pub const MULTIPART_FORM_DATA: &str = "multipart/form-data";
    pub const WILDCARD: &str = "*/*";
    pub const ZIP: &str = "application/zip";
    pub const RAR: &str = "application/x-rar-compressed";
    pub const JAR: &str = "application/java-archive";
    pub const TAR: &str = "application/x-tar";
    pub const XLS: &str = "application/vnd.ms-excel";
    pub const XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

    pub const TEXT_HTML: &str = "text/html";
    pub const TEXT_PLAIN: &str = "text/plain";
    pub const TEXT_XML: &str = "text/xml";
    pub const TEXT_CSS: &str = "text/css";
    pub const TEXT_CSV: &str = "text/csv";
    pub const TEXT_CALENDAR: &str = "text/calendar";

    pub const IMAGE_APNG: &str = "image/apng";
    pub const IMAGE_AVIF: &str = "image/avif";
    pub const IMAGE_BMP: &str = "image/bmp";
    pub const IMAGE_GIF: &str = "image/gif";
    pub const IMAGE_ICON: &str = "image/x-icon";
    pub const IMAGE_JPEG: &str = "image/jpeg";
    pub const IMAGE_PNG: &str = "image/png";
    pub const IMAGE_SVG: &str = "image/svg+xml";
    pub const IMAGE_TIFF: &str = "image/tiff";
    pub const IMAGE_WEBP: &str = "image/webp";

    pub const AUDIO_AAC: &str = "audio/aac";
    pub const AUDIO_FLAC: &str = "audio/flac";
    pub const AUDIO_MP3: &str = "audio/mpeg";
    pub const AUDIO_MP4: &str = "audio/mp4";
    pub const AUDIO_OGG: &str = "audio/ogg";
    pub const AUDIO_WAV: &str = "audio/wav";
    pub const AUDIO_WEBM: &str = "audio/webm";
    pub const AUDIO_3GPP: &str = "audio/3gpp";

    pub const VIDEO_3GP: &str = "video/3gpp";
    pub const VIDEO_AVI: &str = "video/x-msvideo";
    pub const VIDEO_FLV: &str = "video/x-flv";
    pub const VIDEO_MOV: &str = "video/quicktime";
    pub const VIDEO_MP4: &str = "video/mp4";
    pub const VIDEO_MPEG: &str = "video/mpeg";
    pub const VIDEO_OGV: &str = "video/ogg";
    pub const VIDEO_WEBM: &str = "video/webm";
    pub const VIDEO_WMV: &str = "video/x-ms-wmv";
}
