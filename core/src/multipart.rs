//! `multipart/form-data` body encoder.
//!
//! # Design
//! The encoder writes parts straight into the connection's output buffer
//! and flushes after each one. It owns no boundary of its own: the boundary
//! comes from the `Connection` that announced it in the `Content-Type`
//! header, so the two can never disagree.
//!
//! A form field is sent as a file part when its value names an existing
//! regular file, and as a text part otherwise.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use log::debug;

use crate::field::Field;
use crate::header::names;
use crate::storage::{guess_content_type, CHUNK_SIZE};

const CRLF: &str = "\r\n";

/// How a form field will be encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormPart<'a> {
    Text { name: &'a str, value: &'a str },
    File { name: &'a str, path: &'a Path },
}

impl<'a> FormPart<'a> {
    /// File part if the value is the path of an existing file, text otherwise.
    pub fn classify(field: &'a Field) -> Self {
        let path = Path::new(field.value());
        if !field.value().is_empty() && path.is_file() {
            FormPart::File {
                name: field.name(),
                path,
            }
        } else {
            FormPart::Text {
                name: field.name(),
                value: field.value(),
            }
        }
    }
}

/// Streams form parts into `W` using a fixed boundary.
pub struct MultipartEncoder<W: Write> {
    writer: W,
    boundary: String,
    charset: String,
    parts: usize,
}

impl<W: Write> MultipartEncoder<W> {
    pub fn new(writer: W, boundary: impl Into<String>, charset: impl Into<String>) -> Self {
        Self {
            writer,
            boundary: boundary.into(),
            charset: charset.into(),
            parts: 0,
        }
    }

    /// Encode one field according to [`FormPart::classify`].
    pub fn add_field(&mut self, field: &Field) -> io::Result<()> {
        match FormPart::classify(field) {
            FormPart::Text { name, value } => self.add_form_field(name, value),
            FormPart::File { name, path } => self.add_file_part(name, path),
        }
    }

    pub fn add_form_field(&mut self, name: &str, value: &str) -> io::Result<()> {
        self.delimiter()?;
        write!(
            self.writer,
            "{}: form-data; name=\"{}\"{CRLF}",
            names::CONTENT_DISPOSITION,
            escape_quoted(name)
        )?;
        write!(
            self.writer,
            "{}: text/plain; charset={}{CRLF}",
            names::CONTENT_TYPE,
            self.charset
        )?;
        self.writer.write_all(CRLF.as_bytes())?;
        self.writer.write_all(value.as_bytes())?;
        self.writer.write_all(CRLF.as_bytes())?;
        self.end_part()
    }

    /// Stream the file's bytes in fixed-size chunks.
    pub fn add_file_part(&mut self, field_name: &str, path: &Path) -> io::Result<()> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut file = File::open(path)?;

        self.delimiter()?;
        write!(
            self.writer,
            "{}: form-data; name=\"{}\"; filename=\"{}\"{CRLF}",
            names::CONTENT_DISPOSITION,
            escape_quoted(field_name),
            escape_quoted(&file_name)
        )?;
        write!(
            self.writer,
            "{}: {}{CRLF}",
            names::CONTENT_TYPE,
            guess_content_type(&file_name)
        )?;
        write!(self.writer, "{}: binary{CRLF}", names::CONTENT_TRANSFER_ENCODING)?;
        self.writer.write_all(CRLF.as_bytes())?;

        let mut buf = [0u8; CHUNK_SIZE];
        let mut sent = 0u64;
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            self.writer.write_all(&buf[..n])?;
            sent += n as u64;
        }
        self.writer.write_all(CRLF.as_bytes())?;
        debug!("Encoded file part `{}` ({} bytes)", field_name, sent);
        self.end_part()
    }

    /// Write the closing delimiter and hand back the writer.
    pub fn finish(mut self) -> io::Result<W> {
        write!(self.writer, "--{}--{CRLF}", self.boundary)?;
        self.writer.flush()?;
        debug!("Closed multipart body with {} parts", self.parts);
        Ok(self.writer)
    }

    fn delimiter(&mut self) -> io::Result<()> {
        write!(self.writer, "--{}{CRLF}", self.boundary)
    }

    fn end_part(&mut self) -> io::Result<()> {
        self.parts += 1;
        self.writer.flush()
    }
}

fn escape_quoted(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}
