//! File persistence for downloaded bodies, and media-type/extension mapping.
//!
//! # Design
//! `FileSaver` is the seam between the transfer engine and disk. The engine
//! only hands it a directory, a name and a reader; progress is reported back
//! as a cumulative byte count. `DiskFileSaver` writes into a `.part` sibling
//! and renames it into place, so a failed transfer never leaves a file that
//! looks complete.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use uuid::Uuid;

use crate::header::media_types;

/// Copy buffer size for streaming bodies to disk.
pub const CHUNK_SIZE: usize = 4096;

/// Stores a response body and reports how many bytes have been written.
pub trait FileSaver: Send + Sync {
    /// Stream `reader` into `dir/file_name`, calling `on_progress` with the
    /// cumulative byte count after every chunk. Returns the stored path.
    fn save(
        &self,
        dir: &Path,
        file_name: &str,
        reader: &mut dyn Read,
        on_progress: &mut dyn FnMut(u64),
    ) -> io::Result<PathBuf>;
}

/// Writes bodies to the local filesystem, creating `dir` when missing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskFileSaver;

impl FileSaver for DiskFileSaver {
    fn save(
        &self,
        dir: &Path,
        file_name: &str,
        reader: &mut dyn Read,
        on_progress: &mut dyn FnMut(u64),
    ) -> io::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let destination = dir.join(file_name);
        let partial = dir.join(format!("{file_name}.part"));

        match copy_chunks(reader, &partial, on_progress) {
            Ok(written) => {
                fs::rename(&partial, &destination)?;
                debug!("Stored {} bytes at {}", written, destination.display());
                Ok(destination)
            }
            Err(err) => {
                if let Err(cleanup) = fs::remove_file(&partial) {
                    warn!("Could not remove {}: {}", partial.display(), cleanup);
                }
                Err(err)
            }
        }
    }
}

fn copy_chunks(
    reader: &mut dyn Read,
    path: &Path,
    on_progress: &mut dyn FnMut(u64),
) -> io::Result<u64> {
    let mut writer = BufWriter::new(File::create(path)?);
    let mut buf = [0u8; CHUNK_SIZE];
    let mut written = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        writer.write_all(&buf[..n])?;
        written += n as u64;
        on_progress(written);
    }
    writer.flush()?;
    Ok(written)
}

/// `<prefix>_<uuid><ext>`, where the extension is inferred from `content_type`.
pub fn random_file_name(prefix: &str, content_type: Option<&str>) -> String {
    let ext = content_type.and_then(extension_for).unwrap_or("");
    format!("{}_{}{}", prefix, Uuid::new_v4().simple(), ext)
}

/// File extension (with the leading dot) for a media type. Parameters such
/// as `; charset=UTF-8` are ignored.
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    let essence = essence(content_type);
    MEDIA_EXTENSIONS
        .iter()
        .find(|(media, _)| media.eq_ignore_ascii_case(&essence))
        .map(|(_, ext)| *ext)
}

/// Media type for a file name, falling back to `application/octet-stream`.
pub fn guess_content_type(file_name: &str) -> &'static str {
    let ext = match Path::new(file_name).extension().and_then(|e| e.to_str()) {
        Some(ext) => format!(".{}", ext.to_ascii_lowercase()),
        None => return media_types::APPLICATION_OCTET_STREAM,
    };
    MEDIA_EXTENSIONS
        .iter()
        .find(|(_, known)| *known == ext)
        .map(|(media, _)| *media)
        .unwrap_or(media_types::APPLICATION_OCTET_STREAM)
}

fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

// First match wins in both directions, so the preferred extension of a
// media type (and the preferred media type of an extension) comes first.
const MEDIA_EXTENSIONS: &[(&str, &str)] = &[
    (media_types::APPLICATION_JSON, ".json"),
    (media_types::APPLICATION_PDF, ".pdf"),
    (media_types::APPLICATION_XML, ".xml"),
    (media_types::APPLICATION_XHTML_XML, ".xhtml"),
    (media_types::APPLICATION_ATOM_XML, ".atom"),
    (media_types::APPLICATION_ANDROID, ".apk"),
    (media_types::ZIP, ".zip"),
    (media_types::RAR, ".rar"),
    (media_types::JAR, ".jar"),
    (media_types::TAR, ".tar"),
    (media_types::XLS, ".xls"),
    (media_types::XLSX, ".xlsx"),
    (media_types::APPLICATION_OCTET_STREAM, ".bin"),
    (media_types::TEXT_PLAIN, ".txt"),
    (media_types::TEXT_HTML, ".html"),
    (media_types::TEXT_HTML, ".htm"),
    (media_types::TEXT_XML, ".xml"),
    (media_types::TEXT_CSS, ".css"),
    (media_types::TEXT_CSV, ".csv"),
    (media_types::TEXT_CALENDAR, ".ics"),
    (media_types::IMAGE_PNG, ".png"),
    (media_types::IMAGE_JPEG, ".jpg"),
    (media_types::IMAGE_JPEG, ".jpeg"),
    (media_types::IMAGE_GIF, ".gif"),
    (media_types::IMAGE_BMP, ".bmp"),
    (media_types::IMAGE_WEBP, ".webp"),
    (media_types::IMAGE_SVG, ".svg"),
    (media_types::IMAGE_TIFF, ".tiff"),
    (media_types::IMAGE_ICON, ".ico"),
    (media_types::IMAGE_AVIF, ".avif"),
    (media_types::IMAGE_APNG, ".apng"),
    (media_types::AUDIO_MP3, ".mp3"),
    (media_types::AUDIO_AAC, ".aac"),
    (media_types::AUDIO_FLAC, ".flac"),
    (media_types::AUDIO_OGG, ".oga"),
    (media_types::AUDIO_WAV, ".wav"),
    (media_types::AUDIO_WEBM, ".weba"),
    (media_types::AUDIO_MP4, ".m4a"),
    (media_types::AUDIO_3GPP, ".3gpp"),
    (media_types::VIDEO_MP4, ".mp4"),
    (media_types::VIDEO_MPEG, ".mpeg"),
    (media_types::VIDEO_WEBM, ".webm"),
    (media_types::VIDEO_OGV, ".ogv"),
    (media_types::VIDEO_AVI, ".avi"),
    (media_types::VIDEO_MOV, ".mov"),
    (media_types::VIDEO_FLV, ".flv"),
    (media_types::VIDEO_WMV, ".wmv"),
    (media_types::VIDEO_3GP, ".3gp"),
];
