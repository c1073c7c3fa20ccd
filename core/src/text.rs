//! Buffered, line-oriented text decoding with progress reporting.

use std::io::{self, BufRead, BufReader, Read};

use crate::progress::{Progress, ProgressMeter};

/// Read `reader` to the end as UTF-8 text, one line at a time.
///
/// Line terminators are kept, and count towards the bytes read. Invalid
/// UTF-8 sequences are replaced with U+FFFD. `on_progress` receives the
/// deduplicated updates of a [`ProgressMeter`] over `total_size`.
pub fn read_text<R, F>(reader: R, total_size: i64, mut on_progress: F) -> io::Result<String>
where
    R: Read,
    F: FnMut(Progress),
{
    let mut reader = BufReader::new(reader);
    let mut meter = ProgressMeter::new(total_size);
    let mut bytes = Vec::new();

    loop {
        let read = reader.read_until(b'\n', &mut bytes)?;
        if read == 0 {
            break;
        }
        if let Some(update) = meter.advance(bytes.len() as u64) {
            on_progress(update);
        }
    }
    if let Some(update) = meter.finish() {
        on_progress(update);
    }

    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    })
}
