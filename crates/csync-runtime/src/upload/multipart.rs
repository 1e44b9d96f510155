#![forbid(unsafe_code)]

//! Minimal `multipart/form-data` reading: the first file part only.
//!
//! [`read_part_headers`] consumes lines up to the blank line that follows
//! the first `Content-Disposition` carrying a `filename=`; [`PartReader`]
//! then yields body bytes until `CRLF--<boundary>`.

use std::io::{self, BufRead, Read};

use super::strip_path;

const CRLF: &[u8] = b"\r\n";
const DASHDASH: &[u8] = b"--";

/// Default mime type when the part declares none.
pub const DEFAULT_PART_MIME: &str = "application/octet-stream";

/// Filename and mime type of the file part, plus how many header bytes were
/// consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartHeaders {
    pub filename: String,
    pub mime_type: String,
    pub consumed: u64,
}

fn unexpected_end() -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "The multipart stream ended unexpectedly",
    )
}

/// The boundary parameter of a `Content-Type` header, if multipart.
#[must_use]
pub fn boundary(content_type: &str) -> Option<&str> {
    let (_, rest) = content_type.split_once("boundary=")?;
    let boundary = rest.split(';').next().unwrap_or(rest).trim();
    let boundary = boundary.trim_matches('"');
    (!boundary.is_empty()).then_some(boundary)
}

/// Read part headers up to the start of the first file body.
///
/// # Errors
///
/// `UnexpectedEof` if the stream ends inside the headers; other I/O errors
/// as returned by `reader`.
pub fn read_part_headers<R: BufRead>(reader: &mut R) -> io::Result<PartHeaders> {
    let mut filename = String::from("unknown");
    let mut mime_type = DEFAULT_PART_MIME.to_owned();
    let mut file_field = false;
    let mut consumed = 0u64;
    let mut raw = Vec::new();

    loop {
        raw.clear();
        let read = reader.read_until(b'\n', &mut raw)?;
        if read == 0 {
            return Err(unexpected_end());
        }
        consumed += read as u64;
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim_end_matches(['\r', '\n']);

        if line.starts_with("Content-Disposition:") && line.contains("filename=") {
            if let Some(name) = quoted_filename(line) {
                filename = strip_path(name).to_owned();
            }
            file_field = true;
        } else if file_field && line.is_empty() {
            break;
        } else if line.starts_with("Content-Type") {
            if let Some((_, value)) = line.split_once(": ") {
                mime_type = value.trim().to_owned();
            }
        }
    }

    Ok(PartHeaders {
        filename,
        mime_type,
        consumed,
    })
}

/// `filename="a.txt"` → `a.txt`; the first character after `=` is taken as
/// the quote, whatever it is.
fn quoted_filename(line: &str) -> Option<&str> {
    let (_, rest) = line.rsplit_once("filename=")?;
    let quote = rest.chars().next()?;
    let rest = &rest[quote.len_utf8()..];
    Some(rest.find(quote).map_or(rest, |end| &rest[..end]))
}

/// Part body reader, ending at `CRLF--<boundary>`.
///
/// Bytes that could still be the start of the delimiter are held back until
/// disambiguated. Reaching end of input before the delimiter is an
/// `UnexpectedEof` error.
#[derive(Debug)]
pub struct PartReader<R> {
    inner: R,
    delimiter: Vec<u8>,
    buffer: Vec<u8>,
    /// Bytes of `buffer` already known to be body.
    ready: usize,
    finished: bool,
}

impl<R: Read> PartReader<R> {
    #[must_use]
    pub fn new(inner: R, boundary: &str) -> Self {
        let mut delimiter = Vec::with_capacity(boundary.len() + 4);
        delimiter.extend_from_slice(CRLF);
        delimiter.extend_from_slice(DASHDASH);
        delimiter.extend_from_slice(boundary.as_bytes());
        Self {
            inner,
            delimiter,
            buffer: Vec::new(),
            ready: 0,
            finished: false,
        }
    }

    /// Length of the trailer after the body: delimiter, closing `--` and CRLF.
    #[must_use]
    pub fn trailer_len(&self) -> u64 {
        (self.delimiter.len() + DASHDASH.len() + CRLF.len()) as u64
    }

    fn fill(&mut self) -> io::Result<()> {
        let mut chunk = [0u8; 1024];
        loop {
            if let Some(at) = find(&self.buffer, &self.delimiter) {
                self.buffer.truncate(at);
                self.ready = at;
                self.finished = true;
                return Ok(());
            }
            let safe = self.buffer.len().saturating_sub(self.delimiter.len() - 1);
            if safe > 0 {
                self.ready = safe;
                return Ok(());
            }
            let n = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if n == 0 {
                return Err(unexpected_end());
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }
}

impl<R: Read> Read for PartReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        if self.ready == 0 {
            if self.finished {
                return Ok(0);
            }
            self.fill()?;
            if self.ready == 0 {
                return Ok(0);
            }
        }
        let n = out.len().min(self.ready);
        out[..n].copy_from_slice(&self.buffer[..n]);
        self.buffer.drain(..n);
        self.ready -= n;
        Ok(n)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
