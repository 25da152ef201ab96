use super::scanner::{BoundaryScanner, SegmentEnd};
use super::{FormData, FormError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// File name prefix of temporary upload files.
pub const TEMP_PREFIX: &str = "fastweb.";
const TEMP_SUFFIX_LEN: usize = 10;

const HEADER_END: &[u8] = b"\r\n\r\n";

static BOUNDARY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"boundary="?([^";,]+)"?"#).expect("boundary regex should be valid")
});

/// A file part streamed to disk.
///
/// `file` is opened read-only at offset zero. The file is not removed when
/// the `Upload` is dropped; call [`Upload::remove`] or delete `path`.
#[derive(Debug)]
pub struct Upload {
    pub file: File,
    /// Client-supplied file name, unvalidated.
    pub filename: String,
    pub path: PathBuf,
}

impl Upload {
    /// Read the whole upload into memory.
    pub fn read_to_vec(&mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        self.file.read_to_end(&mut out)?;
        Ok(out)
    }

    /// Close and delete the temporary file.
    pub fn remove(self) -> io::Result<()> {
        drop(self.file);
        std::fs::remove_file(&self.path)
    }
}

/// One parsed part header: `Name: value; attr=x; attr2="y"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartHeader {
    pub name: String,
    pub value: String,
    /// Attribute names are lowercased.
    pub attributes: HashMap<String, String>,
}

/// Extract the boundary token from a `Content-Type` value.
pub fn extract_boundary(content_type: &str) -> Result<&str, FormError> {
    BOUNDARY_REGEX
        .captures(content_type)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| FormError::MissingBoundary {
            content_type: content_type.to_string(),
        })
}

#[derive(Clone, Copy)]
enum HeaderState {
    Name,
    Value,
    AttrName,
    AttrValue,
    Quoted,
    Escaped,
    AfterQuoted,
}

/// Parse a single header line. Returns `None` when the line has no `:`.
///
/// Quoted attribute values may contain `;` and backslash-escaped characters.
/// Attributes without `=` are skipped.
pub fn parse_header_line(line: &str) -> Option<PartHeader> {
    let line = format!("{line};");
    let mut state = HeaderState::Name;
    let mut header: Option<PartHeader> = None;
    let mut name = "";
    let mut start = 0;
    let mut attr = String::new();
    let mut quoted = String::new();

    for (i, c) in line.char_indices() {
        match state {
            HeaderState::Name => {
                if c == ':' {
                    name = line[..i].trim();
                    start = i + 1;
                    state = HeaderState::Value;
                }
            }
            HeaderState::Value => {
                if c == ';' {
                    header = Some(PartHeader {
                        name: name.to_string(),
                        value: line[start..i].trim().to_string(),
                        attributes: HashMap::new(),
                    });
                    start = i + 1;
                    state = HeaderState::AttrName;
                }
            }
            HeaderState::AttrName => match c {
                '=' => {
                    attr = line[start..i].trim().to_ascii_lowercase();
                    start = i + 1;
                    state = HeaderState::AttrValue;
                }
                ';' => start = i + 1,
                _ => {}
            },
            HeaderState::AttrValue => match c {
                '"' => {
                    quoted.clear();
                    state = HeaderState::Quoted;
                }
                ';' => {
                    if let Some(h) = header.as_mut() {
                        h.attributes
                            .insert(attr.clone(), line[start..i].trim().to_string());
                    }
                    start = i + 1;
                    state = HeaderState::AttrName;
                }
                _ => {}
            },
            HeaderState::Quoted => match c {
                '\\' => state = HeaderState::Escaped,
                '"' => {
                    if let Some(h) = header.as_mut() {
                        h.attributes.insert(attr.clone(), quoted.clone());
                    }
                    state = HeaderState::AfterQuoted;
                }
                _ => quoted.push(c),
            },
            HeaderState::Escaped => {
                quoted.push(c);
                state = HeaderState::Quoted;
            }
            HeaderState::AfterQuoted => {
                if c == ';' {
                    start = i + 1;
                    state = HeaderState::AttrName;
                }
            }
        }
    }
    header
}

/// An upload whose body has been written but not yet handed out.
///
/// Dropping it deletes the file, so every upload of a body that fails to
/// parse is removed.
struct PendingUpload {
    field: String,
    filename: String,
    temp: NamedTempFile,
}

/// Stream a `multipart/form-data` body into `form`.
///
/// Text parts become string fields; parts carrying a `filename` are written
/// to temporary files under `upload_dir`. Uploads only reach `form` once the
/// closing boundary has been read; on error none of them is left on disk.
pub fn parse_multipart<R: Read>(
    input: R,
    content_type: &str,
    upload_dir: &Path,
    buffer_size: usize,
    form: &mut FormData,
) -> Result<(), FormError> {
    let boundary = extract_boundary(content_type)?;
    let delimiter = format!("\r\n--{boundary}").into_bytes();
    let mut scanner = BoundaryScanner::with_capacity(input, buffer_size);

    // Preamble: everything before the first `--boundary`.
    let opening = &delimiter[2..];
    if scanner.read_until(opening, |_| Ok(()))? != SegmentEnd::Delimiter {
        debug!(boundary, "Multipart body carries no parts");
        return Ok(());
    }

    let mut pending = Vec::new();
    loop {
        if scanner.peek(2)? == b"--" {
            scanner.consume(2);
            break;
        }

        let headers = read_part_headers(&mut scanner)?;
        let disposition = headers
            .get("content-disposition")
            .ok_or(FormError::MissingContentDisposition)?;
        let name = disposition
            .attributes
            .get("name")
            .ok_or(FormError::MissingName)?
            .clone();

        match disposition.attributes.get("filename") {
            Some(filename) => {
                let temp = receive_upload(&mut scanner, &delimiter, upload_dir)?;
                debug!(
                    field = %name,
                    filename = %filename,
                    path = %temp.path().display(),
                    "Upload received"
                );
                pending.push(PendingUpload {
                    field: name,
                    filename: filename.clone(),
                    temp,
                });
            }
            None => {
                let (bytes, end) = scanner.read_vec_until(&delimiter)?;
                if end != SegmentEnd::Delimiter {
                    return Err(FormError::UnexpectedEof);
                }
                let value = String::from_utf8(bytes).map_err(|_| {
                    FormError::MalformedPart(format!("field '{name}' is not valid UTF-8"))
                })?;
                debug!(field = %name, len = value.len(), "Field received");
                form.fields.entry(name).or_default().push(value);
            }
        }
    }
    keep_uploads(pending, form)?;
    Ok(())
}

/// Hand finished uploads to `form`, reopened read-only.
///
/// Every read handle is opened before any file is kept, so a failed open
/// still deletes all of them.
fn keep_uploads(pending: Vec<PendingUpload>, form: &mut FormData) -> io::Result<()> {
    let opened = pending
        .into_iter()
        .map(|upload| -> io::Result<_> { Ok((File::open(upload.temp.path())?, upload)) })
        .collect::<io::Result<Vec<_>>>()?;
    for (file, upload) in opened {
        let (_, path) = upload.temp.keep().map_err(|err| err.error)?;
        form.uploads.entry(upload.field).or_default().push(Upload {
            file,
            filename: upload.filename,
            path,
        });
    }
    Ok(())
}

/// Read the header block of one part, keyed by lowercased header name.
fn read_part_headers<R: Read>(
    scanner: &mut BoundaryScanner<R>,
) -> Result<HashMap<String, PartHeader>, FormError> {
    let (raw, end) = scanner.read_vec_until(HEADER_END)?;
    if end != SegmentEnd::Delimiter {
        return Err(FormError::UnexpectedEof);
    }
    let text = String::from_utf8(raw)
        .map_err(|_| FormError::MalformedPart("part headers are not valid UTF-8".to_string()))?;
    // The line break that ends the boundary line is the first thing read.
    let text = text.strip_prefix("\r\n").unwrap_or(&text);

    let mut headers = HashMap::new();
    for line in text.split("\r\n") {
        match parse_header_line(line) {
            Some(header) => {
                headers.insert(header.name.to_ascii_lowercase(), header);
            }
            None if line.trim().is_empty() => {}
            None => warn!(line = %line, "Ignoring malformed part header"),
        }
    }
    Ok(headers)
}

/// Stream one file part into a fresh temporary file.
///
/// The returned file is still deleted on drop.
fn receive_upload<R: Read>(
    scanner: &mut BoundaryScanner<R>,
    delimiter: &[u8],
    upload_dir: &Path,
) -> Result<NamedTempFile, FormError> {
    let mut temp = temp_file_in(upload_dir)?;
    let end = {
        let mut writer = BufWriter::new(temp.as_file_mut());
        let end = scanner.read_until(delimiter, |chunk| writer.write_all(chunk))?;
        writer.flush()?;
        end
    };
    if end != SegmentEnd::Delimiter {
        return Err(FormError::UnexpectedEof);
    }
    Ok(temp)
}

/// Create an exclusively owned `fastweb.<random>` file in `dir`, mode 0600.
fn temp_file_in(dir: &Path) -> io::Result<NamedTempFile> {
    tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .rand_bytes(TEMP_SUFFIX_LEN)
        .tempfile_in(dir)
}
