//! # Form Module
//!
//! Decodes the query string and request body into named text fields and named
//! file uploads.
//!
//! ## Body kinds
//!
//! | Content type | Handling |
//! |--------------|----------|
//! | `application/x-www-form-urlencoded` | whole body read, pairs decoded |
//! | `multipart/form-data; boundary=...` | streamed part by part |
//! | anything else | [`Policy::Lenient`] ignores the body, [`Policy::Strict`] fails |
//!
//! The query string is always decoded first, so body values for the same key
//! are appended after query values.
//!
//! ## Streaming
//!
//! Multipart bodies are never buffered whole. The [`BoundaryScanner`] keeps a
//! fixed window (see `scan_buffer_size` in
//! [`RuntimeConfig`](crate::runtime_config::RuntimeConfig)) and file parts are
//! written straight to a temporary file as they arrive:
//!
//! ```text
//! --XYZ\r\n
//! Content-Disposition: form-data; name="name"\r\n
//! \r\n
//! bob\r\n
//! --XYZ\r\n
//! Content-Disposition: form-data; name="upload"; filename="hello.txt"\r\n
//! \r\n
//! hi\r\n
//! --XYZ--\r\n
//! ```
//!
//! Uploads are opened read-only and left on disk once the whole body has
//! parsed; whoever consumes them deletes them. A body that fails part way
//! leaves no upload behind.

mod multipart;
mod scanner;
mod urlencoded;

pub use multipart::{
    extract_boundary, parse_header_line, parse_multipart, PartHeader, Upload, TEMP_PREFIX,
};
pub use scanner::{BoundaryScanner, SegmentEnd, DEFAULT_BUFFER_SIZE};
pub use urlencoded::{parse_into as parse_urlencoded, percent_decode};

use crate::runtime_config::{Policy, RuntimeConfig};
use http::Method;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read};
use tracing::{debug, warn};

const URLENCODED: &str = "application/x-www-form-urlencoded";
const MULTIPART: &str = "multipart/form-data";

/// Errors raised while decoding a query string, body, or cookie header.
#[derive(Debug)]
pub enum FormError {
    Io(io::Error),
    /// Malformed percent-encoding, or decoded bytes that are not UTF-8.
    Decode { input: String },
    MissingBoundary { content_type: String },
    MissingContentDisposition,
    /// A `Content-Disposition` header without a `name` attribute.
    MissingName,
    MalformedPart(String),
    /// The body ended before the closing boundary.
    UnexpectedEof,
    UnsupportedContentType(String),
}

impl fmt::Display for FormError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormError::Io(e) => write!(f, "error reading request body: {e}"),
            FormError::Decode { input } => write!(f, "invalid url encoding in '{input}'"),
            FormError::MissingBoundary { content_type } => {
                write!(f, "no multipart boundary in content type '{content_type}'")
            }
            FormError::MissingContentDisposition => {
                write!(f, "missing Content-Disposition header in multipart part")
            }
            FormError::MissingName => {
                write!(f, "missing name field in Content-Disposition header")
            }
            FormError::MalformedPart(msg) => write!(f, "malformed multipart part: {msg}"),
            FormError::UnexpectedEof => write!(f, "request body ended before the closing boundary"),
            FormError::UnsupportedContentType(ct) => {
                write!(f, "unsupported request content type '{ct}'")
            }
        }
    }
}

impl std::error::Error for FormError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FormError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for FormError {
    fn from(err: io::Error) -> Self {
        FormError::Io(err)
    }
}

/// Decoded fields and uploads of one request.
#[derive(Debug, Default)]
pub struct FormData {
    pub fields: HashMap<String, Vec<String>>,
    pub uploads: HashMap<String, Vec<Upload>>,
}

impl FormData {
    /// First value of a field.
    #[must_use]
    pub fn first(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

/// How the body of a request is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    UrlEncoded,
    Multipart,
    Other,
}

impl BodyKind {
    /// Classify a `Content-Type` value.
    ///
    /// Url-encoded matches only the bare type or the type followed by `;`.
    #[must_use]
    pub fn from_content_type(content_type: &str) -> Self {
        let ct = content_type.trim_start();
        if has_prefix_ci(ct, URLENCODED) {
            let rest = &ct[URLENCODED.len()..];
            if rest.is_empty() || rest.starts_with(';') {
                return BodyKind::UrlEncoded;
            }
        }
        if has_prefix_ci(ct, MULTIPART) {
            return BodyKind::Multipart;
        }
        BodyKind::Other
    }
}

fn has_prefix_ci(s: &str, prefix: &str) -> bool {
    s.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

fn carries_body(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT || *method == Method::PATCH
}

/// Decode the query string and, for body-carrying methods, the body.
pub fn parse_form<R: Read>(
    method: &Method,
    query: Option<&str>,
    content_type: &str,
    mut body: R,
    config: &RuntimeConfig,
) -> Result<FormData, FormError> {
    let mut form = FormData::default();

    if let Some(query) = query.filter(|q| !q.is_empty()) {
        urlencoded::parse_into(&mut form.fields, query)?;
    }

    if !carries_body(method) {
        return Ok(form);
    }

    match BodyKind::from_content_type(content_type) {
        BodyKind::UrlEncoded => {
            let mut raw = Vec::new();
            body.read_to_end(&mut raw)?;
            let text = String::from_utf8(raw).map_err(|_| FormError::Decode {
                input: "<request body>".to_string(),
            })?;
            urlencoded::parse_into(&mut form.fields, &text)?;
            debug!(fields = form.fields.len(), "Url-encoded body parsed");
        }
        BodyKind::Multipart => {
            multipart::parse_multipart(
                body,
                content_type,
                &config.upload_dir,
                config.scan_buffer_size,
                &mut form,
            )?;
            debug!(
                fields = form.fields.len(),
                uploads = form.uploads.len(),
                "Multipart body parsed"
            );
        }
        BodyKind::Other => match config.leniency.unknown_content_type {
            Policy::Lenient => {
                warn!(content_type = %content_type, "Unknown content type, ignoring request body");
            }
            Policy::Strict => {
                return Err(FormError::UnsupportedContentType(content_type.to_string()));
            }
        },
    }

    Ok(form)
}
