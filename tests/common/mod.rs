#![allow(dead_code)]

use fastweb::server::{Request, CONTENT_TYPE, HTTP_COOKIE, REQUEST_METHOD, REQUEST_URI};
use std::collections::HashMap;
use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, Mutex};

/// Reader that hands out at most `step` bytes per call, the way a slow
/// socket does.
pub struct Stutter<R> {
    inner: R,
    step: usize,
}

impl<R: Read> Stutter<R> {
    pub fn new(inner: R, step: usize) -> Self {
        Self { inner, step }
    }
}

impl<R: Read> Read for Stutter<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.step);
        self.inner.read(&mut buf[..n])
    }
}

pub enum Part<'a> {
    Field { name: &'a str, value: &'a str },
    File { name: &'a str, filename: &'a str, contents: &'a [u8] },
}

/// Assemble a well-formed `multipart/form-data` body.
pub fn multipart_body(boundary: &str, parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        match part {
            Part::Field { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File {
                name,
                filename,
                contents,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; \
                         filename=\"{filename}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(contents);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}

/// Cloneable sink so a test can read what a request wrote.
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct RequestBuilder {
    params: HashMap<String, String>,
    body: Vec<u8>,
}

impl RequestBuilder {
    pub fn get(uri: &str) -> Self {
        Self::new("GET", uri)
    }

    pub fn post(uri: &str, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        let mut builder = Self::new("POST", uri);
        builder
            .params
            .insert(CONTENT_TYPE.to_string(), content_type.to_string());
        builder.body = body.into();
        builder
    }

    fn new(method: &str, uri: &str) -> Self {
        let params = HashMap::from([
            (REQUEST_METHOD.to_string(), method.to_string()),
            (REQUEST_URI.to_string(), uri.to_string()),
        ]);
        Self {
            params,
            body: Vec::new(),
        }
    }

    pub fn cookie(mut self, header: &str) -> Self {
        self.params
            .insert(HTTP_COOKIE.to_string(), header.to_string());
        self
    }

    pub fn build(self) -> (Request, SharedBuf) {
        let out = SharedBuf::default();
        let request = Request::new(self.params, Cursor::new(self.body), out.clone());
        (request, out)
    }
}
