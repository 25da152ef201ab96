//! # Server Module
//!
//! The seam between a transport and the runtime.
//!
//! Framing (FastCGI, CGI or an in-process test harness) is not handled here.
//! A transport hands over one [`Request`] per inbound request: a CGI-style
//! parameter map (`REQUEST_URI`, `QUERY_STRING`, `REQUEST_METHOD`,
//! `CONTENT_TYPE`, `HTTP_COOKIE`), the body stream and the output stream.
//! Once the path has been routed, [`RequestEnv::build`] decodes cookies,
//! query string and body into the environment actions see.

pub mod request;

pub use request::{
    parse_cookies, Request, RequestEnv, RoutePath, CONTENT_TYPE, HTTP_COOKIE, QUERY_STRING,
    REQUEST_METHOD, REQUEST_URI,
};
