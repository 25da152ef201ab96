use crate::dispatcher::{de_title_case, title_case};
use crate::error::Result;
use crate::form::{self, percent_decode, FormError, Upload};
use crate::ids::RequestId;
use crate::runtime_config::{Policy, RuntimeConfig};
use http::Method;
use std::collections::HashMap;
use std::io::{Read, Write};
use tracing::{debug, warn};

pub const REQUEST_URI: &str = "REQUEST_URI";
pub const QUERY_STRING: &str = "QUERY_STRING";
pub const REQUEST_METHOD: &str = "REQUEST_METHOD";
pub const CONTENT_TYPE: &str = "CONTENT_TYPE";
pub const HTTP_COOKIE: &str = "HTTP_COOKIE";

/// One inbound request as handed over by the transport.
///
/// The transport owns framing; the runtime only sees the CGI-style parameter
/// map, the body stream and the output stream.
pub struct Request {
    pub params: HashMap<String, String>,
    pub input: Box<dyn Read + Send>,
    pub output: Box<dyn Write + Send>,
}

impl Request {
    pub fn new(
        params: HashMap<String, String>,
        input: impl Read + Send + 'static,
        output: impl Write + Send + 'static,
    ) -> Self {
        Self {
            params,
            input: Box::new(input),
            output: Box::new(output),
        }
    }

    #[inline]
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// `REQUEST_METHOD`, defaulting to `GET` when absent or unparseable.
    #[must_use]
    pub fn method(&self) -> Method {
        self.param(REQUEST_METHOD)
            .and_then(|m| Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes()).ok())
            .unwrap_or(Method::GET)
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// A request path split into routing segments.
///
/// `/user_profile/show_all/7/bob?x=1` yields controller `UserProfile`, action
/// `ShowAll`, arguments `["7", "bob"]` and query `x=1`. A trailing empty
/// segment (from a trailing `/`) is not an argument.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoutePath {
    /// Path without the query string.
    pub path: String,
    pub query: Option<String>,
    /// Class-style controller name; empty when the path names none.
    pub controller: String,
    pub lcontroller: String,
    pub action: String,
    pub laction: String,
    pub args: Vec<String>,
}

impl RoutePath {
    #[must_use]
    pub fn parse(uri: &str) -> Self {
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (uri, None),
        };
        let parts: Vec<&str> = path.split('/').collect();

        let lcontroller = parts.get(1).copied().unwrap_or_default().to_string();
        let laction = parts.get(2).copied().unwrap_or_default().to_string();
        let mut args: Vec<String> = parts.iter().skip(3).map(|s| s.to_string()).collect();
        if parts.len() > 3 && args.last().is_some_and(String::is_empty) {
            args.pop();
        }

        Self {
            path: path.to_string(),
            query,
            controller: title_case(&lcontroller),
            lcontroller,
            action: title_case(&laction),
            laction,
            args,
        }
    }

    /// Fill in a controller name the path did not carry.
    pub fn set_controller(&mut self, name: &str) {
        self.controller = title_case(name);
        self.lcontroller = de_title_case(&self.controller);
    }

    /// Fill in an action name the path did not carry.
    pub fn set_action(&mut self, name: &str) {
        self.action = title_case(name);
        self.laction = de_title_case(&self.action);
    }
}

/// Everything known about a request once it has been routed.
#[derive(Debug)]
pub struct RequestEnv {
    pub request_id: RequestId,
    pub method: Method,
    pub path: String,
    pub controller: String,
    pub lcontroller: String,
    pub action: String,
    pub laction: String,
    /// Raw positional path arguments.
    pub params: Vec<String>,
    pub form: HashMap<String, Vec<String>>,
    pub uploads: HashMap<String, Vec<Upload>>,
    pub cookies: HashMap<String, String>,
    /// The transport's parameter map, untouched.
    pub transport: HashMap<String, String>,
}

impl RequestEnv {
    /// Decode cookies, query string and body of a routed request.
    pub fn build(
        request_id: RequestId,
        route: RoutePath,
        request: &mut Request,
        config: &RuntimeConfig,
    ) -> Result<Self> {
        let method = request.method();
        let cookies = match request.param(HTTP_COOKIE) {
            Some(header) => parse_cookies(header, config.leniency.malformed_cookie)?,
            None => HashMap::new(),
        };

        let query = route
            .query
            .as_deref()
            .or_else(|| request.params.get(QUERY_STRING).map(String::as_str));
        let content_type = request
            .params
            .get(CONTENT_TYPE)
            .map(String::as_str)
            .unwrap_or_default();
        let form = form::parse_form(&method, query, content_type, &mut request.input, config)?;
        debug!(
            cookies = cookies.len(),
            fields = form.fields.len(),
            uploads = form.uploads.len(),
            "Request environment built"
        );

        Ok(Self {
            request_id,
            method,
            path: route.path,
            controller: route.controller,
            lcontroller: route.lcontroller,
            action: route.action,
            laction: route.laction,
            params: route.args,
            form: form.fields,
            uploads: form.uploads,
            cookies,
            transport: request.params.clone(),
        })
    }

    /// Bare environment for a path, with no form, cookies or uploads.
    #[must_use]
    pub fn for_path(uri: &str) -> Self {
        let route = RoutePath::parse(uri);
        Self {
            request_id: RequestId::new(),
            method: Method::GET,
            path: route.path,
            controller: route.controller,
            lcontroller: route.lcontroller,
            action: route.action,
            laction: route.laction,
            params: route.args,
            form: HashMap::new(),
            uploads: HashMap::new(),
            cookies: HashMap::new(),
            transport: HashMap::new(),
        }
    }
}

/// Parse a `Cookie` header: `;`-separated pairs, values percent-decoded.
///
/// Pairs without `=` are ignored. A value that fails to decode is dropped
/// with a warning under [`Policy::Lenient`] and fails the parse under
/// [`Policy::Strict`].
pub fn parse_cookies(
    header: &str,
    policy: Policy,
) -> Result<HashMap<String, String>, FormError> {
    let mut cookies = HashMap::new();
    for pair in header.split(';') {
        let Some((name, value)) = pair.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        match (percent_decode(value.trim()), policy) {
            (Ok(value), _) => {
                cookies.insert(name.to_string(), value);
            }
            (Err(err), Policy::Lenient) => {
                warn!(cookie = %name, error = %err, "Dropping cookie with malformed value");
            }
            (Err(err), Policy::Strict) => return Err(err),
        }
    }
    Ok(cookies)
}
