//! # fastweb
//!
//! **fastweb** is a small request runtime for controller-style web
//! applications. A transport (FastCGI, CGI, a test harness) hands it one
//! request at a time; fastweb routes the path to a controller action, decodes
//! the form body and cookies, runs the action and persists the visitor's
//! session.
//!
//! ## Architecture
//!
//! - **[`server`]** - The transport seam: the CGI-style [`Request`] and the
//!   routed [`RequestEnv`](server::RequestEnv)
//! - **[`dispatcher`]** - Controller registration, routing by path segment and
//!   action invocation with typed parameters
//! - **[`form`]** - URL-encoded and `multipart/form-data` decoding on top of a
//!   streaming boundary scanner
//! - **[`session`]** - Server-side sessions keyed by the `fastweb_sessid`
//!   cookie, stored in a compact PHP-like text encoding
//! - **[`runtime_config`]** - Paths, defaults and leniency policies from the
//!   environment or YAML
//! - **[`logging`]** - `tracing` subscriber setup
//! - **[`cli`]** - The `fastweb-session` inspection tool
//!
//! ## Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Transport
//!     participant App as Application
//!     participant Env as RequestEnv
//!     participant Ctrl as Controller
//!     participant Store as SessionStore
//!
//!     Transport->>App: handle(Request)
//!     App->>App: resolve /controller/action/args
//!     App->>Env: build (cookies, query, body)
//!     App->>Ctrl: pre_filter, then action(args)
//!     Ctrl->>Store: start_session (optional)
//!     App->>Transport: render to output
//!     App->>Store: save session
//!     App-->>Transport: Outcome
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use fastweb::{ActionResult, ActionTable, Application, Context, Controller, Request};
//! use fastweb::runtime_config::RuntimeConfig;
//! use std::collections::HashMap;
//!
//! #[derive(Default)]
//! struct Greeter;
//!
//! impl Controller for Greeter {
//!     const NAME: &'static str = "Default";
//!
//!     fn actions(table: &mut ActionTable<Self>) {
//!         table.add("hello", |_: &mut Self, ctx: &mut Context, name: String| -> ActionResult {
//!             ctx.start_session()?.set("name", name);
//!             Ok(())
//!         });
//!     }
//! }
//!
//! let dir = std::env::temp_dir();
//! let config = RuntimeConfig { session_dir: dir, ..RuntimeConfig::default() };
//! let mut app = Application::new(config);
//! app.register::<Greeter>();
//!
//! let params = HashMap::from([("REQUEST_URI".to_string(), "/default/hello/ann".to_string())]);
//! let request = Request::new(params, std::io::empty(), std::io::sink());
//! app.dispatch(request).unwrap();
//! ```
//!
//! ## Configuration
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `FASTWEB_SESSION_DIR` | `/tmp` | Directory holding `sess_<id>` files |
//! | `FASTWEB_UPLOAD_DIR` | system temp dir | Where uploaded files are spooled |
//! | `FASTWEB_DEFAULT_CONTROLLER` | `Default` | Controller for an empty path |
//! | `FASTWEB_SCAN_BUFFER_SIZE` | `4096` | Multipart read buffer (decimal or `0x` hex, min 256) |
//! | `FASTWEB_LENIENCY` | `lenient` | `strict` turns tolerated failures into errors |
//! | `FASTWEB_LOG_LEVEL` | `info` | Log level |
//! | `FASTWEB_LOG_FORMAT` | `json` | `json` or `pretty` |

pub mod cli;
pub mod dispatcher;
pub mod error;
pub mod form;
pub mod ids;
pub mod logging;
pub mod runtime_config;
pub mod server;
pub mod session;

pub use dispatcher::{
    ActionResult, ActionTable, Application, Context, Controller, Outcome, Renderer, SetCookie,
};
pub use error::{Error, ErrorKind, Result};
pub use form::{FormData, FormError, Upload};
pub use ids::{RequestId, SessionId};
pub use server::{Request, RequestEnv};
pub use session::{CodecError, Session, SessionStore, SessionValue};
