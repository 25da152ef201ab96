//! # Dispatcher Module
//!
//! Maps a request path onto a controller action and runs it.
//!
//! ## Routing surface
//!
//! ```text
//! /<controller>/<action>/<arg1>/<arg2>/...
//! ```
//!
//! Path segments are `lower_snake` and are converted with [`title_case`] to
//! find the class-style names controllers and actions are registered under
//! (`/user_profile/show_all` → `UserProfile` / `ShowAll`). A missing
//! controller segment falls back to the configured default controller
//! (`Default`), a missing action segment to the controller's default action
//! (`Index`).
//!
//! ## Registration
//!
//! Controllers implement [`Controller`] and list their actions once, at
//! startup. An action is any function taking the controller, the
//! [`Context`] and up to six `i64`/`String` parameters:
//!
//! ```rust
//! use fastweb::dispatcher::{ActionResult, ActionTable, Application, Context, Controller};
//! use fastweb::runtime_config::RuntimeConfig;
//!
//! #[derive(Default)]
//! struct Article;
//!
//! fn show(_: &mut Article, ctx: &mut Context, id: i64, slug: String) -> ActionResult {
//!     ctx.start_session()?.set("last_article", id);
//!     tracing::debug!(id, slug = %slug, "showing article");
//!     Ok(())
//! }
//!
//! impl Controller for Article {
//!     const NAME: &'static str = "Article";
//!
//!     fn actions(table: &mut ActionTable<Self>) {
//!         table.add("show", show);
//!     }
//! }
//!
//! let mut app = Application::new(RuntimeConfig::default());
//! app.register::<Article>();
//! assert!(app.resolve("/article/show/7/hello").is_ok());
//! ```
//!
//! The parameter list is read from the function's type, so `/article/show/x/y`
//! fails with [`RoutingError::BadParameter`] before the action runs.
//!
//! ## Request flow
//!
//! 1. The path is split and the controller, action and arguments resolved
//! 2. Cookies, query string and body are decoded into a
//!    [`RequestEnv`](crate::server::RequestEnv)
//! 3. A fresh controller runs its pre-filter, then the action
//! 4. The [`Renderer`] writes the response and the session, if started, is
//!    saved
//!
//! Any failure stops the flow and is returned as an
//! [`Error`](crate::error::Error); [`Application::handle`] additionally
//! classifies it as not-found or generic for the transport.

mod context;
mod controller;
mod core;
mod naming;

pub use context::{Context, SetCookie};
pub use controller::{
    bind_arguments, ActionFn, ActionResult, ActionTable, Arg, Controller, Param, ParamKind,
    ParamKinds, RoutingError,
};
pub use core::{Application, NoopRenderer, Outcome, Renderer, ResolvedRoute};
pub use naming::{de_title_case, title_case};
