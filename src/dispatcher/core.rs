use super::context::Context;
use super::controller::{
    bind_arguments, Arg, Controller, ControllerHandle, Registered, RoutingError,
};
use crate::error::{Error, ErrorKind, Result};
use crate::ids::RequestId;
use crate::runtime_config::{Policy, RuntimeConfig};
use crate::server::{Request, RequestEnv, RoutePath, REQUEST_URI};
use crate::session::SessionStore;
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn};

/// Writes the response for a successful action.
///
/// Template rendering lives outside this crate; implementations receive the
/// context the action filled in and the transport's output stream.
pub trait Renderer: Send + Sync {
    fn render(&self, ctx: &mut Context, out: &mut dyn Write) -> io::Result<()>;
}

/// Renders nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRenderer;

impl Renderer for NoopRenderer {
    fn render(&self, _ctx: &mut Context, _out: &mut dyn Write) -> io::Result<()> {
        Ok(())
    }
}

impl<F> Renderer for F
where
    F: Fn(&mut Context, &mut dyn Write) -> io::Result<()> + Send + Sync,
{
    fn render(&self, ctx: &mut Context, out: &mut dyn Write) -> io::Result<()> {
        self(ctx, out)
    }
}

/// How a request ended, for transports that map failures to error pages.
#[derive(Debug)]
pub enum Outcome {
    Rendered,
    /// Nothing matched the path; typically a 404 page.
    NotFound(Error),
    Failed(Error),
}

/// A path resolved down to one action with bound arguments.
pub struct ResolvedRoute<'a> {
    pub route: RoutePath,
    pub args: Vec<Arg>,
    handle: &'a dyn ControllerHandle,
}

impl std::fmt::Debug for ResolvedRoute<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedRoute")
            .field("route", &self.route)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// Controller registry and request entry point.
///
/// Controllers are registered once at startup; afterwards the application is
/// only read, so one instance can serve any number of worker threads.
pub struct Application {
    config: RuntimeConfig,
    controllers: HashMap<String, Box<dyn ControllerHandle>>,
    sessions: Arc<SessionStore>,
    renderer: Box<dyn Renderer>,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.controllers.keys().collect();
        names.sort();
        f.debug_struct("Application")
            .field("config", &self.config)
            .field("controllers", &names)
            .finish_non_exhaustive()
    }
}

impl Application {
    /// Application with file-backed sessions under `config.session_dir`.
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        let sessions = Arc::new(SessionStore::with_dir(&config.session_dir));
        Self {
            config,
            controllers: HashMap::new(),
            sessions,
            renderer: Box::new(NoopRenderer),
        }
    }

    #[must_use]
    pub fn with_session_store(mut self, sessions: Arc<SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: impl Renderer + 'static) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    /// Register controller `C`; a controller with the same name is replaced.
    pub fn register<C: Controller>(&mut self) -> &mut Self {
        let handle = Registered::<C>::new();
        let name = handle.name().to_string();
        let actions: Vec<String> = handle.action_names().into_iter().map(str::to_string).collect();

        if self.controllers.insert(name.clone(), Box::new(handle)).is_some() {
            warn!(controller = %name, "Replaced existing controller");
        }
        info!(
            controller = %name,
            actions = ?actions,
            total_controllers = self.controllers.len(),
            "Controller registered"
        );
        self
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn session_store(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Registered controller names, sorted.
    #[must_use]
    pub fn controller_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.controllers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve controller, action and arguments for a request URI.
    pub fn resolve(&self, uri: &str) -> Result<ResolvedRoute<'_>, RoutingError> {
        let mut route = RoutePath::parse(uri);
        if route.controller.is_empty() {
            route.set_controller(&self.config.default_controller);
        }

        let handle = self
            .controllers
            .get(&route.controller)
            .ok_or_else(|| RoutingError::ControllerNotFound {
                controller: route.controller.clone(),
            })?;

        if route.action.is_empty() {
            route.set_action(handle.default_action());
        }

        let kinds = handle
            .action_kinds(&route.action)
            .ok_or_else(|| RoutingError::ActionNotFound {
                controller: route.controller.clone(),
                action: route.action.clone(),
            })?;
        let args = bind_arguments(kinds, &route.args)?;

        Ok(ResolvedRoute {
            route,
            args,
            handle: handle.as_ref(),
        })
    }

    /// Route, parse and run one request, then render and persist the session.
    pub fn dispatch(&self, mut request: Request) -> Result<()> {
        let request_id = RequestId::new();
        let uri = request.param(REQUEST_URI).unwrap_or("/").to_string();
        let span = info_span!("dispatch", request_id = %request_id, uri = %uri);
        let _enter = span.enter();
        let start = Instant::now();

        let resolved = self.resolve(&uri)?;
        debug!(
            controller = %resolved.route.controller,
            action = %resolved.route.action,
            args = resolved.args.len(),
            "Route resolved"
        );

        let action = resolved.route.action.clone();
        let env = RequestEnv::build(request_id, resolved.route, &mut request, &self.config)?;
        let mut ctx = Context::new(env, Arc::clone(&self.sessions));

        resolved
            .handle
            .invoke(&action, &mut ctx, resolved.args)
            .map_err(Error::Action)?;

        if let Err(err) = self.render(&mut ctx, &mut request.output) {
            match self.config.leniency.render_failure {
                Policy::Lenient => warn!(error = %err, "Render failed, continuing"),
                Policy::Strict => return Err(Error::Io(err)),
            }
        }

        ctx.close_session()?;
        info!(
            controller = %ctx.env.controller,
            action = %ctx.env.action,
            elapsed_us = start.elapsed().as_micros() as u64,
            "Request dispatched"
        );
        Ok(())
    }

    /// [`dispatch`](Self::dispatch), with the result classified and logged.
    pub fn handle(&self, request: Request) -> Outcome {
        match self.dispatch(request) {
            Ok(()) => Outcome::Rendered,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!(error = %err, "Page not found");
                Outcome::NotFound(err)
            }
            Err(err) => {
                error!(error = %err, "Request failed");
                Outcome::Failed(err)
            }
        }
    }

    fn render(&self, ctx: &mut Context, out: &mut Box<dyn Write + Send>) -> io::Result<()> {
        self.renderer.render(ctx, out)?;
        out.flush()
    }
}
