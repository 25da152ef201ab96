use crate::error::Result;
use crate::form::Upload;
use crate::server::RequestEnv;
use crate::session::{MemoryBackend, Session, SessionStore, SESSION_COOKIE};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;

/// A cookie the response should set.
///
/// Only the data is kept here; formatting the `Set-Cookie` header belongs to
/// the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub expires: Option<SystemTime>,
    pub secure: bool,
    pub http_only: bool,
}

impl SetCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: None,
            domain: None,
            expires: None,
            secure: false,
            http_only: false,
        }
    }

    #[must_use]
    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// What an action sees of the request it serves.
pub struct Context {
    pub env: RequestEnv,
    store: Arc<SessionStore>,
    session: Option<Arc<Session>>,
    cookies_out: BTreeMap<String, SetCookie>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("env", &self.env)
            .field("session", &self.session.as_ref().map(|s| s.id()))
            .field("cookies_out", &self.cookies_out)
            .finish_non_exhaustive()
    }
}

impl Context {
    pub fn new(env: RequestEnv, store: Arc<SessionStore>) -> Self {
        Self {
            env,
            store,
            session: None,
            cookies_out: BTreeMap::new(),
        }
    }

    /// Context over a private in-memory session store, for driving actions
    /// outside an [`Application`](super::Application).
    pub fn detached(env: RequestEnv) -> Self {
        Self::new(env, Arc::new(SessionStore::new(MemoryBackend::new())))
    }

    /// Open the visitor's session, creating one (and its cookie) if needed.
    ///
    /// Repeated calls return the same session.
    pub fn start_session(&mut self) -> Result<Arc<Session>> {
        if let Some(session) = &self.session {
            return Ok(Arc::clone(session));
        }
        let cookie = self.env.cookies.get(SESSION_COOKIE).map(String::as_str);
        let opened = self.store.open(cookie)?;
        if opened.created {
            self.set_cookie(
                SetCookie::new(SESSION_COOKIE, opened.session.id().as_str()).http_only(true),
            );
        }
        debug!(session_id = %opened.session.id(), created = opened.created, "Session started");
        self.session = Some(Arc::clone(&opened.session));
        Ok(opened.session)
    }

    /// The session, if this request has started one.
    #[must_use]
    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }

    /// Persist the session, if one was started.
    pub fn close_session(&mut self) -> Result<()> {
        match &self.session {
            Some(session) => self.store.save(session),
            None => Ok(()),
        }
    }

    /// Queue a cookie; a later cookie with the same name replaces it.
    pub fn set_cookie(&mut self, cookie: SetCookie) {
        self.cookies_out.insert(cookie.name.clone(), cookie);
    }

    /// Cookies queued for the response, ordered by name.
    pub fn cookies_to_set(&self) -> impl Iterator<Item = &SetCookie> {
        self.cookies_out.values()
    }

    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.env.cookies.get(name).map(String::as_str)
    }

    /// First value of a form field.
    #[must_use]
    pub fn form_value(&self, name: &str) -> Option<&str> {
        self.env
            .form
            .get(name)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    #[must_use]
    pub fn form_values(&self, name: &str) -> &[String] {
        self.env
            .form
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Take ownership of the uploads sent under `name`.
    pub fn take_uploads(&mut self, name: &str) -> Vec<Upload> {
        self.env.uploads.remove(name).unwrap_or_default()
    }
}
