mod common;

use common::{multipart_body, Part, RequestBuilder};
use fastweb::dispatcher::{
    ActionResult, ActionTable, Application, Context, Controller, Outcome, RoutingError, SetCookie,
};
use fastweb::runtime_config::{Leniency, Policy, RuntimeConfig};
use fastweb::session::{SessionStore, SESSION_COOKIE};
use fastweb::{Error, ErrorKind};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

const URLENCODED: &str = "application/x-www-form-urlencoded";

#[derive(Default)]
struct Home;

impl Controller for Home {
    const NAME: &'static str = "Default";

    fn actions(table: &mut ActionTable<Self>) {
        table.add("index", |_: &mut Self, _: &mut Context| -> ActionResult { Ok(()) });
    }
}

#[derive(Default)]
struct Account {
    visits: i64,
}

impl Account {
    fn login(&mut self, ctx: &mut Context) -> ActionResult {
        let user = ctx.form_value("user").unwrap_or("anonymous").to_string();
        let session = ctx.start_session()?;
        session.set("user", user);
        session.set("tags", ctx.form_values("tags").to_vec());
        session.set("visits", self.visits);
        ctx.set_cookie(SetCookie::new("lang", "en").path("/account"));
        Ok(())
    }

    fn avatar(&mut self, ctx: &mut Context) -> ActionResult {
        let mut uploads = ctx.take_uploads("avatar");
        let mut upload = uploads.pop().ok_or_else(|| anyhow::anyhow!("no avatar uploaded"))?;
        let contents = String::from_utf8(upload.read_to_vec()?)?;
        let session = ctx.start_session()?;
        session.set("avatar_name", upload.filename.clone());
        session.set("avatar", contents);
        if let Some(name) = ctx.form_value("name") {
            session.set("name", name);
        }
        upload.remove()?;
        Ok(())
    }
}

impl Controller for Account {
    const NAME: &'static str = "Account";

    fn pre_filter(&mut self, ctx: &mut Context) -> ActionResult {
        if ctx.env.laction == "locked" {
            anyhow::bail!("account is locked");
        }
        let session = ctx.start_session()?;
        self.visits = session.get_int("visits").unwrap_or(0) + 1;
        Ok(())
    }

    fn actions(table: &mut ActionTable<Self>) {
        table
            .add("login", Account::login)
            .add("avatar", Account::avatar)
            .add("locked", |_: &mut Self, _: &mut Context| -> ActionResult { Ok(()) })
            .add("show", |_: &mut Self, ctx: &mut Context, id: i64, name: String| -> ActionResult {
                ctx.start_session()?.set("shown", format!("{id}:{name}"));
                Ok(())
            })
            .add("missing", |_: &mut Self, _: &mut Context| -> ActionResult {
                Err(RoutingError::ActionNotFound {
                    controller: "Account".to_string(),
                    action: "Missing".to_string(),
                }
                .into())
            });
    }
}

/// Writes `Set-Cookie` lines, a blank line, then `Controller/Action`.
fn render_headers(ctx: &mut Context, out: &mut dyn Write) -> io::Result<()> {
    for cookie in ctx.cookies_to_set() {
        write!(out, "Set-Cookie: {}={}", cookie.name, cookie.value)?;
        if let Some(path) = &cookie.path {
            write!(out, "; Path={path}")?;
        }
        if cookie.http_only {
            write!(out, "; HttpOnly")?;
        }
        writeln!(out)?;
    }
    writeln!(out)?;
    write!(out, "{}/{}", ctx.env.controller, ctx.env.action)
}

fn config(dir: &Path) -> RuntimeConfig {
    RuntimeConfig {
        session_dir: dir.join("sessions"),
        upload_dir: dir.join("uploads"),
        ..RuntimeConfig::default()
    }
}

fn app(dir: &Path) -> Application {
    std::fs::create_dir_all(dir.join("sessions")).unwrap();
    std::fs::create_dir_all(dir.join("uploads")).unwrap();
    let mut app = Application::new(config(dir)).with_renderer(render_headers);
    app.register::<Home>().register::<Account>();
    app
}

fn session_cookie(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let rest = line.strip_prefix(&format!("Set-Cookie: {SESSION_COOKIE}="))?;
        Some(rest.split(';').next()?.to_string())
    })
}

#[test]
fn test_root_uses_default_controller() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());
    let (request, out) = RequestBuilder::get("/").build();
    assert!(matches!(app.handle(request), Outcome::Rendered));
    assert_eq!(out.contents(), "\nDefault/Index");
}

#[test]
fn test_urlencoded_login_persists_session() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (request, out) = RequestBuilder::post(
        "/account/login?tags=a",
        "application/x-www-form-urlencoded; charset=UTF-8",
        "user=bob+smith&tags=b%21",
    )
    .build();
    app.dispatch(request).unwrap();

    let output = out.contents();
    assert!(output.ends_with("Account/Login"));
    assert!(output.contains("Set-Cookie: lang=en; Path=/account\n"));
    let id = session_cookie(&output).expect("session cookie set");
    assert!(output.contains(&format!("{SESSION_COOKIE}={id}; HttpOnly")));

    let stored_path = dir.path().join("sessions").join(format!("sess_{id}"));
    let stored = std::fs::read_to_string(stored_path).unwrap();
    assert!(stored.starts_with("ms*:{"));
    assert!(stored.contains(r#"s:"user";s:"bob smith";"#));
    assert!(stored.contains(r#"s:"tags";as2:{s:"a";s:"b!";}"#));

    // A fresh application reads the same file back.
    let again = fastweb::session::SessionStore::with_dir(dir.path().join("sessions"));
    let session = again.open(Some(id.as_str())).unwrap().session;
    assert_eq!(session.get_string("user").as_deref(), Some("bob smith"));
    assert_eq!(session.get_int("visits"), Some(1));
}

#[test]
fn test_returning_visitor_keeps_session() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (request, out) = RequestBuilder::post("/account/login", URLENCODED, "user=ann").build();
    app.dispatch(request).unwrap();
    let id = session_cookie(&out.contents()).unwrap();

    let (request, out) = RequestBuilder::post("/account/login", URLENCODED, "user=ann")
        .cookie(&format!("theme=dark; {SESSION_COOKIE}={id}"))
        .build();
    app.dispatch(request).unwrap();
    assert_eq!(session_cookie(&out.contents()), None);

    let session = app.session_store().open(Some(id.as_str())).unwrap().session;
    assert_eq!(session.get_int("visits"), Some(2));
}

#[test]
fn test_multipart_upload_reaches_action() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());
    let body = multipart_body(
        "XYZ",
        &[
            Part::Field {
                name: "name",
                value: "bob",
            },
            Part::File {
                name: "avatar",
                filename: "hello.txt",
                contents: b"hi",
            },
        ],
    );

    let (request, out) =
        RequestBuilder::post("/account/avatar", "multipart/form-data; boundary=XYZ", body).build();
    app.dispatch(request).unwrap();

    let id = session_cookie(&out.contents()).unwrap();
    let session = app.session_store().open(Some(id.as_str())).unwrap().session;
    assert_eq!(session.get_string("avatar").as_deref(), Some("hi"));
    assert_eq!(session.get_string("avatar_name").as_deref(), Some("hello.txt"));
    assert_eq!(session.get_string("name").as_deref(), Some("bob"));
    assert_eq!(std::fs::read_dir(dir.path().join("uploads")).unwrap().count(), 0);
}

#[test]
fn test_typed_path_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (request, out) = RequestBuilder::get("/account/show/7/bob/ignored").build();
    app.dispatch(request).unwrap();
    let id = session_cookie(&out.contents()).unwrap();
    let session = app.session_store().open(Some(id.as_str())).unwrap().session;
    assert_eq!(session.get_string("shown").as_deref(), Some("7:bob"));

    let (request, _) = RequestBuilder::get("/account/show/seven/bob").build();
    match app.handle(request) {
        Outcome::NotFound(Error::Routing(RoutingError::BadParameter { index, input })) => {
            assert_eq!(index, 1);
            assert_eq!(input, "seven");
        }
        other => panic!("expected a bad parameter, got {other:?}"),
    }
}

#[test]
fn test_not_found_classification() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    for uri in ["/nowhere", "/account/nothing", "/account/show/1", "/account/missing"] {
        let (request, out) = RequestBuilder::get(uri).build();
        match app.handle(request) {
            Outcome::NotFound(err) => assert_eq!(err.kind(), ErrorKind::NotFound, "{uri}"),
            other => panic!("{uri}: expected not found, got {other:?}"),
        }
        assert_eq!(out.contents(), "", "{uri} must not render");
    }
}

#[test]
fn test_pre_filter_failure_skips_action() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());
    let (request, out) = RequestBuilder::get("/account/locked").build();
    match app.handle(request) {
        Outcome::Failed(Error::Action(err)) => assert_eq!(err.to_string(), "account is locked"),
        other => panic!("expected an action failure, got {other:?}"),
    }
    assert_eq!(out.contents(), "");
}

#[test]
fn test_malformed_cookie_follows_policy() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());
    let (request, out) = RequestBuilder::get("/").cookie("broken=%zz; theme=dark").build();
    assert!(matches!(app.handle(request), Outcome::Rendered));
    assert!(out.contents().ends_with("Default/Index"));

    let strict_config = RuntimeConfig {
        leniency: Leniency {
            malformed_cookie: Policy::Strict,
            ..Leniency::default()
        },
        ..config(dir.path())
    };
    let mut strict = Application::new(strict_config).with_renderer(render_headers);
    strict.register::<Home>();
    let (request, _) = RequestBuilder::get("/").cookie("broken=%zz").build();
    assert!(matches!(strict.handle(request), Outcome::Failed(Error::Form(_))));
}

#[test]
fn test_render_failure_policy() {
    fn failing(_: &mut Context, _: &mut dyn Write) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away"))
    }

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SessionStore::with_dir(dir.path()));

    let mut lenient = Application::new(config(dir.path()))
        .with_session_store(Arc::clone(&store))
        .with_renderer(failing);
    lenient.register::<Account>();
    let (request, _) = RequestBuilder::post("/account/login", URLENCODED, "user=x").build();
    assert!(matches!(lenient.handle(request), Outcome::Rendered));
    assert_eq!(store.len(), 1);

    let strict_config = RuntimeConfig {
        leniency: Leniency {
            render_failure: Policy::Strict,
            ..Leniency::default()
        },
        ..config(dir.path())
    };
    let mut strict = Application::new(strict_config).with_renderer(failing);
    strict.register::<Account>();
    let (request, _) = RequestBuilder::post("/account/login", URLENCODED, "user=x").build();
    match strict.handle(request) {
        Outcome::Failed(Error::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::BrokenPipe),
        other => panic!("expected an I/O failure, got {other:?}"),
    }
}
