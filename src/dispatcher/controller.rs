use super::context::Context;
use super::naming::title_case;
use smallvec::{smallvec, SmallVec};
use std::collections::BTreeMap;
use std::fmt;

/// What actions and pre-filters return.
pub type ActionResult = anyhow::Result<()>;

/// Parameter kinds of one action; almost always a handful.
pub type ParamKinds = SmallVec<[ParamKind; 4]>;

/// Kind of a positional action parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    Str,
}

/// A path segment converted to its parameter's kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Int(i64),
    Str(String),
}

/// The request could not be routed to an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    ControllerNotFound { controller: String },
    ActionNotFound { controller: String, action: String },
    NotEnoughParameters { expected: usize, given: usize },
    /// `index` is 1-based.
    BadParameter { index: usize, input: String },
}

impl fmt::Display for RoutingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingError::ControllerNotFound { controller } => {
                write!(f, "controller class '{controller}' not found")
            }
            RoutingError::ActionNotFound { controller, action } => {
                write!(f, "action '{action}' is not implemented in controller '{controller}'")
            }
            RoutingError::NotEnoughParameters { expected, given } => {
                write!(f, "not enough parameters: expected {expected}, got {given}")
            }
            RoutingError::BadParameter { index, input } => {
                write!(f, "parameter {index} must be an integer, input: {input}")
            }
        }
    }
}

impl std::error::Error for RoutingError {}

mod sealed {
    pub trait Sealed {}
    impl Sealed for i64 {}
    impl Sealed for String {}
}

/// Types an action may take as positional parameters: `i64` and `String`.
pub trait Param: sealed::Sealed + Sized + Send + 'static {
    const KIND: ParamKind;

    fn from_arg(arg: Arg) -> Option<Self>;
}

impl Param for i64 {
    const KIND: ParamKind = ParamKind::Int;

    fn from_arg(arg: Arg) -> Option<Self> {
        match arg {
            Arg::Int(v) => Some(v),
            Arg::Str(_) => None,
        }
    }
}

impl Param for String {
    const KIND: ParamKind = ParamKind::Str;

    fn from_arg(arg: Arg) -> Option<Self> {
        match arg {
            Arg::Str(v) => Some(v),
            Arg::Int(_) => None,
        }
    }
}

/// Convert raw path segments to the kinds an action expects.
///
/// Extra segments are ignored.
pub fn bind_arguments(
    kinds: &[ParamKind],
    segments: &[String],
) -> Result<Vec<Arg>, RoutingError> {
    if segments.len() < kinds.len() {
        return Err(RoutingError::NotEnoughParameters {
            expected: kinds.len(),
            given: segments.len(),
        });
    }
    kinds
        .iter()
        .zip(segments)
        .enumerate()
        .map(|(i, (kind, segment))| match kind {
            ParamKind::Str => Ok(Arg::Str(segment.clone())),
            ParamKind::Int => segment
                .parse::<i64>()
                .map(Arg::Int)
                .map_err(|_| RoutingError::BadParameter {
                    index: i + 1,
                    input: segment.clone(),
                }),
        })
        .collect()
}

/// A function that can be registered as an action of controller `C`.
///
/// Implemented for every `Fn(&mut C, &mut Context, P1, ..., Pn) -> ActionResult`
/// with up to six [`Param`] parameters.
pub trait ActionFn<C, Args>: Send + Sync + 'static {
    fn param_kinds(&self) -> ParamKinds;

    fn call(&self, controller: &mut C, ctx: &mut Context, args: Vec<Arg>) -> ActionResult;
}

macro_rules! impl_action_fn {
    ($($ty:ident => $var:ident),*) => {
        impl<C, F, $($ty,)*> ActionFn<C, ($($ty,)*)> for F
        where
            F: Fn(&mut C, &mut Context, $($ty),*) -> ActionResult + Send + Sync + 'static,
            $($ty: Param,)*
        {
            fn param_kinds(&self) -> ParamKinds {
                smallvec![$(<$ty as Param>::KIND),*]
            }

            #[allow(unused_mut, unused_variables)]
            fn call(&self, controller: &mut C, ctx: &mut Context, args: Vec<Arg>) -> ActionResult {
                let expected = self.param_kinds().len();
                let given = args.len();
                let mut args = args.into_iter();
                $(
                    let $var = args
                        .next()
                        .and_then(<$ty as Param>::from_arg)
                        .ok_or(RoutingError::NotEnoughParameters { expected, given })?;
                )*
                (self)(controller, ctx, $($var),*)
            }
        }
    };
}

impl_action_fn!();
impl_action_fn!(A1 => a1);
impl_action_fn!(A1 => a1, A2 => a2);
impl_action_fn!(A1 => a1, A2 => a2, A3 => a3);
impl_action_fn!(A1 => a1, A2 => a2, A3 => a3, A4 => a4);
impl_action_fn!(A1 => a1, A2 => a2, A3 => a3, A4 => a4, A5 => a5);
impl_action_fn!(A1 => a1, A2 => a2, A3 => a3, A4 => a4, A5 => a5, A6 => a6);

type Invoke<C> = Box<dyn Fn(&mut C, &mut Context, Vec<Arg>) -> ActionResult + Send + Sync>;

struct Action<C> {
    kinds: ParamKinds,
    invoke: Invoke<C>,
}

/// The actions of one controller, keyed by class-style name.
pub struct ActionTable<C> {
    actions: BTreeMap<String, Action<C>>,
}

impl<C: 'static> ActionTable<C> {
    fn new() -> Self {
        Self {
            actions: BTreeMap::new(),
        }
    }

    /// Register `action` under `name` (normalized with `title_case`, so
    /// `show_all` and `ShowAll` are the same action).
    pub fn add<Args: 'static, F: ActionFn<C, Args>>(&mut self, name: &str, action: F) -> &mut Self {
        let kinds = action.param_kinds();
        self.actions.insert(
            title_case(name),
            Action {
                kinds,
                invoke: Box::new(move |controller: &mut C, ctx: &mut Context, args: Vec<Arg>| {
                    action.call(controller, ctx, args)
                }),
            },
        );
        self
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.actions.keys().map(String::as_str).collect()
    }
}

/// A group of actions sharing a name prefix, a default action and a pre-filter.
///
/// A fresh `Self::default()` serves every request, so a controller's fields
/// are per-request scratch space.
///
/// ```rust,ignore
/// #[derive(Default)]
/// struct User;
///
/// impl Controller for User {
///     const NAME: &'static str = "User";
///
///     fn actions(table: &mut ActionTable<Self>) {
///         table.add("show", |_: &mut User, ctx: &mut Context, id: i64| -> ActionResult {
///             ctx.start_session()?.set("last_user", id);
///             Ok(())
///         });
///     }
/// }
/// ```
pub trait Controller: Default + Send + 'static {
    /// Class-style name the controller is routed under, e.g. `UserProfile`.
    const NAME: &'static str;

    /// Action used when the path names none.
    fn default_action() -> &'static str {
        "Index"
    }

    /// Runs before every action; an error skips the action.
    fn pre_filter(&mut self, _ctx: &mut Context) -> ActionResult {
        Ok(())
    }

    fn actions(table: &mut ActionTable<Self>);
}

/// Type-erased view of a registered controller.
pub(crate) trait ControllerHandle: Send + Sync {
    fn name(&self) -> &str;
    fn default_action(&self) -> &str;
    fn action_kinds(&self, action: &str) -> Option<&[ParamKind]>;
    fn action_names(&self) -> Vec<&str>;
    fn invoke(&self, action: &str, ctx: &mut Context, args: Vec<Arg>) -> ActionResult;
}

pub(crate) struct Registered<C> {
    name: String,
    default_action: String,
    table: ActionTable<C>,
}

impl<C: Controller> Registered<C> {
    pub(crate) fn new() -> Self {
        let mut table = ActionTable::new();
        C::actions(&mut table);
        Self {
            name: title_case(C::NAME),
            default_action: title_case(C::default_action()),
            table,
        }
    }
}

impl<C: Controller> ControllerHandle for Registered<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_action(&self) -> &str {
        &self.default_action
    }

    fn action_kinds(&self, action: &str) -> Option<&[ParamKind]> {
        self.table.actions.get(action).map(|a| a.kinds.as_slice())
    }

    fn action_names(&self) -> Vec<&str> {
        self.table.names()
    }

    fn invoke(&self, action: &str, ctx: &mut Context, args: Vec<Arg>) -> ActionResult {
        let entry = self
            .table
            .actions
            .get(action)
            .ok_or_else(|| RoutingError::ActionNotFound {
                controller: self.name.clone(),
                action: action.to_string(),
            })?;
        let mut controller = C::default();
        controller.pre_filter(ctx)?;
        (entry.invoke)(&mut controller, ctx, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::RequestEnv;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn binds_int_and_string() {
        let kinds = [ParamKind::Int, ParamKind::Str];
        assert_eq!(
            bind_arguments(&kinds, &strings(&["42", "bob"])).unwrap(),
            vec![Arg::Int(42), Arg::Str("bob".to_string())]
        );
    }

    #[test]
    fn bad_int_reports_one_based_position() {
        let kinds = [ParamKind::Int, ParamKind::Str];
        assert_eq!(
            bind_arguments(&kinds, &strings(&["x", "bob"])).unwrap_err(),
            RoutingError::BadParameter {
                index: 1,
                input: "x".to_string()
            }
        );
    }

    #[test]
    fn too_few_segments() {
        let kinds = [ParamKind::Int, ParamKind::Str];
        assert_eq!(
            bind_arguments(&kinds, &strings(&["42"])).unwrap_err(),
            RoutingError::NotEnoughParameters {
                expected: 2,
                given: 1
            }
        );
    }

    #[test]
    fn extra_segments_ignored() {
        let kinds = [ParamKind::Str];
        assert_eq!(
            bind_arguments(&kinds, &strings(&["a", "b"])).unwrap(),
            vec![Arg::Str("a".to_string())]
        );
    }

    #[derive(Default)]
    struct Echo {
        filtered: bool,
    }

    impl Controller for Echo {
        const NAME: &'static str = "echo";

        fn default_action() -> &'static str {
            "say"
        }

        fn pre_filter(&mut self, _ctx: &mut Context) -> ActionResult {
            self.filtered = true;
            Ok(())
        }

        fn actions(table: &mut ActionTable<Self>) {
            table
                .add("say", |c: &mut Echo, _ctx: &mut Context, n: i64, word: String| {
                    anyhow::ensure!(c.filtered, "pre-filter did not run");
                    anyhow::ensure!(n == 3 && word == "hi", "got {n} {word}");
                    Ok(())
                })
                .add("show_all", |_: &mut Echo, _ctx: &mut Context| -> ActionResult { Ok(()) });
        }
    }

    #[test]
    fn registered_controller_normalizes_names() {
        let handle = Registered::<Echo>::new();
        assert_eq!(handle.name(), "Echo");
        assert_eq!(handle.default_action(), "Say");
        assert_eq!(handle.action_names(), vec!["Say", "ShowAll"]);
        assert_eq!(
            handle.action_kinds("Say"),
            Some(&[ParamKind::Int, ParamKind::Str][..])
        );
    }

    #[test]
    fn invoke_runs_pre_filter_then_action() {
        let handle = Registered::<Echo>::new();
        let mut ctx = Context::detached(RequestEnv::for_path("/echo/say/3/hi"));
        handle
            .invoke("Say", &mut ctx, vec![Arg::Int(3), Arg::Str("hi".to_string())])
            .unwrap();
        let err = handle.invoke("Missing", &mut ctx, Vec::new()).unwrap_err();
        assert!(err.downcast_ref::<RoutingError>().is_some());
    }

    #[test]
    fn invoke_with_mismatched_args_is_a_routing_error() {
        let handle = Registered::<Echo>::new();
        let mut ctx = Context::detached(RequestEnv::for_path("/echo/say"));
        let err = handle
            .invoke("Say", &mut ctx, vec![Arg::Str("3".to_string())])
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RoutingError>(),
            Some(RoutingError::NotEnoughParameters { expected: 2, given: 1 })
        ));
    }
}
