use crate::dispatcher::RoutingError;
use crate::form::FormError;
use crate::session::CodecError;
use std::fmt;
use std::io;

/// Broad classification of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No controller, action or argument binding matched the path.
    NotFound,
    Generic,
}

/// Crate-level error returned from request handling.
#[derive(Debug)]
pub enum Error {
    Form(FormError),
    Codec(CodecError),
    Routing(RoutingError),
    Io(io::Error),
    /// Returned by an action or its controller's pre-filter.
    Action(anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Routing errors are not-found, including ones an action returns itself.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Routing(_) => ErrorKind::NotFound,
            Error::Action(err) => {
                if err.downcast_ref::<RoutingError>().is_some() {
                    ErrorKind::NotFound
                } else if let Some(inner) = err.downcast_ref::<Error>() {
                    inner.kind()
                } else {
                    ErrorKind::Generic
                }
            }
            _ => ErrorKind::Generic,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Form(e) => write!(f, "request parse error: {e}"),
            Error::Codec(e) => write!(f, "{e}"),
            Error::Routing(e) => write!(f, "{e}"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Action(e) => write!(f, "action failed: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Form(e) => Some(e),
            Error::Codec(e) => Some(e),
            Error::Routing(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::Action(e) => Some(&**e),
        }
    }
}

impl From<FormError> for Error {
    fn from(err: FormError) -> Self {
        Error::Form(err)
    }
}

impl From<CodecError> for Error {
    fn from(err: CodecError) -> Self {
        Error::Codec(err)
    }
}

impl From<RoutingError> for Error {
    fn from(err: RoutingError) -> Self {
        Error::Routing(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}
