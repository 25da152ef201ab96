//! # Session Module
//!
//! Per-visitor state that survives across requests.
//!
//! ## Values
//!
//! A session is a string-keyed map of [`SessionValue`]s. The universe is
//! closed: integers, strings, sequences and key-ordered mappings of those,
//! nested "any" slots, and [`Record`]s (named fields in declaration order).
//! Floats, booleans and nulls are rejected with
//! [`CodecError::Unsupported`].
//!
//! ## Encoding
//!
//! Every node starts with a short type tag, so an encoded session decodes
//! without a schema:
//!
//! | Value | Encoding |
//! |-------|----------|
//! | integer | `i:42;` |
//! | string | `s:"say \"hi\"";` |
//! | sequence | `ai2:{i:1;i:2;}` (`i`, `s` or `*` elements) |
//! | mapping | `msi:{s:"a";i:1;}` (`i`/`s` keys, `i`/`s`/`*` values) |
//! | record | `t:{s:"name";s:"bob";}` |
//!
//! ## Storage
//!
//! [`SessionStore`] caches live sessions and persists them through a
//! [`SessionBackend`]; [`FileBackend`] writes `sess_<id>` files with mode
//! `0600`. Sessions are only written when closed.
//!
//! ```rust
//! use fastweb::session::{MemoryBackend, SessionStore};
//!
//! let store = SessionStore::new(MemoryBackend::new());
//! let opened = store.open(None).unwrap();
//! assert!(opened.created);
//! opened.session.set("user", "bob");
//! store.save(&opened.session).unwrap();
//! ```

pub mod codec;
mod store;
mod value;

pub use store::{
    FileBackend, MemoryBackend, OpenedSession, Session, SessionBackend, SessionStore,
    SESSION_COOKIE, SESSION_FILE_PREFIX,
};
pub use value::{Record, SessionValue};

use std::fmt;
use std::io;

/// Errors from encoding or decoding session values.
#[derive(Debug)]
pub enum CodecError {
    Io(io::Error),
    /// Malformed encoded input; `offset` is the byte position of the problem.
    Format { offset: usize, message: String },
    /// A value with no representation in the session universe.
    Unsupported { shape: String },
    /// A value nested deeper than the decoder accepts.
    TooDeep { max: usize },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Io(e) => write!(f, "session I/O error: {e}"),
            CodecError::Format { offset, message } => {
                write!(f, "malformed session data at byte {offset}: {message}")
            }
            CodecError::Unsupported { shape } => {
                write!(f, "type {shape} cannot be stored in a session")
            }
            CodecError::TooDeep { max } => {
                write!(f, "value nests deeper than {max} levels")
            }
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CodecError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CodecError {
    fn from(err: io::Error) -> Self {
        CodecError::Io(err)
    }
}
