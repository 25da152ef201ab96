//! # CLI Module
//!
//! The `fastweb-session` tool for looking inside stored sessions.
//!
//! ## Commands
//!
//! ### `dump`
//!
//! Decode one session file and print it as pretty JSON:
//!
//! ```bash
//! fastweb-session dump /tmp/sess_0123456789abcdef0123456789abcdef
//! ```
//!
//! ### `list`
//!
//! List the sessions stored in a directory with their key counts. Files that
//! fail to decode are listed with the error instead:
//!
//! ```bash
//! fastweb-session list --dir /var/lib/app/sessions
//! ```
//!
//! `--dir` defaults to `FASTWEB_SESSION_DIR`, then `/tmp`.

mod commands;

#[cfg(test)]
mod tests;

pub use commands::{execute, run_cli, Cli, Commands};
