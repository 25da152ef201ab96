use crate::ids::SessionId;
use crate::session::{codec, SessionStore, SESSION_FILE_PREFIX};
use anyhow::Context as _;
use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Command-line interface for inspecting fastweb sessions
#[derive(Debug, Parser)]
#[command(name = "fastweb-session")]
#[command(about = "Inspect fastweb session files", long_about = None)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available session inspection commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Decode a session file and print it as JSON
    Dump {
        /// Path to a `sess_<id>` file
        file: PathBuf,
    },
    /// List stored sessions with their key counts
    List {
        /// Session directory
        #[arg(long, env = "FASTWEB_SESSION_DIR", default_value = "/tmp")]
        dir: PathBuf,
    },
}

/// Parse the process arguments and run the selected command against stdout.
pub fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    execute(&cli.command, &mut out)
}

/// Run one command, writing its report to `out`.
pub fn execute(command: &Commands, out: &mut impl Write) -> anyhow::Result<()> {
    match command {
        Commands::Dump { file } => dump(file, out),
        Commands::List { dir } => list(dir, out),
    }
}

fn dump(file: &Path, out: &mut impl Write) -> anyhow::Result<()> {
    let reader = fs::File::open(file)
        .with_context(|| format!("failed to open session file {}", file.display()))?;
    let value = codec::decode(BufReader::new(reader))
        .with_context(|| format!("failed to decode {}", file.display()))?;
    serde_json::to_writer_pretty(&mut *out, &value)?;
    writeln!(out)?;
    Ok(())
}

fn list(dir: &Path, out: &mut impl Write) -> anyhow::Result<()> {
    let mut ids: Vec<SessionId> = fs::read_dir(dir)
        .with_context(|| format!("failed to read session directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name();
            let id = name.to_str()?.strip_prefix(SESSION_FILE_PREFIX)?.to_string();
            SessionId::parse(&id)
        })
        .collect();
    ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    debug!(dir = %dir.display(), sessions = ids.len(), "Listing sessions");

    let store = SessionStore::with_dir(dir);
    for id in &ids {
        match store.load(id) {
            Ok(Some(data)) => writeln!(out, "{id}\t{} keys", data.len())?,
            Ok(None) => writeln!(out, "{id}\tmissing")?,
            Err(err) => writeln!(out, "{id}\terror: {err}")?,
        }
    }
    Ok(())
}
