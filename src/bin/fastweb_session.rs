#![allow(clippy::expect_used)]

use fastweb::cli::run_cli;
use fastweb::logging::{init_logging, LogConfig};

fn main() {
    init_logging(&LogConfig::from_env()).expect("failed to initialise logging");
    if let Err(err) = run_cli() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
