//! Unit tests for CLI commands

use crate::cli::{execute, Cli, Commands};
use clap::Parser;
use std::fs;

const ID_A: &str = "0123456789abcdef0123456789abcdef";
const ID_B: &str = "fedcba9876543210fedcba9876543210";

#[test]
fn test_dump_command_parses() {
    let cli = Cli::try_parse_from(["fastweb-session", "dump", "/tmp/sess_x"]).unwrap();
    match cli.command {
        Commands::Dump { file } => assert_eq!(file.to_string_lossy(), "/tmp/sess_x"),
        other => panic!("Expected Dump command, got {other:?}"),
    }
}

#[test]
fn test_list_command_with_dir() {
    let cli = Cli::try_parse_from(["fastweb-session", "list", "--dir", "/srv/sessions"]).unwrap();
    match cli.command {
        Commands::List { dir } => assert_eq!(dir.to_string_lossy(), "/srv/sessions"),
        other => panic!("Expected List command, got {other:?}"),
    }
}

#[test]
fn test_dump_requires_file() {
    assert!(Cli::try_parse_from(["fastweb-session", "dump"]).is_err());
}

#[test]
fn test_dump_prints_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(format!("sess_{ID_A}"));
    fs::write(&path, r#"ms*:{s:"count";i:3;s:"tags";as2:{s:"a";s:"b";}}"#).unwrap();

    let mut out: Vec<u8> = Vec::new();
    execute(&Commands::Dump { file: path }, &mut out).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(json["count"], 3);
    assert_eq!(json["tags"], serde_json::json!(["a", "b"]));
}

#[test]
fn test_dump_reports_decode_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken");
    fs::write(&path, "ai5:{i:1;i:2;}").unwrap();

    let err = execute(&Commands::Dump { file: path }, &mut Vec::<u8>::new()).unwrap_err();
    assert!(err.to_string().contains("failed to decode"));
}

#[test]
fn test_list_skips_foreign_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(format!("sess_{ID_B}")), "garbage").unwrap();
    fs::write(dir.path().join(format!("sess_{ID_A}")), r#"mss:{s:"k";s:"v";}"#).unwrap();
    fs::write(dir.path().join("sess_short"), "ms*:{}").unwrap();
    fs::write(dir.path().join("notes.txt"), "hello").unwrap();

    let mut out: Vec<u8> = Vec::new();
    execute(
        &Commands::List {
            dir: dir.path().to_path_buf(),
        },
        &mut out,
    )
    .unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], format!("{ID_A}\t1 keys"));
    assert!(lines[1].starts_with(&format!("{ID_B}\terror:")));
}
