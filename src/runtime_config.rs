//! # Runtime Configuration Module
//!
//! Settings that shape how requests are parsed, where sessions and uploads
//! live on disk, and how strictly the runtime treats recoverable oddities.
//!
//! ## Sources
//!
//! - [`RuntimeConfig::default()`] for the built-in values
//! - [`RuntimeConfig::from_env()`] for deployment overrides
//! - [`RuntimeConfig::from_yaml_str()`] / [`RuntimeConfig::load()`] for a
//!   config file; every field is optional
//!
//! ## Environment Variables
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `FASTWEB_SESSION_DIR` | `session_dir` | `/tmp` |
//! | `FASTWEB_UPLOAD_DIR` | `upload_dir` | `TMPDIR` or `/tmp` |
//! | `FASTWEB_DEFAULT_CONTROLLER` | `default_controller` | `Default` |
//! | `FASTWEB_SCAN_BUFFER_SIZE` | `scan_buffer_size` | `4096` |
//! | `FASTWEB_LENIENCY` | both `leniency` policies | `lenient` |
//!
//! `FASTWEB_SCAN_BUFFER_SIZE` accepts decimal (`8192`) or hexadecimal
//! (`0x2000`). Values below [`MIN_SCAN_BUFFER_SIZE`] fall back to the default
//! from the environment and are rejected in a config file.
//!
//! ## Example file
//!
//! ```yaml
//! session_dir: /var/lib/app/sessions
//! scan_buffer_size: 0x4000
//! leniency:
//!   unknown_content_type: strict
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use fastweb::runtime_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env();
//! println!("sessions in {}", config.session_dir.display());
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Default size of the multipart scan buffer in bytes.
pub const DEFAULT_SCAN_BUFFER_SIZE: usize = 4096;

/// Smallest accepted scan buffer; it must hold a whole boundary line.
pub const MIN_SCAN_BUFFER_SIZE: usize = 256;

/// How a recoverable condition is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Log a warning and carry on.
    #[default]
    Lenient,
    /// Fail the request.
    Strict,
}

impl Policy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "lenient" => Some(Policy::Lenient),
            "strict" => Some(Policy::Strict),
            _ => None,
        }
    }
}

/// Per-condition leniency switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Leniency {
    /// A POST body whose content type is neither url-encoded nor multipart.
    pub unknown_content_type: Policy,
    /// The renderer failing after a successful action.
    pub render_failure: Policy,
    /// A cookie whose value is not valid percent-encoding.
    pub malformed_cookie: Policy,
}

impl Leniency {
    #[must_use]
    pub fn uniform(policy: Policy) -> Self {
        Self {
            unknown_content_type: policy,
            render_failure: policy,
            malformed_cookie: policy,
        }
    }
}

/// Runtime configuration for an [`Application`](crate::dispatcher::Application).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Directory holding `sess_<id>` files.
    pub session_dir: PathBuf,
    /// Directory receiving temporary upload files.
    pub upload_dir: PathBuf,
    /// Controller used when the path names none.
    pub default_controller: String,
    /// Size of the multipart scan buffer; must exceed the boundary length.
    #[serde(deserialize_with = "deserialize_size")]
    pub scan_buffer_size: usize,
    pub leniency: Leniency,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            session_dir: PathBuf::from("/tmp"),
            upload_dir: env::temp_dir(),
            default_controller: "Default".to_string(),
            scan_buffer_size: DEFAULT_SCAN_BUFFER_SIZE,
            leniency: Leniency::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = env::var("FASTWEB_SESSION_DIR") {
            config.session_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("FASTWEB_UPLOAD_DIR") {
            config.upload_dir = PathBuf::from(dir);
        }
        if let Ok(name) = env::var("FASTWEB_DEFAULT_CONTROLLER") {
            if !name.trim().is_empty() {
                config.default_controller = name.trim().to_string();
            }
        }
        if let Ok(val) = env::var("FASTWEB_SCAN_BUFFER_SIZE") {
            config.scan_buffer_size = scan_buffer_size_or_default(&val);
        }
        if let Some(policy) = env::var("FASTWEB_LENIENCY")
            .ok()
            .and_then(|v| Policy::parse(&v))
        {
            config.leniency = Leniency::uniform(policy);
        }
        config
    }

    /// Parse a YAML document; absent fields keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("invalid runtime configuration")
    }

    /// Read and parse a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("in {}", path.display()))
    }
}

/// Parse a size given in decimal or `0x`-prefixed hexadecimal.
fn parse_size(val: &str) -> Option<usize> {
    let val = val.trim();
    if let Some(hex) = val.strip_prefix("0x").or_else(|| val.strip_prefix("0X")) {
        usize::from_str_radix(hex, 16).ok()
    } else {
        val.parse().ok()
    }
}

fn scan_buffer_size_or_default(val: &str) -> usize {
    parse_size(val)
        .filter(|&n| n >= MIN_SCAN_BUFFER_SIZE)
        .unwrap_or(DEFAULT_SCAN_BUFFER_SIZE)
}

fn deserialize_size<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Number(usize),
        Text(String),
    }

    let size = match Size::deserialize(deserializer)? {
        Size::Number(n) => n,
        Size::Text(s) => parse_size(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid size '{s}'")))?,
    };
    if size < MIN_SCAN_BUFFER_SIZE {
        return Err(serde::de::Error::custom(format!(
            "scan buffer of {size} bytes is below the minimum of {MIN_SCAN_BUFFER_SIZE}"
        )));
    }
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = RuntimeConfig::default();
        assert_eq!(config.session_dir, PathBuf::from("/tmp"));
        assert_eq!(config.default_controller, "Default");
        assert_eq!(config.scan_buffer_size, 4096);
        assert_eq!(config.leniency.unknown_content_type, Policy::Lenient);
        assert_eq!(config.leniency.render_failure, Policy::Lenient);
        assert_eq!(config.leniency.malformed_cookie, Policy::Lenient);
    }

    #[test]
    fn size_accepts_hex_and_decimal() {
        assert_eq!(parse_size("0x2000"), Some(8192));
        assert_eq!(parse_size("8192"), Some(8192));
        assert_eq!(parse_size("lots"), None);
    }

    #[test]
    fn env_scan_buffer_below_minimum_falls_back() {
        assert_eq!(scan_buffer_size_or_default("64"), DEFAULT_SCAN_BUFFER_SIZE);
        assert_eq!(scan_buffer_size_or_default("junk"), DEFAULT_SCAN_BUFFER_SIZE);
        assert_eq!(scan_buffer_size_or_default("0x100"), MIN_SCAN_BUFFER_SIZE);
    }

    #[test]
    fn yaml_overrides_only_named_fields() {
        let config = RuntimeConfig::from_yaml_str(
            "session_dir: /var/sess\n\
             scan_buffer_size: \"0x4000\"\n\
             leniency:\n  render_failure: strict\n",
        )
        .unwrap();
        assert_eq!(config.session_dir, PathBuf::from("/var/sess"));
        assert_eq!(config.scan_buffer_size, 0x4000);
        assert_eq!(config.leniency.render_failure, Policy::Strict);
        assert_eq!(config.leniency.unknown_content_type, Policy::Lenient);
        assert_eq!(config.default_controller, "Default");
    }

    #[test]
    fn yaml_rejects_tiny_scan_buffer() {
        let err = RuntimeConfig::from_yaml_str("scan_buffer_size: 64\n").unwrap_err();
        assert!(format!("{err:#}").contains("minimum"), "{err:#}");
        assert!(RuntimeConfig::from_yaml_str("scan_buffer_size: \"0x40\"\n").is_err());
        let config = RuntimeConfig::from_yaml_str("scan_buffer_size: 256\n").unwrap();
        assert_eq!(config.scan_buffer_size, MIN_SCAN_BUFFER_SIZE);
    }

    #[test]
    fn yaml_rejects_unknown_policy() {
        assert!(RuntimeConfig::from_yaml_str("leniency:\n  render_failure: maybe\n").is_err());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fastweb.yaml");
        std::fs::write(&path, "default_controller: Home\n").unwrap();
        let config = RuntimeConfig::load(&path).unwrap();
        assert_eq!(config.default_controller, "Home");
        assert!(RuntimeConfig::load(dir.path().join("missing.yaml")).is_err());
    }

    #[test]
    fn policy_parse_is_case_insensitive() {
        assert_eq!(Policy::parse("STRICT"), Some(Policy::Strict));
        assert_eq!(Policy::parse(" lenient "), Some(Policy::Lenient));
        assert_eq!(Policy::parse("other"), None);
    }
}
