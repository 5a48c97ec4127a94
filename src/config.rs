//! Tool configuration (`.csvmerge3.toml`).
//!
//! Optional per-directory defaults for the CLI: output dialect and key
//! specification. Missing file ⇒ all defaults (no error); CLI flags always
//! override file values.

use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::csv::{LineTerminator, QuoteStyle};

/// Conventional config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".csvmerge3.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration, parsed from [`CONFIG_FILE`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolConfig {
    /// Output dialect defaults.
    #[serde(default)]
    pub output: OutputConfig,

    /// Merge defaults.
    #[serde(default)]
    pub merge: MergeSection,
}

/// Output dialect defaults; each field falls back to the built-in default
/// when absent here and on the command line.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Default quoting style (`minimal` when unset).
    pub quote: Option<QuoteStyle>,

    /// Default line terminator (`native` when unset).
    pub lineterminator: Option<LineTerminator>,

    /// Re-encode every row by default.
    #[serde(default)]
    pub reformat_all: bool,
}

/// Merge defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergeSection {
    /// Default primary-key specification (`|`-separated alternatives,
    /// `[auto]` for guessing).
    pub key: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Error loading the configuration file.
#[derive(Debug)]
pub struct ConfigError {
    /// The path being loaded, when known.
    pub path: Option<std::path::PathBuf>,
    /// Human-readable message with line-level detail when possible.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.path {
            write!(f, "{}: {}", p.display(), self.message)
        } else {
            write!(f, "config error: {}", self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

impl ToolConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file is not an error; it yields all defaults.
    ///
    /// # Errors
    /// Returns [`ConfigError`] on unreadable files (other than not-found)
    /// or invalid TOML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError {
                    path: Some(path.to_owned()),
                    message: format!("could not read file: {e}"),
                });
            }
        };
        Self::parse(&contents).map_err(|mut e| {
            e.path = Some(path.to_owned());
            e
        })
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns [`ConfigError`] on invalid TOML or unknown fields.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                let line = toml_str[..span.start]
                    .chars()
                    .filter(|&c| c == '\n')
                    .count()
                    + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError {
                path: None,
                message,
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_all_fields() {
        let cfg = ToolConfig::default();
        assert_eq!(cfg.output.quote, None);
        assert_eq!(cfg.output.lineterminator, None);
        assert!(!cfg.output.reformat_all);
        assert_eq!(cfg.merge.key, None);
    }

    #[test]
    fn parse_empty_string() {
        let cfg = ToolConfig::parse("").unwrap();
        assert_eq!(cfg, ToolConfig::default());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[output]
quote = "all"
lineterminator = "unix"
reformat-all = true

[merge]
key = "id|[auto]"
"#;
        let cfg = ToolConfig::parse(toml).unwrap();
        assert_eq!(cfg.output.quote, Some(QuoteStyle::All));
        assert_eq!(cfg.output.lineterminator, Some(LineTerminator::Unix));
        assert!(cfg.output.reformat_all);
        assert_eq!(cfg.merge.key.as_deref(), Some("id|[auto]"));
    }

    #[test]
    fn parse_partial_config_uses_defaults() {
        let cfg = ToolConfig::parse("[merge]\nkey = \"name\"\n").unwrap();
        assert_eq!(cfg.merge.key.as_deref(), Some("name"));
        assert_eq!(cfg.output.quote, None);
    }

    #[test]
    fn parse_rejects_unknown_field() {
        let err = ToolConfig::parse("mystery = 1\n").unwrap_err();
        assert!(
            err.message.contains("unknown field"),
            "error should mention unknown field: {}",
            err.message
        );
    }

    #[test]
    fn parse_rejects_invalid_quote_style() {
        let err = ToolConfig::parse("[output]\nquote = \"fancy\"\n").unwrap_err();
        assert!(
            err.message.contains("unknown variant"),
            "error should mention unknown variant: {}",
            err.message
        );
    }

    #[test]
    fn parse_includes_line_number_on_error() {
        let err = ToolConfig::parse("[output]\nquote = 42\n").unwrap_err();
        assert!(
            err.message.contains("line"),
            "error should include line number: {}",
            err.message
        );
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let cfg = ToolConfig::load(Path::new("/nonexistent/.csvmerge3.toml")).unwrap();
        assert_eq!(cfg, ToolConfig::default());
    }

    #[test]
    fn load_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[output]\nquote = \"nonnumeric\"\n").unwrap();
        let cfg = ToolConfig::load(&path).unwrap();
        assert_eq!(cfg.output.quote, Some(QuoteStyle::NonNumeric));
    }

    #[test]
    fn load_invalid_file_shows_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "not [[ valid").unwrap();
        let err = ToolConfig::load(&path).unwrap_err();
        assert_eq!(err.path.as_deref(), Some(path.as_path()));
        assert!(!err.message.is_empty());
    }
}
