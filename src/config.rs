//! docdelta configuration (`.docdelta/config.toml`).
//!
//! Defines the typed configuration (tracked-file patterns, where state,
//! backups and the changelog live, the default target document) and the
//! resolved [`Settings`] handed to every component. Nothing in docdelta
//! resolves paths on its own; they all come from a `Settings`.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level docdelta configuration.
///
/// Parsed from `.docdelta/config.toml`. Missing fields use defaults.
/// Missing file → all defaults (no error).
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocdeltaConfig {
    /// Which files are tracked.
    #[serde(default)]
    pub scan: ScanConfig,

    /// Where persisted state, backups and the changelog live.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Target document defaults.
    #[serde(default)]
    pub document: DocumentConfig,
}

// ---------------------------------------------------------------------------
// ScanConfig
// ---------------------------------------------------------------------------

/// Tracked-file selection.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanConfig {
    /// File-name globs to track (default: structured data, markup and report
    /// containers).
    #[serde(default = "default_include")]
    pub include: Vec<String>,

    /// Substring tokens; any path containing one is skipped.
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            include: default_include(),
            exclude: default_exclude(),
        }
    }
}

fn default_include() -> Vec<String> {
    ["*.sql", "*.md", "*.pbix", "*.pbip", "*.yaml", "*.json", "*.py"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

fn default_exclude() -> Vec<String> {
    [".cache", ".git", "__pycache__", ".docdelta"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

// ---------------------------------------------------------------------------
// StorageConfig
// ---------------------------------------------------------------------------

/// Locations of docdelta's own files.
///
/// `cache_dir` is relative to the repository root; the other paths are
/// relative to `cache_dir`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory holding state, backups, changelog and request files.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Persisted [`RepoState`](docdelta_core::RepoState) file name.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Backup directory.
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,

    /// Changelog document.
    #[serde(default = "default_changelog_file")]
    pub changelog_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            state_file: default_state_file(),
            backup_dir: default_backup_dir(),
            changelog_file: default_changelog_file(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".docdelta")
}

fn default_state_file() -> PathBuf {
    PathBuf::from("doc_state.json")
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("backups")
}

fn default_changelog_file() -> PathBuf {
    PathBuf::from("CHANGELOG.md")
}

// ---------------------------------------------------------------------------
// DocumentConfig
// ---------------------------------------------------------------------------

/// Target document defaults.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentConfig {
    /// Document updated when no `--target` is given (default: `"README.md"`).
    #[serde(default = "default_target")]
    pub target: String,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            target: default_target(),
        }
    }
}

fn default_target() -> String {
    "README.md".to_owned()
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Error loading a docdelta configuration file.
#[derive(Debug)]
pub struct ConfigError {
    /// The path that was being loaded (if available).
    pub path: Option<PathBuf>,
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

impl DocdeltaConfig {
    /// Load configuration from a TOML file.
    ///
    /// - If the file does not exist, returns all defaults (not an error).
    /// - If the file exists but contains invalid TOML or unknown fields,
    ///   returns a [`ConfigError`] with line-level detail.
    ///
    /// # Errors
    /// Returns `ConfigError` on I/O errors (other than not-found) or parse errors.
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
    /// Returns `ConfigError` on invalid TOML, unknown fields, or an empty
    /// include list.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str).map_err(|e| {
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
        })?;
        if config.scan.include.is_empty() {
            return Err(ConfigError {
                path: None,
                message: "scan.include must list at least one pattern".to_owned(),
            });
        }
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Repository root plus configuration, with every path resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    root: PathBuf,
    config: DocdeltaConfig,
}

impl Settings {
    /// Combine a root directory with an already-loaded configuration.
    pub fn new(root: impl Into<PathBuf>, config: DocdeltaConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Load settings for `root`, reading `config_path` or the default
    /// `.docdelta/config.toml` under the root.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the configuration file is invalid.
    pub fn load(root: impl Into<PathBuf>, config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let root = root.into();
        let path = config_path.map_or_else(|| Self::default_config_path(&root), Path::to_path_buf);
        let config = DocdeltaConfig::load(&path)?;
        Ok(Self::new(root, config))
    }

    /// `<root>/.docdelta/config.toml`.
    #[must_use]
    pub fn default_config_path(root: &Path) -> PathBuf {
        root.join(".docdelta").join("config.toml")
    }

    /// Repository root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The parsed configuration.
    #[must_use]
    pub const fn config(&self) -> &DocdeltaConfig {
        &self.config
    }

    /// Absolute cache directory.
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(&self.config.storage.cache_dir)
    }

    /// Persisted state file.
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.cache_dir().join(&self.config.storage.state_file)
    }

    /// Backup directory.
    #[must_use]
    pub fn backup_dir(&self) -> PathBuf {
        self.cache_dir().join(&self.config.storage.backup_dir)
    }

    /// Changelog document.
    #[must_use]
    pub fn changelog_path(&self) -> PathBuf {
        self.cache_dir().join(&self.config.storage.changelog_file)
    }

    /// Writer lock file.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.cache_dir().join(".lock")
    }

    /// Default location of the update batch returned by the text service.
    #[must_use]
    pub fn updates_path(&self) -> PathBuf {
        self.cache_dir().join("updates.json")
    }

    /// Rendered prompt written by `diff`.
    #[must_use]
    pub fn prompt_path(&self) -> PathBuf {
        self.cache_dir().join("update_prompt.txt")
    }

    /// Machine-readable request written by `diff`.
    #[must_use]
    pub fn request_path(&self) -> PathBuf {
        self.cache_dir().join("update_request.json")
    }

    /// The target document, falling back to the configured default.
    #[must_use]
    pub fn target_or_default<'a>(&'a self, target: Option<&'a str>) -> &'a str {
        target.unwrap_or(&self.config.document.target)
    }

    /// Absolute path of a target document given relative to the root.
    #[must_use]
    pub fn target_path(&self, target: &str) -> PathBuf {
        self.root.join(target)
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
        let cfg = DocdeltaConfig::default();
        assert!(cfg.scan.include.contains(&"*.sql".to_owned()));
        assert!(cfg.scan.include.contains(&"*.pbix".to_owned()));
        assert!(cfg.scan.exclude.contains(&".git".to_owned()));
        assert_eq!(cfg.storage.cache_dir, PathBuf::from(".docdelta"));
        assert_eq!(cfg.storage.state_file, PathBuf::from("doc_state.json"));
        assert_eq!(cfg.document.target, "README.md");
    }

    #[test]
    fn parse_empty_string_is_defaults() {
        assert_eq!(DocdeltaConfig::parse("").unwrap(), DocdeltaConfig::default());
    }

    #[test]
    fn parse_partial_scan_section() {
        let cfg = DocdeltaConfig::parse(
            r#"
[scan]
include = ["*.rs"]
"#,
        )
        .unwrap();
        assert_eq!(cfg.scan.include, vec!["*.rs"]);
        assert_eq!(cfg.scan.exclude, default_exclude());
    }

    #[test]
    fn parse_rejects_unknown_fields() {
        let err = DocdeltaConfig::parse("[scan]\nincludes = []\n").unwrap_err();
        assert!(err.message.contains("includes"), "{}", err.message);
    }

    #[test]
    fn parse_rejects_empty_include() {
        let err = DocdeltaConfig::parse("[scan]\ninclude = []\n").unwrap_err();
        assert!(err.message.contains("scan.include"));
    }

    #[test]
    fn parse_includes_line_number_on_error() {
        let toml = "[document]\n\ntarget = 42\n";
        let err = DocdeltaConfig::parse(toml).unwrap_err();
        assert!(err.message.contains("line"), "{}", err.message);
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let cfg = DocdeltaConfig::load(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(cfg, DocdeltaConfig::default());
    }

    #[test]
    fn load_invalid_file_shows_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "not valid [[[toml").unwrap();
        let err = DocdeltaConfig::load(&path).unwrap_err();
        assert_eq!(err.path.as_deref(), Some(path.as_path()));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn settings_resolve_storage_paths() {
        let cfg = DocdeltaConfig::parse(
            r#"
[storage]
cache_dir = "meta"
backup_dir = "bk"
"#,
        )
        .unwrap();
        let settings = Settings::new("/repo", cfg);
        assert_eq!(settings.cache_dir(), PathBuf::from("/repo/meta"));
        assert_eq!(settings.backup_dir(), PathBuf::from("/repo/meta/bk"));
        assert_eq!(settings.state_path(), PathBuf::from("/repo/meta/doc_state.json"));
        assert_eq!(settings.changelog_path(), PathBuf::from("/repo/meta/CHANGELOG.md"));
    }

    #[test]
    fn settings_load_reads_default_location() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".docdelta")).unwrap();
        std::fs::write(
            dir.path().join(".docdelta/config.toml"),
            "[document]\ntarget = \"docs/GUIDE.md\"\n",
        )
        .unwrap();
        let settings = Settings::load(dir.path(), None).unwrap();
        assert_eq!(settings.target_or_default(None), "docs/GUIDE.md");
        assert_eq!(settings.target_or_default(Some("X.md")), "X.md");
    }
}
