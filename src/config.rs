//! Application configuration: TOML file loading, CLI overrides, and defaults.
//!
//! Resolution order (first found wins, values merge/override):
//! 1. CLI flags (`--counts`)
//! 2. `--config PATH`
//! 3. `$GIST_TREE_CONFIG` environment variable (path to config file)
//! 4. Project-local `.gist-tree.toml` in the current working directory
//! 5. Global `~/.config/gist-tree/config.toml`
//! 6. Built-in defaults

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::store::JsonFileStorage;
use crate::sync::{TreeOptions, DEFAULT_NOTEPAD_NAME};

// ── Section configs ──────────────────────────────────────────────────────────

/// Tree behaviour.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TreeConfig {
    /// Fetch a child count for every root group.
    pub show_decoration_counts: Option<bool>,
    /// Show owner avatars on starred and opened gists.
    pub use_owner_avatars: Option<bool>,
    /// Fetch gist counts for followed users.
    pub followed_user_counts: Option<bool>,
    /// Description of the reserved notepad gist.
    pub notepad_name: Option<String>,
}

/// Persisted key/value settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON state file. `None` falls back to the platform data directory.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub level: Option<String>,
}

// ── Top-level config ─────────────────────────────────────────────────────────

/// Top-level application configuration.
///
/// All fields are optional so that partial configs from different sources
/// can be merged together (CLI overrides file, file overrides defaults).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub tree: TreeConfig,
    pub storage: StorageConfig,
    pub log: LogConfig,
}

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const CONFIG_ENV_VAR: &str = "GIST_TREE_CONFIG";

// ── Config file locator ──────────────────────────────────────────────────────

/// Candidate config file paths in priority order. The `--config` path is
/// handled separately.
fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
        paths.push(PathBuf::from(env_path));
    }

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(".gist-tree.toml"));
    }

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("gist-tree").join("config.toml"));
    }

    paths
}

/// Read and parse a TOML config file. Missing files are skipped silently,
/// unparsable ones with a warning.
fn load_file(path: &Path) -> Option<AppConfig> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str::<AppConfig>(&content) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            warn!("skipping config file {}: {}", path.display(), e);
            None
        }
    }
}

// ── Merge logic ──────────────────────────────────────────────────────────────

impl AppConfig {
    /// Merge `other` on top of `self`; `other`'s `Some` values win.
    pub fn merge(self, other: &AppConfig) -> AppConfig {
        AppConfig {
            tree: TreeConfig {
                show_decoration_counts: other
                    .tree
                    .show_decoration_counts
                    .or(self.tree.show_decoration_counts),
                use_owner_avatars: other.tree.use_owner_avatars.or(self.tree.use_owner_avatars),
                followed_user_counts: other
                    .tree
                    .followed_user_counts
                    .or(self.tree.followed_user_counts),
                notepad_name: other
                    .tree
                    .notepad_name
                    .clone()
                    .or(self.tree.notepad_name),
            },
            storage: StorageConfig {
                path: other.storage.path.clone().or(self.storage.path),
            },
            log: LogConfig {
                level: other.log.level.clone().or(self.log.level),
            },
        }
    }

    /// Load the final merged configuration.
    ///
    /// `cli_config_path` is an explicit config file path from `--config`.
    /// `cli_overrides` are partial overrides derived from CLI flags.
    pub fn load(cli_config_path: Option<&Path>, cli_overrides: Option<&AppConfig>) -> AppConfig {
        let mut config = AppConfig::default();

        // Lowest priority first so later merges overwrite.
        for path in candidate_paths().iter().rev() {
            if let Some(file_cfg) = load_file(path) {
                config = config.merge(&file_cfg);
            }
        }

        if let Some(cli_path) = cli_config_path {
            if let Some(file_cfg) = load_file(cli_path) {
                config = config.merge(&file_cfg);
            }
        }

        if let Some(overrides) = cli_overrides {
            config = config.merge(overrides);
        }

        config
    }

    // ── Convenience getters with built-in defaults ──────────────────────────

    pub fn show_decoration_counts(&self) -> bool {
        self.tree.show_decoration_counts.unwrap_or(false)
    }

    pub fn use_owner_avatars(&self) -> bool {
        self.tree.use_owner_avatars.unwrap_or(false)
    }

    pub fn followed_user_counts(&self) -> bool {
        self.tree.followed_user_counts.unwrap_or(false)
    }

    pub fn notepad_name(&self) -> &str {
        self.tree
            .notepad_name
            .as_deref()
            .unwrap_or(DEFAULT_NOTEPAD_NAME)
    }

    pub fn log_level(&self) -> &str {
        self.log.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    /// State file path. `None` when neither the config nor the platform
    /// provides a data directory.
    pub fn storage_path(&self) -> Option<PathBuf> {
        self.storage
            .path
            .clone()
            .or_else(JsonFileStorage::default_path)
    }

    /// Project the `[tree]` section into synchronizer options.
    pub fn tree_options(&self) -> TreeOptions {
        TreeOptions {
            show_decoration_counts: self.show_decoration_counts(),
            use_owner_avatars: self.use_owner_avatars(),
            followed_user_counts: self.followed_user_counts(),
            notepad_name: self.notepad_name().to_string(),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
