use std::path::{Path, PathBuf};

use {
    anonka_common::UserId,
    tracing::{debug, warn},
};

use crate::{env_subst::substitute_env, schema::AnonkaConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["anonka.toml", "anonka.yaml", "anonka.yml", "anonka.json"];

const TOKEN_ENV: &str = "ANONKA_TELEGRAM_TOKEN";
const OPERATOR_ENV: &str = "ANONKA_OPERATOR_ID";

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<AnonkaConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./anonka.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/anonka/anonka.{toml,yaml,yml,json}` (user-global)
///
/// Returns `AnonkaConfig::default()` if no config file is found.
pub fn discover_and_load() -> AnonkaConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    AnonkaConfig::default()
}

/// Apply `ANONKA_*` environment overrides on top of a loaded config.
pub fn apply_env_overrides(config: &mut AnonkaConfig) {
    apply_overrides_with(config, |name| std::env::var(name).ok());
}

fn apply_overrides_with(config: &mut AnonkaConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(token) = lookup(TOKEN_ENV).filter(|t| !t.trim().is_empty()) {
        let telegram = config
            .channels
            .telegram
            .get_or_insert_with(|| serde_json::json!({}));
        if let Some(map) = telegram.as_object_mut() {
            map.insert("token".into(), serde_json::Value::String(token));
        } else {
            warn!("channels.telegram is not a table, ignoring {TOKEN_ENV}");
        }
    }

    if let Some(raw) = lookup(OPERATOR_ENV) {
        match raw.parse::<UserId>() {
            Ok(id) => config.relay.operator = Some(id),
            Err(e) => warn!(error = %e, "ignoring {OPERATOR_ENV}"),
        }
    }
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let config_dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| config_dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/anonka/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "anonka").map(|d| d.config_dir().to_path_buf())
}

/// Returns the user data directory, falling back to `./` when no home exists.
pub fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "anonka")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Database location when `[database] path` is unset.
pub fn default_database_path() -> PathBuf {
    data_dir().join("anonka.db")
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<AnonkaConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
