use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{
    error::{Error, Result},
    schema::HeicbotConfig,
    validate::validate,
};

/// Config file name, searched in `./` then `~/.config/heicbot/`.
pub const CONFIG_FILENAME: &str = "heicbot.toml";

/// Environment variables read on top of the config file.
pub mod env {
    pub const API_ID: &str = "API_ID";
    pub const API_HASH: &str = "API_HASH";
    pub const BOT_TOKEN: &str = "BOT_TOKEN";
    pub const STRING_SESSION: &str = "STRING_SESSION";
    pub const API_URL: &str = "HEICBOT_API_URL";
    pub const DOWNLOAD_DIR: &str = "HEICBOT_DOWNLOAD_DIR";
    pub const OUTPUT_DIR: &str = "HEICBOT_OUTPUT_DIR";
    pub const MAX_PART_SIZE_MB: &str = "HEICBOT_MAX_PART_SIZE_MB";
}

/// Load config from the given TOML file.
pub fn load_config(path: &Path) -> Result<HeicbotConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Discover and load config from standard locations.
///
/// Returns `HeicbotConfig::default()` if no file is found or it cannot be
/// parsed.
pub fn discover_and_load() -> HeicbotConfig {
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
    HeicbotConfig::default()
}

fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILENAME);
    if local.exists() {
        return Some(local);
    }
    config_dir()
        .map(|dir| dir.join(CONFIG_FILENAME))
        .filter(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/heicbot/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "heicbot").map(|d| d.config_dir().to_path_buf())
}

/// Overlay process environment variables onto `config`.
pub fn apply_env_overrides(config: HeicbotConfig) -> Result<HeicbotConfig> {
    apply_env_overrides_with(config, |name| std::env::var(name).ok())
}

/// Overlay variables from `lookup` onto `config`. Empty values count as unset.
fn apply_env_overrides_with(
    mut config: HeicbotConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<HeicbotConfig> {
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(raw) = get(env::API_ID) {
        let id = raw.trim().parse::<i64>().map_err(|e| Error::InvalidEnv {
            name: env::API_ID,
            message: format!("{raw:?} is not an integer ({e})"),
        })?;
        config.telegram.api_id = Some(id);
    }
    if let Some(hash) = get(env::API_HASH) {
        config.telegram.api_hash = Secret::new(hash);
    }
    if let Some(token) = get(env::BOT_TOKEN) {
        config.telegram.bot_token = Secret::new(token);
    }
    if let Some(session) = get(env::STRING_SESSION) {
        config.telegram.session = Some(Secret::new(session));
    }
    if let Some(url) = get(env::API_URL) {
        config.telegram.api_url = Some(url);
    }
    if let Some(dir) = get(env::DOWNLOAD_DIR) {
        config.storage.download_dir = PathBuf::from(dir);
    }
    if let Some(dir) = get(env::OUTPUT_DIR) {
        config.storage.output_dir = PathBuf::from(dir);
    }
    if let Some(raw) = get(env::MAX_PART_SIZE_MB) {
        config.conversion.max_part_size_mb =
            raw.trim().parse().map_err(|e| Error::InvalidEnv {
                name: env::MAX_PART_SIZE_MB,
                message: format!("{raw:?} is not a size in megabytes ({e})"),
            })?;
    }

    Ok(config)
}

/// Load the effective startup configuration.
///
/// An explicit `path` must exist and parse; otherwise standard locations are
/// searched. Environment overrides are applied last, then the result is
/// validated: errors abort, warnings are logged.
pub fn load(path: Option<&Path>) -> Result<HeicbotConfig> {
    let config = match path {
        Some(path) => load_config(path)?,
        None => discover_and_load(),
    };
    let config = apply_env_overrides(config)?;
    check(config)
}

fn check(config: HeicbotConfig) -> Result<HeicbotConfig> {
    let result = validate(&config);
    for diagnostic in result.warnings() {
        warn!(path = diagnostic.path, "{}", diagnostic.message);
    }
    if result.has_errors() {
        return Err(Error::Invalid(result.errors().cloned().collect()));
    }
    Ok(config)
}
