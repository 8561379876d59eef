//! Configuration loading and validation.
//!
//! Sources, lowest precedence first: built-in defaults, `heicbot.toml`
//! (in `./` or `~/.config/heicbot/`, or an explicit path), then environment
//! variables (`API_ID`, `API_HASH`, `BOT_TOKEN`, `STRING_SESSION` and the
//! `HEICBOT_*` overrides).

pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{apply_env_overrides, config_dir, discover_and_load, load, load_config},
    schema::{ConversionConfig, HeicbotConfig, StorageConfig, TelegramConfig},
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
