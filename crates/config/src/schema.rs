use std::path::PathBuf;

use {
    heicbot_media::pipeline::DEFAULT_ARCHIVE_NAME,
    secrecy::Secret,
    serde::Deserialize,
};

pub use heicbot_media::split::DEFAULT_MAX_PART_SIZE_MB;

/// Root configuration, read once at startup and shared immutably.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HeicbotConfig {
    pub telegram: TelegramConfig,
    pub storage: StorageConfig,
    pub conversion: ConversionConfig,
}

/// Telegram transport credentials and connection settings.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Application id (`API_ID`).
    pub api_id: Option<i64>,

    /// Application hash (`API_HASH`).
    pub api_hash: Secret<String>,

    /// Bot token from @BotFather (`BOT_TOKEN`).
    pub bot_token: Secret<String>,

    /// Persisted session string (`STRING_SESSION`). Bot API sessions are
    /// stateless, so this is accepted but never sent anywhere.
    pub session: Option<Secret<String>>,

    /// Bot API base URL. Defaults to the public API, which accepts uploads
    /// up to 50 MB. A self-hosted `telegram-bot-api --local` server accepts
    /// up to 2000 MB and hands out files as paths on its own disk, so it
    /// must share a filesystem with the bot.
    pub api_url: Option<String>,

    /// Long-polling timeout passed to `getUpdates`, in seconds.
    pub poll_timeout_secs: u32,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("api_id", &self.api_id)
            .field("api_hash", &"[REDACTED]")
            .field("bot_token", &"[REDACTED]")
            .field("session", &self.session.as_ref().map(|_| "[REDACTED]"))
            .field("api_url", &self.api_url)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish()
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_id: None,
            api_hash: Secret::new(String::new()),
            bot_token: Secret::new(String::new()),
            session: None,
            api_url: None,
            poll_timeout_secs: 30,
        }
    }
}

/// Working directory roots. Each run creates its own subdirectories.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub download_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
            output_dir: PathBuf::from("converted"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Output archives larger than this are split into parts.
    pub max_part_size_mb: u64,
    /// Base name of the returned archive, without `.zip`.
    pub archive_name: String,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            max_part_size_mb: DEFAULT_MAX_PART_SIZE_MB,
            archive_name: DEFAULT_ARCHIVE_NAME.into(),
        }
    }
}
