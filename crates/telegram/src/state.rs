use std::sync::Arc;

use {
    heicbot_config::HeicbotConfig,
    heicbot_media::{HeicDecoder, PipelineOptions},
};

use crate::outbound::TelegramOutbound;

/// Handle shared by the polling loop and every message task.
pub type SharedContext = Arc<BotContext>;

/// Runtime state for one connected bot.
pub struct BotContext {
    pub bot: teloxide::Bot,
    pub bot_username: Option<String>,
    pub config: Arc<HeicbotConfig>,
    pub decoder: Arc<dyn HeicDecoder>,
    pub outbound: TelegramOutbound,
}

impl BotContext {
    #[must_use]
    pub fn new(
        bot: teloxide::Bot,
        bot_username: Option<String>,
        config: Arc<HeicbotConfig>,
        decoder: Arc<dyn HeicDecoder>,
    ) -> Self {
        let outbound = TelegramOutbound::new(bot.clone());
        Self {
            bot,
            bot_username,
            config,
            decoder,
            outbound,
        }
    }

    /// Send replies through a different client, e.g. one with a longer
    /// timeout for uploads.
    #[must_use]
    pub fn with_outbound(mut self, outbound: TelegramOutbound) -> Self {
        self.outbound = outbound;
        self
    }

    #[must_use]
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            archive_name: self.config.conversion.archive_name.clone(),
            max_part_size_mb: self.config.conversion.max_part_size_mb,
        }
    }
}
