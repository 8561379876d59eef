//! Telegram front end for the HEIC converter.
//!
//! Long-polls the Bot API with teloxide, answers greeting commands, and runs
//! the media pipeline for every `.zip` document it receives.

pub mod bot;
pub mod error;
pub mod handlers;
pub mod outbound;
pub mod state;

pub use {
    bot::{build_bot, build_upload_bot, start_polling},
    error::{Error, Result},
    handlers::{Inbound, classify, handle_message},
    outbound::TelegramOutbound,
    state::{BotContext, SharedContext},
};
