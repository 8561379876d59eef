use std::{sync::Arc, time::Duration};

use {
    anyhow::Context,
    heicbot_config::HeicbotConfig,
    heicbot_media::{HeicDecoder, workspace::ensure_roots},
    secrecy::ExposeSecret,
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, BotCommand, UpdateKind},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{
    handlers,
    outbound::TelegramOutbound,
    state::{BotContext, SharedContext},
};

/// Added to the long-polling timeout so `getUpdates` returns before the
/// client gives up.
const POLL_TIMEOUT_MARGIN: Duration = Duration::from_secs(15);
/// Total limit for one `sendDocument`; parts can be up to 2000 MB.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60 * 60);
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Build the Bot API client used for polling and short requests, pointing it
/// at a self-hosted server when `telegram.api_url` is set.
pub fn build_bot(config: &HeicbotConfig) -> anyhow::Result<Bot> {
    let poll_timeout = Duration::from_secs(u64::from(config.telegram.poll_timeout_secs));
    build_bot_with_timeout(config, poll_timeout + POLL_TIMEOUT_MARGIN)
}

/// Same as [`build_bot`] but with a request timeout long enough for large
/// document uploads.
pub fn build_upload_bot(config: &HeicbotConfig) -> anyhow::Result<Bot> {
    build_bot_with_timeout(config, UPLOAD_TIMEOUT)
}

fn build_bot_with_timeout(config: &HeicbotConfig, timeout: Duration) -> anyhow::Result<Bot> {
    let telegram = &config.telegram;
    let client = teloxide::net::default_reqwest_settings()
        .timeout(timeout)
        .build()?;
    let bot = Bot::with_client(telegram.bot_token.expose_secret(), client);

    match telegram.api_url.as_deref() {
        Some(raw) => {
            let url = reqwest::Url::parse(raw)
                .with_context(|| format!("invalid telegram.api_url {raw:?}"))?;
            Ok(bot.set_api_url(url))
        },
        None => Ok(bot),
    }
}

/// Connect the bot and start polling.
///
/// Spawns a background task that processes updates until the returned
/// `CancellationToken` is cancelled. Each message gets its own task.
pub async fn start_polling(
    config: Arc<HeicbotConfig>,
    decoder: Arc<dyn HeicDecoder>,
) -> anyhow::Result<CancellationToken> {
    let bot = build_bot(&config)?;
    let upload_bot = build_upload_bot(&config)?;

    // Verify credentials and get bot username.
    let me = bot.get_me().await.context("telegram getMe failed")?;
    let bot_username = me.username.clone();

    // Delete any existing webhook so long polling works.
    bot.delete_webhook().send().await?;

    let commands = vec![
        BotCommand::new("start", "How to use this bot"),
        BotCommand::new("help", "How to use this bot"),
    ];
    if let Err(e) = bot.set_my_commands(commands).await {
        warn!("failed to register bot commands: {e}");
    }

    ensure_roots(&config.storage.download_dir, &config.storage.output_dir)?;

    info!(
        username = ?bot_username,
        api_url = %bot.api_url(),
        download_dir = %config.storage.download_dir.display(),
        output_dir = %config.storage.output_dir.display(),
        "telegram bot connected (webhook cleared)"
    );

    let poll_timeout = config.telegram.poll_timeout_secs;
    let ctx: SharedContext = Arc::new(
        BotContext::new(bot.clone(), bot_username, config, decoder)
            .with_outbound(TelegramOutbound::new(upload_bot)),
    );
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();

    tokio::spawn(async move {
        info!("starting telegram manual polling loop");
        let mut offset: i32 = 0;

        loop {
            let result = tokio::select! {
                () = cancel_clone.cancelled() => {
                    info!("telegram polling stopped");
                    break;
                },
                result = bot
                    .get_updates()
                    .offset(offset)
                    .timeout(poll_timeout)
                    .allowed_updates(vec![AllowedUpdate::Message])
                    .send() => result,
            };

            match result {
                Ok(updates) => {
                    debug!(count = updates.len(), "got telegram updates");
                    for update in updates {
                        offset = update.id.as_offset();
                        match update.kind {
                            UpdateKind::Message(msg) => {
                                debug!(chat_id = msg.chat.id.0, "received telegram message");
                                let ctx = Arc::clone(&ctx);
                                tokio::spawn(async move {
                                    let chat_id = msg.chat.id.0;
                                    if let Err(e) = handlers::handle_message(msg, &ctx).await {
                                        error!(
                                            chat_id,
                                            error = %e,
                                            "error handling telegram message"
                                        );
                                    }
                                });
                            },
                            other => {
                                debug!("ignoring non-message update: {other:?}");
                            },
                        }
                    }
                },
                Err(e) => {
                    // Another instance is polling with the same token.
                    if matches!(&e, RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) {
                        warn!(
                            "telegram polling disabled: another instance is already running with this token"
                        );
                        cancel_clone.cancel();
                        break;
                    }

                    warn!(error = %e, "telegram getUpdates failed");
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                },
            }
        }
    });

    Ok(cancel)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::Secret};

    fn config_with_url(url: Option<&str>) -> HeicbotConfig {
        let mut config = HeicbotConfig::default();
        config.telegram.bot_token = Secret::new("123:ABC".into());
        config.telegram.api_url = url.map(str::to_string);
        config
    }

    #[test]
    fn build_bot_uses_public_api_by_default() {
        let bot = build_bot(&config_with_url(None)).unwrap();
        assert_eq!(bot.api_url().host_str(), Some("api.telegram.org"));
        assert_eq!(bot.token(), "123:ABC");
    }

    #[test]
    fn build_bot_honours_custom_api_url() {
        let bot = build_bot(&config_with_url(Some("http://localhost:8081"))).unwrap();
        assert_eq!(bot.api_url().as_str(), "http://localhost:8081/");
    }

    #[test]
    fn upload_bot_shares_token_and_api_url() {
        let config = config_with_url(Some("http://localhost:8081"));
        let bot = build_upload_bot(&config).unwrap();
        assert_eq!(bot.api_url().as_str(), "http://localhost:8081/");
        assert_eq!(bot.token(), "123:ABC");
    }

    #[test]
    fn build_bot_rejects_invalid_api_url() {
        let err = build_bot(&config_with_url(Some("not a url"))).unwrap_err();
        assert!(err.to_string().contains("telegram.api_url"));
    }
}
