use std::{future::Future, path::Path, time::Duration};

use {
    teloxide::{
        RequestError,
        payloads::{SendDocumentSetters, SendMessageSetters},
        prelude::*,
        types::{ChatId, InputFile, MessageId, ReplyParameters},
    },
    tracing::{debug, info, warn},
};

use crate::error::Result;

const TELEGRAM_RETRY_AFTER_MAX_RETRIES: usize = 4;

/// Outbound replies for a single bot.
#[derive(Clone)]
pub struct TelegramOutbound {
    bot: Bot,
}

impl TelegramOutbound {
    #[must_use]
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Send a plain text message, optionally as a reply.
    pub async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId> {
        let reply_params = reply_to.map(reply_params);
        let message = run_telegram_request_with_retry(chat_id, "send message", || {
            let mut req = self.bot.send_message(chat_id, text);
            if let Some(rp) = &reply_params {
                req = req.reply_parameters(rp.clone());
            }
            async move { req.await }
        })
        .await?;
        debug!(chat_id = chat_id.0, text_len = text.len(), "telegram text sent");
        Ok(message.id)
    }

    /// Upload the file at `path` as a document. The file is re-read on every
    /// retry.
    pub async fn send_document(
        &self,
        chat_id: ChatId,
        path: &Path,
        caption: Option<&str>,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId> {
        let reply_params = reply_to.map(reply_params);
        let message = run_telegram_request_with_retry(chat_id, "send document", || {
            let mut req = self
                .bot
                .send_document(chat_id, InputFile::file(path.to_path_buf()));
            if let Some(caption) = caption {
                req = req.caption(caption);
            }
            if let Some(rp) = &reply_params {
                req = req.reply_parameters(rp.clone());
            }
            async move { req.await }
        })
        .await?;
        info!(
            chat_id = chat_id.0,
            path = %path.display(),
            "telegram document sent"
        );
        Ok(message.id)
    }
}

fn reply_params(message_id: MessageId) -> ReplyParameters {
    ReplyParameters::new(message_id).allow_sending_without_reply()
}

async fn run_telegram_request_with_retry<T, F, Fut>(
    chat_id: ChatId,
    operation: &'static str,
    mut request: F,
) -> std::result::Result<T, RequestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, RequestError>>,
{
    let mut retries = 0usize;

    loop {
        match request().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let Some(wait) = retry_after_duration(&err) else {
                    return Err(err);
                };

                if retries >= TELEGRAM_RETRY_AFTER_MAX_RETRIES {
                    warn!(
                        chat_id = chat_id.0,
                        operation,
                        retries,
                        max_retries = TELEGRAM_RETRY_AFTER_MAX_RETRIES,
                        retry_after_secs = wait.as_secs(),
                        "telegram rate limit persisted after retries"
                    );
                    return Err(err);
                }

                retries += 1;
                warn!(
                    chat_id = chat_id.0,
                    operation,
                    retries,
                    max_retries = TELEGRAM_RETRY_AFTER_MAX_RETRIES,
                    retry_after_secs = wait.as_secs(),
                    "telegram rate limited, waiting before retry"
                );
                tokio::time::sleep(wait).await;
            },
        }
    }
}

fn retry_after_duration(error: &RequestError) -> Option<Duration> {
    match error {
        RequestError::RetryAfter(wait) => Some(wait.duration()),
        _ => None,
    }
}
