//! Inbound message handling.
//!
//! A message is either a greeting command, a `.zip` document to convert, or
//! something we ignore. Archive runs download into a fresh [`RunWorkspace`],
//! run the media pipeline on a blocking thread, upload every output file as
//! a reply and remove the workspace afterwards, whatever the outcome.

use std::path::Path;

use {
    heicbot_media::{
        PipelineError, PipelineOutput, RunWorkspace, Stage, archive::is_archive_name,
        process_archive,
    },
    teloxide::{
        prelude::*,
        types::{ChatId, MessageId},
    },
    tokio::io::AsyncWriteExt,
    tracing::{debug, error, info, warn},
};

use crate::{
    error::{Error, Result},
    state::BotContext,
};

/// Reply to `/start` and `/help`.
pub const USAGE_TEXT: &str =
    "Send me a .zip file containing HEIC images, and I'll convert them to PNG!";

/// A `.zip` document attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveAttachment {
    pub file_id: String,
    pub file_name: String,
    pub size: u32,
}

/// What an inbound message asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Greeting,
    Archive(ArchiveAttachment),
    Ignored,
}

/// Decide how to treat a message. Documents win over text, so a `.zip` sent
/// with a `/start` caption is still converted.
#[must_use]
pub fn classify(msg: &Message, bot_username: Option<&str>) -> Inbound {
    if let Some(doc) = msg.document() {
        return match doc.file_name.as_deref().filter(|name| is_archive_name(name)) {
            Some(name) => Inbound::Archive(ArchiveAttachment {
                file_id: doc.file.id.clone(),
                file_name: name.to_string(),
                size: doc.file.size,
            }),
            None => Inbound::Ignored,
        };
    }
    match msg.text() {
        Some(text) if is_greeting_command(text, bot_username) => Inbound::Greeting,
        _ => Inbound::Ignored,
    }
}

/// `/start`, `/help`, or either addressed to us as `/help@our_bot`.
fn is_greeting_command(text: &str, bot_username: Option<&str>) -> bool {
    let Some(command) = text
        .split_whitespace()
        .next()
        .and_then(|word| word.strip_prefix('/'))
    else {
        return false;
    };
    let (name, target) = match command.split_once('@') {
        Some((name, target)) => (name, Some(target)),
        None => (command, None),
    };
    let addressed_to_us = match (target, bot_username) {
        (Some(target), Some(username)) => target.eq_ignore_ascii_case(username),
        _ => true,
    };
    addressed_to_us && matches!(name, "start" | "help")
}

/// Handle one inbound message to completion.
pub async fn handle_message(msg: Message, ctx: &BotContext) -> anyhow::Result<()> {
    let chat_id = msg.chat.id;
    match classify(&msg, ctx.bot_username.as_deref()) {
        Inbound::Greeting => {
            ctx.outbound
                .send_text(chat_id, USAGE_TEXT, Some(msg.id))
                .await?;
        },
        Inbound::Archive(attachment) => {
            process_upload(ctx, chat_id, msg.id, attachment).await;
        },
        Inbound::Ignored => {
            debug!(chat_id = chat_id.0, "ignoring message without a zip document");
        },
    }
    Ok(())
}

/// Why an archive run stopped early.
#[derive(Debug, thiserror::Error)]
enum RunFailure {
    #[error("download failed: {0}")]
    Download(#[source] Error),
    #[error(transparent)]
    Pipeline(PipelineError),
    #[error("upload failed after {delivered} of {total} files: {source}")]
    Upload {
        delivered: usize,
        total: usize,
        #[source]
        source: Error,
    },
    #[error("pipeline task failed: {0}")]
    Internal(#[source] tokio::task::JoinError),
}

impl RunFailure {
    fn stage(&self) -> &'static str {
        match self {
            Self::Download(_) => "download",
            Self::Pipeline(e) => match e.stage {
                Stage::Extract => "extract",
                Stage::Convert => "convert",
                Stage::Archive => "archive",
                Stage::Split => "split",
            },
            Self::Upload { .. } => "upload",
            Self::Internal(_) => "internal",
        }
    }

    /// Short explanation for the user. Never includes host paths.
    fn user_message(&self, file_name: &str) -> String {
        match self {
            Self::Download(_) => format!("Could not download {file_name}."),
            Self::Pipeline(e) => match (e.stage, &e.source) {
                (Stage::Extract, _) => format!("{file_name} is not a readable ZIP archive."),
                (Stage::Convert, heicbot_media::Error::Conversion { file, .. }) => {
                    format!("Could not convert {file}, so no images were sent.")
                },
                (Stage::Convert, _) => {
                    format!("Could not convert the images in {file_name}, so nothing was sent.")
                },
                (Stage::Archive | Stage::Split, _) => internal_error_text(file_name),
            },
            Self::Upload {
                delivered, total, ..
            } => format!("Upload failed: {delivered} of {total} files were delivered."),
            Self::Internal(_) => internal_error_text(file_name),
        }
    }
}

fn internal_error_text(file_name: &str) -> String {
    format!("Something went wrong while processing {file_name}. Please try again later.")
}

/// Run the full archive flow for one attachment. Failures are reported to
/// the user and logged, never propagated.
async fn process_upload(
    ctx: &BotContext,
    chat_id: ChatId,
    message_id: MessageId,
    attachment: ArchiveAttachment,
) {
    let file_name = attachment.file_name.clone();
    notify(ctx, chat_id, message_id, "Downloading ZIP file...").await;

    let storage = &ctx.config.storage;
    let workspace = match RunWorkspace::create(&storage.download_dir, &storage.output_dir) {
        Ok(workspace) => workspace,
        Err(e) => {
            error!(chat_id = chat_id.0, error = %e, "failed to allocate run workspace");
            notify(ctx, chat_id, message_id, &internal_error_text(&file_name)).await;
            return;
        },
    };
    let run_id = workspace.id();
    info!(
        %run_id,
        chat_id = chat_id.0,
        file_name = %file_name,
        size = attachment.size,
        "archive run started"
    );

    let (workspace, outcome) = run(ctx, chat_id, message_id, &attachment, workspace).await;
    match outcome {
        Ok(0) => info!(%run_id, "archive run finished without output"),
        Ok(delivered) => info!(%run_id, delivered, "archive run finished"),
        Err(failure) => {
            warn!(
                %run_id,
                chat_id = chat_id.0,
                stage = failure.stage(),
                error = %failure,
                "archive run failed"
            );
            notify(ctx, chat_id, message_id, &failure.user_message(&file_name)).await;
        },
    }

    if let Some(workspace) = workspace
        && let Err(e) = workspace.close()
    {
        warn!(%run_id, error = %e, "failed to remove run workspace");
    }
}

/// Download, convert and deliver. Returns the workspace back (unless the
/// blocking task lost it) together with the number of delivered files.
async fn run(
    ctx: &BotContext,
    chat_id: ChatId,
    message_id: MessageId,
    attachment: &ArchiveAttachment,
    workspace: RunWorkspace,
) -> (Option<RunWorkspace>, std::result::Result<usize, RunFailure>) {
    let input = workspace.download_path(&attachment.file_name);
    if let Err(e) = download_telegram_file(&ctx.bot, &attachment.file_id, &input).await {
        return (Some(workspace), Err(RunFailure::Download(e)));
    }
    notify(ctx, chat_id, message_id, "ZIP downloaded, processing...").await;

    let decoder = ctx.decoder.clone();
    let options = ctx.pipeline_options();
    let joined = tokio::task::spawn_blocking(move || {
        let result = process_archive(&input, &workspace, &*decoder, &options);
        (workspace, result)
    })
    .await;
    let (workspace, output) = match joined {
        Ok((workspace, Ok(output))) => (workspace, output),
        Ok((workspace, Err(e))) => return (Some(workspace), Err(RunFailure::Pipeline(e))),
        Err(e) => return (None, Err(RunFailure::Internal(e))),
    };

    if output.parts.is_empty() {
        let text = format!("No HEIC images found in {}.", attachment.file_name);
        notify(ctx, chat_id, message_id, &text).await;
        return (Some(workspace), Ok(0));
    }
    notify(ctx, chat_id, message_id, "Images converted, checking file size...").await;
    if output.split {
        let text = format!(
            "The archive is larger than {} MB and will be sent in {} parts.",
            ctx.config.conversion.max_part_size_mb,
            output.parts.len()
        );
        notify(ctx, chat_id, message_id, &text).await;
    }

    let delivered = deliver(ctx, chat_id, message_id, &output).await;
    (Some(workspace), delivered)
}

/// Upload every output file in order, deleting each once it is sent.
async fn deliver(
    ctx: &BotContext,
    chat_id: ChatId,
    message_id: MessageId,
    output: &PipelineOutput,
) -> std::result::Result<usize, RunFailure> {
    let total = output.parts.len();
    let archive_name = format!("{}.zip", ctx.config.conversion.archive_name);

    for (index, part) in output.parts.iter().enumerate() {
        let name = display_name(part);
        notify(ctx, chat_id, message_id, &format!("Uploading {name}...")).await;

        let caption = output
            .split
            .then(|| part_caption(index + 1, total, &archive_name));
        if let Err(source) = ctx
            .outbound
            .send_document(chat_id, part, caption.as_deref(), Some(message_id))
            .await
        {
            return Err(RunFailure::Upload {
                delivered: index,
                total,
                source,
            });
        }

        if let Err(e) = tokio::fs::remove_file(part).await {
            warn!(path = %part.display(), error = %e, "failed to remove uploaded file");
        }
    }
    Ok(total)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Parts are raw byte ranges, so every caption says how to rebuild the
/// archive.
fn part_caption(number: usize, total: usize, archive_name: &str) -> String {
    format!(
        "Part {number} of {total}. This is not a ZIP on its own: concatenate parts 1 to {total} \
         in order to rebuild {archive_name} (e.g. `heicbot join`)."
    )
}

/// Progress message; failures are logged and do not stop the run.
async fn notify(ctx: &BotContext, chat_id: ChatId, message_id: MessageId, text: &str) {
    if let Err(e) = ctx.outbound.send_text(chat_id, text, Some(message_id)).await {
        warn!(chat_id = chat_id.0, error = %e, "failed to send progress message");
    }
}

/// Fetch a Telegram file into `dest`. Returns the number of bytes written.
///
/// A Bot API server in `--local` mode answers `getFile` with an absolute
/// path on its own disk, which is copied directly. Relative paths are
/// streamed over HTTP.
pub async fn download_telegram_file(bot: &Bot, file_id: &str, dest: &Path) -> Result<u64> {
    let file = bot.get_file(file_id).await?;

    // Local paths contain the bot token, so they stay out of errors and logs.
    let local = Path::new(&file.path);
    if local.is_absolute() {
        let written = tokio::fs::copy(local, dest)
            .await
            .map_err(|e| Error::io("failed to copy file from the local Bot API server", e))?;
        debug!(path = %dest.display(), bytes = written, "telegram file copied");
        return Ok(written);
    }

    // Files live at <api_url>/file/bot<token>/<file_path>.
    let url = bot
        .api_url()
        .join(&format!("file/bot{}/{}", bot.token(), file.path))
        .map_err(|e| Error::message(format!("invalid file url: {e}")))?;

    let mut response = reqwest::get(url).await.map_err(Error::http)?;
    if !response.status().is_success() {
        return Err(Error::message(format!(
            "failed to download file: HTTP {}",
            response.status()
        )));
    }

    let mut out = tokio::fs::File::create(dest)
        .await
        .map_err(|e| Error::io(format!("failed to create {}", dest.display()), e))?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await.map_err(Error::http)? {
        out.write_all(&chunk)
            .await
            .map_err(|e| Error::io(format!("failed to write {}", dest.display()), e))?;
        written += chunk.len() as u64;
    }
    out.flush()
        .await
        .map_err(|e| Error::io(format!("failed to write {}", dest.display()), e))?;

    debug!(path = %dest.display(), bytes = written, "telegram file downloaded");
    Ok(written)
}
