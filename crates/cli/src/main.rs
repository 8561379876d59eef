mod convert_commands;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    clap::{Parser, Subcommand},
    heicbot_config::HeicbotConfig,
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "heicbot", about = "heicbot: HEIC to PNG converter for Telegram")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (default: ./heicbot.toml, then ~/.config/heicbot/heicbot.toml).
    #[arg(long, global = true, env = "HEICBOT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Telegram bot (default when no subcommand is provided).
    Run,
    /// Convert a local ZIP archive without Telegram.
    Convert {
        /// ZIP archive containing HEIC images.
        archive: PathBuf,
        /// Where to write the result (overrides storage.output_dir).
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Split threshold in megabytes (overrides conversion.max_part_size_mb).
        #[arg(long)]
        max_part_size_mb: Option<u64>,
    },
    /// Concatenate `<name>_partN.zip` files back into one archive.
    Join {
        /// Parts in order.
        #[arg(required = true)]
        parts: Vec<PathBuf>,
        /// Output archive path.
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// File and environment settings without credential checks, for the
/// offline commands.
fn offline_config(path: Option<&Path>) -> anyhow::Result<HeicbotConfig> {
    let config = match path {
        Some(path) => heicbot_config::load_config(path)?,
        None => heicbot_config::discover_and_load(),
    };
    Ok(heicbot_config::apply_env_overrides(config)?)
}

async fn run_bot(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = Arc::new(heicbot_config::load(config_path)?);
    let decoder = heicbot_media::default_decoder();
    let cancel = heicbot_telegram::start_polling(config, decoder).await?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("shutdown requested");
            cancel.cancel();
            Ok(())
        },
        () = cancel.cancelled() => {
            warn!("telegram polling stopped");
            anyhow::bail!("another instance is already polling with this bot token")
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "heicbot starting");

    match cli.command {
        None | Some(Commands::Run) => run_bot(cli.config.as_deref()).await,
        Some(Commands::Convert {
            archive,
            output_dir,
            max_part_size_mb,
        }) => {
            let config = offline_config(cli.config.as_deref())?;
            convert_commands::handle_convert(config, archive, output_dir, max_part_size_mb).await
        },
        Some(Commands::Join { parts, output }) => convert_commands::handle_join(&parts, &output),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_runs_the_bot() {
        let cli = Cli::try_parse_from(["heicbot", "--log-level", "debug"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level, "debug");
    }

    #[test]
    fn convert_accepts_overrides() {
        let cli = Cli::try_parse_from([
            "heicbot",
            "convert",
            "photos.zip",
            "--output-dir",
            "out",
            "--max-part-size-mb",
            "49",
        ])
        .unwrap();
        let Some(Commands::Convert {
            archive,
            output_dir,
            max_part_size_mb,
        }) = cli.command
        else {
            panic!("expected convert command");
        };
        assert_eq!(archive, PathBuf::from("photos.zip"));
        assert_eq!(output_dir, Some(PathBuf::from("out")));
        assert_eq!(max_part_size_mb, Some(49));
    }

    #[test]
    fn join_requires_parts_and_output() {
        assert!(Cli::try_parse_from(["heicbot", "join", "--output", "a.zip"]).is_err());
        assert!(Cli::try_parse_from(["heicbot", "join", "a_part1.zip"]).is_err());

        let cli =
            Cli::try_parse_from(["heicbot", "join", "a_part1.zip", "a_part2.zip", "-o", "a.zip"])
                .unwrap();
        let Some(Commands::Join { parts, output }) = cli.command else {
            panic!("expected join command");
        };
        assert_eq!(parts.len(), 2);
        assert_eq!(output, PathBuf::from("a.zip"));
    }
}
