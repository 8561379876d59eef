//! Semantic checks on a loaded configuration.
//!
//! Missing transport credentials are errors; settings that are accepted but
//! have no effect, or that Telegram will reject later, are warnings.

use std::fmt;

use secrecy::ExposeSecret;

use crate::schema::HeicbotConfig;

/// Largest document a self-hosted Bot API server in `--local` mode accepts.
pub const TELEGRAM_MAX_UPLOAD_MB: u64 = 2000;

/// Largest document the public Bot API accepts.
pub const PUBLIC_API_MAX_UPLOAD_MB: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "telegram.api_id".
    pub path: &'static str,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.severity, self.path, self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    fn error(&mut self, path: &'static str, message: impl Into<String>) {
        self.push(Severity::Error, path, message);
    }

    fn warning(&mut self, path: &'static str, message: impl Into<String>) {
        self.push(Severity::Warning, path, message);
    }

    fn push(&mut self, severity: Severity, path: &'static str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path,
            message: message.into(),
        });
    }
}

/// Check credentials and conversion settings.
#[must_use]
pub fn validate(config: &HeicbotConfig) -> ValidationResult {
    let mut result = ValidationResult::default();
    let telegram = &config.telegram;

    match telegram.api_id {
        None => result.error("telegram.api_id", "API_ID is not set"),
        Some(id) if id <= 0 => {
            result.error("telegram.api_id", format!("API_ID must be positive, got {id}"));
        },
        Some(_) => {},
    }
    if telegram.api_hash.expose_secret().trim().is_empty() {
        result.error("telegram.api_hash", "API_HASH is not set");
    }
    if telegram.bot_token.expose_secret().trim().is_empty() {
        result.error("telegram.bot_token", "BOT_TOKEN is not set");
    }
    if telegram.session.is_some() {
        result.warning(
            "telegram.session",
            "STRING_SESSION is ignored: Bot API sessions are stateless",
        );
    }
    if telegram.poll_timeout_secs == 0 {
        result.warning(
            "telegram.poll_timeout_secs",
            "0 disables long polling and busy-loops getUpdates",
        );
    }

    let conversion = &config.conversion;
    if conversion.max_part_size_mb == 0 {
        result.error("conversion.max_part_size_mb", "must be greater than zero");
    } else if conversion.max_part_size_mb > TELEGRAM_MAX_UPLOAD_MB {
        result.warning(
            "conversion.max_part_size_mb",
            format!(
                "{} MB exceeds Telegram's {TELEGRAM_MAX_UPLOAD_MB} MB upload limit",
                conversion.max_part_size_mb
            ),
        );
    } else if telegram.api_url.is_none() && conversion.max_part_size_mb > PUBLIC_API_MAX_UPLOAD_MB
    {
        result.warning(
            "conversion.max_part_size_mb",
            format!(
                "{} MB exceeds the public Bot API's {PUBLIC_API_MAX_UPLOAD_MB} MB upload limit; \
                 set telegram.api_url to a local Bot API server or lower the part size",
                conversion.max_part_size_mb
            ),
        );
    }
    let name = conversion.archive_name.trim();
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        result.error(
            "conversion.archive_name",
            format!("{:?} is not a plain file name", conversion.archive_name),
        );
    }

    result
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::schema::{ConversionConfig, TelegramConfig},
        rstest::rstest,
        secrecy::Secret,
    };

    fn valid() -> HeicbotConfig {
        HeicbotConfig {
            telegram: TelegramConfig {
                api_id: Some(42),
                api_hash: Secret::new("hash".into()),
                bot_token: Secret::new("123:ABC".into()),
                api_url: Some("http://localhost:8081".into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn paths(result: &ValidationResult, severity: Severity) -> Vec<&'static str> {
        result
            .diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .map(|d| d.path)
            .collect()
    }

    #[test]
    fn complete_config_has_no_diagnostics() {
        let result = validate(&valid());
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn default_config_reports_every_missing_credential() {
        let result = validate(&HeicbotConfig::default());
        assert!(result.has_errors());
        assert_eq!(paths(&result, Severity::Error), vec![
            "telegram.api_id",
            "telegram.api_hash",
            "telegram.bot_token",
        ]);
    }

    #[rstest]
    #[case(0)]
    #[case(-7)]
    fn non_positive_api_id_is_an_error(#[case] id: i64) {
        let mut cfg = valid();
        cfg.telegram.api_id = Some(id);
        assert_eq!(paths(&validate(&cfg), Severity::Error), vec!["telegram.api_id"]);
    }

    #[test]
    fn session_is_only_a_warning() {
        let mut cfg = valid();
        cfg.telegram.session = Some(Secret::new("1Aa...".into()));
        let result = validate(&cfg);
        assert!(!result.has_errors());
        assert_eq!(result.warnings().count(), 1);
    }

    #[rstest]
    #[case(0, true, true)]
    #[case(0, false, true)]
    #[case(2001, true, false)]
    #[case(51, false, false)]
    #[case(2000, false, false)]
    fn part_size_bounds(#[case] size: u64, #[case] local_server: bool, #[case] is_error: bool) {
        let mut cfg = valid();
        if !local_server {
            cfg.telegram.api_url = None;
        }
        cfg.conversion = ConversionConfig {
            max_part_size_mb: size,
            ..Default::default()
        };
        let result = validate(&cfg);
        assert_eq!(result.has_errors(), is_error);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].path, "conversion.max_part_size_mb");
    }

    #[rstest]
    #[case(50)]
    #[case(1)]
    fn public_api_accepts_small_parts(#[case] size: u64) {
        let mut cfg = valid();
        cfg.telegram.api_url = None;
        cfg.conversion.max_part_size_mb = size;
        assert!(validate(&cfg).diagnostics.is_empty());
    }

    #[test]
    fn public_api_warning_names_the_limit() {
        let mut cfg = valid();
        cfg.telegram.api_url = None;
        let result = validate(&cfg);
        let warning = result.warnings().next().unwrap();
        assert!(warning.message.contains("50 MB"), "{warning}");
        assert!(warning.message.contains("telegram.api_url"), "{warning}");
    }

    #[rstest]
    #[case("")]
    #[case("..")]
    #[case("a/b")]
    fn archive_name_must_be_a_file_name(#[case] name: &str) {
        let mut cfg = valid();
        cfg.conversion.archive_name = name.into();
        assert_eq!(paths(&validate(&cfg), Severity::Error), vec![
            "conversion.archive_name"
        ]);
    }

    #[test]
    fn diagnostic_display() {
        let d = Diagnostic {
            severity: Severity::Error,
            path: "telegram.bot_token",
            message: "BOT_TOKEN is not set".into(),
        };
        assert_eq!(d.to_string(), "error telegram.bot_token: BOT_TOKEN is not set");
    }
}
