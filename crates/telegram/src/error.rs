use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Telegram(#[from] teloxide::RequestError),

    /// Built with [`Error::http`], which strips the request URL.
    #[error(transparent)]
    Reqwest(reqwest::Error),

    #[error(transparent)]
    Media(#[from] heicbot_media::Error),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    /// File URLs embed the bot token, so it never reaches the message.
    #[must_use]
    pub fn http(source: reqwest::Error) -> Self {
        Self::Reqwest(source.without_url())
    }

    #[must_use]
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
