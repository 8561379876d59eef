use std::{error::Error as StdError, io, path::Path};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    #[error("{message}")]
    InvalidInput { message: String },
    /// A single image in a batch failed; `file` is its bare file name.
    #[error("failed to convert {file}: {source}")]
    Conversion {
        file: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    #[must_use]
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// I/O failure on a specific path, e.g. `failed to create downloads/x: ...`.
    #[must_use]
    pub fn io_at(action: &str, path: &Path, source: io::Error) -> Self {
        Self::io(format!("failed to {action} {}", path.display()), source)
    }

    #[must_use]
    pub fn external<E>(context: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn conversion(file: impl Into<String>, source: Self) -> Self {
        Self::Conversion {
            file: file.into(),
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
