use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(String),

    /// Upstream answered with a non-2xx status. The body is relayed unchanged.
    #[error("upstream returned {status}")]
    Upstream {
        status: u16,
        content_type: Option<String>,
        body: Bytes,
    },

    #[error("{0}")]
    Transport(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("model configuration not found: {0}")]
    ModelNotFound(String),

    #[error("Selector error: {0}")]
    Selector(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    pub fn upstream(status: u16, content_type: Option<String>, body: impl Into<Bytes>) -> Self {
        Self::Upstream {
            status,
            content_type,
            body: body.into(),
        }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn model_not_found(id: impl Into<String>) -> Self {
        Self::ModelNotFound(id.into())
    }

    pub fn selector(msg: impl Into<String>) -> Self {
        Self::Selector(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
