pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy shared by rendering and generation.
///
/// Only [`Error::Aborted`] is expected in normal operation; it is produced when a request is
/// cancelled and must never be shown to the user.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("malformed response: {message}")]
    MalformedResponse { message: String },

    #[error("{}", transport_message(.status, .message))]
    Transport { status: Option<u16>, message: String },

    #[error("request aborted")]
    Aborted,

    #[error("failed to decode stream record: {message}")]
    Decode { message: String },

    #[error("unknown diagram type: {diagram_type}")]
    UnknownDiagramType { diagram_type: String },

    #[error("invalid settings: {message}")]
    Settings { message: String },
}

fn transport_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("service responded with status {status}: {message}"),
        None => format!("transport error: {message}"),
    }
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
        }
    }

    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        Self::Transport {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Aborts are a normal consequence of cancellation and are never reported.
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// Whether a failed SVG render may be retried once as PNG.
    pub fn allows_png_fallback(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::MalformedResponse { .. })
    }
}
