use thiserror::Error;

#[derive(Debug, Error)]
pub enum EyeHandError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("no frame available from the frame source")]
    NoFrame,

    #[error("Model gateway transport error: {0}")]
    Gateway(String),

    #[error("Model gateway returned {status}: {body}")]
    GatewayStatus { status: u16, body: String },

    #[error("Response parse error: {0}")]
    Parse(String),

    #[error("sink not connected")]
    SinkDisconnected,

    #[error("Executor error: {0}")]
    Executor(String),

    #[error("agent is busy: a step is already running")]
    Busy,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Image encode error: {0}")]
    Image(#[from] image::ImageError),
}

impl serde::Serialize for EyeHandError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type EyeHandResult<T> = Result<T, EyeHandError>;
