use derive_more::{Display, Error, From};

pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type. Variants mirror the pipeline stages: remote API
/// failures, malformed payloads, model loading, bad inference input, and
/// dataset I/O.
#[derive(Debug, Display, Error, From)]
pub enum Error {
    /// The remote comment API rejected or failed the request (auth, quota,
    /// persistent server errors).
    #[display("comment API error: {_0}")]
    #[error(ignore)]
    #[from(ignore)]
    Service(String),

    /// A fetched or loaded record did not have the expected shape.
    #[display("malformed data: {_0}")]
    #[error(ignore)]
    #[from(ignore)]
    Format(String),

    /// Model weights, config, or tokenizer could not be loaded. Fatal.
    #[display("model load error: {_0}")]
    #[error(ignore)]
    #[from(ignore)]
    Model(String),

    /// Invalid text reached the inference engine.
    #[display("invalid inference input: {_0}")]
    #[error(ignore)]
    #[from(ignore)]
    Input(String),

    /// The run was cancelled between pages/batches.
    #[display("cancelled")]
    #[from(ignore)]
    Cancelled,

    #[display("HTTP error: {_0}")]
    Http(reqwest::Error),

    #[display("I/O error: {_0}")]
    Io(std::io::Error),

    #[display("CSV error: {_0}")]
    Csv(csv::Error),

    #[display("JSON error: {_0}")]
    Json(serde_json::Error),

    #[display("tensor error: {_0}")]
    Candle(candle_core::Error),

    #[display("{_0}")]
    #[error(ignore)]
    #[from(ignore)]
    Custom(String),
}

impl Error {
    pub fn custom(msg: impl Into<String>) -> Self {
        Error::Custom(msg.into())
    }

    pub fn service(msg: impl Into<String>) -> Self {
        Error::Service(msg.into())
    }

    pub fn data_format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Error::Model(msg.into())
    }

    pub fn input(msg: impl Into<String>) -> Self {
        Error::Input(msg.into())
    }
}

impl From<hf_hub::api::sync::ApiError> for Error {
    fn from(value: hf_hub::api::sync::ApiError) -> Self {
        Error::Model(value.to_string())
    }
}
