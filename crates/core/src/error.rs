use thiserror::Error;

#[derive(Error, Debug)]
pub enum AiError {
    #[error("config: {0}")] Config(String),
    #[error("unknown model: {0}")] UnknownModel(String),
    #[error("payload: {0}")] Payload(String),
    #[error("sign: {0}")] Sign(String),
    #[error("transport: {0}")] Transport(String),
    #[error("decode: {0}")] Decode(String),
    #[error("other: {0}")] Other(String),
}

impl From<serde_json::Error> for AiError {
    fn from(e: serde_json::Error) -> Self {
        AiError::Payload(e.to_string())
    }
}
