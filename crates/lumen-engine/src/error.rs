use lumen_contracts::session::PersistenceError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StudioError>;

#[derive(Debug, Error)]
pub enum StudioError {
    #[error("could not decode image: {0}")]
    ImageDecode(String),

    #[error("could not encode image: {0}")]
    ImageEncode(String),

    #[error("model call failed: {0}")]
    ModelInvocation(String),

    #[error("a model request is already in progress")]
    ModelBusy,

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("invalid value for {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("no image loaded")]
    NoImage,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
