use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown flag: {0}")]
    UnknownFlag(String),

    #[error("invalid flag name: {0:?}")]
    InvalidFlagName(String),

    #[error("flag registered twice: {0}")]
    DuplicateFlag(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}
