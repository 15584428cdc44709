use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("invalid application entity title: {0}")]
    InvalidAeTitle(String),

    #[error("invalid time window: {0}")]
    InvalidWindow(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
