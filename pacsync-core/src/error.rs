use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Model(#[from] pacsync_model::ModelError),

    #[error(transparent)]
    Dimse(#[from] pacsync_dimse::DimseError),

    #[error("operation cancelled: {0}")]
    Cancelled(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
