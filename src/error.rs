use thiserror::Error;

pub type Result<T> = std::result::Result<T, FilterError>;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Incompatible merge: {0}")]
    IncompatibleMerge(String),

    #[error("{0} is not supported by this filter")]
    Unsupported(&'static str),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
