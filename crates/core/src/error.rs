use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid command line: {0}")]
    InvalidCommand(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
