use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TreeError>;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("corruption detected: {0}")]
    Corruption(String),
    #[error("node exceeds storage slot: {0}")]
    Capacity(String),
}
