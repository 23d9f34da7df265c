use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("malformed descriptor: {0}")]
    MalformedDescriptor(String),
}

pub type Result<T> = std::result::Result<T, ResourceError>;
