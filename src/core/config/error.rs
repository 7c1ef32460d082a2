use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON5 parse error: {0}")]
    Parse(#[from] json5::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}
