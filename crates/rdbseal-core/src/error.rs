use thiserror::Error;

pub type RdbsealResult<T> = Result<T, RdbsealError>;

#[derive(Debug, Error)]
pub enum RdbsealError {
    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
