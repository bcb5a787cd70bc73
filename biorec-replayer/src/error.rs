use biorec_types::BiorecError;
use thiserror::Error;

pub type ReplayResult<T> = Result<T, ReplayError>;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка формата EDF/BDF или конвейера записей
    #[error("Biorec error: {0}")]
    Biorec(#[from] BiorecError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),
}
