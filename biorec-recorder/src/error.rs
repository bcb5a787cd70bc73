use biorec_types::BiorecError;
use thiserror::Error;

pub type RecorderResult<T> = std::result::Result<T, RecorderError>;

#[derive(Debug, Error)]
pub enum RecorderError {
    /// Источник выборок не найден или не поддерживается
    #[error("Sample source not available: {0}")]
    SourceNotFound(String),

    /// Ошибка источника выборок
    #[error("Sample source error: {0}")]
    SourceError(String),

    /// Неверная конфигурация
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Ошибка записи файла
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка формата EDF/BDF или конвейера записей
    #[error("Biorec error: {0}")]
    Biorec(#[from] BiorecError),

    /// Ошибка пайплайна (inter-thread)
    #[error("Pipeline error: {0}")]
    Pipeline(String),
}
