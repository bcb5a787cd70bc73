use std::fmt;

use thiserror::Error;

use crate::FormatVersion;

/// Результат для операций biorec
pub type BiorecResult<T> = std::result::Result<T, BiorecError>;

/// Общий тип ошибок biorec.
#[derive(Debug, Error)]
pub enum BiorecError {
    /// Ошибка разбора заголовка файла
    #[error("Header error: {0}")]
    Header(#[from] HeaderError),

    /// Неправильное использование API (закрытый writer, порядок сигналов и т.п.)
    #[error("Usage error: {0}")]
    Usage(#[from] UsageError),

    /// Недопустимый аргумент (диапазоны, размеры, окна фильтров)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Ошибки ввода/вывода (автоконвертируются из std::io::Error)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BiorecError {
    pub fn invalid_argument<S: Into<String>>(s: S) -> Self {
        Self::InvalidArgument(s.into())
    }
}

/// Поле заголовка, в котором обнаружена ошибка.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderErrorKind {
    HeaderNotComplete,
    VersionFormatInvalid,
    DateFormatInvalid,
    TimeFormatInvalid,
    NumberOfBytesInvalid,
    NumberOfRecordsInvalid,
    RecordDurationInvalid,
    NumberOfSignalsInvalid,
    PhysicalMinInvalid,
    PhysicalMaxInvalid,
    DigitalMinInvalid,
    DigitalMaxInvalid,
    PhysicalMaxLowerOrEqualMin,
    DigitalMaxLowerOrEqualMin,
    DigitalRangeOutOfFormat,
    NumberOfSamplesInvalid,
}

impl HeaderErrorKind {
    /// Имя поля заголовка
    pub fn field(&self) -> &'static str {
        match self {
            Self::HeaderNotComplete => "header record",
            Self::VersionFormatInvalid => "version",
            Self::DateFormatInvalid => "start date",
            Self::TimeFormatInvalid => "start time",
            Self::NumberOfBytesInvalid => "number of bytes in header",
            Self::NumberOfRecordsInvalid => "number of data records",
            Self::RecordDurationInvalid => "duration of data record",
            Self::NumberOfSignalsInvalid => "number of signals",
            Self::PhysicalMinInvalid | Self::PhysicalMaxLowerOrEqualMin => "physical min",
            Self::PhysicalMaxInvalid => "physical max",
            Self::DigitalMinInvalid | Self::DigitalMaxLowerOrEqualMin => "digital min",
            Self::DigitalMaxInvalid | Self::DigitalRangeOutOfFormat => "digital max",
            Self::NumberOfSamplesInvalid => "number of samples in data record",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Self::HeaderNotComplete => "Header record is not complete",
            Self::VersionFormatInvalid => "Version format invalid",
            Self::DateFormatInvalid => "Date format invalid. Expected: dd.mm.yy",
            Self::TimeFormatInvalid => "Time format invalid. Expected: hh.mm.ss",
            Self::NumberOfBytesInvalid => {
                "Number of bytes in header invalid. Expected: 256 + 256 * number of signals"
            }
            Self::NumberOfRecordsInvalid => "Number of data records invalid. Expected int >= -1",
            Self::RecordDurationInvalid => "Duration of data record invalid. Expected double > 0",
            Self::NumberOfSignalsInvalid => "Number of signals invalid. Expected int >= 0",
            Self::PhysicalMinInvalid => "Physical min invalid",
            Self::PhysicalMaxInvalid => "Physical max invalid",
            Self::DigitalMinInvalid => "Digital min invalid",
            Self::DigitalMaxInvalid => "Digital max invalid",
            Self::PhysicalMaxLowerOrEqualMin => "Physical max <= Physical min",
            Self::DigitalMaxLowerOrEqualMin => "Digital max <= Digital min",
            Self::DigitalRangeOutOfFormat => "Digital min/max out of format range",
            Self::NumberOfSamplesInvalid => "Number of samples in data record invalid. Expected int > 0",
        }
    }
}

/// Ошибка формата заголовка: поле, исходный текст и номер сигнала.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct HeaderError {
    pub kind: HeaderErrorKind,
    pub value: Option<String>,
    pub signal: Option<usize>,
}

impl HeaderError {
    pub fn new(kind: HeaderErrorKind) -> Self {
        Self {
            kind,
            value: None,
            signal: None,
        }
    }

    pub fn with_value<S: Into<String>>(
        mut self,
        value: S,
    ) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_signal(
        mut self,
        signal: usize,
    ) -> Self {
        self.signal = Some(signal);
        self
    }
}

impl fmt::Display for HeaderError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.kind.description())?;
        if let Some(signal) = self.signal {
            write!(f, " (signal {signal})")?;
        }
        if let Some(value) = &self.value {
            write!(f, ", {}: '{value}'", self.kind.field())?;
        }
        Ok(())
    }
}

/// Ошибки неправильного использования writer'а, стадий и буферов.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("Writer was closed. Data can not be written")]
    WriterClosed,

    #[error("Number of signals is 0. Data can not be written")]
    NoSignals,

    #[error("Header is not set")]
    HeaderNotSet,

    #[error("Samples written out of order: expected signal {expected}, got {actual}")]
    SignalOutOfOrder { expected: usize, actual: usize },

    #[error("Signal {signal}: expected {expected} samples, got {actual}")]
    SampleCount {
        signal: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Data record length {actual} does not match record size {expected}")]
    RecordLength { expected: usize, actual: usize },

    #[error("Last data record is incomplete")]
    RecordIncomplete,

    #[error("Header is not compatible: {0}")]
    IncompatibleHeader(String),

    #[error("Signal {signal}: {samples} samples per record are not divisible by {divider}")]
    DividerMismatch {
        signal: usize,
        samples: usize,
        divider: usize,
    },

    #[error("Signal index {signal} out of range (number of signals {count})")]
    SignalIndex { signal: usize, count: usize },

    #[error("Format {0} has no file dialect")]
    UnsupportedFileFormat(FormatVersion),

    #[error("Buffer is empty")]
    BufferEmpty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_error_display_carries_field_and_signal() {
        let err = HeaderError::new(HeaderErrorKind::DigitalMaxLowerOrEqualMin)
            .with_value("-100")
            .with_signal(2);
        let text = err.to_string();

        assert!(text.contains("Digital max <= Digital min"));
        assert!(text.contains("signal 2"));
        assert!(text.contains("'-100'"));
    }

    #[test]
    fn test_errors_convert_into_biorec_error() {
        let err: BiorecError = UsageError::WriterClosed.into();
        assert!(matches!(err, BiorecError::Usage(UsageError::WriterClosed)));

        let err: BiorecError = HeaderError::new(HeaderErrorKind::HeaderNotComplete).into();
        assert!(err.to_string().starts_with("Header error"));
    }
}
