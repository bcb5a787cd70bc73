use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{BiorecError, BiorecResult};

/// Разрядность цифровых выборок. Значение варианта равно числу байт на выборку.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FormatVersion {
    /// EDF, 16 бит
    Edf16Bit = 2,
    /// BDF (BioSemi), 24 бита
    Bdf24Bit = 3,
    /// 32 бита, только в памяти: у формата нет файлового диалекта
    Int32Bit = 4,
}

impl FormatVersion {
    pub fn from_bytes_per_sample(v: usize) -> BiorecResult<Self> {
        match v {
            2 => Ok(FormatVersion::Edf16Bit),
            3 => Ok(FormatVersion::Bdf24Bit),
            4 => Ok(FormatVersion::Int32Bit),
            _ => Err(BiorecError::invalid_argument(format!(
                "Unsupported bytes per sample: {v}"
            ))),
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        *self as usize
    }

    /// Минимальное цифровое значение, представимое в формате
    pub fn digital_min(&self) -> i32 {
        match self {
            FormatVersion::Edf16Bit => i16::MIN as i32,
            FormatVersion::Bdf24Bit => -(1 << 23),
            FormatVersion::Int32Bit => i32::MIN,
        }
    }

    /// Максимальное цифровое значение, представимое в формате
    pub fn digital_max(&self) -> i32 {
        match self {
            FormatVersion::Edf16Bit => i16::MAX as i32,
            FormatVersion::Bdf24Bit => (1 << 23) - 1,
            FormatVersion::Int32Bit => i32::MAX,
        }
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let s = match self {
            FormatVersion::Edf16Bit => "EDF 16BIT",
            FormatVersion::Bdf24Bit => "BDF 24BIT",
            FormatVersion::Int32Bit => "INT 32BIT",
        };
        f.write_str(s)
    }
}

impl FromStr for FormatVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "edf" | "edf16" | "16" => Ok(FormatVersion::Edf16Bit),
            "bdf" | "bdf24" | "24" => Ok(FormatVersion::Bdf24Bit),
            "int32" | "32" => Ok(FormatVersion::Int32Bit),
            other => Err(format!(
                "Unknown format '{other}'. Supported: edf, bdf, int32"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_per_sample() {
        assert_eq!(FormatVersion::Edf16Bit.bytes_per_sample(), 2);
        assert_eq!(FormatVersion::Bdf24Bit.bytes_per_sample(), 3);
        assert_eq!(FormatVersion::Int32Bit.bytes_per_sample(), 4);
        assert_eq!(
            FormatVersion::from_bytes_per_sample(3).unwrap(),
            FormatVersion::Bdf24Bit
        );
        assert!(FormatVersion::from_bytes_per_sample(1).is_err());
    }

    #[test]
    fn test_digital_limits() {
        assert_eq!(FormatVersion::Edf16Bit.digital_min(), -32768);
        assert_eq!(FormatVersion::Edf16Bit.digital_max(), 32767);
        assert_eq!(FormatVersion::Bdf24Bit.digital_min(), -8_388_608);
        assert_eq!(FormatVersion::Bdf24Bit.digital_max(), 8_388_607);
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("BDF".parse::<FormatVersion>().unwrap(), FormatVersion::Bdf24Bit);
        assert_eq!("edf".parse::<FormatVersion>().unwrap(), FormatVersion::Edf16Bit);
        assert!("wav".parse::<FormatVersion>().is_err());
    }
}
