use std::path::PathBuf;

use biorec_core::TransformConfig;
use biorec_types::FormatVersion;

use crate::{ReplayError, ReplayResult};

#[derive(Debug, Clone)]
pub struct ReplayConfig {
    pub input_path: PathBuf,
    /// Выходной файл. Не нужен в режиме просмотра заголовка.
    pub output_path: Option<PathBuf>,
    /// Скорость относительно реального времени, `None` = без задержек
    pub speed: Option<f64>,
    /// Формат выходного файла, `None` = как у входного
    pub format: Option<FormatVersion>,
    pub transform: TransformConfig,
    pub stats_interval_secs: u64,
    /// Только вывести заголовок входного файла
    pub inspect: bool,
    /// Заголовок в JSON
    pub json: bool,
}

impl ReplayConfig {
    fn new() -> Self {
        Self {
            input_path: PathBuf::from("recording.bdf"),
            output_path: None,
            speed: None,
            format: None,
            transform: TransformConfig::default(),
            stats_interval_secs: 5,
            inspect: false,
            json: false,
        }
    }

    pub fn validate(&self) -> ReplayResult<()> {
        if let Some(speed) = self.speed {
            if !(speed > 0.0) || !speed.is_finite() {
                return Err(ReplayError::Config(format!(
                    "speed must be > 0, got {speed}"
                )));
            }
        }
        if self.format == Some(FormatVersion::Int32Bit) {
            return Err(ReplayError::Config(
                "int32 can not be written to a file, use edf or bdf".to_string(),
            ));
        }
        if !self.inspect && self.output_path.is_none() {
            return Err(ReplayError::Config(
                "output path is required unless inspecting".to_string(),
            ));
        }
        if self.output_path.as_ref() == Some(&self.input_path) {
            return Err(ReplayError::Config(
                "output must differ from input".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        let ok = ReplayConfig {
            output_path: Some(PathBuf::from("out.bdf")),
            speed: Some(2.0),
            ..ReplayConfig::default()
        };
        ok.validate().unwrap();

        let inspect = ReplayConfig {
            inspect: true,
            ..ReplayConfig::default()
        };
        inspect.validate().unwrap();

        let bad = [
            ReplayConfig::default(),
            ReplayConfig {
                speed: Some(0.0),
                ..ok.clone()
            },
            ReplayConfig {
                format: Some(FormatVersion::Int32Bit),
                ..ok.clone()
            },
            ReplayConfig {
                output_path: Some(PathBuf::from("recording.bdf")),
                ..ok.clone()
            },
        ];
        for config in &bad {
            assert!(config.validate().is_err(), "{config:?}");
        }
    }
}
