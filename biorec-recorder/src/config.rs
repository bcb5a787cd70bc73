use std::path::PathBuf;

use biorec_core::{HeaderCodec, TransformConfig};
use biorec_types::{DataHeader, FormatVersion};

use crate::{RecorderError, RecorderResult};

/// Полная шкала канала в микровольтах (симметрично относительно нуля).
pub const FULL_SCALE_UV: f64 = 187_500.0;

/// Тип источника выборок (выбор при старте).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Встроенный симулятор (не требует железа).
    Simulated,
}

/// Полная конфигурация сессии записи.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Источник выборок
    pub source: SourceKind,
    /// Формат файла
    pub format: FormatVersion,
    /// Число измерительных каналов (без aux)
    pub channels: usize,
    /// Выборок каждого канала в одной записи (= кадров на запись)
    pub samples_per_record: usize,
    /// Длительность записи, секунды
    pub record_duration_secs: f64,
    /// Источник добавляет в кадр служебный канал (заряд батареи),
    /// который отбрасывается перед записью
    pub aux_channel: bool,
    /// Файл, заголовок которого берётся за основу вместо сгенерированного
    pub header_template: Option<PathBuf>,
    pub patient_id: String,
    pub recording_id: String,
    /// Преобразования перед записью в файл
    pub transform: TransformConfig,
    /// Путь к выходному файлу
    pub output_path: PathBuf,
    /// Ограничение по времени (None = до Ctrl+C)
    pub duration_secs: Option<u64>,
    /// Ёмкость канала между источником и писателем (в пачках кадров)
    pub channel_capacity: usize,
    /// Интервал вывода статистики (секунды)
    pub stats_interval_secs: u64,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl RecorderConfig {
    /// Частота дискретизации каждого канала, Гц
    pub fn sample_rate_hz(&self) -> f64 {
        self.samples_per_record as f64 / self.record_duration_secs
    }

    /// Ширина кадра источника (каналы + aux)
    pub fn frame_width(&self) -> usize {
        self.channels + usize::from(self.aux_channel)
    }

    pub fn validate(&self) -> RecorderResult<()> {
        if self.format == FormatVersion::Int32Bit {
            return Err(RecorderError::Config(format!(
                "format {} can not be written to a file, use edf or bdf",
                self.format
            )));
        }
        if self.header_template.is_none() && self.channels == 0 {
            return Err(RecorderError::Config("channels must be > 0".to_string()));
        }
        if self.samples_per_record == 0 {
            return Err(RecorderError::Config(
                "samples per record must be > 0".to_string(),
            ));
        }
        if !(self.record_duration_secs > 0.0) || !self.record_duration_secs.is_finite() {
            return Err(RecorderError::Config(format!(
                "record duration must be > 0, got {}",
                self.record_duration_secs
            )));
        }
        if self.channel_capacity == 0 {
            return Err(RecorderError::Config(
                "channel capacity must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Заголовок файла на входе цепочки преобразований.
    ///
    /// С шаблоном: заголовок шаблона с длительностью записи из
    /// конфигурации и неизвестным числом записей. Число каналов и выборок
    /// в записи берётся из шаблона.
    pub fn build_header(&self) -> RecorderResult<DataHeader> {
        if let Some(path) = &self.header_template {
            let mut file = std::fs::File::open(path)?;
            let (mut header, _) = HeaderCodec::read_header(&mut file)?;
            header.set_duration_of_record(self.record_duration_secs)?;
            header.set_number_of_records(-1)?;
            header.set_recording_start_time_ms(0)?;
            return Ok(header);
        }

        let mut header = DataHeader::new(self.format, self.channels);
        header.set_patient_id(self.patient_id.as_str());
        header.set_recording_id(self.recording_id.as_str());
        header.set_duration_of_record(self.record_duration_secs)?;

        let (digital_min, digital_max) = (self.format.digital_min(), self.format.digital_max());
        for i in 0..self.channels {
            header.set_samples_per_record(i, self.samples_per_record)?;
            header.set_digital_range(i, digital_min, digital_max)?;
            header.set_physical_range(i, -FULL_SCALE_UV, FULL_SCALE_UV)?;

            let signal = header.signal_mut(i)?;
            signal.set_label(format!("Ch{}", i + 1));
            signal.set_transducer("Unknown");
            signal.set_physical_dimension("uV");
        }
        Ok(header)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для SourceKind, RecorderConfig
////////////////////////////////////////////////////////////////////////////////

impl std::fmt::Display for SourceKind {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            SourceKind::Simulated => write!(f, "sim"),
        }
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sim" | "simulated" => Ok(SourceKind::Simulated),
            _ => Err(format!("Unknown source type: '{s}'. Use: sim")),
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Simulated,
            format: FormatVersion::Bdf24Bit,
            channels: 4,
            samples_per_record: 50,
            record_duration_secs: 0.1,
            aux_channel: true,
            header_template: None,
            patient_id: "Default patient".to_string(),
            recording_id: "Default record".to_string(),
            transform: TransformConfig::default(),
            output_path: PathBuf::from("recording.bdf"),
            duration_secs: None,
            channel_capacity: 64,
            stats_interval_secs: 5,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
