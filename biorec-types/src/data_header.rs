use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{BiorecError, BiorecResult, FormatVersion, HeaderError, HeaderErrorKind, Signal, UsageError};

/// Заголовок многоканальной записи: общие поля и упорядоченный список сигналов.
///
/// Значение с семантикой копирования: стадии конвейера и writer получают
/// собственный клон и не видят чужих изменений.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataHeader {
    format_version: FormatVersion,
    patient_id: String,
    recording_id: String,
    /// Время начала записи, мс с эпохи Unix (UTC)
    recording_start_time_ms: i64,
    /// Длительность одной записи данных, секунды
    duration_of_record: f64,
    /// -1 = неизвестно (файл ещё пишется)
    number_of_records: i64,
    signals: Vec<Signal>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl DataHeader {
    pub fn new(
        format_version: FormatVersion,
        number_of_signals: usize,
    ) -> Self {
        Self {
            format_version,
            patient_id: "Default patient".to_string(),
            recording_id: "Default record".to_string(),
            recording_start_time_ms: 0,
            duration_of_record: 1.0,
            number_of_records: -1,
            signals: (0..number_of_signals)
                .map(|i| Signal::new(format_version, i))
                .collect(),
        }
    }

    pub fn format_version(&self) -> FormatVersion {
        self.format_version
    }

    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }

    pub fn recording_id(&self) -> &str {
        &self.recording_id
    }

    pub fn recording_start_time_ms(&self) -> i64 {
        self.recording_start_time_ms
    }

    pub fn duration_of_record(&self) -> f64 {
        self.duration_of_record
    }

    pub fn number_of_records(&self) -> i64 {
        self.number_of_records
    }

    pub fn number_of_signals(&self) -> usize {
        self.signals.len()
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    /// # Panics
    /// Если `index >= number_of_signals()`.
    pub fn signal(
        &self,
        index: usize,
    ) -> &Signal {
        &self.signals[index]
    }

    /// Доступ к текстовым полям сигнала
    pub fn signal_mut(
        &mut self,
        index: usize,
    ) -> BiorecResult<&mut Signal> {
        self.check_signal(index)?;
        Ok(&mut self.signals[index])
    }

    pub fn set_patient_id<S: Into<String>>(
        &mut self,
        patient_id: S,
    ) {
        self.patient_id = patient_id.into();
    }

    pub fn set_recording_id<S: Into<String>>(
        &mut self,
        recording_id: S,
    ) {
        self.recording_id = recording_id.into();
    }

    /// Мс с эпохи Unix. Дата должна укладываться в 1970..=2069: в заголовке
    /// год хранится двумя цифрами.
    pub fn set_recording_start_time_ms(
        &mut self,
        time_ms: i64,
    ) -> BiorecResult<()> {
        if time_ms < 0 {
            return Err(BiorecError::invalid_argument(format!(
                "Recording start time must be >= 0, got {time_ms}"
            )));
        }
        let year = DateTime::<Utc>::from_timestamp_millis(time_ms).map(|dt| dt.year());
        if !matches!(year, Some(1970..=2069)) {
            return Err(HeaderError::new(HeaderErrorKind::DateFormatInvalid)
                .with_value(time_ms.to_string())
                .into());
        }
        self.recording_start_time_ms = time_ms;
        Ok(())
    }

    /// Время начала по компонентам даты (UTC). Год 1970..=2069, как позволяет формат `dd.mm.yy`.
    pub fn set_recording_start_date_time(
        &mut self,
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
    ) -> BiorecResult<()> {
        if !(1970..=2069).contains(&year) {
            return Err(BiorecError::invalid_argument(format!(
                "Year must be in 1970..=2069, got {year}"
            )));
        }
        let dt = NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(hour, minute, second))
            .ok_or_else(|| {
                BiorecError::invalid_argument(format!(
                    "Invalid date/time {year}-{month}-{day} {hour}:{minute}:{second}"
                ))
            })?;
        self.set_recording_start_time_ms(dt.and_utc().timestamp_millis())
    }

    pub fn set_duration_of_record(
        &mut self,
        duration_sec: f64,
    ) -> BiorecResult<()> {
        if !(duration_sec > 0.0) || !duration_sec.is_finite() {
            return Err(HeaderError::new(HeaderErrorKind::RecordDurationInvalid)
                .with_value(duration_sec.to_string())
                .into());
        }
        self.duration_of_record = duration_sec;
        Ok(())
    }

    pub fn set_number_of_records(
        &mut self,
        number_of_records: i64,
    ) -> BiorecResult<()> {
        if number_of_records < -1 {
            return Err(HeaderError::new(HeaderErrorKind::NumberOfRecordsInvalid)
                .with_value(number_of_records.to_string())
                .into());
        }
        self.number_of_records = number_of_records;
        Ok(())
    }

    /// Добавляет сигнал по умолчанию в конец списка, возвращает его индекс.
    pub fn add_signal(&mut self) -> usize {
        let index = self.signals.len();
        self.signals.push(Signal::new(self.format_version, index));
        index
    }

    pub fn remove_signal(
        &mut self,
        index: usize,
    ) -> BiorecResult<Signal> {
        self.check_signal(index)?;
        Ok(self.signals.remove(index))
    }

    pub fn set_samples_per_record(
        &mut self,
        index: usize,
        samples: usize,
    ) -> BiorecResult<()> {
        self.check_signal(index)?;
        if samples == 0 {
            return Err(HeaderError::new(HeaderErrorKind::NumberOfSamplesInvalid)
                .with_value("0")
                .with_signal(index)
                .into());
        }
        self.signals[index].samples_per_record = samples;
        Ok(())
    }

    pub fn set_digital_range(
        &mut self,
        index: usize,
        digital_min: i32,
        digital_max: i32,
    ) -> BiorecResult<()> {
        self.check_signal(index)?;
        if digital_max <= digital_min {
            return Err(HeaderError::new(HeaderErrorKind::DigitalMaxLowerOrEqualMin)
                .with_value(format!("{digital_min}/{digital_max}"))
                .with_signal(index)
                .into());
        }
        if digital_min < self.format_version.digital_min()
            || digital_max > self.format_version.digital_max()
        {
            return Err(HeaderError::new(HeaderErrorKind::DigitalRangeOutOfFormat)
                .with_value(format!("{digital_min}/{digital_max}"))
                .with_signal(index)
                .into());
        }
        let signal = &mut self.signals[index];
        signal.digital_min = digital_min;
        signal.digital_max = digital_max;
        Ok(())
    }

    pub fn set_physical_range(
        &mut self,
        index: usize,
        physical_min: f64,
        physical_max: f64,
    ) -> BiorecResult<()> {
        self.check_signal(index)?;
        if !(physical_max > physical_min) {
            return Err(HeaderError::new(HeaderErrorKind::PhysicalMaxLowerOrEqualMin)
                .with_value(format!("{physical_min}/{physical_max}"))
                .with_signal(index)
                .into());
        }
        let signal = &mut self.signals[index];
        signal.physical_min = physical_min;
        signal.physical_max = physical_max;
        Ok(())
    }

    /// Сумма выборок всех сигналов в одной записи данных
    pub fn record_size(&self) -> usize {
        self.signals.iter().map(Signal::samples_per_record).sum()
    }

    /// Смещение сегмента сигнала внутри записи (в выборках)
    pub fn signal_start(
        &self,
        index: usize,
    ) -> usize {
        self.signals[..index]
            .iter()
            .map(Signal::samples_per_record)
            .sum()
    }

    pub fn sample_frequency(
        &self,
        index: usize,
    ) -> f64 {
        self.signals[index].sample_frequency(self.duration_of_record)
    }

    /// Задаёт число выборок в записи как `round(freq * duration_of_record)`.
    pub fn set_sample_frequency(
        &mut self,
        index: usize,
        frequency_hz: f64,
    ) -> BiorecResult<()> {
        let samples = (frequency_hz * self.duration_of_record).round();
        if !(samples >= 1.0) {
            return Err(BiorecError::invalid_argument(format!(
                "Sample frequency {frequency_hz} Hz gives no samples for record duration {}",
                self.duration_of_record
            )));
        }
        self.set_samples_per_record(index, samples as usize)
    }

    fn check_signal(
        &self,
        index: usize,
    ) -> BiorecResult<()> {
        if index >= self.signals.len() {
            return Err(UsageError::SignalIndex {
                signal: index,
                count: self.signals.len(),
            }
            .into());
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl fmt::Display for DataHeader {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let start = DateTime::<Utc>::from_timestamp_millis(self.recording_start_time_ms)
            .map(|t| t.format("%d-%m-%Y %H:%M:%S").to_string())
            .unwrap_or_else(|| self.recording_start_time_ms.to_string());

        writeln!(f, "Format version    : {}", self.format_version)?;
        writeln!(f, "Patient           : {}", self.patient_id)?;
        writeln!(f, "Recording         : {}", self.recording_id)?;
        writeln!(f, "Start             : {start}")?;
        writeln!(f, "Record duration   : {} s", self.duration_of_record)?;
        writeln!(f, "Number of records : {}", self.number_of_records)?;
        writeln!(f, "Number of signals : {}", self.signals.len())?;
        for (i, s) in self.signals.iter().enumerate() {
            writeln!(
                f,
                "  [{i}] {:<16} {:>4} spr {:>9.3} Hz  dig [{}, {}]  phys [{}, {}] {}  {}",
                s.label,
                s.samples_per_record,
                s.sample_frequency(self.duration_of_record),
                s.digital_min,
                s.digital_max,
                s.physical_min,
                s.physical_max,
                s.physical_dimension,
                s.prefiltering,
            )?;
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
