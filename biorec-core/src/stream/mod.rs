//! Конвейер записей данных.
//!
//! Каждая стадия оборачивает следующую (`out`) и реализует
//! [`DataRecordStream`]: получает входной заголовок, выводит из него свой и
//! передаёт дальше, затем преобразует и передаёт записи. Последняя стадия:
//! [`crate::RecordWriter`] или [`RecordCollector`].
//!
//! ```
//! use biorec_core::{DataRecordStream, RecordCollector, RecordsJoiner, SignalRemover};
//! use biorec_types::{DataHeader, FormatVersion};
//!
//! let mut sink = RecordCollector::new();
//! let joiner = RecordsJoiner::new(&mut sink, 2)?;
//! let mut remover = SignalRemover::new(joiner);
//! remover.remove_signal(1)?;
//!
//! remover.set_header(DataHeader::new(FormatVersion::Bdf24Bit, 2))?;
//! remover.write_data_record(&[1, 100])?;
//! remover.write_data_record(&[2, 200])?;
//! remover.close()?;
//!
//! assert_eq!(sink.records(), &[vec![1, 2]]);
//! # Ok::<(), biorec_types::BiorecError>(())
//! ```

pub mod chain;
pub mod collector;
pub mod frequency_reducer;
pub mod joiner;
pub mod remover;
pub mod signal_filter;

pub use chain::*;
pub use collector::*;
pub use frequency_reducer::*;
pub use joiner::*;
pub use remover::*;
pub use signal_filter::*;

use biorec_types::{BiorecResult, DataHeader, UsageError};

/// Приёмник записей данных.
///
/// Порядок вызовов: `set_header` до первой записи, затем `write_data_record`
/// (длина записи равна размеру записи текущего заголовка), затем `close`.
/// Повторный `set_header` допустим: стадии пересылают его, когда меняется
/// их настройка.
pub trait DataRecordStream {
    fn set_header(
        &mut self,
        header: DataHeader,
    ) -> BiorecResult<()>;

    fn write_data_record(
        &mut self,
        record: &[i32],
    ) -> BiorecResult<()>;

    fn close(&mut self) -> BiorecResult<()>;

    /// Заголовок на выходе всей цепочки, если он уже известен.
    fn resultant_header(&self) -> Option<DataHeader> {
        None
    }
}

impl<S: DataRecordStream + ?Sized> DataRecordStream for Box<S> {
    fn set_header(
        &mut self,
        header: DataHeader,
    ) -> BiorecResult<()> {
        (**self).set_header(header)
    }

    fn write_data_record(
        &mut self,
        record: &[i32],
    ) -> BiorecResult<()> {
        (**self).write_data_record(record)
    }

    fn close(&mut self) -> BiorecResult<()> {
        (**self).close()
    }

    fn resultant_header(&self) -> Option<DataHeader> {
        (**self).resultant_header()
    }
}

impl<S: DataRecordStream + ?Sized> DataRecordStream for &mut S {
    fn set_header(
        &mut self,
        header: DataHeader,
    ) -> BiorecResult<()> {
        (**self).set_header(header)
    }

    fn write_data_record(
        &mut self,
        record: &[i32],
    ) -> BiorecResult<()> {
        (**self).write_data_record(record)
    }

    fn close(&mut self) -> BiorecResult<()> {
        (**self).close()
    }

    fn resultant_header(&self) -> Option<DataHeader> {
        (**self).resultant_header()
    }
}

/// Заголовок задан и длина записи совпадает с его размером записи.
pub(crate) fn checked_header<'a>(
    header: Option<&'a DataHeader>,
    record: &[i32],
) -> BiorecResult<&'a DataHeader> {
    let header = header.ok_or(UsageError::HeaderNotSet)?;
    let expected = header.record_size();
    if record.len() != expected {
        return Err(UsageError::RecordLength {
            expected,
            actual: record.len(),
        }
        .into());
    }
    Ok(header)
}

/// Номер сигнала меньше числа сигналов заголовка.
pub(crate) fn check_signal_index(
    header: &DataHeader,
    signal: usize,
) -> BiorecResult<()> {
    if signal >= header.number_of_signals() {
        return Err(UsageError::SignalIndex {
            signal,
            count: header.number_of_signals(),
        }
        .into());
    }
    Ok(())
}
