use biorec_types::{BiorecResult, DataHeader, UsageError};
use log::debug;

use crate::{
    stream::{check_signal_index, checked_header},
    DataRecordStream,
};

/// Удаляет выбранные сигналы из заголовка и из каждой записи.
#[derive(Debug)]
pub struct SignalRemover<S> {
    out: S,
    /// Маска удаляемых сигналов по номеру
    removed: Vec<bool>,
    in_header: Option<DataHeader>,
    out_record: Vec<i32>,
}

impl<S: DataRecordStream> SignalRemover<S> {
    pub fn new(out: S) -> Self {
        Self {
            out,
            removed: Vec::new(),
            in_header: None,
            out_record: Vec::new(),
        }
    }

    /// Помечает сигнал (номер во входном заголовке) для удаления.
    pub fn remove_signal(
        &mut self,
        signal: usize,
    ) -> BiorecResult<()> {
        if let Some(header) = &self.in_header {
            check_signal_index(header, signal)?;
        }
        let previous = self.removed.clone();
        if self.removed.len() <= signal {
            self.removed.resize(signal + 1, false);
        }
        self.removed[signal] = true;

        // При отказе нижней стадии прежняя маска остаётся в силе.
        if let Some(header) = self.in_header.clone() {
            if let Err(e) = self.set_header(header) {
                self.removed = previous;
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn is_removed(
        &self,
        signal: usize,
    ) -> bool {
        self.removed.get(signal).copied().unwrap_or(false)
    }

    pub fn out_header(&self) -> Option<DataHeader> {
        let mut header = self.in_header.clone()?;
        for signal in (0..header.number_of_signals()).rev() {
            if self.is_removed(signal) {
                header.remove_signal(signal).ok()?;
            }
        }
        Some(header)
    }

    pub fn into_inner(self) -> S {
        self.out
    }
}

impl<S: DataRecordStream> DataRecordStream for SignalRemover<S> {
    fn set_header(
        &mut self,
        header: DataHeader,
    ) -> BiorecResult<()> {
        for (signal, removed) in self.removed.iter().enumerate() {
            if *removed {
                check_signal_index(&header, signal)?;
            }
        }
        let previous = self.in_header.replace(header);

        let Some(out_header) = self.out_header() else {
            self.in_header = previous;
            return Err(UsageError::HeaderNotSet.into());
        };
        debug!(
            "SignalRemover: {} signals left, out record size {}",
            out_header.number_of_signals(),
            out_header.record_size()
        );
        let size = out_header.record_size();
        if let Err(e) = self.out.set_header(out_header) {
            self.in_header = previous;
            return Err(e);
        }
        self.out_record = Vec::with_capacity(size);
        Ok(())
    }

    fn write_data_record(
        &mut self,
        record: &[i32],
    ) -> BiorecResult<()> {
        let header = checked_header(self.in_header.as_ref(), record)?;

        self.out_record.clear();
        let mut start = 0;
        for (i, signal) in header.signals().iter().enumerate() {
            let len = signal.samples_per_record();
            if !self.removed.get(i).copied().unwrap_or(false) {
                self.out_record.extend_from_slice(&record[start..start + len]);
            }
            start += len;
        }
        self.out.write_data_record(&self.out_record)
    }

    fn close(&mut self) -> BiorecResult<()> {
        self.out.close()
    }

    fn resultant_header(&self) -> Option<DataHeader> {
        self.out.resultant_header().or_else(|| self.out_header())
    }
}
