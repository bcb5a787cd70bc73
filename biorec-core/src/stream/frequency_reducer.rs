use biorec_types::{BiorecError, BiorecResult, DataHeader, UsageError};
use log::debug;

use crate::{
    stream::{check_signal_index, checked_header},
    DataRecordStream,
};

/// Понижает частоту дискретизации выбранных сигналов.
///
/// Для сигнала с делителем `d` каждые `d` подряд идущих выборок заменяются их
/// средним (целочисленное деление с отбрасыванием дробной части). Сигналы без
/// делителя проходят без изменений.
#[derive(Debug)]
pub struct SignalFrequencyReducer<S> {
    out: S,
    /// Делитель по номеру сигнала; `None` = без изменений
    dividers: Vec<Option<usize>>,
    in_header: Option<DataHeader>,
    out_record: Vec<i32>,
}

impl<S: DataRecordStream> SignalFrequencyReducer<S> {
    pub fn new(out: S) -> Self {
        Self {
            out,
            dividers: Vec::new(),
            in_header: None,
            out_record: Vec::new(),
        }
    }

    /// Регистрирует делитель частоты для сигнала.
    ///
    /// Если заголовок уже известен, кратность проверяется сразу и новый
    /// выходной заголовок отправляется дальше по цепочке.
    pub fn add_divider(
        &mut self,
        signal: usize,
        divider: usize,
    ) -> BiorecResult<()> {
        if divider == 0 {
            return Err(BiorecError::invalid_argument(format!(
                "Signal {signal}: divider must be positive"
            )));
        }
        if let Some(header) = &self.in_header {
            check_signal_index(header, signal)?;
            check_divider(header, signal, divider)?;
        }

        let previous = self.dividers.clone();
        if self.dividers.len() <= signal {
            self.dividers.resize(signal + 1, None);
        }
        self.dividers[signal] = Some(divider);

        if let Some(header) = self.in_header.clone() {
            if let Err(e) = self.set_header(header) {
                self.dividers = previous;
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn divider(
        &self,
        signal: usize,
    ) -> usize {
        self.dividers.get(signal).copied().flatten().unwrap_or(1)
    }

    pub fn out_header(&self) -> Option<DataHeader> {
        let in_header = self.in_header.as_ref()?;
        let mut header = in_header.clone();
        for (i, signal) in in_header.signals().iter().enumerate() {
            header
                .set_samples_per_record(i, signal.samples_per_record() / self.divider(i))
                .ok()?;
        }
        Some(header)
    }

    pub fn into_inner(self) -> S {
        self.out
    }
}

impl<S: DataRecordStream> DataRecordStream for SignalFrequencyReducer<S> {
    fn set_header(
        &mut self,
        header: DataHeader,
    ) -> BiorecResult<()> {
        for (signal, divider) in self.dividers.iter().enumerate() {
            if let Some(divider) = *divider {
                check_signal_index(&header, signal)?;
                check_divider(&header, signal, divider)?;
            }
        }
        let previous = self.in_header.replace(header);

        let Some(out_header) = self.out_header() else {
            self.in_header = previous;
            return Err(UsageError::HeaderNotSet.into());
        };
        debug!(
            "SignalFrequencyReducer: out record size {}",
            out_header.record_size()
        );
        let size = out_header.record_size();
        if let Err(e) = self.out.set_header(out_header) {
            // Нижняя стадия осталась со старым заголовком
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
            let segment = &record[start..start + len];
            let divider = self.dividers.get(i).copied().flatten().unwrap_or(1);
            if divider == 1 {
                self.out_record.extend_from_slice(segment);
            } else {
                self.out_record.extend(segment.chunks_exact(divider).map(|block| {
                    let sum: i64 = block.iter().map(|&v| v as i64).sum();
                    (sum / divider as i64) as i32
                }));
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

fn check_divider(
    header: &DataHeader,
    signal: usize,
    divider: usize,
) -> BiorecResult<()> {
    let samples = header.signal(signal).samples_per_record();
    if samples % divider != 0 {
        return Err(UsageError::DividerMismatch {
            signal,
            samples,
            divider,
        }
        .into());
    }
    Ok(())
}
