use std::fmt;

use biorec_types::{BiorecResult, DataHeader, UsageError};
use log::debug;

use crate::{
    stream::{check_signal_index, checked_header},
    DataRecordStream, DigitalFilter,
};

/// Фильтр с именем, которое попадает в поле префильтрации заголовка.
pub struct NamedFilter {
    filter: Box<dyn DigitalFilter + Send>,
    name: String,
}

impl NamedFilter {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for NamedFilter {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("NamedFilter").field("name", &self.name).finish()
    }
}

/// Применяет цепочки цифровых фильтров к выборкам выбранных сигналов.
///
/// Фильтруется `digital + offset`, то есть величина, пропорциональная
/// физическому значению. Результат переводится обратно в цифровой с
/// отбрасыванием дробной части. Имена фильтров дописываются к полю
/// префильтрации сигнала: `"HP:0.1Hz;movAvg:2;"`.
#[derive(Debug)]
pub struct SignalFilter<S> {
    out: S,
    /// Фильтры по номеру сигнала в порядке регистрации
    filters: Vec<Vec<NamedFilter>>,
    offsets: Vec<f64>,
    in_header: Option<DataHeader>,
    out_record: Vec<i32>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl<S: DataRecordStream> SignalFilter<S> {
    pub fn new(out: S) -> Self {
        Self {
            out,
            filters: Vec::new(),
            offsets: Vec::new(),
            in_header: None,
            out_record: Vec::new(),
        }
    }

    /// Добавляет фильтр в конец цепочки сигнала.
    ///
    /// Если заголовок уже получен, новый выходной заголовок сразу
    /// отправляется дальше.
    pub fn add_signal_filter<F>(
        &mut self,
        signal: usize,
        filter: F,
        name: &str,
    ) -> BiorecResult<()>
    where
        F: DigitalFilter + Send + 'static,
    {
        if let Some(header) = &self.in_header {
            check_signal_index(header, signal)?;
        }
        let len = self.filters.len();
        if len <= signal {
            self.filters.resize_with(signal + 1, Vec::new);
        }
        self.filters[signal].push(NamedFilter {
            filter: Box::new(filter),
            name: name.to_string(),
        });

        if let Some(header) = self.in_header.clone() {
            if let Err(e) = self.set_header(header) {
                self.filters[signal].pop();
                if len <= signal {
                    self.filters.truncate(len);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Имена фильтров сигнала через `;` (с завершающим `;`)
    pub fn signal_filters_name(
        &self,
        signal: usize,
    ) -> String {
        self.filters
            .get(signal)
            .map(|chain| chain.iter().map(|f| format!("{};", f.name)).collect())
            .unwrap_or_default()
    }

    pub fn out_header(&self) -> Option<DataHeader> {
        let in_header = self.in_header.as_ref()?;
        let mut header = in_header.clone();
        for (i, signal) in in_header.signals().iter().enumerate() {
            let names = self.signal_filters_name(i);
            let prefiltering = if signal.prefiltering().is_empty() {
                names
            } else {
                format!("{};{}", signal.prefiltering(), names)
            };
            header.signal_mut(i).ok()?.set_prefiltering(prefiltering);
        }
        Some(header)
    }

    pub fn into_inner(self) -> S {
        self.out
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl<S: DataRecordStream> DataRecordStream for SignalFilter<S> {
    fn set_header(
        &mut self,
        header: DataHeader,
    ) -> BiorecResult<()> {
        for (signal, chain) in self.filters.iter().enumerate() {
            if !chain.is_empty() {
                check_signal_index(&header, signal)?;
            }
        }
        let offsets = header.signals().iter().map(|s| s.offset()).collect();
        let previous = self.in_header.replace(header);

        let Some(out_header) = self.out_header() else {
            self.in_header = previous;
            return Err(UsageError::HeaderNotSet.into());
        };
        debug!(
            "SignalFilter: {} filtered signals",
            self.filters.iter().filter(|chain| !chain.is_empty()).count()
        );
        if let Err(e) = self.out.set_header(out_header) {
            self.in_header = previous;
            return Err(e);
        }
        self.offsets = offsets;
        Ok(())
    }

    fn write_data_record(
        &mut self,
        record: &[i32],
    ) -> BiorecResult<()> {
        let header = checked_header(self.in_header.as_ref(), record)?;

        self.out_record.clear();
        self.out_record.extend_from_slice(record);
        let mut start = 0;
        for (i, signal) in header.signals().iter().enumerate() {
            let len = signal.samples_per_record();
            if let Some(chain) = self.filters.get_mut(i).filter(|chain| !chain.is_empty()) {
                let offset = self.offsets[i];
                for sample in &mut self.out_record[start..start + len] {
                    let mut value = *sample as f64 + offset;
                    for named in chain.iter_mut() {
                        value = named.filter.filtered_value(value);
                    }
                    *sample = (value - offset) as i32;
                }
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

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
