use biorec_types::{BiorecError, BiorecResult, DataHeader};
use log::{debug, warn};

use crate::{stream::checked_header, DataRecordStream};

/// Склеивает `join` последовательных записей в одну.
///
/// Выборки каждого сигнала из всех склеиваемых записей идут подряд:
/// сначала сигнал 0 из записей 1..=join, затем сигнал 1 и т.д. Длительность
/// записи и число выборок каждого сигнала умножаются на `join`.
#[derive(Debug)]
pub struct RecordsJoiner<S> {
    out: S,
    join: usize,
    in_header: Option<DataHeader>,
    /// (начало, длина) сегмента каждого сигнала во входной записи
    segments: Vec<(usize, usize)>,
    out_record: Vec<i32>,
    joined: usize,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl<S: DataRecordStream> RecordsJoiner<S> {
    pub fn new(
        out: S,
        join: usize,
    ) -> BiorecResult<Self> {
        if join == 0 {
            return Err(BiorecError::invalid_argument(
                "Number of records to join must be at least 1",
            ));
        }
        Ok(Self {
            out,
            join,
            in_header: None,
            segments: Vec::new(),
            out_record: Vec::new(),
            joined: 0,
        })
    }

    pub fn join(&self) -> usize {
        self.join
    }

    /// Заголовок на выходе этой стадии
    pub fn out_header(&self) -> Option<DataHeader> {
        let in_header = self.in_header.as_ref()?;
        let mut header = in_header.clone();
        for (i, signal) in in_header.signals().iter().enumerate() {
            header
                .set_samples_per_record(i, signal.samples_per_record() * self.join)
                .ok()?;
        }
        header
            .set_duration_of_record(in_header.duration_of_record() * self.join as f64)
            .ok()?;
        let records = in_header.number_of_records();
        if records > 0 {
            header.set_number_of_records(records / self.join as i64).ok()?;
        }
        Some(header)
    }

    pub fn get_ref(&self) -> &S {
        &self.out
    }

    pub fn into_inner(self) -> S {
        self.out
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl<S: DataRecordStream> DataRecordStream for RecordsJoiner<S> {
    fn set_header(
        &mut self,
        header: DataHeader,
    ) -> BiorecResult<()> {
        let segments: Vec<(usize, usize)> = header
            .signals()
            .iter()
            .enumerate()
            .map(|(i, s)| (header.signal_start(i), s.samples_per_record()))
            .collect();
        let record_size = header.record_size();
        let previous = self.in_header.replace(header);

        let Some(out_header) = self.out_header() else {
            self.in_header = previous;
            return Err(BiorecError::invalid_argument("Joined header is out of range"));
        };
        debug!(
            "RecordsJoiner: join {} records, out record size {}",
            self.join,
            out_header.record_size()
        );
        if let Err(e) = self.out.set_header(out_header) {
            self.in_header = previous;
            return Err(e);
        }

        // Незавершённая группа сохраняется, если раскладка записи не изменилась.
        if segments != self.segments {
            if self.joined > 0 {
                warn!("Record layout changed, dropping {} buffered records", self.joined);
            }
            self.joined = 0;
            self.out_record = vec![0; record_size * self.join];
            self.segments = segments;
        }
        Ok(())
    }

    fn write_data_record(
        &mut self,
        record: &[i32],
    ) -> BiorecResult<()> {
        checked_header(self.in_header.as_ref(), record)?;

        for &(start, len) in &self.segments {
            let dst = start * self.join + self.joined * len;
            self.out_record[dst..dst + len].copy_from_slice(&record[start..start + len]);
        }
        self.joined += 1;

        if self.joined == self.join {
            self.joined = 0;
            self.out.write_data_record(&self.out_record)?;
        }
        Ok(())
    }

    fn close(&mut self) -> BiorecResult<()> {
        if self.joined > 0 {
            warn!(
                "RecordsJoiner: dropping incomplete group of {} records (need {})",
                self.joined, self.join
            );
            self.joined = 0;
        }
        self.out.close()
    }

    fn resultant_header(&self) -> Option<DataHeader> {
        self.out.resultant_header().or_else(|| self.out_header())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
