use biorec_types::{BiorecResult, DataHeader};

use crate::{stream::checked_header, DataRecordStream};

/// Конечная стадия, сохраняющая всё полученное в памяти.
///
/// Проверяет, что длина каждой записи равна размеру записи последнего
/// полученного заголовка.
#[derive(Debug, Default)]
pub struct RecordCollector {
    headers: Vec<DataHeader>,
    records: Vec<Vec<i32>>,
    closed: bool,
}

impl RecordCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Последний полученный заголовок
    pub fn header(&self) -> Option<&DataHeader> {
        self.headers.last()
    }

    /// Все заголовки в порядке получения
    pub fn headers(&self) -> &[DataHeader] {
        &self.headers
    }

    pub fn records(&self) -> &[Vec<i32>] {
        &self.records
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl DataRecordStream for RecordCollector {
    fn set_header(
        &mut self,
        header: DataHeader,
    ) -> BiorecResult<()> {
        self.headers.push(header);
        Ok(())
    }

    fn write_data_record(
        &mut self,
        record: &[i32],
    ) -> BiorecResult<()> {
        checked_header(self.headers.last(), record)?;
        self.records.push(record.to_vec());
        Ok(())
    }

    fn close(&mut self) -> BiorecResult<()> {
        self.closed = true;
        Ok(())
    }

    fn resultant_header(&self) -> Option<DataHeader> {
        self.headers.last().cloned()
    }
}
