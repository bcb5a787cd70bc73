use std::{
    fs::File,
    io::{ErrorKind, Read, Seek, SeekFrom},
    path::Path,
};

use biorec_types::{BiorecError, BiorecResult, DataHeader, FormatVersion, UsageError};

use crate::{binary::read_samples_le, HeaderCodec};

/// Читатель файлов EDF/BDF с произвольным доступом.
///
/// Один курсор записей и независимый курсор выборок для каждого сигнала.
/// Число записей вычисляется по длине файла при каждом вызове, поэтому
/// читатель видит рост файла, который ещё пишется.
///
/// Не потокобезопасен: доступ из нескольких потоков упорядочивает вызывающий.
pub struct RecordReader<R: Read + Seek> {
    inner: R,
    header: DataHeader,
    header_len: u64,
    record_size: usize,
    format: FormatVersion,
    bytes_per_sample: usize,
    signal_starts: Vec<usize>,
    sample_positions: Vec<u64>,
    record_position: u64,
    byte_buf: Vec<u8>,
}

impl RecordReader<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> BiorecResult<Self> {
        Self::new(File::open(path)?)
    }
}

impl<R: Read + Seek> RecordReader<R> {
    /// Создаёт читатель, читая и проверяя заголовок из `inner`.
    pub fn new(mut inner: R) -> BiorecResult<Self> {
        inner.seek(SeekFrom::Start(0))?;
        let (header, header_len) = HeaderCodec::read_header(&mut inner)?;

        let ns = header.number_of_signals();
        let signal_starts = (0..ns).map(|i| header.signal_start(i)).collect();

        Ok(Self {
            inner,
            record_size: header.record_size(),
            format: header.format_version(),
            bytes_per_sample: header.format_version().bytes_per_sample(),
            header,
            header_len: header_len as u64,
            signal_starts,
            sample_positions: vec![0; ns],
            record_position: 0,
            byte_buf: Vec::new(),
        })
    }

    /// Заголовок файла.
    pub fn header(&self) -> &DataHeader {
        &self.header
    }

    /// Размер заголовка в байтах.
    pub fn header_len(&self) -> u64 {
        self.header_len
    }

    pub fn sample_position(
        &self,
        signal: usize,
    ) -> u64 {
        self.sample_positions[signal]
    }

    /// Переставляет курсор выборок одного сигнала. Остальные курсоры не меняются.
    pub fn set_sample_position(
        &mut self,
        signal: usize,
        position: u64,
    ) -> BiorecResult<()> {
        self.check_signal(signal)?;
        self.sample_positions[signal] = position;
        Ok(())
    }

    pub fn record_position(&self) -> u64 {
        self.record_position
    }

    pub fn set_record_position(
        &mut self,
        position: u64,
    ) {
        self.record_position = position;
    }

    /// Сбрасывает курсор записей и все курсоры выборок в 0.
    pub fn reset(&mut self) {
        self.record_position = 0;
        self.sample_positions.iter_mut().for_each(|p| *p = 0);
    }

    /// Полное число записей в файле (по его текущей длине).
    pub fn number_of_records(&mut self) -> BiorecResult<u64> {
        let record_bytes = (self.record_size * self.bytes_per_sample) as u64;
        if record_bytes == 0 {
            return Ok(0);
        }
        let len = self.inner.seek(SeekFrom::End(0))?;
        Ok(len.saturating_sub(self.header_len) / record_bytes)
    }

    pub fn number_of_samples(
        &mut self,
        signal: usize,
    ) -> BiorecResult<u64> {
        self.check_signal(signal)?;
        let spr = self.header.signal(signal).samples_per_record() as u64;
        Ok(self.number_of_records()? * spr)
    }

    /// Записей, доступных от текущего курсора записей.
    pub fn available_records(&mut self) -> BiorecResult<u64> {
        Ok(self.number_of_records()?.saturating_sub(self.record_position))
    }

    /// Выборок сигнала, доступных от его текущего курсора.
    pub fn available_samples(
        &mut self,
        signal: usize,
    ) -> BiorecResult<u64> {
        let total = self.number_of_samples(signal)?;
        Ok(total.saturating_sub(self.sample_positions[signal]))
    }

    /// Читает до `buf.len()` цифровых выборок сигнала от его курсора.
    /// В конце файла возвращает меньше (или 0), не блокируется и не дополняет.
    pub fn read_samples(
        &mut self,
        signal: usize,
        buf: &mut [i32],
    ) -> BiorecResult<usize> {
        self.check_signal(signal)?;
        self.read_signal(signal, buf)
    }

    /// То же, что [`RecordReader::read_samples`], с пересчётом в физические значения.
    pub fn read_physical_samples(
        &mut self,
        signal: usize,
        buf: &mut [f64],
    ) -> BiorecResult<usize> {
        self.check_signal(signal)?;
        let mut digital = vec![0i32; buf.len()];
        let n = self.read_signal(signal, &mut digital)?;

        let s = self.header.signal(signal);
        for (dst, &d) in buf.iter_mut().zip(&digital[..n]) {
            *dst = s.digital_to_physical(d);
        }
        Ok(n)
    }

    /// Читает до `n` целых записей от курсора записей в `buf`.
    ///
    /// Возвращает число прочитанных записей (может быть меньше `n`) или
    /// `None`, если данных за курсором нет совсем.
    pub fn read_data_records(
        &mut self,
        n: usize,
        buf: &mut [i32],
    ) -> BiorecResult<Option<usize>> {
        if self.record_size == 0 {
            return Err(UsageError::NoSignals.into());
        }
        let wanted = n * self.record_size;
        if buf.len() < wanted {
            return Err(BiorecError::invalid_argument(format!(
                "Buffer holds {} samples, {n} records need {wanted}",
                buf.len()
            )));
        }

        let record_bytes = (self.record_size * self.bytes_per_sample) as u64;
        let pos = self.header_len + self.record_position * record_bytes;
        self.inner.seek(SeekFrom::Start(pos))?;

        self.byte_buf.resize(wanted * self.bytes_per_sample, 0);
        let got = read_full(&mut self.inner, &mut self.byte_buf)?;
        if got == 0 && n > 0 {
            return Ok(None);
        }

        let records = got / record_bytes as usize;
        let bytes = records * record_bytes as usize;
        read_samples_le(&self.byte_buf[..bytes], self.format, buf);
        self.record_position += records as u64;

        Ok(Some(records))
    }

    /// Следующая запись от курсора записей.
    pub fn next_record(&mut self) -> BiorecResult<Option<Vec<i32>>> {
        let mut record = vec![0i32; self.record_size];
        match self.read_data_records(1, &mut record)? {
            Some(1) => Ok(Some(record)),
            _ => Ok(None),
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn read_signal(
        &mut self,
        signal: usize,
        out: &mut [i32],
    ) -> BiorecResult<usize> {
        let spr = self.header.signal(signal).samples_per_record() as u64;
        let bps = self.bytes_per_sample as u64;
        let start = self.signal_starts[signal] as u64;
        let record_size = self.record_size as u64;

        let mut position = self.sample_positions[signal];
        let mut total = 0usize;

        while total < out.len() {
            let record = position / spr;
            let offset = position % spr;
            let chunk = ((spr - offset) as usize).min(out.len() - total);

            let file_pos = self.header_len + (record * record_size + start + offset) * bps;
            self.inner.seek(SeekFrom::Start(file_pos))?;

            let want = chunk * self.bytes_per_sample;
            self.byte_buf.resize(want, 0);
            let got = read_full(&mut self.inner, &mut self.byte_buf[..want])?;

            let n = read_samples_le(
                &self.byte_buf[..got],
                self.format,
                &mut out[total..],
            );
            total += n;
            position += n as u64;

            if got < want {
                break;
            }
        }

        self.sample_positions[signal] = position;
        Ok(total)
    }

    fn check_signal(
        &self,
        signal: usize,
    ) -> BiorecResult<()> {
        if signal >= self.sample_positions.len() {
            return Err(UsageError::SignalIndex {
                signal,
                count: self.sample_positions.len(),
            }
            .into());
        }
        Ok(())
    }
}

/// Записи по порядку от курсора записей.
impl<R: Read + Seek> Iterator for RecordReader<R> {
    type Item = BiorecResult<Vec<i32>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Читает, пока буфер не заполнится или не кончатся данные.
fn read_full<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
) -> BiorecResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
