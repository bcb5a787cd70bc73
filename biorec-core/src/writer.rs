use std::{
    fs::File,
    io::{BufWriter, Seek, SeekFrom, Write},
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use biorec_types::{BiorecError, BiorecResult, DataHeader, FormatVersion, Signal, UsageError};
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::{
    binary::write_sample_le, header::MAX_NUMBER_OF_RECORDS, DataRecordStream, HeaderCodec,
};

/// Период опроса флага записи в [`RecordWriter::close`]
const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Последовательный писатель файлов EDF/BDF.
///
/// Принимает либо целые записи, либо порции выборок по сигналам строго по
/// кругу (0, 1, .., n-1, 0, ..). Значения вне цифрового диапазона сигнала
/// насыщаются. Перед первой записью пишется предварительный заголовок,
/// при закрытии в нём исправляется число записей.
///
/// Методы записи вызываются из одного потока. [`RecordWriter::close`] можно
/// вызвать из другого потока (через `Arc`): он запрещает новые записи и
/// дожидается окончания текущей.
pub struct RecordWriter<W: Write + Seek> {
    state: Mutex<WriterState<W>>,
    closed: AtomicBool,
    writing: AtomicBool,
}

struct WriterState<W: Write + Seek> {
    out: BufWriter<W>,
    header: Option<DataHeader>,
    header_written: bool,
    record_size: usize,
    /// Всего записанных выборок (по всем сигналам)
    sample_count: u64,
    /// Сигнал, чья порция ожидается следующей
    current_signal: usize,
    byte_buf: Vec<u8>,
}

/// Сбрасывает флаг записи при выходе из метода, в том числе по ошибке.
struct WritingGuard<'a>(&'a AtomicBool);

impl Drop for WritingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl RecordWriter<File> {
    pub fn create<P: AsRef<Path>>(
        path: P,
        header: DataHeader,
    ) -> BiorecResult<Self> {
        let writer = Self::without_header(File::create(path)?);
        writer.set_header(header)?;
        Ok(writer)
    }
}

impl<W: Write + Seek> RecordWriter<W> {
    /// Писатель с заданным заголовком. Ничего не пишет до первой записи.
    pub fn new(
        inner: W,
        header: DataHeader,
    ) -> BiorecResult<Self> {
        let writer = Self::without_header(inner);
        writer.set_header(header)?;
        Ok(writer)
    }

    /// Писатель, заголовок которого придёт позже через [`RecordWriter::set_header`].
    pub fn without_header(inner: W) -> Self {
        Self {
            state: Mutex::new(WriterState {
                out: BufWriter::new(inner),
                header: None,
                header_written: false,
                record_size: 0,
                sample_count: 0,
                current_signal: 0,
                byte_buf: Vec::new(),
            }),
            closed: AtomicBool::new(false),
            writing: AtomicBool::new(false),
        }
    }

    /// Задаёт заголовок. Повторный заголовок должен совпадать по формату,
    /// числу сигналов и числу выборок каждого сигнала.
    pub fn set_header(
        &self,
        header: DataHeader,
    ) -> BiorecResult<()> {
        let _guard = self.begin_write()?;
        let mut state = self.state.lock();

        if let Some(current) = &state.header {
            check_compatible(current, &header)?;
        }

        let mut header = header;
        header.set_number_of_records(-1)?;
        if let Some(current) = &state.header {
            if header.recording_start_time_ms() == 0 {
                header.set_recording_start_time_ms(current.recording_start_time_ms())?;
            }
        }

        debug!(
            "writer header: {} signals, record size {}",
            header.number_of_signals(),
            header.record_size()
        );
        state.record_size = header.record_size();
        state.header = Some(header);
        Ok(())
    }

    /// Текущий заголовок (копия).
    pub fn header(&self) -> Option<DataHeader> {
        self.state.lock().header.clone()
    }

    /// Пишет порцию цифровых выборок сигнала `signal`. Сигналы должны идти по
    /// кругу, длина порции равна числу выборок сигнала в записи.
    pub fn write_samples(
        &self,
        signal: usize,
        samples: &[i32],
    ) -> BiorecResult<()> {
        let _guard = self.begin_write()?;
        self.state.lock().write_signal(signal, samples)
    }

    /// То же для физических значений.
    pub fn write_physical_samples(
        &self,
        signal: usize,
        samples: &[f64],
    ) -> BiorecResult<()> {
        let _guard = self.begin_write()?;
        let mut state = self.state.lock();
        let digital = {
            let header = state.header()?;
            if signal >= header.number_of_signals() {
                return Err(UsageError::SignalIndex {
                    signal,
                    count: header.number_of_signals(),
                }
                .into());
            }
            to_digital(header.signal(signal), samples)
        };
        state.write_signal(signal, &digital)
    }

    /// Пишет целую запись. Допустимо только на границе записи.
    pub fn write_data_record(
        &self,
        record: &[i32],
    ) -> BiorecResult<()> {
        let _guard = self.begin_write()?;
        self.state.lock().write_record(record)
    }

    /// Пишет целую запись физических значений.
    pub fn write_physical_data_record(
        &self,
        record: &[f64],
    ) -> BiorecResult<()> {
        let _guard = self.begin_write()?;
        let mut state = self.state.lock();
        let digital = {
            let header = state.header()?;
            if record.len() != header.record_size() {
                return Err(UsageError::RecordLength {
                    expected: header.record_size(),
                    actual: record.len(),
                }
                .into());
            }
            let mut digital = Vec::with_capacity(record.len());
            let mut start = 0;
            for signal in header.signals() {
                let end = start + signal.samples_per_record();
                digital.extend(to_digital(signal, &record[start..end]));
                start = end;
            }
            digital
        };
        state.write_record(&digital)
    }

    /// Число полностью принятых записей. 0, если сигналов нет.
    pub fn number_of_received_records(&self) -> u64 {
        let state = self.state.lock();
        if state.record_size == 0 {
            return 0;
        }
        state.sample_count / state.record_size as u64
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Закрывает писатель: ждёт окончания текущей записи и исправляет число
    /// записей в заголовке. Повторный вызов ничего не делает.
    ///
    /// Если последняя запись не дописана, заголовок всё равно исправляется,
    /// а вызов возвращает [`UsageError::RecordIncomplete`].
    pub fn close(&self) -> BiorecResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        while self.writing.load(Ordering::SeqCst) {
            thread::sleep(CLOSE_POLL_INTERVAL);
        }
        self.state.lock().finish()
    }

    /// Возвращает поток вывода. Вызывать после [`RecordWriter::close`].
    pub fn into_inner(self) -> BiorecResult<W> {
        self.state
            .into_inner()
            .out
            .into_inner()
            .map_err(|e| BiorecError::Io(e.into_error()))
    }

    fn begin_write(&self) -> BiorecResult<WritingGuard<'_>> {
        self.writing.store(true, Ordering::SeqCst);
        let guard = WritingGuard(&self.writing);
        if self.closed.load(Ordering::SeqCst) {
            return Err(UsageError::WriterClosed.into());
        }
        Ok(guard)
    }
}

impl<W: Write + Seek> WriterState<W> {
    fn header(&self) -> BiorecResult<&DataHeader> {
        self.header
            .as_ref()
            .ok_or_else(|| UsageError::HeaderNotSet.into())
    }

    fn write_signal(
        &mut self,
        signal: usize,
        samples: &[i32],
    ) -> BiorecResult<()> {
        let header = self.header()?;
        let ns = header.number_of_signals();
        if ns == 0 {
            return Err(UsageError::NoSignals.into());
        }
        if signal != self.current_signal {
            return Err(UsageError::SignalOutOfOrder {
                expected: self.current_signal,
                actual: signal,
            }
            .into());
        }
        let spr = header.signal(signal).samples_per_record();
        if samples.len() != spr {
            return Err(UsageError::SampleCount {
                signal,
                expected: spr,
                actual: samples.len(),
            }
            .into());
        }

        self.ensure_header_written()?;

        let mut bytes = std::mem::take(&mut self.byte_buf);
        bytes.clear();
        if let Some(header) = &self.header {
            encode_clamped(
                &mut bytes,
                header.signal(signal),
                samples,
                header.format_version(),
            );
        }
        let result = self.out.write_all(&bytes);
        self.byte_buf = bytes;
        result?;

        self.sample_count += spr as u64;
        self.current_signal = (self.current_signal + 1) % ns;
        Ok(())
    }

    fn write_record(
        &mut self,
        record: &[i32],
    ) -> BiorecResult<()> {
        let header = self.header()?;
        if header.number_of_signals() == 0 {
            return Err(UsageError::NoSignals.into());
        }
        if self.current_signal != 0 {
            return Err(UsageError::RecordIncomplete.into());
        }
        if record.len() != self.record_size {
            return Err(UsageError::RecordLength {
                expected: self.record_size,
                actual: record.len(),
            }
            .into());
        }

        self.ensure_header_written()?;

        let mut bytes = std::mem::take(&mut self.byte_buf);
        bytes.clear();
        if let Some(header) = &self.header {
            let format = header.format_version();
            let mut start = 0;
            for signal in header.signals() {
                let end = start + signal.samples_per_record();
                encode_clamped(&mut bytes, signal, &record[start..end], format);
                start = end;
            }
        }
        let result = self.out.write_all(&bytes);
        self.byte_buf = bytes;
        result?;

        self.sample_count += record.len() as u64;
        Ok(())
    }

    /// Перед первыми данными: отметка времени начала и предварительный заголовок.
    fn ensure_header_written(&mut self) -> BiorecResult<()> {
        if self.header_written {
            return Ok(());
        }
        let Some(header) = self.header.as_mut() else {
            return Err(UsageError::HeaderNotSet.into());
        };
        if header.recording_start_time_ms() <= 0 {
            header.set_recording_start_time_ms(chrono::Utc::now().timestamp_millis())?;
        }
        let bytes = HeaderCodec::encode(header)?;
        self.out.write_all(&bytes)?;
        self.header_written = true;
        debug!("provisional header written ({} bytes)", bytes.len());
        Ok(())
    }

    fn finish(&mut self) -> BiorecResult<()> {
        if self.header.is_none() {
            self.out.flush()?;
            return Ok(());
        }
        self.ensure_header_written()?;

        let records = if self.record_size == 0 {
            0
        } else {
            (self.sample_count / self.record_size as u64) as i64
        };
        let incomplete = self.current_signal != 0;

        let Some(header) = self.header.as_mut() else {
            return Ok(());
        };
        if records > 0 && records <= MAX_NUMBER_OF_RECORDS {
            header.set_number_of_records(records)?;
        } else if records > MAX_NUMBER_OF_RECORDS {
            warn!("{records} records do not fit the header field, record count left unknown");
        }

        let bytes = HeaderCodec::encode(header)?;
        self.out.flush()?;
        self.out.seek(SeekFrom::Start(0))?;
        self.out.write_all(&bytes)?;
        self.out.flush()?;

        info!(
            "writer closed: {records} records, {} samples",
            self.sample_count
        );

        if incomplete {
            warn!("writer closed in the middle of a data record");
            return Err(UsageError::RecordIncomplete.into());
        }
        Ok(())
    }
}

fn check_compatible(
    current: &DataHeader,
    new: &DataHeader,
) -> BiorecResult<()> {
    if current.format_version() != new.format_version() {
        return Err(UsageError::IncompatibleHeader(format!(
            "format {} != {}",
            new.format_version(),
            current.format_version()
        ))
        .into());
    }
    if current.number_of_signals() != new.number_of_signals() {
        return Err(UsageError::IncompatibleHeader(format!(
            "number of signals {} != {}",
            new.number_of_signals(),
            current.number_of_signals()
        ))
        .into());
    }
    for (i, (a, b)) in current.signals().iter().zip(new.signals()).enumerate() {
        if a.samples_per_record() != b.samples_per_record() {
            return Err(UsageError::IncompatibleHeader(format!(
                "signal {i}: samples per record {} != {}",
                b.samples_per_record(),
                a.samples_per_record()
            ))
            .into());
        }
    }
    Ok(())
}

fn encode_clamped(
    out: &mut Vec<u8>,
    signal: &Signal,
    samples: &[i32],
    format: FormatVersion,
) {
    let width = format.bytes_per_sample();
    let start = out.len();
    out.resize(start + samples.len() * width, 0);
    for (chunk, &v) in out[start..].chunks_exact_mut(width).zip(samples) {
        write_sample_le(chunk, signal.clamp_digital(v), format);
    }
}

fn to_digital(
    signal: &Signal,
    physical: &[f64],
) -> Vec<i32> {
    physical
        .iter()
        .map(|&p| signal.physical_to_digital(p))
        .collect()
}

impl<W: Write + Seek> DataRecordStream for RecordWriter<W> {
    fn set_header(
        &mut self,
        header: DataHeader,
    ) -> BiorecResult<()> {
        RecordWriter::set_header(self, header)
    }

    fn write_data_record(
        &mut self,
        record: &[i32],
    ) -> BiorecResult<()> {
        RecordWriter::write_data_record(self, record)
    }

    fn close(&mut self) -> BiorecResult<()> {
        RecordWriter::close(self)
    }

    fn resultant_header(&self) -> Option<DataHeader> {
        self.header()
    }
}

/// Писатель, разделяемый с потоком, который его закрывает.
impl<W: Write + Seek> DataRecordStream for Arc<RecordWriter<W>> {
    fn set_header(
        &mut self,
        header: DataHeader,
    ) -> BiorecResult<()> {
        let writer: &RecordWriter<W> = self;
        writer.set_header(header)
    }

    fn write_data_record(
        &mut self,
        record: &[i32],
    ) -> BiorecResult<()> {
        let writer: &RecordWriter<W> = self;
        writer.write_data_record(record)
    }

    fn close(&mut self) -> BiorecResult<()> {
        let writer: &RecordWriter<W> = self;
        writer.close()
    }

    fn resultant_header(&self) -> Option<DataHeader> {
        let writer: &RecordWriter<W> = self;
        writer.header()
    }
}
