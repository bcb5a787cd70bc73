use std::{
    fs::File,
    io::{Seek, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use biorec_core::{DataRecordStream, RecordWriter};
use biorec_types::{BiorecError, DataHeader, UsageError};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{info, warn};

use crate::{
    device::{FrameChunk, SampleSource},
    metrics::RecorderMetrics,
    RecorderConfig, RecorderError, RecorderResult,
};

/// Собирает кадры в записи данных.
///
/// Канал `c` занимает в записи отрезок `[c * spr, (c + 1) * spr)`; значения
/// кадра сверх числа каналов (aux) отбрасываются.
#[derive(Debug)]
pub struct FrameAssembler {
    channels: usize,
    samples_per_record: usize,
    record: Vec<i32>,
    filled: usize,
}

impl FrameAssembler {
    pub fn new(
        channels: usize,
        samples_per_record: usize,
    ) -> Self {
        Self {
            channels,
            samples_per_record,
            record: vec![0; channels * samples_per_record],
            filled: 0,
        }
    }

    /// Для заголовка, у всех сигналов которого одинаковое число выборок в записи.
    pub fn for_header(header: &DataHeader) -> RecorderResult<Self> {
        let signals = header.signals();
        let Some(first) = signals.first() else {
            return Err(RecorderError::Config("header has no signals".to_string()));
        };
        let spr = first.samples_per_record();
        if signals.iter().any(|s| s.samples_per_record() != spr) {
            return Err(RecorderError::Config(
                "all signals must have the same samples per record".to_string(),
            ));
        }
        Ok(Self::new(signals.len(), spr))
    }

    /// Кадров в незавершённой записи
    pub fn pending_frames(&self) -> usize {
        self.filled
    }

    /// Добавляет кадр. Возвращает запись, если она заполнена.
    pub fn push(
        &mut self,
        frame: &[i32],
    ) -> RecorderResult<Option<&[i32]>> {
        if frame.len() < self.channels {
            return Err(RecorderError::Pipeline(format!(
                "frame has {} values, expected at least {}",
                frame.len(),
                self.channels
            )));
        }
        for (c, &value) in frame[..self.channels].iter().enumerate() {
            self.record[c * self.samples_per_record + self.filled] = value;
        }
        self.filled += 1;

        if self.filled == self.samples_per_record {
            self.filled = 0;
            return Ok(Some(&self.record));
        }
        Ok(None)
    }
}

/// Оркестрирует сессию записи.
pub struct RecordingPipeline {
    config: RecorderConfig,
    header: DataHeader,
    metrics: Arc<RecorderMetrics>,
    stop_flag: Arc<AtomicBool>,
}

impl RecordingPipeline {
    /// Проверяет конфигурацию и строит заголовок. Возвращает также
    /// shared-ссылку на метрики.
    pub fn new(config: RecorderConfig) -> RecorderResult<(Self, Arc<RecorderMetrics>)> {
        config.validate()?;
        let header = config.build_header()?;
        FrameAssembler::for_header(&header)?;

        let metrics = RecorderMetrics::new();
        let p = Self {
            config,
            header,
            metrics: metrics.clone(),
            stop_flag: Arc::new(AtomicBool::new(false)),
        };

        Ok((p, metrics))
    }

    /// Заголовок на входе цепочки преобразований
    pub fn header(&self) -> &DataHeader {
        &self.header
    }

    /// Флаг остановки. Устанавливается в `true` для graceful shutdown.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop_flag.clone()
    }

    /// Запускает запись в файл из конфигурации. Блокируется до завершения.
    pub fn run(
        self,
        source: Box<dyn SampleSource>,
    ) -> RecorderResult<()> {
        let out = File::create(&self.config.output_path)?;
        self.run_with_output(source, out)
    }

    /// То же, но записи идут в `out`.
    ///
    /// Ошибка записи прерывает сессию: цепочка закрывается (заголовок
    /// исправляется, насколько это возможно), а ошибка возвращается.
    pub fn run_with_output<W: Write + Seek + Send + 'static>(
        self,
        mut source: Box<dyn SampleSource>,
        out: W,
    ) -> RecorderResult<()> {
        let info = source.info();
        if info.channels != self.header.number_of_signals() {
            return Err(RecorderError::Config(format!(
                "source delivers {} channels, header has {} signals",
                info.channels,
                self.header.number_of_signals()
            )));
        }

        info!(
            "Starting recording: {} @ {:.1} Hz, {} channels{}",
            info.name,
            info.sample_rate_hz,
            info.channels,
            if info.aux_channel { " + aux" } else { "" }
        );
        if let Some(serial) = &info.serial {
            info!("Source serial: {serial}");
        }
        info!(
            "Output: {:?}, duration: {:?}",
            self.config.output_path, self.config.duration_secs
        );

        let (tx, rx) = crossbeam_channel::bounded::<FrameChunk>(self.config.channel_capacity);
        let stop_flag = self.stop_flag.clone();
        let stop_flag_capture = stop_flag.clone();
        let metrics_capture = self.metrics.clone();

        // Поток источника
        let capture_handle = std::thread::spawn(move || {
            let result = source.run(tx, metrics_capture, stop_flag_capture);

            if let Err(ref e) = result {
                warn!("Capture thread error: {e}");
            }

            result
        });

        // Цикл записи (текущий поток)
        let writer_result = self.writer_loop(rx, out);

        stop_flag.store(true, Ordering::Relaxed);

        match capture_handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Capture thread finished with error: {e}"),
            Err(_) => warn!("Capture thread panicked"),
        }

        writer_result
    }

    fn writer_loop<W: Write + Seek + Send + 'static>(
        &self,
        rx: Receiver<FrameChunk>,
        out: W,
    ) -> RecorderResult<()> {
        let cfg = &self.config;
        let metrics = &self.metrics;

        // Заголовок писатель получит от цепочки: она может менять число
        // сигналов и выборок.
        let writer = Arc::new(RecordWriter::without_header(out));
        let mut chain = cfg.transform.build(Arc::clone(&writer))?;
        chain.set_header(self.header.clone())?;

        let out_header = chain
            .resultant_header()
            .ok_or_else(|| RecorderError::Pipeline("output header is not known".to_string()))?;
        let out_record_bytes =
            (out_header.record_size() * out_header.format_version().bytes_per_sample()) as u64;
        info!(
            "File: {} signals, {} samples per record, {:.3}s records",
            out_header.number_of_signals(),
            out_header.record_size(),
            out_header.duration_of_record()
        );

        let mut assembler = FrameAssembler::for_header(&self.header)?;
        let recv_timeout = Duration::from_millis(100);
        let stats_interval = Duration::from_secs(cfg.stats_interval_secs);

        let session_start = Instant::now();
        let mut last_stats = Instant::now();
        let mut next_frame = 0u64;
        let mut failure: Option<RecorderError> = None;

        'session: loop {
            if let Some(dur) = cfg.duration_secs {
                if session_start.elapsed().as_secs() >= dur {
                    info!("Duration limit reached ({dur}s). Finalizing...");
                    break;
                }
            }

            if self.stop_flag.load(Ordering::Relaxed) {
                info!("Stop signal received. Finalizing...");
                break;
            }

            let chunk = match rx.recv_timeout(recv_timeout) {
                Ok(c) => c,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    info!("Capture channel closed. Flushing...");
                    break;
                }
            };

            metrics
                .frames_received
                .fetch_add(chunk.frame_count() as u64, Ordering::Relaxed);
            if chunk.first_frame != next_frame {
                warn!(
                    "Frame gap: expected frame {next_frame}, got {} ({} frames missing)",
                    chunk.first_frame,
                    chunk.first_frame.saturating_sub(next_frame)
                );
            }
            next_frame = chunk.first_frame + chunk.frame_count() as u64;

            for frame in chunk.frames() {
                let record = match assembler.push(frame) {
                    Ok(Some(record)) => record,
                    Ok(None) => continue,
                    Err(e) => {
                        failure = Some(e);
                        break 'session;
                    }
                };
                metrics.records_assembled.fetch_add(1, Ordering::Relaxed);

                match chain.write_data_record(record) {
                    Ok(()) => {}
                    Err(BiorecError::Usage(UsageError::WriterClosed)) => {
                        warn!("Writer closed. Finalizing...");
                        break 'session;
                    }
                    Err(e) => {
                        metrics.write_errors.fetch_add(1, Ordering::Relaxed);
                        warn!("Write error: {e}. Finalizing...");
                        failure = Some(e.into());
                        break 'session;
                    }
                }
            }

            let written = writer.number_of_received_records();
            metrics.records_written.store(written, Ordering::Relaxed);
            metrics
                .bytes_written
                .store(written * out_record_bytes, Ordering::Relaxed);

            if last_stats.elapsed() >= stats_interval {
                self.log_progress(&session_start);
                last_stats = Instant::now();
            }
        }

        if assembler.pending_frames() > 0 {
            warn!(
                "Dropping {} frames of incomplete data record",
                assembler.pending_frames()
            );
        }

        // Закрывает все стадии и писатель, исправляет число записей в заголовке
        let closed = chain.close();

        let written = writer.number_of_received_records();
        metrics.records_written.store(written, Ordering::Relaxed);
        metrics
            .bytes_written
            .store(written * out_record_bytes, Ordering::Relaxed);

        if let Some(e) = failure {
            if let Err(close_err) = closed {
                warn!("File not finalized after error: {close_err}");
            }
            return Err(e);
        }
        closed?;

        info!("File finalized: {:?} ({written} records)", cfg.output_path);
        Ok(())
    }

    fn log_progress(
        &self,
        start: &Instant,
    ) {
        let m = &self.metrics;

        info!(
            "[ {:.0}s ] frames={} records={} dropped={} ({:.2}%) errors={}",
            start.elapsed().as_secs_f64(),
            m.frames_received.load(Ordering::Relaxed),
            m.records_written.load(Ordering::Relaxed),
            m.dropped_frames.load(Ordering::Relaxed),
            m.drop_rate_pct(),
            m.write_errors.load(Ordering::Relaxed),
        );
    }
}
