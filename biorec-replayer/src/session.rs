use std::{
    fs::File,
    io::{Read, Seek, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use biorec_core::{DataRecordStream, RecordReader, RecordWriter, TimingController};
use biorec_types::{BiorecResult, DataHeader, FormatVersion};
use log::{debug, info, warn};

use crate::{ReplayConfig, ReplayMetrics, ReplayResult};

/// Перевод записей в другой формат с сохранением физических значений.
///
/// Физические диапазоны сигналов не меняются, цифровые расширяются до
/// полного диапазона нового формата.
#[derive(Debug, Clone)]
pub struct FormatConversion {
    from: DataHeader,
    to: DataHeader,
}

impl FormatConversion {
    pub fn new(
        from: &DataHeader,
        format: FormatVersion,
    ) -> BiorecResult<Self> {
        let mut to = DataHeader::new(format, from.number_of_signals());
        to.set_patient_id(from.patient_id());
        to.set_recording_id(from.recording_id());
        to.set_recording_start_time_ms(from.recording_start_time_ms())?;
        to.set_duration_of_record(from.duration_of_record())?;
        to.set_number_of_records(from.number_of_records())?;

        for (i, s) in from.signals().iter().enumerate() {
            to.set_samples_per_record(i, s.samples_per_record())?;
            to.set_digital_range(i, format.digital_min(), format.digital_max())?;
            to.set_physical_range(i, s.physical_min(), s.physical_max())?;

            let out = to.signal_mut(i)?;
            out.set_label(s.label());
            out.set_transducer(s.transducer());
            out.set_prefiltering(s.prefiltering());
            out.set_physical_dimension(s.physical_dimension());
        }

        Ok(Self {
            from: from.clone(),
            to,
        })
    }

    /// Заголовок после перевода
    pub fn header(&self) -> &DataHeader {
        &self.to
    }

    /// Переводит запись на месте.
    pub fn convert(
        &self,
        record: &mut [i32],
    ) {
        let mut start = 0;
        for (src, dst) in self.from.signals().iter().zip(self.to.signals()) {
            let end = start + src.samples_per_record();
            for v in &mut record[start..end] {
                *v = dst.clamp_digital(dst.physical_to_digital(src.digital_to_physical(*v)));
            }
            start = end;
        }
    }
}

/// Сессия воспроизведения (single-threaded): файл читается запись за
/// записью, проходит цепочку преобразований и пишется в новый файл.
pub struct ReplaySession {
    config: ReplayConfig,
    metrics: Arc<ReplayMetrics>,
    stop_flag: Arc<AtomicBool>,
    pause_flag: Arc<AtomicBool>,
}

impl ReplaySession {
    /// Создаёт сессию, проверяя конфигурацию.
    pub fn new(config: ReplayConfig) -> ReplayResult<Self> {
        config.validate()?;

        Ok(Self {
            config,
            metrics: ReplayMetrics::new(),
            stop_flag: Arc::new(AtomicBool::new(false)),
            pause_flag: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop_flag.clone()
    }

    /// Пауза. Действует только при заданной скорости.
    pub fn pause_flag(&self) -> Arc<AtomicBool> {
        self.pause_flag.clone()
    }

    pub fn metrics(&self) -> Arc<ReplayMetrics> {
        self.metrics.clone()
    }

    /// Заголовок входного файла в виде текста или JSON.
    pub fn inspect(&self) -> ReplayResult<String> {
        let reader = RecordReader::open(&self.config.input_path)?;
        let header = reader.header();

        if self.config.json {
            Ok(serde_json::to_string_pretty(header)?)
        } else {
            Ok(header.to_string())
        }
    }

    /// Запускает воспроизведение. Блокирует до конца файла или stop_flag.
    pub fn run(self) -> ReplayResult<()> {
        let input = File::open(&self.config.input_path)?;
        let output_path = self.config.output_path.clone().unwrap_or_default();
        let output = File::create(&output_path)?;
        self.run_with_io(input, output)
    }

    /// То же для произвольных потоков ввода и вывода.
    ///
    /// Цепочка закрывается в любом случае: при ошибке чтения или записи
    /// заголовок выходного файла исправляется по уже записанным записям, а
    /// вызов возвращает исходную ошибку.
    pub fn run_with_io<R, W>(
        self,
        input: R,
        output: W,
    ) -> ReplayResult<()>
    where
        R: Read + Seek,
        W: Write + Seek + Send + 'static,
    {
        let cfg = &self.config;
        let metrics = &self.metrics;
        let session_start = Instant::now();

        let mut reader = RecordReader::new(input)?;
        let in_header = reader.header().clone();

        let conversion = match cfg.format {
            Some(format) if format != in_header.format_version() => {
                Some(FormatConversion::new(&in_header, format)?)
            }
            _ => None,
        };
        let header = conversion
            .as_ref()
            .map_or_else(|| in_header.clone(), |c| c.header().clone());

        let writer = Arc::new(RecordWriter::without_header(output));
        let mut chain = cfg.transform.build(Arc::clone(&writer))?;
        chain.set_header(header.clone())?;

        Self::print_header_info(&header, cfg, reader.number_of_records()?);

        let timing = cfg.speed.map(|speed| {
            TimingController::new(header.duration_of_record(), speed, self.pause_flag.clone())
        });
        let replayed = self.replay_records(
            &mut reader,
            conversion.as_ref(),
            timing,
            chain.as_mut(),
            &writer,
            &session_start,
        );

        let closed = chain.close();
        metrics
            .records_written
            .store(writer.number_of_received_records(), Ordering::Relaxed);
        match replayed {
            Ok(index) => {
                debug!("EOF after {index} records");
                closed?;
            }
            Err(e) => {
                warn!(
                    "Replay aborted after {} records: {e}",
                    writer.number_of_received_records()
                );
                if let Err(close_err) = closed {
                    warn!("Output not finalized: {close_err}");
                }
                return Err(e);
            }
        }

        if metrics.underruns.load(Ordering::Relaxed) > 0 {
            warn!(
                "{} records were late. Consider a lower --speed",
                metrics.underruns.load(Ordering::Relaxed)
            );
        }

        info!("Output finalized: {:?}", cfg.output_path);
        metrics.log_summary(&session_start);

        Ok(())
    }

    /// Цикл записей. Возвращает число переданных в цепочку записей.
    fn replay_records<R, W>(
        &self,
        reader: &mut RecordReader<R>,
        conversion: Option<&FormatConversion>,
        mut timing: Option<TimingController>,
        chain: &mut dyn DataRecordStream,
        writer: &RecordWriter<W>,
        session_start: &Instant,
    ) -> ReplayResult<u64>
    where
        R: Read + Seek,
        W: Write + Seek,
    {
        let metrics = &self.metrics;
        let stats_interval = Duration::from_secs(self.config.stats_interval_secs);
        let mut last_stats = Instant::now();
        let mut index = 0u64;

        while let Some(mut record) = reader.next_record()? {
            if self.stop_flag.load(Ordering::Relaxed) {
                info!("Stop signal received. Finalizing...");
                break;
            }

            if let Some(timing) = timing.as_mut() {
                let pace = timing.wait_for_record(index);
                metrics.record_timing(pace.error_ns, pace.underrun);
            }

            if let Some(conversion) = conversion {
                conversion.convert(&mut record);
            }

            chain.write_data_record(&record)?;
            index += 1;

            metrics.records_read.fetch_add(1, Ordering::Relaxed);
            metrics
                .samples_read
                .fetch_add(record.len() as u64, Ordering::Relaxed);

            if last_stats.elapsed() >= stats_interval {
                metrics
                    .records_written
                    .store(writer.number_of_received_records(), Ordering::Relaxed);
                Self::log_progress(metrics, session_start);
                last_stats = Instant::now();
            }
        }

        Ok(index)
    }

    fn print_header_info(
        h: &DataHeader,
        cfg: &ReplayConfig,
        records: u64,
    ) {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!("  Input         : {:?}", cfg.input_path);
        info!("  Output        : {:?}", cfg.output_path);
        match cfg.speed {
            Some(speed) => info!("  Speed         : {speed}x"),
            None => info!("  Speed         : max"),
        }
        info!("  Format        : {}", h.format_version());
        info!("  Signals       : {}", h.number_of_signals());
        info!("  Record        : {:.3}s", h.duration_of_record());
        info!("  Records       : {records}");
        if !cfg.transform.is_identity() {
            info!("  Transform     : {:?}", cfg.transform);
        }
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    fn log_progress(
        m: &ReplayMetrics,
        start: &Instant,
    ) {
        info!(
            "[ {:.0}s ] read={} written={} underruns={} timing_err={:.1}µs",
            start.elapsed().as_secs_f64(),
            m.records_read.load(Ordering::Relaxed),
            m.records_written.load(Ordering::Relaxed),
            m.underruns.load(Ordering::Relaxed),
            m.avg_timing_error_us(),
        );
    }
}
