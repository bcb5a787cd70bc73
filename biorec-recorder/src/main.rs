use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use biorec_core::{parse_signal_pair, TransformConfig};
use biorec_recorder::{create_source, RecorderConfig, RecordingPipeline, SourceKind};
use biorec_types::FormatVersion;
use clap::Parser;
use log::{error, info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "biorec-recorder",
    version = env!("CARGO_PKG_VERSION"),
    about = "Record multi-channel biosignals to EDF/BDF file",
    long_about = None,
)]
struct Cli {
    /// Источник выборок: sim
    #[arg(short, long, default_value = "sim")]
    source: SourceKind,
    /// Формат файла: edf, bdf
    #[arg(long, default_value = "bdf")]
    format: FormatVersion,
    /// Число измерительных каналов
    #[arg(short, long, default_value = "4")]
    channels: usize,
    /// Выборок каждого канала в одной записи
    #[arg(long, default_value = "50")]
    samples_per_record: usize,
    /// Длительность записи, секунды
    #[arg(long, default_value = "0.1")]
    record_duration: f64,
    /// Источник не выдаёт служебный канал (заряд батареи)
    #[arg(long)]
    no_aux: bool,
    /// Взять заголовок из существующего EDF/BDF файла
    #[arg(long)]
    header_template: Option<PathBuf>,
    /// Идентификатор пациента
    #[arg(long, default_value = "Default patient")]
    patient: String,
    /// Идентификатор записи
    #[arg(long, default_value = "Default record")]
    recording: String,
    /// Путь к выходному файлу
    #[arg(short, long, default_value = "recording.bdf")]
    output: PathBuf,
    /// Ограничение записи (секунды). По умолчанию: до Ctrl+C
    #[arg(short, long)]
    duration: Option<u64>,
    /// Скользящее среднее: <сигнал>:<окно>, можно повторять
    #[arg(long = "filter", value_parser = parse_signal_pair)]
    filters: Vec<(usize, usize)>,
    /// Понижение частоты: <сигнал>:<делитель>, можно повторять
    #[arg(long = "divider", value_parser = parse_signal_pair)]
    dividers: Vec<(usize, usize)>,
    /// Удалить сигнал из файла, можно повторять
    #[arg(long = "remove")]
    removed: Vec<usize>,
    /// Объединять каждые N записей в одну
    #[arg(long, default_value = "1")]
    join: usize,
    /// Ёмкость канала между источником и писателем (пачек кадров)
    #[arg(long, default_value = "64")]
    channel_capacity: usize,
    /// Интервал вывода статистики (секунды)
    #[arg(long, default_value = "5")]
    stats_interval: u64,
    /// Подробный вывод (debug)
    #[arg(short, long)]
    verbose: bool,
    /// Тихий режим (только ошибки)
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.quiet {
        log::LevelFilter::Error
    } else if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_target(false)
        .format_timestamp_secs()
        .init();

    let config = RecorderConfig {
        source: cli.source,
        format: cli.format,
        channels: cli.channels,
        samples_per_record: cli.samples_per_record,
        record_duration_secs: cli.record_duration,
        aux_channel: !cli.no_aux,
        header_template: cli.header_template.clone(),
        patient_id: cli.patient.clone(),
        recording_id: cli.recording.clone(),
        transform: TransformConfig {
            moving_average: cli.filters.clone(),
            dividers: cli.dividers.clone(),
            removed_signals: cli.removed.clone(),
            join: cli.join,
        },
        output_path: cli.output.clone(),
        duration_secs: cli.duration,
        channel_capacity: cli.channel_capacity,
        stats_interval_secs: cli.stats_interval,
    };

    let (pipeline, metrics) = match RecordingPipeline::new(config.clone()) {
        Ok(p) => p,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    // С шаблоном число каналов задаёт заголовок, а не --channels
    let channels = pipeline.header().number_of_signals();
    let source = match create_source(&config, channels) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to open sample source: {e}");
            std::process::exit(1);
        }
    };

    let stop_flag: Arc<AtomicBool> = pipeline.stop_flag();
    let stop_ctrlc = stop_flag.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        if stop_ctrlc.swap(true, Ordering::SeqCst) {
            // Второй Ctrl+C: принудительный выход
            warn!("Force exit");
            std::process::exit(130);
        }
        warn!("Ctrl+C received, finishing current record and finalizing file...");
    }) {
        warn!("Failed to set Ctrl+C handler: {e}");
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Source        : {}", config.source);
    info!("  Format        : {}", config.format);
    info!("  Channels      : {channels}");
    info!("  Sample rate   : {:.1} Hz", config.sample_rate_hz());
    info!("  Record        : {:.3}s", config.record_duration_secs);
    if !config.transform.is_identity() {
        info!("  Transform     : {:?}", config.transform);
    }
    info!("  Output        : {:?}", cli.output);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let session_start = Instant::now();

    if let Err(e) = pipeline.run(source) {
        error!("Recording failed: {e}");
        std::process::exit(1);
    }

    let summary = metrics.summary(&session_start);
    info!("\n{summary}");

    if summary.dropped_frames > 0 {
        warn!(
            "{} frames dropped ({:.2}% loss). Consider: larger --channel-capacity",
            summary.dropped_frames, summary.drop_rate_pct
        );
    }

    if summary.write_errors > 0 {
        warn!(
            "{} write errors occurred. Check disk space and I/O.",
            summary.write_errors
        );
        std::process::exit(1);
    }

    info!("Recording complete: {:?}", cli.output);
}
