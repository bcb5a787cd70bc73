use std::{path::PathBuf, sync::atomic::Ordering};

use biorec_core::{parse_signal_pair, TransformConfig};
use biorec_replayer::{ReplayConfig, ReplaySession};
use biorec_types::FormatVersion;
use clap::Parser;
use log::{error, warn};

#[derive(Parser, Debug)]
#[command(
    name = "biorec-replayer",
    version = env!("CARGO_PKG_VERSION"),
    about = "Replay EDF/BDF recording into a new file, optionally reshaped",
    long_about = None,
)]
struct Cli {
    /// Входной EDF/BDF файл
    input: PathBuf,
    /// Выходной файл
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Скорость относительно реального времени. По умолчанию: без задержек
    #[arg(short, long)]
    speed: Option<f64>,
    /// Формат выходного файла: edf, bdf
    #[arg(long)]
    format: Option<FormatVersion>,
    /// Скользящее среднее: <сигнал>:<окно>, можно повторять
    #[arg(long = "filter", value_parser = parse_signal_pair)]
    filters: Vec<(usize, usize)>,
    /// Понижение частоты: <сигнал>:<делитель>, можно повторять
    #[arg(long = "divider", value_parser = parse_signal_pair)]
    dividers: Vec<(usize, usize)>,
    /// Удалить сигнал, можно повторять
    #[arg(long = "remove")]
    removed: Vec<usize>,
    /// Объединять каждые N записей в одну
    #[arg(long, default_value = "1")]
    join: usize,
    /// Только вывести заголовок входного файла
    #[arg(long)]
    inspect: bool,
    /// Заголовок в JSON (с --inspect)
    #[arg(long)]
    json: bool,
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

    let config = ReplayConfig {
        input_path: cli.input,
        output_path: cli.output,
        speed: cli.speed,
        format: cli.format,
        transform: TransformConfig {
            moving_average: cli.filters,
            dividers: cli.dividers,
            removed_signals: cli.removed,
            join: cli.join,
        },
        stats_interval_secs: cli.stats_interval,
        inspect: cli.inspect,
        json: cli.json,
    };

    let session = match ReplaySession::new(config) {
        Ok(s) => s,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    if cli.inspect {
        match session.inspect() {
            Ok(text) => println!("{text}"),
            Err(e) => {
                error!("Failed to read header: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    let stop = session.stop_flag();
    if let Err(e) = ctrlc::set_handler(move || {
        if stop.swap(true, Ordering::SeqCst) {
            warn!("Force exit");
            std::process::exit(130);
        }
        warn!("Ctrl+C received, finalizing output...");
    }) {
        warn!("Failed to set Ctrl+C handler: {e}");
    }

    if let Err(e) = session.run() {
        error!("Replay failed: {e}");
        std::process::exit(1);
    }
}
