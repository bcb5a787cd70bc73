use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

use log::info;

/// Счётчики сессии воспроизведения.
#[derive(Debug, Default)]
pub struct ReplayMetrics {
    pub records_read: AtomicU64,
    pub records_written: AtomicU64,
    pub samples_read: AtomicU64,
    /// Записи, выданные позже расчётного момента
    pub underruns: AtomicU64,
    pub timing_error_ns_sum: AtomicU64,
    pub timing_samples: AtomicU64,
}

impl ReplayMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Средняя ошибка темпа, мкс
    pub fn avg_timing_error_us(&self) -> f64 {
        let n = self.timing_samples.load(Ordering::Relaxed);

        if n == 0 {
            return 0.0;
        }

        self.timing_error_ns_sum.load(Ordering::Relaxed) as f64 / n as f64 / 1_000.0
    }

    pub fn record_timing(
        &self,
        error_ns: u64,
        underrun: bool,
    ) {
        self.timing_error_ns_sum
            .fetch_add(error_ns, Ordering::Relaxed);
        self.timing_samples.fetch_add(1, Ordering::Relaxed);
        if underrun {
            self.underruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn log_summary(
        &self,
        start: &Instant,
    ) {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!("  Duration      : {:.1}s", start.elapsed().as_secs_f64());
        info!(
            "  Records read  : {}",
            self.records_read.load(Ordering::Relaxed)
        );
        info!(
            "  Records out   : {}",
            self.records_written.load(Ordering::Relaxed)
        );
        info!(
            "  Samples       : {}",
            self.samples_read.load(Ordering::Relaxed)
        );
        info!("  Underruns     : {}", self.underruns.load(Ordering::Relaxed));
        info!("  Timing error  : {:.1}µs", self.avg_timing_error_us());
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }
}
