use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

/// Метрики, обновляемые lock-free из нескольких потоков.
#[derive(Debug, Default)]
pub struct RecorderMetrics {
    pub frames_received: AtomicU64,
    pub dropped_frames: AtomicU64,
    /// Записей, переданных в цепочку преобразований
    pub records_assembled: AtomicU64,
    /// Записей, принятых писателем файла
    pub records_written: AtomicU64,
    pub write_errors: AtomicU64,
    pub bytes_written: AtomicU64,
}

/// Snapshot метрик для отображения / тестирования.
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub duration_secs: f64,
    pub frames_received: u64,
    pub dropped_frames: u64,
    pub records_assembled: u64,
    pub records_written: u64,
    pub write_errors: u64,
    pub bytes_written: u64,
    pub frame_rate_hz: f64,
    pub drop_rate_pct: f64,
}

impl RecorderMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Принятых кадров в секунду.
    pub fn frame_rate_hz(
        &self,
        elapsed: &Instant,
    ) -> f64 {
        let secs = elapsed.elapsed().as_secs_f64();

        if secs < 1e-9 {
            return 0.0;
        }

        self.frames_received.load(Ordering::Relaxed) as f64 / secs
    }

    /// Процент потерянных кадров (0.0-100.0).
    pub fn drop_rate_pct(&self) -> f64 {
        let received = self.frames_received.load(Ordering::Relaxed);
        let dropped = self.dropped_frames.load(Ordering::Relaxed);
        let total = received + dropped;

        if total == 0 {
            0.0
        } else {
            dropped as f64 / total as f64 * 100.0
        }
    }

    /// Итоговая сводка для вывода в конце сессии.
    pub fn summary(
        &self,
        elapsed: &Instant,
    ) -> MetricsSummary {
        MetricsSummary {
            duration_secs: elapsed.elapsed().as_secs_f64(),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
            records_assembled: self.records_assembled.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            frame_rate_hz: self.frame_rate_hz(elapsed),
            drop_rate_pct: self.drop_rate_pct(),
        }
    }
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(f, "  Duration      : {:.1}s", self.duration_secs)?;
        writeln!(f, "  Frames        : {}", self.frames_received)?;
        writeln!(
            f,
            "  Dropped       : {} ({:.2}%)",
            self.dropped_frames, self.drop_rate_pct
        )?;
        writeln!(f, "  Records in    : {}", self.records_assembled)?;
        writeln!(f, "  Records out   : {}", self.records_written)?;
        writeln!(f, "  Write errors  : {}", self.write_errors)?;
        writeln!(
            f,
            "  Bytes written : {:.1} KB",
            self.bytes_written as f64 / 1e3
        )?;
        writeln!(f, "  Frame rate    : {:.1} Hz", self.frame_rate_hz)?;
        write!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")
    }
}
