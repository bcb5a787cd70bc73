use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

/// Отставание, начиная с которого запись считается выданной с опозданием.
pub const UNDERRUN_THRESHOLD_NS: u64 = 1_000_000;

/// Результат ожидания очередной записи.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pace {
    /// Отклонение от расчётного момента, нс
    pub error_ns: u64,
    /// Расчётный момент уже прошёл более чем на [`UNDERRUN_THRESHOLD_NS`]
    pub underrun: bool,
}

/// Задаёт темп воспроизведения записей данных.
///
/// Запись с номером `n` должна быть выдана через
/// `n * record_duration / speed` реального времени от начала сессии. Если мы
/// опережаем, спим. Если отстаём, отмечаем underrun и продолжаем без задержки.
#[derive(Debug)]
pub struct TimingController {
    speed: f64,
    record_duration: Duration,
    session_start: Instant,
    paused: Arc<AtomicBool>,
}

impl TimingController {
    pub fn new(
        record_duration_sec: f64,
        speed: f64,
        paused: Arc<AtomicBool>,
    ) -> Self {
        Self {
            speed: speed.max(0.01),
            record_duration: Duration::from_secs_f64(record_duration_sec.max(0.0)),
            session_start: Instant::now(),
            paused,
        }
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Сбрасывает таймер (старт сессии или перемотка).
    pub fn reset(&mut self) {
        self.session_start = Instant::now();
    }

    /// Ждёт момента выдачи записи `record_index` (отсчёт от начала сессии).
    pub fn wait_for_record(
        &mut self,
        record_index: u64,
    ) -> Pace {
        while self.paused.load(Ordering::Relaxed) {
            let before = Instant::now();
            std::thread::sleep(Duration::from_millis(20));
            // время паузы не должно превращаться в отставание
            self.session_start += before.elapsed();
        }

        let file_offset_ns = self.record_duration.as_nanos() as f64 * record_index as f64;
        let real_offset_ns = (file_offset_ns / self.speed) as u64;
        let elapsed_ns = self.session_start.elapsed().as_nanos() as u64;

        if real_offset_ns > elapsed_ns {
            std::thread::sleep(Duration::from_nanos(real_offset_ns - elapsed_ns));

            let actual = self.session_start.elapsed().as_nanos() as u64;
            Pace {
                error_ns: actual.saturating_sub(real_offset_ns),
                underrun: false,
            }
        } else {
            let lag = elapsed_ns - real_offset_ns;
            Pace {
                error_ns: lag,
                underrun: lag > UNDERRUN_THRESHOLD_NS,
            }
        }
    }
}
