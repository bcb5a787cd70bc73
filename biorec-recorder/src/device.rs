// Симулятор выдаёт кадры (по одной выборке на канал) пачками в темпе
// реального времени, так что pipeline видит данные почти как с настоящего
// усилителя. В каждом канале синусоида своей частоты плюс шум, последний
// столбец кадра (aux) содержит уровень заряда батареи.

use std::{
    f64::consts::PI,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Sender, TrySendError};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{metrics::RecorderMetrics, RecorderConfig, RecorderResult, SourceKind};

/// Источник кадров с выборками.
pub trait SampleSource: Send {
    /// Информация об источнике
    fn info(&self) -> SourceInfo;

    /// Запускает выдачу кадров. Блокируется до установки `stop_flag` или
    /// закрытия канала.
    fn run(
        &mut self,
        tx: Sender<FrameChunk>,
        metrics: Arc<RecorderMetrics>,
        stop_flag: Arc<AtomicBool>,
    ) -> RecorderResult<()>;
}

/// Пачка подряд идущих кадров, хранится по кадрам:
/// `[f0c0, f0c1, .., f0cN, f1c0, ..]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameChunk {
    /// Номер первого кадра пачки от начала сессии
    pub first_frame: u64,
    /// Значений в одном кадре
    pub width: usize,
    pub data: Vec<i32>,
}

impl FrameChunk {
    pub fn frame_count(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.data.len() / self.width
        }
    }

    pub fn frames(&self) -> impl Iterator<Item = &[i32]> {
        self.data.chunks_exact(self.width.max(1))
    }
}

/// Информация об источнике (для логирования).
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub name: String,
    pub serial: Option<String>,
    pub sample_rate_hz: f64,
    pub channels: usize,
    pub aux_channel: bool,
}

/// Генератор синтетических биосигналов для тестов и демонстрации.
pub struct SimulatedSource {
    pub sample_rate_hz: f64,
    pub channels: usize,
    pub aux_channel: bool,
    /// Кадров в одной пачке
    pub chunk_frames: usize,
    /// Амплитуда синусоиды в цифровых единицах
    pub amplitude: f64,
    /// Амплитуда равномерного шума в цифровых единицах
    pub noise: f64,
    pub seed: u64,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl SimulatedSource {
    pub fn new(
        sample_rate_hz: f64,
        channels: usize,
        aux_channel: bool,
    ) -> Self {
        Self {
            sample_rate_hz,
            channels,
            aux_channel,
            chunk_frames: 10,
            amplitude: 10_000.0,
            noise: 100.0,
            seed: 0x5EED,
        }
    }

    /// Частота синусоиды канала `c`, Гц
    pub fn tone_hz(channel: usize) -> f64 {
        1.0 + channel as f64 * 2.0
    }

    fn width(&self) -> usize {
        self.channels + usize::from(self.aux_channel)
    }

    fn fill_frame(
        &self,
        frame: u64,
        rng: &mut StdRng,
        out: &mut Vec<i32>,
    ) {
        let t = frame as f64 / self.sample_rate_hz;
        for c in 0..self.channels {
            let tone = self.amplitude * (2.0 * PI * Self::tone_hz(c) * t).sin();
            let noise = if self.noise > 0.0 {
                rng.gen_range(-self.noise..=self.noise)
            } else {
                0.0
            };
            out.push((tone + noise).round() as i32);
        }
        if self.aux_channel {
            // 100% батареи, минус 1% в минуту
            let battery = (100.0 - t / 60.0).max(0.0);
            out.push(battery.round() as i32);
        }
    }
}

impl SampleSource for SimulatedSource {
    fn info(&self) -> SourceInfo {
        SourceInfo {
            name: "Simulated amplifier".to_string(),
            serial: Some("SIM-0001".to_string()),
            sample_rate_hz: self.sample_rate_hz,
            channels: self.channels,
            aux_channel: self.aux_channel,
        }
    }

    fn run(
        &mut self,
        tx: Sender<FrameChunk>,
        metrics: Arc<RecorderMetrics>,
        stop_flag: Arc<AtomicBool>,
    ) -> RecorderResult<()> {
        let frame_period_ns = 1_000_000_000f64 / self.sample_rate_hz;
        let width = self.width();
        let mut rng = StdRng::seed_from_u64(self.seed);

        let start = Instant::now();
        let mut next_frame: u64 = 0;

        while !stop_flag.load(Ordering::Relaxed) {
            let mut data = Vec::with_capacity(self.chunk_frames * width);
            for i in 0..self.chunk_frames as u64 {
                self.fill_frame(next_frame + i, &mut rng, &mut data);
            }

            let chunk = FrameChunk {
                first_frame: next_frame,
                width,
                data,
            };

            match tx.try_send(chunk) {
                Ok(()) => {}
                Err(TrySendError::Full(c)) => {
                    metrics
                        .dropped_frames
                        .fetch_add(c.frame_count() as u64, Ordering::Relaxed);
                }
                Err(TrySendError::Disconnected(_)) => break,
            }

            next_frame += self.chunk_frames as u64;

            // pacing: синхронизация по реальному времени
            let expected = Duration::from_nanos((next_frame as f64 * frame_period_ns) as u64);
            let elapsed = start.elapsed();
            if expected > elapsed {
                thread::sleep(expected - elapsed);
            }
        }

        Ok(())
    }
}

/// Создаёт источник по конфигурации для кадров из `channels` каналов.
pub fn create_source(
    config: &RecorderConfig,
    channels: usize,
) -> RecorderResult<Box<dyn SampleSource>> {
    match config.source {
        SourceKind::Simulated => Ok(Box::new(SimulatedSource::new(
            config.sample_rate_hz(),
            channels,
            config.aux_channel,
        ))),
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
