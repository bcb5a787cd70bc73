use biorec_types::BiorecResult;

use crate::{
    DataRecordStream, MovingAverageFilter, RecordsJoiner, SignalFilter, SignalFrequencyReducer,
    SignalRemover,
};

/// Настройка цепочки преобразований перед конечной стадией.
///
/// Порядок стадий фиксирован: фильтр → понижение частоты → удаление
/// сигналов → склейка записей → `sink`. Все номера сигналов относятся к
/// входному заголовку.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformConfig {
    /// (сигнал, окно) скользящего среднего
    pub moving_average: Vec<(usize, usize)>,
    /// (сигнал, делитель) частоты
    pub dividers: Vec<(usize, usize)>,
    pub removed_signals: Vec<usize>,
    /// Число склеиваемых записей; 0 и 1 означают «без склейки»
    pub join: usize,
}

impl TransformConfig {
    /// Цепочка без стадий
    pub fn is_identity(&self) -> bool {
        self.moving_average.is_empty()
            && self.dividers.is_empty()
            && self.removed_signals.is_empty()
            && self.join <= 1
    }

    /// Собирает стадии вокруг `sink`. Возвращает вход цепочки.
    pub fn build<S>(
        &self,
        sink: S,
    ) -> BiorecResult<Box<dyn DataRecordStream + Send>>
    where
        S: DataRecordStream + Send + 'static,
    {
        let mut stream: Box<dyn DataRecordStream + Send> = Box::new(sink);

        if self.join > 1 {
            stream = Box::new(RecordsJoiner::new(stream, self.join)?);
        }

        if !self.removed_signals.is_empty() {
            let mut remover = SignalRemover::new(stream);
            for &signal in &self.removed_signals {
                remover.remove_signal(signal)?;
            }
            stream = Box::new(remover);
        }

        if !self.dividers.is_empty() {
            let mut reducer = SignalFrequencyReducer::new(stream);
            for &(signal, divider) in &self.dividers {
                reducer.add_divider(signal, divider)?;
            }
            stream = Box::new(reducer);
        }

        if !self.moving_average.is_empty() {
            let mut filter = SignalFilter::new(stream);
            for &(signal, window) in &self.moving_average {
                filter.add_signal_filter(
                    signal,
                    MovingAverageFilter::new(window)?,
                    &format!("movAvg:{window}"),
                )?;
            }
            stream = Box::new(filter);
        }

        Ok(stream)
    }
}

/// Разбирает пару `"сигнал:значение"`, например `"1:4"`.
pub fn parse_signal_pair(s: &str) -> Result<(usize, usize), String> {
    let (signal, value) = s
        .split_once(':')
        .ok_or_else(|| format!("expected <signal>:<value>, got '{s}'"))?;
    let signal = signal
        .trim()
        .parse::<usize>()
        .map_err(|e| format!("invalid signal number '{signal}': {e}"))?;
    let value = value
        .trim()
        .parse::<usize>()
        .map_err(|e| format!("invalid value '{value}': {e}"))?;
    if value == 0 {
        return Err(format!("value must be positive in '{s}'"));
    }
    Ok((signal, value))
}
