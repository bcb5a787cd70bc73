use serde::{Deserialize, Serialize};

use crate::FormatVersion;

/// Описание одного канала: калибровка и число выборок в записи.
///
/// Калибровка линейная:
/// `gain = (physical_max - physical_min) / (digital_max - digital_min)`,
/// `offset = physical_max / gain - digital_max`,
/// `physical = (digital + offset) * gain`.
///
/// Диапазоны меняются только через [`crate::DataHeader`], который проверяет
/// их относительно формата.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub(crate) label: String,
    pub(crate) transducer: String,
    pub(crate) prefiltering: String,
    pub(crate) physical_dimension: String,
    pub(crate) physical_min: f64,
    pub(crate) physical_max: f64,
    pub(crate) digital_min: i32,
    pub(crate) digital_max: i32,
    pub(crate) samples_per_record: usize,
}

impl Signal {
    /// Сигнал по умолчанию: полный диапазон формата, 1 выборка в записи.
    pub fn new(
        format: FormatVersion,
        index: usize,
    ) -> Self {
        Self {
            label: format!("Channel_{index}"),
            transducer: "Unknown".to_string(),
            prefiltering: String::new(),
            physical_dimension: String::new(),
            physical_min: format.digital_min() as f64,
            physical_max: format.digital_max() as f64,
            digital_min: format.digital_min(),
            digital_max: format.digital_max(),
            samples_per_record: 1,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn transducer(&self) -> &str {
        &self.transducer
    }

    pub fn prefiltering(&self) -> &str {
        &self.prefiltering
    }

    pub fn physical_dimension(&self) -> &str {
        &self.physical_dimension
    }

    pub fn physical_min(&self) -> f64 {
        self.physical_min
    }

    pub fn physical_max(&self) -> f64 {
        self.physical_max
    }

    pub fn digital_min(&self) -> i32 {
        self.digital_min
    }

    pub fn digital_max(&self) -> i32 {
        self.digital_max
    }

    pub fn samples_per_record(&self) -> usize {
        self.samples_per_record
    }

    pub fn set_label<S: Into<String>>(
        &mut self,
        label: S,
    ) {
        self.label = label.into();
    }

    pub fn set_transducer<S: Into<String>>(
        &mut self,
        transducer: S,
    ) {
        self.transducer = transducer.into();
    }

    pub fn set_prefiltering<S: Into<String>>(
        &mut self,
        prefiltering: S,
    ) {
        self.prefiltering = prefiltering.into();
    }

    pub fn set_physical_dimension<S: Into<String>>(
        &mut self,
        dimension: S,
    ) {
        self.physical_dimension = dimension.into();
    }

    pub fn gain(&self) -> f64 {
        (self.physical_max - self.physical_min) / (self.digital_max as f64 - self.digital_min as f64)
    }

    pub fn offset(&self) -> f64 {
        self.physical_max / self.gain() - self.digital_max as f64
    }

    /// Физическое значение в цифровое (с округлением до ближайшего целого).
    /// Результат не ограничивается цифровым диапазоном: см. [`Signal::clamp_digital`].
    pub fn physical_to_digital(
        &self,
        physical: f64,
    ) -> i32 {
        (physical / self.gain() - self.offset()).round() as i32
    }

    pub fn digital_to_physical(
        &self,
        digital: i32,
    ) -> f64 {
        (digital as f64 + self.offset()) * self.gain()
    }

    /// Насыщение значения до `[digital_min, digital_max]`
    pub fn clamp_digital(
        &self,
        digital: i32,
    ) -> i32 {
        digital.clamp(self.digital_min, self.digital_max)
    }

    /// Частота дискретизации в Гц при заданной длительности записи
    pub fn sample_frequency(
        &self,
        record_duration_sec: f64,
    ) -> f64 {
        self.samples_per_record as f64 / record_duration_sec
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn calibrated() -> Signal {
        let mut signal = Signal::new(FormatVersion::Edf16Bit, 0);
        signal.digital_min = -2048;
        signal.digital_max = 2047;
        signal.physical_min = -500.0;
        signal.physical_max = 500.0;
        signal
    }

    #[test]
    fn test_default_signal() {
        let signal = Signal::new(FormatVersion::Bdf24Bit, 3);

        assert_eq!(signal.label(), "Channel_3");
        assert_eq!(signal.transducer(), "Unknown");
        assert_eq!(signal.prefiltering(), "");
        assert_eq!(signal.digital_min(), -8_388_608);
        assert_eq!(signal.physical_max(), 8_388_607.0);
        assert_abs_diff_eq!(signal.gain(), 1.0);
        assert_abs_diff_eq!(signal.offset(), 0.0);
    }

    #[test]
    fn test_physical_digital_round_trip_within_one_lsb() {
        let signal = calibrated();
        let lsb = signal.gain();

        let mut x = -500.0;
        while x <= 500.0 {
            let back = signal.digital_to_physical(signal.physical_to_digital(x));
            assert!((back - x).abs() <= lsb, "x={x} back={back}");
            x += 0.37;
        }
    }

    #[test]
    fn test_calibration_end_points() {
        let signal = calibrated();

        assert_abs_diff_eq!(signal.digital_to_physical(2047), 500.0, epsilon = 1e-9);
        assert_abs_diff_eq!(signal.digital_to_physical(-2048), -500.0, epsilon = 1e-9);
        assert_eq!(signal.physical_to_digital(500.0), 2047);
        assert_eq!(signal.physical_to_digital(-500.0), -2048);
    }

    #[test]
    fn test_clamp_digital() {
        let signal = calibrated();

        assert_eq!(signal.clamp_digital(5000), 2047);
        assert_eq!(signal.clamp_digital(-5000), -2048);
        assert_eq!(signal.clamp_digital(12), 12);
    }
}
