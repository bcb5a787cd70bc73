use biorec_types::BiorecResult;

use crate::CircularFifoBuffer;

/// Цифровой фильтр с состоянием: одно значение на входе, одно на выходе.
pub trait DigitalFilter {
    fn filtered_value(
        &mut self,
        value: f64,
    ) -> f64;
}

impl<F: FnMut(f64) -> f64> DigitalFilter for F {
    fn filtered_value(
        &mut self,
        value: f64,
    ) -> f64 {
        self(value)
    }
}

/// Скользящее среднее по последним `window` значениям.
///
/// Пока окно не заполнено, среднее считается по уже накопленным значениям.
#[derive(Debug, Clone)]
pub struct MovingAverageFilter {
    buffer: CircularFifoBuffer,
    sum: f64,
}

impl MovingAverageFilter {
    pub fn new(window: usize) -> BiorecResult<Self> {
        Ok(Self {
            buffer: CircularFifoBuffer::new(window)?,
            sum: 0.0,
        })
    }

    pub fn window(&self) -> usize {
        self.buffer.capacity()
    }
}

impl DigitalFilter for MovingAverageFilter {
    fn filtered_value(
        &mut self,
        value: f64,
    ) -> f64 {
        if self.buffer.is_full() {
            if let Ok(oldest) = self.buffer.get() {
                self.sum -= oldest;
            }
        }
        self.buffer.add(value);
        self.sum += value;
        self.sum / self.buffer.size() as f64
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_moving_average_warm_up() {
        let mut filter = MovingAverageFilter::new(3).unwrap();
        let out: Vec<f64> = (1..=9).map(|v| filter.filtered_value(v as f64)).collect();

        assert_abs_diff_eq!(out[0], 1.0);
        assert_abs_diff_eq!(out[1], 1.5);
        assert_abs_diff_eq!(out[2], 2.0);
        for (i, v) in out.iter().enumerate().skip(2) {
            // среднее трёх последних: i-1, i, i+1
            assert_abs_diff_eq!(*v, i as f64, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_zero_window_rejected() {
        assert!(MovingAverageFilter::new(0).is_err());
    }

    #[test]
    fn test_closure_is_a_filter() {
        let mut gain = |v: f64| v * 2.0;

        assert_eq!(gain.filtered_value(1.5), 3.0);
    }
}
