use biorec_types::{BiorecError, BiorecResult, UsageError};

/// Кольцевой FIFO-буфер фиксированной ёмкости.
///
/// При заполнении `add` вытесняет самый старый элемент. Совпадение `start` и
/// `end` разрешается флагом `full`, ёмкость используется полностью.
#[derive(Debug, Clone)]
pub struct CircularFifoBuffer {
    elements: Vec<f64>,
    /// Индекс самого старого элемента
    start: usize,
    /// Индекс следующей свободной ячейки
    end: usize,
    full: bool,
}

impl CircularFifoBuffer {
    pub fn new(capacity: usize) -> BiorecResult<Self> {
        if capacity == 0 {
            return Err(BiorecError::invalid_argument(
                "Buffer capacity must be > 0",
            ));
        }
        Ok(Self {
            elements: vec![0.0; capacity],
            start: 0,
            end: 0,
            full: false,
        })
    }

    pub fn capacity(&self) -> usize {
        self.elements.len()
    }

    pub fn size(&self) -> usize {
        if self.full {
            self.capacity()
        } else if self.end >= self.start {
            self.end - self.start
        } else {
            self.capacity() - self.start + self.end
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.full && self.start == self.end
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn clear(&mut self) {
        self.start = 0;
        self.end = 0;
        self.full = false;
    }

    pub fn add(
        &mut self,
        value: f64,
    ) {
        if self.full {
            self.start = self.increment(self.start);
        }
        self.elements[self.end] = value;
        self.end = self.increment(self.end);
        self.full = self.end == self.start;
    }

    /// Самый старый элемент без удаления
    pub fn get(&self) -> BiorecResult<f64> {
        if self.is_empty() {
            return Err(UsageError::BufferEmpty.into());
        }
        Ok(self.elements[self.start])
    }

    /// Удаляет и возвращает самый старый элемент
    pub fn remove(&mut self) -> BiorecResult<f64> {
        let value = self.get()?;
        self.start = self.increment(self.start);
        self.full = false;
        Ok(value)
    }

    fn increment(
        &self,
        index: usize,
    ) -> usize {
        (index + 1) % self.capacity()
    }
}
