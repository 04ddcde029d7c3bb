//! Simple moving average of volume, incremental form.

use crate::buffer::RingBuffer;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct VolumeSma {
    period: usize,
    volumes: RingBuffer<f64>,
    value: Option<f64>,
}

impl VolumeSma {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "volume SMA period must be >= 1");
        Self { period, volumes: RingBuffer::new(period), value: None }
    }

    pub fn update(&mut self, bar: &Bar) {
        self.volumes.push(bar.volume);
        if self.volumes.len() == self.period {
            let sum: f64 = self.volumes.iter().sum();
            self.value = Some(sum / self.period as f64);
        } else {
            self.value = None;
        }
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn is_warm(&self) -> bool {
        self.value.is_some()
    }
}
