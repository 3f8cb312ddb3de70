//! Gridded model output and its time-indexed series.

use ndarray::Array2;

/// A regular elevation or erosion-deposition grid at one simulated-time checkpoint.
pub type Surface = Array2<f64>;

/// Checkpoint surfaces ordered ascending by simulated time.
///
/// The ordering is enforced at insertion, so iteration order is always the
/// time order of the simulation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CheckpointSeries {
    entries: Vec<(f64, Surface)>,
}

impl CheckpointSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Append a checkpoint. Times must arrive in strictly ascending order.
    pub fn push(&mut self, time: f64, surface: Surface) {
        if let Some((last, _)) = self.entries.last() {
            assert!(
                time > *last,
                "checkpoint times must be strictly ascending: {time} after {last}"
            );
        }
        self.entries.push((time, surface));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Surface at an exact checkpoint time.
    pub fn at(&self, time: f64) -> Option<&Surface> {
        self.entries
            .iter()
            .find(|(t, _)| *t == time)
            .map(|(_, surface)| surface)
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &Surface)> {
        self.entries.iter().map(|(t, surface)| (*t, surface))
    }

    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|(t, _)| *t)
    }
}
