//! Bounded rolling buffer of sample points

use crate::config::DEFAULT_WINDOW_CAPACITY;
use crate::types::SamplePoint;
use std::collections::VecDeque;

/// Order-preserving FIFO of the most recent `capacity` samples
#[derive(Debug, Clone, PartialEq)]
pub struct SampleWindow {
    points: VecDeque<SamplePoint>,
    capacity: usize,
}

impl Default for SampleWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

impl SampleWindow {
    /// Create a window; capacity is clamped to at least 1
    pub fn new(capacity: usize) -> Self {
        Self {
            points: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the capacity, evicting the oldest points if it shrank
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.evict();
    }

    /// Add a point at the tail, evicting from the head while over capacity
    pub fn append(&mut self, point: SamplePoint) {
        self.points.push_back(point);
        self.evict();
    }

    /// Empty the buffer, keeping the capacity
    pub fn reset(&mut self) {
        self.points.clear();
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SamplePoint> {
        self.points.iter()
    }

    pub fn latest(&self) -> Option<&SamplePoint> {
        self.points.back()
    }

    /// Get as plot points
    pub fn as_plot_points(&self) -> Vec<[f64; 2]> {
        self.points.iter().map(SamplePoint::as_array).collect()
    }

    pub fn to_vec(&self) -> Vec<SamplePoint> {
        self.points.iter().copied().collect()
    }

    fn evict(&mut self) {
        if self.points.len() > self.capacity {
            let excess = self.points.len() - self.capacity;
            self.points.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_eviction_drops_oldest() {
        let mut window = SampleWindow::new(3);
        for i in 0..5 {
            window.append(SamplePoint::new(i as f64, 0.0));
        }
        let xs: Vec<f64> = window.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_capacity_clamped() {
        let mut window = SampleWindow::new(0);
        assert_eq!(window.capacity(), 1);
        window.append(SamplePoint::new(1.0, 1.0));
        window.append(SamplePoint::new(2.0, 2.0));
        assert_eq!(window.to_vec(), vec![SamplePoint::new(2.0, 2.0)]);
    }

    #[test]
    fn test_shrinking_capacity_evicts() {
        let mut window = SampleWindow::new(10);
        for i in 0..10 {
            window.append(SamplePoint::new(i as f64, 0.0));
        }
        window.set_capacity(4);
        assert_eq!(window.len(), 4);
        assert_eq!(window.iter().next().map(|p| p.x), Some(6.0));
        assert_eq!(window.latest().map(|p| p.x), Some(9.0));
    }

    #[test]
    fn test_reset_keeps_capacity() {
        let mut window = SampleWindow::new(5);
        window.append(SamplePoint::new(1.0, 2.0));
        window.reset();
        assert!(window.is_empty());
        assert_eq!(window.capacity(), 5);
        assert_eq!(window.as_plot_points(), Vec::<[f64; 2]>::new());
    }

    proptest! {
        #[test]
        fn test_window_holds_most_recent_points(
            capacity in 1usize..50,
            values in prop::collection::vec(-1000.0f64..1000.0, 0..200)
        ) {
            let mut window = SampleWindow::new(capacity);
            for (i, v) in values.iter().enumerate() {
                window.append(SamplePoint::new(i as f64, *v));
                prop_assert!(window.len() <= capacity);
            }

            let start = values.len().saturating_sub(capacity);
            let expected: Vec<SamplePoint> = values[start..]
                .iter()
                .enumerate()
                .map(|(i, v)| SamplePoint::new((start + i) as f64, *v))
                .collect();
            prop_assert_eq!(window.to_vec(), expected);
        }
    }
}
