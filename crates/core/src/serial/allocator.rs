//! Serial number allocation for serialized items received without serials.

use std::collections::HashMap;

use kardex_shared::types::SerialNo;

/// Hands out new serial numbers.
pub trait SerialAllocator: Send {
    /// Returns `count` fresh serial numbers from `series`.
    fn allocate(&mut self, series: &str, count: usize) -> Vec<SerialNo>;
}

/// Number of digits of the running counter.
const COUNTER_WIDTH: usize = 5;

/// Allocates `{series}{counter}` with a zero-padded counter per series.
///
/// Counters only move forward, so a rolled-back operation leaves a gap.
#[derive(Debug, Clone, Default)]
pub struct SeriesAllocator {
    counters: HashMap<String, u64>,
}

impl SeriesAllocator {
    /// Creates an allocator with every series starting at 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SerialAllocator for SeriesAllocator {
    fn allocate(&mut self, series: &str, count: usize) -> Vec<SerialNo> {
        let counter = self.counters.entry(series.to_string()).or_insert(0);
        (0..count)
            .map(|_| {
                *counter += 1;
                SerialNo::new(format!("{series}{:0width$}", *counter, width = COUNTER_WIDTH))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_counts_up() {
        let mut allocator = SeriesAllocator::new();
        assert_eq!(
            allocator.allocate("LAP-", 2),
            vec![SerialNo::from("LAP-00001"), SerialNo::from("LAP-00002")]
        );
        assert_eq!(allocator.allocate("LAP-", 1), vec![SerialNo::from("LAP-00003")]);
    }

    #[test]
    fn test_series_are_independent() {
        let mut allocator = SeriesAllocator::new();
        allocator.allocate("A-", 3);
        assert_eq!(allocator.allocate("B-", 1), vec![SerialNo::from("B-00001")]);
    }

    #[test]
    fn test_zero_count() {
        let mut allocator = SeriesAllocator::new();
        assert!(allocator.allocate("A-", 0).is_empty());
    }
}
