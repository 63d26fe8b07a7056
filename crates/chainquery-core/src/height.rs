//! Height-window resolver for "most recent N blocks" queries.

use serde::{Deserialize, Serialize};

use crate::types::Height;

/// A contiguous `[start, end)` range of block heights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeightWindow {
    pub start_height: Height,
    /// Exclusive.
    pub end_height: Height,
}

impl HeightWindow {
    /// Resolve the window for `count` blocks starting at `start`
    /// (`0` = the most recent blocks) on a chain whose tip is `chain_height`.
    ///
    /// The window never extends past the tip. All arithmetic saturates, so a
    /// start beyond the tip produces an empty window instead of wrapping.
    pub fn resolve(start: Height, count: u64, chain_height: Height) -> Self {
        let start_height = if start == 0 {
            chain_height.saturating_sub(count).saturating_add(1).max(1)
        } else {
            start
        };
        let end_height = start_height
            .saturating_add(count)
            .min(chain_height.saturating_add(1))
            .max(start_height);
        Self {
            start_height,
            end_height,
        }
    }

    pub fn count(&self) -> u64 {
        self.end_height - self.start_height
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Heights in the window, newest first.
    pub fn heights_descending(&self) -> impl Iterator<Item = Height> {
        (self.start_height..self.end_height).rev()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn most_recent_window() {
        let w = HeightWindow::resolve(0, 5, 15);
        assert_eq!(w, HeightWindow { start_height: 11, end_height: 16 });
        assert_eq!(w.heights_descending().collect::<Vec<_>>(), vec![15, 14, 13, 12, 11]);
    }

    #[test]
    fn window_clamps_at_tip() {
        let w = HeightWindow::resolve(14, 5, 15);
        assert_eq!(w.count(), 2);
        assert!(HeightWindow::resolve(20, 5, 15).is_empty());
    }

    #[test]
    fn short_chain_returns_whole_chain() {
        let w = HeightWindow::resolve(0, 100, 3);
        assert_eq!(w, HeightWindow { start_height: 1, end_height: 4 });
    }

    #[test]
    fn empty_chain_and_zero_count() {
        assert!(HeightWindow::resolve(0, 10, 0).is_empty());
        assert!(HeightWindow::resolve(0, 0, 15).is_empty());
        assert!(HeightWindow::resolve(7, 0, 15).is_empty());
    }

    #[test]
    fn no_overflow_near_u64_max() {
        let w = HeightWindow::resolve(u64::MAX - 10, 5, u64::MAX - 1);
        assert_eq!(w.count(), 5);
        let w = HeightWindow::resolve(0, u64::MAX, u64::MAX);
        assert_eq!(w.start_height, 1);
    }

    proptest! {
        #[test]
        fn from_zero_covers_most_recent(count in 0u64..10_000, chain in 0u64..10_000) {
            let w = HeightWindow::resolve(0, count, chain);
            prop_assert_eq!(w.count(), count.min(chain));
            if !w.is_empty() {
                prop_assert_eq!(w.start_height, chain.saturating_sub(count).saturating_add(1).max(1));
                prop_assert_eq!(w.end_height - 1, chain);
            }
        }

        #[test]
        fn zero_count_is_empty(start in any::<u64>(), chain in any::<u64>()) {
            prop_assert!(HeightWindow::resolve(start, 0, chain).is_empty());
        }
    }
}
