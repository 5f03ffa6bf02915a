use std::time::{Duration, Instant};

use crate::board::position::Color;

const SAFETY_MARGIN_MS: u64 = 20;
const MIN_THINK_MS: u64 = 10;

/// Maps `go` time controls to a single thinking budget. Depth-limited
/// and infinite searches carry no budget at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeManager {
    budget: Option<Duration>,
}

impl TimeManager {
    pub fn infinite() -> Self {
        Self { budget: None }
    }

    /// `movetime` minus a safety margin scaled to its magnitude, so
    /// the reply still reaches the GUI before the clock flag falls.
    pub fn from_movetime(ms: u64) -> Self {
        let margin = if ms <= 50 {
            7
        } else if ms <= 100 {
            10
        } else if ms <= 1000 {
            15
        } else {
            20
        };
        Self {
            budget: Some(Duration::from_millis(ms.saturating_sub(margin).max(1))),
        }
    }

    /// Allocates a fortieth of the remaining clock plus the increment,
    /// capped at 80% of the clock.
    pub fn from_clock(
        wtime: u64,
        btime: u64,
        winc: u64,
        binc: u64,
        side_to_move: Color,
    ) -> Self {
        let (time_left, increment) = match side_to_move {
            Color::White => (wtime, winc),
            Color::Black => (btime, binc),
        };

        let mut target = time_left / 40 + increment;
        target = target.min(time_left * 8 / 10);
        target = target.saturating_sub(SAFETY_MARGIN_MS).max(MIN_THINK_MS);

        Self {
            budget: Some(Duration::from_millis(target)),
        }
    }

    pub fn is_infinite(&self) -> bool {
        self.budget.is_none()
    }

    pub fn budget(&self) -> Option<Duration> {
        self.budget
    }

    pub fn deadline(&self, start: Instant) -> Option<Instant> {
        self.budget.map(|b| start + b)
    }
}
