use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::geometry::Coord;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct InputTuning {
    pub click_throttle_ms: u64,
    pub double_click_ms: u64,
    pub aim_threshold_rad: f32,
    pub drag_threshold_px: f32,
}

impl Default for InputTuning {
    fn default() -> Self {
        Self {
            click_throttle_ms: 100,
            double_click_ms: 250,
            aim_threshold_rad: 0.1,
            drag_threshold_px: 4.0,
        }
    }
}

/// Accepts at most one click per `min_interval`.
#[derive(Debug, Clone)]
pub struct ClickThrottle {
    min_interval: Duration,
    last_accepted: Option<Instant>,
}

impl ClickThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_accepted: None,
        }
    }

    pub fn accept(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_accepted {
            if now.saturating_duration_since(last) < self.min_interval {
                return false;
            }
        }
        self.last_accepted = Some(now);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickIntent {
    Single,
    Double,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClickState {
    #[default]
    Idle,
    PendingSingle {
        deadline: Instant,
    },
}

/// Single/double click disambiguation for one control.
///
/// A first press is held back as `PendingSingle`; a second press before the
/// deadline turns it into a double, otherwise [`ClickDisambiguator::poll`]
/// releases it as a single once the deadline passes.
#[derive(Debug, Clone)]
pub struct ClickDisambiguator {
    window: Duration,
    state: ClickState,
}

impl ClickDisambiguator {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: ClickState::Idle,
        }
    }

    pub fn state(&self) -> ClickState {
        self.state
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            ClickState::Idle => None,
            ClickState::PendingSingle { deadline } => Some(deadline),
        }
    }

    /// Registers a press. Returns the intent resolved by it: `Double` when it
    /// completes a pair, `Single` when an overdue pending press had not been
    /// polled yet (this press then starts a new pending one).
    pub fn press(&mut self, now: Instant) -> Option<ClickIntent> {
        match self.state {
            ClickState::PendingSingle { deadline } if now < deadline => {
                self.state = ClickState::Idle;
                Some(ClickIntent::Double)
            }
            ClickState::PendingSingle { .. } => {
                self.state = ClickState::PendingSingle {
                    deadline: now + self.window,
                };
                Some(ClickIntent::Single)
            }
            ClickState::Idle => {
                self.state = ClickState::PendingSingle {
                    deadline: now + self.window,
                };
                None
            }
        }
    }

    pub fn poll(&mut self, now: Instant) -> Option<ClickIntent> {
        match self.state {
            ClickState::PendingSingle { deadline } if now >= deadline => {
                self.state = ClickState::Idle;
                Some(ClickIntent::Single)
            }
            _ => None,
        }
    }

    pub fn cancel(&mut self) {
        self.state = ClickState::Idle;
    }
}

/// Currently selected grid cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    cell: Option<Coord>,
}

impl Selection {
    pub fn cell(&self) -> Option<Coord> {
        self.cell
    }

    /// Selecting the already-selected cell clears the selection. Returns the
    /// new selection.
    pub fn toggle(&mut self, coord: Coord) -> Option<Coord> {
        self.cell = if self.cell == Some(coord) {
            None
        } else {
            Some(coord)
        };
        self.cell
    }

    pub fn clear(&mut self) {
        self.cell = None;
    }
}

/// Quantity entry opened by a double press on an amount-taking action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantityPrompt {
    max: u32,
    digits: String,
}

impl QuantityPrompt {
    const MAX_DIGITS: usize = 6;

    pub fn new(max: u32) -> Self {
        Self {
            max,
            digits: String::new(),
        }
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn text(&self) -> &str {
        &self.digits
    }

    pub fn push_digit(&mut self, digit: u8) {
        if digit > 9 || self.digits.len() >= Self::MAX_DIGITS {
            return;
        }
        if self.digits == "0" {
            self.digits.clear();
        }
        self.digits.push(char::from(b'0' + digit));
    }

    pub fn backspace(&mut self) {
        self.digits.pop();
    }

    /// Entered amount when it lies within `1..=max`.
    pub fn amount(&self) -> Option<u32> {
        let value = self.digits.parse::<u32>().ok()?;
        (1..=self.max).contains(&value).then_some(value)
    }
}
