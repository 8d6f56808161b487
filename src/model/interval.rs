use rand::random_range;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

/// Randomized wait window in milliseconds. Draws fall in `[min, max)`.
///
/// `min <= max` always holds: a mutation that would break it moves `max` to `min + 1`.
/// An interval with `min == 0 && max <= 1` is "empty" and means no randomized delay at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, JsonSchema)]
pub struct Interval {
    min: u32,
    max: u32,
}

/// Wire shape of [`Interval`]; deserialization goes through [`Interval::new`].
#[derive(Deserialize)]
struct RawInterval {
    min: u32,
    max: u32,
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawInterval::deserialize(deserializer)?;
        Ok(Self::new(raw.min, raw.max))
    }
}

impl Default for Interval {
    fn default() -> Self {
        Self { min: 0, max: 1 }
    }
}

impl Interval {
    /// Build an interval, clamping `max` to `min + 1` when `min > max`.
    pub fn new(min: u32, max: u32) -> Self {
        let mut interval = Self { min, max };
        interval.clamp();
        interval
    }

    /// Alias of [`Interval::new`].
    pub fn of(min: u32, max: u32) -> Self {
        Self::new(min, max)
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn set_min(&mut self, min: u32) {
        self.min = min;
        self.clamp();
    }

    pub fn set_max(&mut self, max: u32) {
        self.max = max;
        self.clamp();
    }

    pub fn is_empty(&self) -> bool {
        self.min == 0 && self.max <= 1
    }

    /// Draw a delay uniformly from `[min, max)`. A degenerate window yields `min`.
    pub fn sample(&self) -> u64 {
        let lo = u64::from(self.min);
        let hi = u64::from(self.max).max(lo + 1);
        random_range(lo..hi)
    }

    fn clamp(&mut self) {
        if self.min > self.max {
            self.max = self.min.saturating_add(1);
        }
    }
}
