//! Millisecond timestamps and fixed-period cadences

/// Milliseconds on a monotonic clock. Only differences are meaningful.
pub type Millis = u64;

/// A fixed-period timer for cooperative loops.
///
/// `due` fires when strictly more than `period` has elapsed since the last
/// firing. A fresh cadence fires on its first poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    period: Millis,
    last: Option<Millis>,
}

impl Cadence {
    pub fn new(period: Millis) -> Self {
        Self { period, last: None }
    }

    /// A cadence whose first firing is one full period after `now`
    pub fn starting_at(period: Millis, now: Millis) -> Self {
        Self { period, last: Some(now) }
    }

    pub fn period(&self) -> Millis {
        self.period
    }

    /// Returns true (and re-arms) if the cadence should fire at `now`
    pub fn due(&mut self, now: Millis) -> bool {
        let fire = match self.last {
            None => true,
            Some(last) => now.saturating_sub(last) > self.period,
        };
        if fire {
            self.last = Some(now);
        }
        fire
    }

    /// Re-arm without firing, e.g. after an on-demand send
    pub fn reset(&mut self, now: Millis) {
        self.last = Some(now);
    }
}
