/// A duration whose updates take effect only after a setback.
///
/// Lowering a delay must not help whoever just took over the account, so an
/// update becomes effective once the larger of the current value and the
/// configured minimum setback has elapsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DelayedValue {
    current: u64,
    /// `(value, effect_time)` of the last update, if it is not yet folded in.
    pending: Option<(u64, u64)>,
}

impl DelayedValue {
    pub const fn new(value: u64) -> Self {
        Self { current: value, pending: None }
    }

    /// Value in effect at `now`.
    pub fn get(&self, now: u64) -> u64 {
        match self.pending {
            Some((value, effect_time)) if now >= effect_time => value,
            _ => self.current,
        }
    }

    /// Last scheduled value, effective or not.
    pub fn latest(&self) -> u64 {
        self.pending.map_or(self.current, |(value, _)| value)
    }

    /// Update that is not yet in effect at `now`, as `(value, effect_time)`.
    pub fn pending_update(&self, now: u64) -> Option<(u64, u64)> {
        self.pending.filter(|(_, effect_time)| now < *effect_time)
    }

    /// Schedules `value` and returns the time it takes effect. Replaces any
    /// update still pending.
    pub fn schedule_update(&mut self, value: u64, now: u64, min_setback: u64) -> u64 {
        let current = self.get(now);
        let effect_time = now.saturating_add(current.max(min_setback));
        *self = Self { current, pending: Some((value, effect_time)) };
        effect_time
    }
}
