use thiserror::Error;

/// Default lower bound of the example counter.
pub const DEFAULT_MIN: i64 = 0;

/// Default upper bound of the example counter.
pub const DEFAULT_MAX: i64 = 10;

/// Errors raised while constructing a counter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CounterError {
    #[error("Invalid bounds: min {min} is greater than max {max}")]
    InvalidBounds { min: i64, max: i64 },

    #[error("Initial value {value} is outside of [{min}, {max}]")]
    InitialOutOfBounds { value: i64, min: i64, max: i64 },
}

/// Inclusive range a counter may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    min: i64,
    max: i64,
}

impl Bounds {
    pub fn new(min: i64, max: i64) -> Result<Self, CounterError> {
        if min > max {
            return Err(CounterError::InvalidBounds { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> i64 {
        self.min
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    pub fn contains(&self, value: i64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN,
            max: DEFAULT_MAX,
        }
    }
}

/// How a step is applied when the counter sits near a bound.
///
/// `PreCheck` tests the current value against the bound and then applies the
/// full step, so a step wider than the remaining headroom lands past the
/// bound. `Clamp` additionally clamps the result into the bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BoundPolicy {
    #[default]
    PreCheck,
    Clamp,
}

/// Bounded counter with a lock flag.
///
/// This is the plain state; [`crate::state::CounterStore`] wraps it and
/// emits change events to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterState {
    value: i64,
    locked: bool,
    bounds: Bounds,
    policy: BoundPolicy,
}

impl CounterState {
    /// Create a counter holding `initial`, which must lie inside `bounds`.
    pub fn new(bounds: Bounds, initial: i64) -> Result<Self, CounterError> {
        if !bounds.contains(initial) {
            return Err(CounterError::InitialOutOfBounds {
                value: initial,
                min: bounds.min(),
                max: bounds.max(),
            });
        }

        Ok(Self {
            value: initial,
            locked: false,
            bounds,
            policy: BoundPolicy::default(),
        })
    }

    /// Create a counter starting at the lower bound.
    pub fn with_bounds(bounds: Bounds) -> Self {
        Self {
            value: bounds.min(),
            locked: false,
            bounds,
            policy: BoundPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: BoundPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn policy(&self) -> BoundPolicy {
        self.policy
    }

    /// Step the value up. Returns `true` if the value changed.
    pub fn increment(&mut self, step: i64) -> bool {
        if self.locked || step <= 0 {
            return false;
        }

        let max = self.bounds.max();
        let next = step_if(self.value, step, |v| v < max);
        self.apply(next)
    }

    /// Step the value down. Returns `true` if the value changed.
    pub fn decrement(&mut self, step: i64) -> bool {
        if self.locked || step <= 0 {
            return false;
        }

        let min = self.bounds.min();
        let next = step_if(self.value, step.saturating_neg(), |v| v > min);
        self.apply(next)
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    fn apply(&mut self, next: i64) -> bool {
        let next = match self.policy {
            BoundPolicy::PreCheck => next,
            BoundPolicy::Clamp => next.clamp(self.bounds.min(), self.bounds.max()),
        };

        if next == self.value {
            return false;
        }
        self.value = next;
        true
    }
}

impl Default for CounterState {
    fn default() -> Self {
        Self::with_bounds(Bounds::default())
    }
}

/// Add `delta` to `value` when `predicate` holds for the current value.
fn step_if(value: i64, delta: i64, predicate: impl FnOnce(i64) -> bool) -> i64 {
    if predicate(value) {
        value.saturating_add(delta)
    } else {
        value
    }
}
