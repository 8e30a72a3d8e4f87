//! A single animated value that can be retargeted while in flight.

use instant::{Duration, Instant};

use super::ease::Ease;

/// Values a [`Tween`] can interpolate.
pub trait Lerp: Copy {
    fn lerp(self, to: Self, t: f32) -> Self;
}

impl Lerp for f32 {
    #[inline]
    fn lerp(self, to: Self, t: f32) -> Self {
        self + (to - self) * t
    }
}

impl Lerp for [f32; 2] {
    #[inline]
    fn lerp(self, to: Self, t: f32) -> Self {
        [self[0].lerp(to[0], t), self[1].lerp(to[1], t)]
    }
}

impl Lerp for [f32; 4] {
    #[inline]
    fn lerp(self, to: Self, t: f32) -> Self {
        std::array::from_fn(|i| self[i].lerp(to[i], t))
    }
}

/// The interpolation state of one (subject, property) pair.
///
/// There is no queue: a new goal replaces the running one and starts from the
/// value observed at the moment of retargeting, so the output never jumps.
#[derive(Clone, Debug, PartialEq)]
pub enum Tween<T: Lerp> {
    Idle {
        value: T,
    },
    Running {
        from: T,
        to: T,
        start: Instant,
        duration: Duration,
        ease: Ease,
    },
}

impl<T: Lerp> Tween<T> {
    pub fn new(value: T) -> Self {
        Self::Idle { value }
    }

    /// The value at `now`. Times before the start yield the start value.
    pub fn value_at(&self, now: Instant) -> T {
        match *self {
            Self::Idle { value } => value,
            Self::Running {
                from,
                to,
                start,
                duration,
                ease,
            } => {
                if duration.is_zero() {
                    return to;
                }
                let elapsed = since(now, start).as_secs_f32();
                let t = elapsed / duration.as_secs_f32();
                if t >= 1.0 {
                    to
                } else {
                    from.lerp(to, ease.apply(t))
                }
            }
        }
    }

    /// The value the tween is heading to.
    pub fn goal(&self) -> T {
        match *self {
            Self::Idle { value } => value,
            Self::Running { to, .. } => to,
        }
    }

    pub fn is_running(&self, now: Instant) -> bool {
        match self {
            Self::Idle { .. } => false,
            Self::Running {
                start, duration, ..
            } => since(now, *start) < *duration,
        }
    }

    /// Replace the goal. The new interpolation starts at the value seen at `now`.
    pub fn retarget(&mut self, goal: T, now: Instant, duration: Duration, ease: Ease) {
        let from = self.value_at(now);
        *self = Self::Running {
            from,
            to: goal,
            start: now,
            duration,
            ease,
        };
    }

    /// Collapse a finished interpolation to `Idle`. Returns the current value.
    pub fn settle(&mut self, now: Instant) -> T {
        let value = self.value_at(now);
        if !self.is_running(now) {
            *self = Self::Idle { value };
        }
        value
    }
}

/// Seconds from configuration as a [`Duration`]. Negative, NaN and infinite
/// values collapse to zero.
pub fn secs_to_duration(secs: f32) -> Duration {
    Duration::try_from_secs_f32(secs).unwrap_or(Duration::ZERO)
}

/// Time elapsed from `start` to `now`, zero if `now` is earlier.
pub(crate) fn since(now: Instant, start: Instant) -> Duration {
    if now > start { now - start } else { Duration::ZERO }
}

impl<T: Lerp + Default> Default for Tween<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
