//! Live effect parameters
//!
//! A [`ParamHandle`] is written by whoever drives the sound (a UI slider, a
//! game tick, a rotating turntable) and read by the audio producer thread.
//! Reads go through [`SmoothedParam`], which glides towards the latest target
//! over a short wall-clock window so abrupt changes do not produce zipper
//! noise.

use harmonics_core::clock::{system_clock, SharedClock};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default glide window for live parameters
pub const DEFAULT_SMOOTHING: Duration = Duration::from_millis(500);

/// Target changes smaller than this do not restart a glide
const RETARGET_EPSILON: f32 = 1e-3;

/// Shared, lock-free `f32` target value
#[derive(Debug, Clone)]
pub struct ParamHandle {
    bits: Arc<AtomicU32>,
}

impl ParamHandle {
    pub fn new(value: f32) -> Self {
        let value = if value.is_finite() { value } else { 0.0 };
        Self {
            bits: Arc::new(AtomicU32::new(value.to_bits())),
        }
    }

    /// Publish a new target. Non-finite values are ignored and the previous
    /// target stays in effect.
    pub fn set(&self, value: f32) {
        if !value.is_finite() {
            tracing::debug!(value, "Ignoring non-finite parameter target");
            return;
        }
        self.bits.store(value.to_bits(), Ordering::Release);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }
}

/// Linear glide from the current value to a moving target.
///
/// Time is an arbitrary monotonically increasing axis in seconds, so the same
/// ramp serves both wall-clock and stream-time smoothing.
#[derive(Debug, Clone, Default)]
pub(crate) struct Ramp {
    state: Option<RampState>,
}

#[derive(Debug, Clone, Copy)]
struct RampState {
    from: f32,
    target: f32,
    current: f32,
    started_at: f64,
}

impl Ramp {
    pub fn next(&mut self, target: f32, now: f64, window: f64) -> f32 {
        let Some(state) = self.state.as_mut() else {
            self.state = Some(RampState {
                from: target,
                target,
                current: target,
                started_at: now,
            });
            return target;
        };

        if (target - state.target).abs() > RETARGET_EPSILON {
            state.from = state.current;
            state.target = target;
            state.started_at = now;
        }

        let progress = if window > 0.0 {
            ((now - state.started_at) / window).clamp(0.0, 1.0)
        } else {
            1.0
        };
        state.current = state.from + (state.target - state.from) * progress as f32;
        state.current
    }

    pub fn reset(&mut self) {
        self.state = None;
    }
}

/// A [`ParamHandle`] read through a wall-clock glide
#[derive(Clone)]
pub struct SmoothedParam {
    handle: ParamHandle,
    window: Duration,
    clock: SharedClock,
    origin: Instant,
    ramp: Ramp,
}

impl SmoothedParam {
    /// Smooth `handle` over [`DEFAULT_SMOOTHING`] using the system clock
    pub fn new(handle: ParamHandle) -> Self {
        Self::with_clock(handle, DEFAULT_SMOOTHING, system_clock())
    }

    pub fn with_clock(handle: ParamHandle, window: Duration, clock: SharedClock) -> Self {
        let origin = clock.now();
        Self {
            handle,
            window,
            clock,
            origin,
            ramp: Ramp::default(),
        }
    }

    /// Current smoothed value
    pub fn value(&mut self) -> f32 {
        let now = self
            .clock
            .now()
            .saturating_duration_since(self.origin)
            .as_secs_f64();
        self.ramp
            .next(self.handle.get(), now, self.window.as_secs_f64())
    }

    pub fn handle(&self) -> &ParamHandle {
        &self.handle
    }

    /// Forget the glide; the next read snaps to the current target
    pub fn reset(&mut self) {
        self.ramp.reset();
    }
}

impl std::fmt::Debug for SmoothedParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmoothedParam")
            .field("target", &self.handle.get())
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

/// A filter parameter that is either fixed or driven live
#[derive(Debug, Clone)]
pub enum Param {
    Fixed(f32),
    Live(SmoothedParam),
}

impl Param {
    pub fn value(&mut self) -> f32 {
        match self {
            Param::Fixed(value) => *value,
            Param::Live(param) => param.value(),
        }
    }

    pub fn reset(&mut self) {
        if let Param::Live(param) = self {
            param.reset();
        }
    }
}

impl From<f32> for Param {
    fn from(value: f32) -> Self {
        Param::Fixed(value)
    }
}

impl From<SmoothedParam> for Param {
    fn from(param: SmoothedParam) -> Self {
        Param::Live(param)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harmonics_core::ManualClock;

    fn smoothed(handle: &ParamHandle, clock: &ManualClock) -> SmoothedParam {
        SmoothedParam::with_clock(handle.clone(), DEFAULT_SMOOTHING, Arc::new(clock.clone()))
    }

    #[test]
    fn handle_ignores_non_finite_values() {
        let handle = ParamHandle::new(3.0);
        handle.set(f32::NAN);
        handle.set(f32::INFINITY);
        assert_eq!(handle.get(), 3.0);
    }

    #[test]
    fn first_read_snaps_to_target() {
        let clock = ManualClock::new();
        let handle = ParamHandle::new(1_800.0);
        let mut param = smoothed(&handle, &clock);
        assert_eq!(param.value(), 1_800.0);
    }

    #[test]
    fn glides_over_window() {
        let clock = ManualClock::new();
        let handle = ParamHandle::new(1.0);
        let mut param = smoothed(&handle, &clock);
        assert_eq!(param.value(), 1.0);

        handle.set(2.0);
        assert_eq!(param.value(), 1.0);

        clock.advance(Duration::from_millis(250));
        assert!((param.value() - 1.5).abs() < 1e-4);

        clock.advance(Duration::from_millis(250));
        assert_eq!(param.value(), 2.0);

        clock.advance(Duration::from_secs(5));
        assert_eq!(param.value(), 2.0);
    }

    #[test]
    fn retarget_starts_from_current_value() {
        let clock = ManualClock::new();
        let handle = ParamHandle::new(0.0);
        let mut param = smoothed(&handle, &clock);
        param.value();

        handle.set(100.0);
        param.value();
        clock.advance(Duration::from_millis(250));
        assert!((param.value() - 50.0).abs() < 1e-3);

        handle.set(0.0);
        assert!((param.value() - 50.0).abs() < 1e-3);
        clock.advance(Duration::from_millis(500));
        assert_eq!(param.value(), 0.0);
    }

    #[test]
    fn reset_snaps_to_target() {
        let clock = ManualClock::new();
        let handle = ParamHandle::new(0.0);
        let mut param = smoothed(&handle, &clock);
        param.value();
        handle.set(10.0);
        param.value();

        param.reset();
        assert_eq!(param.value(), 10.0);
    }

    #[test]
    fn fixed_param_is_constant() {
        let mut param = Param::from(440.0);
        assert_eq!(param.value(), 440.0);
        param.reset();
        assert_eq!(param.value(), 440.0);
    }
}
