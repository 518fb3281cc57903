//! Backoff strategies for the retry engine.
//!
//! A strategy is a small state machine: `reset()` rewinds it to the first
//! attempt and `next()` produces the wait before the following attempt.
//! All strategies jitter their output; a jitter factor of exactly `0.0` is
//! normalized to `0.5` so a hand-rolled config cannot accidentally
//! synchronize a retry storm across a fleet.

use rand::Rng;
use std::time::Duration;

/// Produces the sequence of wait durations between attempts.
///
/// Strategies are stateful (decorrelated jitter carries its previous value),
/// so the retry engine clones a private instance per request via
/// [`BackoffStrategy::clone_box`] and calls `reset()` before the first use.
pub trait BackoffStrategy: Send + Sync {
    /// Rewinds the strategy so the next call to [`next`](Self::next) yields
    /// the initial interval.
    fn reset(&mut self);

    /// The wait before the next attempt.
    fn next(&mut self) -> Duration;

    fn clone_box(&self) -> Box<dyn BackoffStrategy>;
}

impl Clone for Box<dyn BackoffStrategy> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Normalizes a jitter factor: negative values clamp to zero-jitter-off,
/// and exactly `0.0` becomes the sane default of `0.5`.
fn normalize_jitter(factor: f64) -> f64 {
    if factor <= 0.0 {
        0.5
    } else {
        factor.min(1.0)
    }
}

/// Applies `± factor · interval` randomization.
fn jitter(interval: Duration, factor: f64) -> Duration {
    let base = interval.as_secs_f64();
    if base <= 0.0 {
        return Duration::ZERO;
    }
    let delta = base * factor;
    let low = (base - delta).max(0.0);
    let high = base + delta;
    let mut rng = rand::rng();
    Duration::from_secs_f64(rng.random_range(low..=high))
}

/// Exponential backoff: `initial × multiplier^(attempt-1)`, capped, jittered.
///
/// Defaults: 500 ms initial, 2× multiplier, 30 s cap, 0.5 jitter.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    multiplier: f64,
    max_interval: Duration,
    jitter_factor: f64,
    attempt: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

impl ExponentialBackoff {
    pub fn new(initial: Duration) -> Self {
        Self {
            initial,
            multiplier: 2.0,
            max_interval: Duration::from_secs(30),
            jitter_factor: 0.5,
            attempt: 0,
        }
    }

    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }

    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = normalize_jitter(factor);
        self
    }

    fn raw_interval(&self) -> Duration {
        let factor = self.multiplier.powi(self.attempt as i32);
        self.initial.mul_f64(factor).min(self.max_interval)
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn reset(&mut self) {
        self.attempt = 0;
    }

    fn next(&mut self) -> Duration {
        let interval = self.raw_interval();
        self.attempt = self.attempt.saturating_add(1);
        jitter(interval, self.jitter_factor)
    }

    fn clone_box(&self) -> Box<dyn BackoffStrategy> {
        Box::new(self.clone())
    }
}

/// Linear backoff: `initial + attempt × increment`, capped, jittered.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    initial: Duration,
    increment: Duration,
    max_interval: Duration,
    jitter_factor: f64,
    attempt: u32,
}

impl LinearBackoff {
    pub fn new(initial: Duration, increment: Duration) -> Self {
        Self {
            initial,
            increment,
            max_interval: Duration::from_secs(30),
            jitter_factor: 0.5,
            attempt: 0,
        }
    }

    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }

    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = normalize_jitter(factor);
        self
    }
}

impl BackoffStrategy for LinearBackoff {
    fn reset(&mut self) {
        self.attempt = 0;
    }

    fn next(&mut self) -> Duration {
        let interval = (self.initial + self.increment * self.attempt).min(self.max_interval);
        self.attempt = self.attempt.saturating_add(1);
        jitter(interval, self.jitter_factor)
    }

    fn clone_box(&self) -> Box<dyn BackoffStrategy> {
        Box::new(self.clone())
    }
}

/// Decorrelated jitter: `next = uniform(base, min(cap, prev × 3))`.
///
/// Resists synchronized retry storms better than plain exponential jitter
/// because each client's sequence depends on its own previous draw.
#[derive(Debug, Clone)]
pub struct DecorrelatedJitter {
    base: Duration,
    cap: Duration,
    prev: Duration,
}

impl DecorrelatedJitter {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            prev: base,
        }
    }
}

impl BackoffStrategy for DecorrelatedJitter {
    fn reset(&mut self) {
        self.prev = self.base;
    }

    fn next(&mut self) -> Duration {
        let low = self.base.as_secs_f64();
        let high = (self.prev.as_secs_f64() * 3.0).min(self.cap.as_secs_f64());
        let mut rng = rand::rng();
        let drawn = if high > low {
            Duration::from_secs_f64(rng.random_range(low..=high))
        } else {
            self.base
        };
        self.prev = drawn;
        drawn
    }

    fn clone_box(&self) -> Box<dyn BackoffStrategy> {
        Box::new(self.clone())
    }
}

/// Constant backoff: a fixed interval, always jittered.
#[derive(Debug, Clone)]
pub struct ConstantBackoff {
    interval: Duration,
    jitter_factor: f64,
}

impl ConstantBackoff {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            jitter_factor: 0.5,
        }
    }

    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = normalize_jitter(factor);
        self
    }
}

impl BackoffStrategy for ConstantBackoff {
    fn reset(&mut self) {}

    fn next(&mut self) -> Duration {
        jitter(self.interval, self.jitter_factor)
    }

    fn clone_box(&self) -> Box<dyn BackoffStrategy> {
        Box::new(self.clone())
    }
}

/// One tier of [`TieredBackoff`]: up to `max_retries` waits of `delay`.
#[derive(Debug, Clone, Copy)]
pub struct Tier {
    pub max_retries: u32,
    pub delay: Duration,
}

/// Tiered backoff: an ordered list of fixed-delay tiers, falling back to
/// exponential growth from one minute (capped at `max_delay`) once every
/// tier is exhausted. Jitter applies to every returned value.
#[derive(Debug, Clone)]
pub struct TieredBackoff {
    tiers: Vec<Tier>,
    max_delay: Duration,
    jitter_factor: f64,
    attempt: u32,
}

impl TieredBackoff {
    pub fn new(tiers: Vec<Tier>, max_delay: Duration) -> Self {
        Self {
            tiers,
            max_delay,
            jitter_factor: 0.5,
            attempt: 0,
        }
    }

    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = normalize_jitter(factor);
        self
    }

    fn raw_interval(&self) -> Duration {
        let mut remaining = self.attempt;
        for tier in &self.tiers {
            if remaining < tier.max_retries {
                return tier.delay.min(self.max_delay);
            }
            remaining -= tier.max_retries;
        }
        // Past every tier: exponential from one minute.
        let exp = Duration::from_secs(60).mul_f64(2f64.powi(remaining.min(16) as i32));
        exp.min(self.max_delay)
    }
}

impl BackoffStrategy for TieredBackoff {
    fn reset(&mut self) {
        self.attempt = 0;
    }

    fn next(&mut self) -> Duration {
        let interval = self.raw_interval();
        self.attempt = self.attempt.saturating_add(1);
        jitter(interval, self.jitter_factor)
    }

    fn clone_box(&self) -> Box<dyn BackoffStrategy> {
        Box::new(self.clone())
    }
}
