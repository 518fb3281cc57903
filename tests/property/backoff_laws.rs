//! Backoff laws: reset produces the initial interval, jitter stays within
//! its envelope, decorrelated draws stay within their bounds.

use granite_retry::{
    BackoffStrategy, ConstantBackoff, DecorrelatedJitter, ExponentialBackoff, LinearBackoff,
};
use proptest::prelude::*;
use std::time::Duration;

fn within_jitter(value: Duration, center: Duration, factor: f64) -> bool {
    let value = value.as_secs_f64();
    let center = center.as_secs_f64();
    value >= center * (1.0 - factor) - 1e-9 && value <= center * (1.0 + factor) + 1e-9
}

proptest! {
    #[test]
    fn exponential_reset_restores_the_initial_interval(
        initial_ms in 1u64..1_000,
        steps in 0usize..10,
    ) {
        let mut backoff = ExponentialBackoff::new(Duration::from_millis(initial_ms))
            .jitter_factor(0.5);
        for _ in 0..steps {
            backoff.next();
        }
        backoff.reset();
        let first = backoff.next();
        prop_assert!(within_jitter(first, Duration::from_millis(initial_ms), 0.5));
    }

    #[test]
    fn exponential_never_exceeds_the_jittered_cap(
        initial_ms in 1u64..100,
        cap_ms in 100u64..2_000,
        steps in 1usize..20,
    ) {
        let cap = Duration::from_millis(cap_ms);
        let mut backoff = ExponentialBackoff::new(Duration::from_millis(initial_ms))
            .max_interval(cap)
            .jitter_factor(0.5);
        for _ in 0..steps {
            let next = backoff.next();
            // With ±50% jitter the hard ceiling is 1.5 × cap.
            prop_assert!(next <= cap.mul_f64(1.5) + Duration::from_millis(1));
        }
    }

    #[test]
    fn linear_reset_restores_the_initial_interval(
        initial_ms in 1u64..500,
        increment_ms in 0u64..200,
    ) {
        let mut backoff = LinearBackoff::new(
            Duration::from_millis(initial_ms),
            Duration::from_millis(increment_ms),
        )
        .jitter_factor(0.5);
        backoff.next();
        backoff.next();
        backoff.reset();
        prop_assert!(within_jitter(
            backoff.next(),
            Duration::from_millis(initial_ms),
            0.5
        ));
    }

    #[test]
    fn constant_stays_within_its_envelope(interval_ms in 1u64..1_000) {
        let mut backoff = ConstantBackoff::new(Duration::from_millis(interval_ms));
        for _ in 0..10 {
            prop_assert!(within_jitter(
                backoff.next(),
                Duration::from_millis(interval_ms),
                0.5
            ));
        }
    }

    #[test]
    fn decorrelated_draws_stay_between_base_and_cap(
        base_ms in 1u64..50,
        cap_ms in 200u64..2_000,
        steps in 1usize..30,
    ) {
        let base = Duration::from_millis(base_ms);
        let cap = Duration::from_millis(cap_ms);
        let mut backoff = DecorrelatedJitter::new(base, cap);
        let mut prev = base;
        for _ in 0..steps {
            let next = backoff.next();
            prop_assert!(next >= base);
            prop_assert!(next <= cap);
            let upper = Duration::from_secs_f64((prev.as_secs_f64() * 3.0).min(cap.as_secs_f64()));
            prop_assert!(next <= upper + Duration::from_millis(1));
            prev = next;
        }
    }

    #[test]
    fn boxed_clones_do_not_share_state(initial_ms in 1u64..500) {
        let strategy: Box<dyn BackoffStrategy> = Box::new(
            ExponentialBackoff::new(Duration::from_millis(initial_ms)).jitter_factor(0.5),
        );
        let mut advanced = strategy.clone();
        let mut fresh = strategy.clone();
        for _ in 0..5 {
            advanced.next();
        }
        // The sibling clone still starts from the initial interval.
        prop_assert!(within_jitter(
            fresh.next(),
            Duration::from_millis(initial_ms),
            0.5
        ));
    }
}
