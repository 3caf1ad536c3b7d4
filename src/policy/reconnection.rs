//! Reconnection policies for hosts marked down (spec §2, §4.9).

use std::time::Duration;

pub trait ReconnectionPolicy: Send + Sync {
    fn new_schedule(&self) -> Box<dyn ReconnectionSchedule>;
}

pub trait ReconnectionSchedule: Send {
    fn next_delay(&mut self) -> Duration;
}

/// Always waits the same interval between attempts.
pub struct ConstantReconnectionPolicy {
    delay: Duration,
}

impl ConstantReconnectionPolicy {
    pub fn new(delay: Duration) -> Self {
        ConstantReconnectionPolicy { delay }
    }
}

impl ReconnectionPolicy for ConstantReconnectionPolicy {
    fn new_schedule(&self) -> Box<dyn ReconnectionSchedule> {
        Box::new(ConstantSchedule { delay: self.delay })
    }
}

struct ConstantSchedule {
    delay: Duration,
}
impl ReconnectionSchedule for ConstantSchedule {
    fn next_delay(&mut self) -> Duration {
        self.delay
    }
}

/// Doubles the delay each attempt up to `max_delay`, matching the
/// teacher's backoff shape used elsewhere in its networking layer.
/// Optionally applies full jitter (a random factor in `0.5..=1.0`) so a
/// cluster-wide disconnect doesn't reconnect in lockstep.
pub struct ExponentialReconnectionPolicy {
    base_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl ExponentialReconnectionPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        ExponentialReconnectionPolicy { base_delay, max_delay, jitter: false }
    }

    pub fn with_jitter(base_delay: Duration, max_delay: Duration) -> Self {
        ExponentialReconnectionPolicy { base_delay, max_delay, jitter: true }
    }
}

impl ReconnectionPolicy for ExponentialReconnectionPolicy {
    fn new_schedule(&self) -> Box<dyn ReconnectionSchedule> {
        Box::new(ExponentialSchedule {
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            jitter: self.jitter,
            attempt: 0,
        })
    }
}

struct ExponentialSchedule {
    base_delay: Duration,
    max_delay: Duration,
    jitter: bool,
    attempt: u32,
}

impl ReconnectionSchedule for ExponentialSchedule {
    fn next_delay(&mut self) -> Duration {
        let factor = 1u64.checked_shl(self.attempt).unwrap_or(u64::MAX);
        let candidate = self.base_delay.saturating_mul(factor.min(u32::MAX as u64) as u32).min(self.max_delay);
        self.attempt = self.attempt.saturating_add(1);
        if self.jitter {
            let scale = rand::random::<f64>() * 0.5 + 0.5; // [0.5, 1.0)
            Duration::from_secs_f64(candidate.as_secs_f64() * scale)
        } else {
            candidate
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_policy_always_returns_same_delay() {
        let policy = ConstantReconnectionPolicy::new(Duration::from_secs(1));
        let mut sched = policy.new_schedule();
        assert_eq!(sched.next_delay(), Duration::from_secs(1));
        assert_eq!(sched.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn exponential_policy_doubles_and_caps() {
        let policy = ExponentialReconnectionPolicy::new(Duration::from_millis(100), Duration::from_secs(2));
        let mut sched = policy.new_schedule();
        assert_eq!(sched.next_delay(), Duration::from_millis(100));
        assert_eq!(sched.next_delay(), Duration::from_millis(200));
        assert_eq!(sched.next_delay(), Duration::from_millis(400));
        for _ in 0..10 {
            sched.next_delay();
        }
        assert_eq!(sched.next_delay(), Duration::from_secs(2));
    }

    #[test]
    fn jitter_stays_within_half_to_full_of_the_unjittered_delay() {
        let policy = ExponentialReconnectionPolicy::with_jitter(Duration::from_millis(100), Duration::from_secs(2));
        let mut sched = policy.new_schedule();
        for _ in 0..5 {
            let delay = sched.next_delay();
            assert!(delay <= Duration::from_secs(2));
        }
    }
}
