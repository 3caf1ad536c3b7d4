//! Speculative execution policies (spec §4.9 state
//! `SpeculativelyExecuting`).

use std::time::Duration;

/// Yields successive delays (from the moment the original request was
/// sent) at which the handler should fire an additional execution against
/// the next host in the plan, for idempotent requests only.
pub trait SpeculativeExecutionPolicy: Send + Sync {
    fn new_plan(&self) -> Box<dyn SpeculativeExecutionPlan>;
}

pub trait SpeculativeExecutionPlan: Send {
    /// Returns the delay before the next speculative execution, or `None`
    /// once the plan is exhausted.
    fn next_execution(&mut self, running_executions: usize) -> Option<Duration>;
}

/// Fires a fixed number of extra executions, each `delay` apart.
pub struct ConstantSpeculativeExecutionPolicy {
    delay: Duration,
    max_speculative_executions: usize,
}

impl ConstantSpeculativeExecutionPolicy {
    pub fn new(delay: Duration, max_speculative_executions: usize) -> Self {
        ConstantSpeculativeExecutionPolicy { delay, max_speculative_executions }
    }
}

impl SpeculativeExecutionPolicy for ConstantSpeculativeExecutionPolicy {
    fn new_plan(&self) -> Box<dyn SpeculativeExecutionPlan> {
        Box::new(ConstantPlan { delay: self.delay, remaining: self.max_speculative_executions })
    }
}

struct ConstantPlan {
    delay: Duration,
    remaining: usize,
}

impl SpeculativeExecutionPlan for ConstantPlan {
    fn next_execution(&mut self, _running_executions: usize) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.delay)
    }
}

/// Never speculates; the default unless a profile opts in.
#[derive(Debug, Default)]
pub struct NoSpeculativeExecutionPolicy;

impl SpeculativeExecutionPolicy for NoSpeculativeExecutionPolicy {
    fn new_plan(&self) -> Box<dyn SpeculativeExecutionPlan> {
        Box::new(NoPlan)
    }
}

struct NoPlan;
impl SpeculativeExecutionPlan for NoPlan {
    fn next_execution(&mut self, _running_executions: usize) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_policy_yields_exactly_max_executions() {
        let policy = ConstantSpeculativeExecutionPolicy::new(Duration::from_millis(50), 2);
        let mut plan = policy.new_plan();
        assert_eq!(plan.next_execution(0), Some(Duration::from_millis(50)));
        assert_eq!(plan.next_execution(1), Some(Duration::from_millis(50)));
        assert_eq!(plan.next_execution(2), None);
    }

    #[test]
    fn no_speculative_execution_never_fires() {
        let policy = NoSpeculativeExecutionPolicy;
        let mut plan = policy.new_plan();
        assert_eq!(plan.next_execution(0), None);
    }
}
