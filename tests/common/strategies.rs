//! Proptest strategies for limiter workloads

use proptest::prelude::*;
use std::time::Duration;

/// One submitted task: how long it runs and how long after the previous submission it arrives
#[derive(Debug, Clone)]
pub struct SubmittedTask {
    pub arrival_gap: Duration,
    pub run_time: Duration,
    pub fails: bool,
}

pub fn submitted_task_strategy() -> impl Strategy<Value = SubmittedTask> {
    (0u64..20, 1u64..60, prop::bool::weighted(0.2)).prop_map(|(gap, run, fails)| SubmittedTask {
        arrival_gap: Duration::from_millis(gap),
        run_time: Duration::from_millis(run),
        fails,
    })
}

pub fn workload_strategy() -> impl Strategy<Value = (usize, Vec<SubmittedTask>)> {
    (1usize..6, prop::collection::vec(submitted_task_strategy(), 1..30))
}
