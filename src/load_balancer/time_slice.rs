//! Time-slice selection: `unix_seconds % len`.
//!
//! Every gateway process picks the same instance within a given second,
//! without shared state. Requests landing in the same second all go to
//! one instance, so fairness only holds across seconds.

use crate::clock::unix_secs;
use crate::load_balancer::LoadBalancer;
use crate::registry::ServiceInstance;

#[derive(Debug, Default, Clone, Copy)]
pub struct TimeSlice;

impl TimeSlice {
    /// Selection for an explicit instant, in unix seconds.
    pub fn select_at(instances: &[ServiceInstance], now_secs: u64) -> Option<&ServiceInstance> {
        if instances.is_empty() {
            return None;
        }
        let index = (now_secs % instances.len() as u64) as usize;
        instances.get(index)
    }
}

impl LoadBalancer for TimeSlice {
    fn select<'a>(&self, instances: &'a [ServiceInstance]) -> Option<&'a ServiceInstance> {
        Self::select_at(instances, unix_secs())
    }

    fn name(&self) -> &'static str {
        "time_slice"
    }
}
