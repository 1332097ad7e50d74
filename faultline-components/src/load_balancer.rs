//! Instance selection for new requests
//!
//! Every microservice has one [`LoadBalancer`] that picks which of its
//! running instances receives the next request. Available strategies:
//!
//! ## Round Robin
//! Cycles through the running instances in order.
//!
//! ## Random
//! Picks uniformly at random.
//!
//! ## Least Utilization
//! Picks the instance with the smallest relative work demand (remaining CPU
//! demand normalized by capacity). Ties are broken uniformly at random.
//!
//! All randomness comes from the run's [`SimRng`], passed in by the caller, so
//! two runs with the same seed and architecture make identical choices.
//!
//! # Example
//!
//! ```rust
//! use faultline_components::load_balancer::{Candidate, LoadBalancer, LoadBalancingStrategy};
//! use faultline_components::InstanceId;
//! use faultline_core::SimRng;
//!
//! let mut rng = SimRng::new(12345);
//! let mut balancer = LoadBalancer::new(LoadBalancingStrategy::LeastUtilization);
//! let candidates = [
//!     Candidate { instance: InstanceId(1), relative_work_demand: 0.7 },
//!     Candidate { instance: InstanceId(2), relative_work_demand: 0.2 },
//! ];
//! assert_eq!(balancer.next_instance(&candidates, &mut rng), Ok(InstanceId(2)));
//! ```

use crate::error::RequestFailedReason;
use crate::instance::InstanceId;
use faultline_core::SimRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingStrategy {
    RoundRobin,
    #[default]
    Random,
    LeastUtilization,
}

/// A running instance eligible to receive a request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub instance: InstanceId,
    pub relative_work_demand: f64,
}

#[derive(Debug, Clone)]
pub struct LoadBalancer {
    strategy: LoadBalancingStrategy,
    next_index: usize,
}

impl LoadBalancer {
    pub fn new(strategy: LoadBalancingStrategy) -> Self {
        Self { strategy, next_index: 0 }
    }

    pub fn strategy(&self) -> LoadBalancingStrategy {
        self.strategy
    }

    /// Chooses one of `candidates`.
    ///
    /// # Errors
    ///
    /// [`RequestFailedReason::NoInstanceAvailable`] when `candidates` is empty.
    pub fn next_instance(
        &mut self,
        candidates: &[Candidate],
        rng: &mut SimRng,
    ) -> Result<InstanceId, RequestFailedReason> {
        if candidates.is_empty() {
            return Err(RequestFailedReason::NoInstanceAvailable);
        }
        let index = match self.strategy {
            LoadBalancingStrategy::RoundRobin => {
                let index = self.next_index % candidates.len();
                self.next_index = self.next_index.wrapping_add(1);
                index
            }
            LoadBalancingStrategy::Random => rng.index(candidates.len()),
            LoadBalancingStrategy::LeastUtilization => least_utilized(candidates, rng),
        };
        let chosen = candidates[index].instance;
        debug!(
            strategy = ?self.strategy,
            candidates = candidates.len(),
            instance = %chosen,
            "Selected instance"
        );
        Ok(chosen)
    }
}

fn least_utilized(candidates: &[Candidate], rng: &mut SimRng) -> usize {
    let minimum = candidates
        .iter()
        .map(|c| c.relative_work_demand)
        .fold(f64::INFINITY, f64::min);
    let tied: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.relative_work_demand == minimum)
        .map(|(index, _)| index)
        .collect();
    match tied.as_slice() {
        [only] => *only,
        [] => 0,
        _ => tied[rng.index(tied.len())],
    }
}
