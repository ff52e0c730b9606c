//! Community-level schedule negotiation.
//!
//! The controller cannot observe a home's cost/convenience trade-off, so it
//! steers through prices: homes propose import profiles, breached slots get
//! a penalty bump, and the round repeats until the aggregate fits under the
//! transformer limit or the iteration ceiling is hit.

use futures::future::join_all;
use itertools::izip;
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use tracing::{info, warn};

use crate::domain::{HomeState, Proposal, SLOTS_PER_DAY};
use crate::error::EmsError;
use crate::optimizer::HomePlanner;

/// Per-slot soft prices published to the homes, reset to zero at the start
/// of every simulation step and only ever increased within a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenaltyVector {
    slots: Vec<f64>,
}

impl PenaltyVector {
    pub fn zeroed() -> Self {
        Self {
            slots: vec![0.0; SLOTS_PER_DAY],
        }
    }

    pub fn get(&self, slot: usize) -> f64 {
        self.slots[slot]
    }

    pub fn bump(&mut self, slot: usize, amount: f64) {
        self.slots[slot] += amount.max(0.0);
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.slots
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum NegotiationState {
    /// Aggregate demand fits under the transformer limit.
    Approved,
    /// Iteration ceiling reached; the last round was accepted with breaches.
    MaxIterAccepted,
}

/// Final result of one negotiation step.
#[derive(Debug, Clone)]
pub struct NegotiationOutcome {
    pub approved: Vec<Proposal>,
    /// Aggregate import profile of the accepted round (kW per slot).
    pub aggregate_kw: Vec<f64>,
    pub first_slot_total_kw: f64,
    pub iterations: u32,
    pub state: NegotiationState,
    pub penalties: PenaltyVector,
}

pub struct CommunityController {
    transformer_limit_kw: f64,
    penalty_increment: f64,
    max_iterations: u32,
}

impl CommunityController {
    pub fn new(transformer_limit_kw: f64, penalty_increment: f64, max_iterations: u32) -> Self {
        Self {
            transformer_limit_kw,
            penalty_increment,
            max_iterations,
        }
    }

    pub fn transformer_limit_kw(&self) -> f64 {
        self.transformer_limit_kw
    }

    /// Run the iterative pricing loop for one simulation step.
    ///
    /// Homes are planned from immutable snapshots, concurrently within a
    /// round; the reduction over proposals is serial. A home whose planner
    /// errors or returns a non-optimal schedule is replaced by a safe-mode
    /// stand-in for both aggregation and commit.
    pub async fn negotiate(
        &self,
        homes: &[HomeState],
        planner: &dyn HomePlanner,
        step: u64,
    ) -> NegotiationOutcome {
        let mut penalties = PenaltyVector::zeroed();
        let mut iterations = 0;

        loop {
            iterations += 1;

            let rounds = homes
                .iter()
                .map(|home| planner.propose(home.clone(), step, penalties.clone()));
            let results = join_all(rounds).await;

            let proposals: Vec<Proposal> = results
                .into_iter()
                .zip(homes)
                .map(|(result, home)| match result {
                    Ok(proposal) if proposal.is_optimal() => proposal,
                    Ok(proposal) => {
                        warn!(
                            house_id = home.house_id,
                            step,
                            status = %proposal.status(),
                            "substituting safe mode for non-optimal proposal"
                        );
                        Proposal::safe_mode(home.house_id)
                    }
                    Err(err) => {
                        warn!(
                            house_id = home.house_id,
                            step,
                            error = %err,
                            "planner failed, substituting safe mode"
                        );
                        Proposal::safe_mode(home.house_id)
                    }
                })
                .collect();

            let mut aggregate_kw = vec![0.0; SLOTS_PER_DAY];
            for proposal in &proposals {
                for (total, kw) in izip!(&mut aggregate_kw, proposal.import_profile_kw()) {
                    *total += kw;
                }
            }

            let breached: Vec<usize> = (0..SLOTS_PER_DAY)
                .filter(|&k| aggregate_kw[k] > self.transformer_limit_kw)
                .collect();

            if breached.is_empty() {
                let peak_kw = aggregate_kw.iter().copied().fold(0.0, f64::max);
                info!(
                    step,
                    iterations,
                    peak_kw,
                    "schedules approved"
                );
                return NegotiationOutcome {
                    first_slot_total_kw: aggregate_kw[0],
                    approved: proposals,
                    aggregate_kw,
                    iterations,
                    state: NegotiationState::Approved,
                    penalties,
                };
            }

            for &k in &breached {
                penalties.bump(k, self.penalty_increment);
            }

            if iterations >= self.max_iterations {
                warn!(
                    error = %EmsError::TransformerBreachUnresolved { step, iterations },
                    "accepting schedule with breaches"
                );
                return NegotiationOutcome {
                    first_slot_total_kw: aggregate_kw[0],
                    approved: proposals,
                    aggregate_kw,
                    iterations,
                    state: NegotiationState::MaxIterAccepted,
                    penalties,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_penalty_vector_starts_zeroed() {
        let penalties = PenaltyVector::zeroed();
        assert_eq!(penalties.as_slice().len(), SLOTS_PER_DAY);
        assert!(penalties.as_slice().iter().all(|&p| p == 0.0));
    }

    #[test]
    fn test_bump_accumulates() {
        let mut penalties = PenaltyVector::zeroed();
        penalties.bump(3, 0.2);
        penalties.bump(3, 0.2);
        assert!((penalties.get(3) - 0.4).abs() < 1e-12);
        assert_eq!(penalties.get(2), 0.0);
    }

    #[test]
    fn test_negative_bump_is_ignored() {
        let mut penalties = PenaltyVector::zeroed();
        penalties.bump(0, -1.0);
        assert_eq!(penalties.get(0), 0.0);
    }

    proptest! {
        /// Any sequence of bumps leaves every slot non-negative and
        /// non-decreasing over time.
        #[test]
        fn prop_penalties_are_monotone(bumps in proptest::collection::vec((0usize..SLOTS_PER_DAY, 0.0f64..1.0), 0..100)) {
            let mut penalties = PenaltyVector::zeroed();
            for (slot, amount) in bumps {
                let before = penalties.get(slot);
                penalties.bump(slot, amount);
                prop_assert!(penalties.get(slot) >= before);
            }
            prop_assert!(penalties.as_slice().iter().all(|&p| p >= 0.0));
        }
    }
}
