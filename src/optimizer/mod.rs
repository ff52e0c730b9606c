pub mod fallback;
pub mod milp;

pub use milp::MpcPlanner;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::AppConfig;
use crate::controller::PenaltyVector;
use crate::domain::{HomeState, Proposal};

/// Produces a home's proposed schedule for one negotiation round.
///
/// Implementations are pure with respect to the snapshot: the same snapshot,
/// step, and penalty vector yield the same proposal.
#[async_trait]
pub trait HomePlanner: Send + Sync {
    async fn propose(
        &self,
        snapshot: HomeState,
        step: u64,
        penalties: PenaltyVector,
    ) -> Result<Proposal>;
}

/// Physical and solver parameters shared by every home's planning pass.
#[derive(Debug, Clone)]
pub struct PlannerParams {
    pub max_charge_kw: f64,
    pub max_discharge_kw: f64,
    pub battery_efficiency: f64,
    pub thermal_capacity_kwh: f64,
    pub cop: f64,
    /// Hard grid import bound per home (kW).
    pub import_limit_kw: f64,
    pub wear_cost_elec: f64,
    pub wear_cost_therm: f64,
    /// Objective coefficient on import above the per-home share.
    pub excess_penalty: f64,
    pub time_limit_secs: u64,
}

impl PlannerParams {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            max_charge_kw: cfg.house.max_charge_kw,
            max_discharge_kw: cfg.house.max_discharge_kw,
            battery_efficiency: cfg.house.battery_efficiency,
            thermal_capacity_kwh: cfg.house.thermal_capacity_kwh,
            cop: cfg.house.cop,
            import_limit_kw: cfg.house.import_limit_kw,
            wear_cost_elec: cfg.house.wear_cost_elec,
            wear_cost_therm: cfg.house.wear_cost_therm,
            excess_penalty: cfg.planner.excess_penalty,
            time_limit_secs: cfg.planner.time_limit_secs,
        }
    }
}
