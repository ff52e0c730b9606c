use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::domain::SLOTS_PER_DAY;

/// Import assumed for a home running in safe mode (kW).
pub const SAFE_MODE_IMPORT_KW: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum ProposalStatus {
    Optimal,
    SafeMode,
    DumbFallback,
}

/// Full result of a successful MPC solve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimalProposal {
    pub house_id: usize,
    /// Planned grid import over the whole horizon (kW per slot).
    pub import_profile_kw: Vec<f64>,
    pub import_kw: f64,
    pub charge_kw: f64,
    pub discharge_kw: f64,
    pub next_soc_kwh: f64,
    pub next_soc_th_kwh: f64,
    pub next_fridge_temp_c: f64,
    pub next_freezer_temp_c: f64,
    pub compressor_kw: f64,
    /// Planned import above the per-home share at the first slot (kW).
    pub excess_import_kw: f64,
    /// Appliances the plan starts right now.
    pub starting_appliances: Vec<String>,
    pub explanation: String,
}

/// Degraded schedule produced when the solver fails: serve the immediate
/// load, start window-opening appliances naively, leave the battery idle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackProposal {
    pub house_id: usize,
    pub import_profile_kw: Vec<f64>,
    pub import_kw: f64,
    /// Reported as 1 by convention; no compressor is actually scheduled.
    pub compressor_kw: f64,
    pub starting_appliances: Vec<String>,
    pub explanation: String,
}

/// Stand-in the community substitutes for any non-optimal proposal: a flat
/// 1 kW import and no battery action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafeModeProposal {
    pub house_id: usize,
    pub import_profile_kw: Vec<f64>,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum Proposal {
    Optimal(OptimalProposal),
    SafeMode(SafeModeProposal),
    DumbFallback(FallbackProposal),
}

impl Proposal {
    pub fn safe_mode(house_id: usize) -> Self {
        Self::SafeMode(SafeModeProposal {
            house_id,
            import_profile_kw: vec![SAFE_MODE_IMPORT_KW; SLOTS_PER_DAY],
            explanation: "Controller Fallback Mode".to_string(),
        })
    }

    pub fn status(&self) -> ProposalStatus {
        match self {
            Self::Optimal(_) => ProposalStatus::Optimal,
            Self::SafeMode(_) => ProposalStatus::SafeMode,
            Self::DumbFallback(_) => ProposalStatus::DumbFallback,
        }
    }

    pub fn is_optimal(&self) -> bool {
        matches!(self, Self::Optimal(_))
    }

    pub fn house_id(&self) -> usize {
        match self {
            Self::Optimal(p) => p.house_id,
            Self::SafeMode(p) => p.house_id,
            Self::DumbFallback(p) => p.house_id,
        }
    }

    pub fn import_profile_kw(&self) -> &[f64] {
        match self {
            Self::Optimal(p) => &p.import_profile_kw,
            Self::SafeMode(p) => &p.import_profile_kw,
            Self::DumbFallback(p) => &p.import_profile_kw,
        }
    }

    /// Grid import planned for the first slot (kW).
    pub fn first_step_import_kw(&self) -> f64 {
        match self {
            Self::Optimal(p) => p.import_kw,
            Self::SafeMode(_) => SAFE_MODE_IMPORT_KW,
            Self::DumbFallback(p) => p.import_kw,
        }
    }

    pub fn charge_kw(&self) -> f64 {
        match self {
            Self::Optimal(p) => p.charge_kw,
            Self::SafeMode(_) | Self::DumbFallback(_) => 0.0,
        }
    }

    pub fn discharge_kw(&self) -> f64 {
        match self {
            Self::Optimal(p) => p.discharge_kw,
            Self::SafeMode(_) | Self::DumbFallback(_) => 0.0,
        }
    }

    pub fn starting_appliances(&self) -> &[String] {
        match self {
            Self::Optimal(p) => &p.starting_appliances,
            Self::DumbFallback(p) => &p.starting_appliances,
            Self::SafeMode(_) => &[],
        }
    }

    pub fn explanation(&self) -> &str {
        match self {
            Self::Optimal(p) => &p.explanation,
            Self::SafeMode(p) => &p.explanation,
            Self::DumbFallback(p) => &p.explanation,
        }
    }
}
