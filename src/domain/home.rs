use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::appliance::Appliance;
use crate::domain::proposal::Proposal;
use crate::domain::SLOTS_PER_DAY;
use crate::error::EmsError;

pub const FRIDGE_TEMP_MIN_C: f64 = 2.0;
pub const FRIDGE_TEMP_MAX_C: f64 = 5.0;
pub const FREEZER_TEMP_MIN_C: f64 = -22.0;
pub const FREEZER_TEMP_MAX_C: f64 = -15.0;
pub const INITIAL_FRIDGE_TEMP_C: f64 = 4.0;
pub const INITIAL_FREEZER_TEMP_C: f64 = -18.0;

/// Shared compressor electrical rating serving fridge and freezer (kW).
pub const COMPRESSOR_MAX_KW: f64 = 0.3;
/// Heat pump electrical input ceiling (kW).
pub const HEAT_PUMP_MAX_KW: f64 = 10.0;

/// Committed solver values may sit this far outside a physical bound before
/// the clamp is reported.
const BOUND_TOLERANCE: f64 = 1e-6;

/// Dense ring of start indicators keyed by (channel, absolute step).
///
/// Channels 0..n are the catalog appliances in order; one extra channel
/// after the catalog records the fridge compressor. Entries older than the
/// ring span read as never-started.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartLedger {
    channels: usize,
    span: usize,
    marks: Vec<f64>,
    stamps: Vec<i64>,
}

impl StartLedger {
    pub fn new(channels: usize, span: usize) -> Self {
        Self {
            channels,
            span,
            marks: vec![0.0; channels * span],
            stamps: vec![-1; channels * span],
        }
    }

    pub fn record(&mut self, channel: usize, step: u64, value: f64) {
        let idx = channel * self.span + step as usize % self.span;
        self.marks[idx] = value;
        self.stamps[idx] = step as i64;
    }

    /// Value recorded at `(channel, step)`, or 0.0 when nothing (still)
    /// stored there. Steps before the simulation start read as 0.0.
    pub fn get(&self, channel: usize, step: i64) -> f64 {
        if step < 0 || channel >= self.channels {
            return 0.0;
        }
        let idx = channel * self.span + step as usize % self.span;
        if self.stamps[idx] == step {
            self.marks[idx]
        } else {
            0.0
        }
    }
}

/// Persistent physical state of one home, owned by the simulation driver.
///
/// The planner consumes immutable snapshots; only [`HomeState::commit`]
/// mutates the state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeState {
    pub house_id: usize,
    pub pv_capacity_kw: f64,
    pub battery_capacity_kwh: f64,
    pub thermal_capacity_kwh: f64,
    /// Per-home share of the grid connection, the soft import cap (kW).
    pub house_limit_kw: f64,

    pub soc_e_kwh: f64,
    pub soc_th_kwh: f64,
    pub fridge_temp_c: f64,
    pub freezer_temp_c: f64,

    /// Day on which each catalog appliance last started; "already ran
    /// today" compares against the current day, so the flags read as false
    /// from the first planning call after midnight.
    ran_on_day: Vec<Option<u64>>,
    pub ledger: StartLedger,
}

impl HomeState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        house_id: usize,
        pv_capacity_kw: f64,
        battery_capacity_kwh: f64,
        thermal_capacity_kwh: f64,
        house_limit_kw: f64,
        initial_soc_kwh: f64,
        initial_soc_th_kwh: f64,
        n_appliances: usize,
    ) -> Self {
        Self {
            house_id,
            pv_capacity_kw,
            battery_capacity_kwh,
            thermal_capacity_kwh,
            house_limit_kw,
            soc_e_kwh: initial_soc_kwh,
            soc_th_kwh: initial_soc_th_kwh,
            fridge_temp_c: INITIAL_FRIDGE_TEMP_C,
            freezer_temp_c: INITIAL_FREEZER_TEMP_C,
            ran_on_day: vec![None; n_appliances],
            ledger: StartLedger::new(n_appliances + 1, SLOTS_PER_DAY),
        }
    }

    pub fn fridge_channel(&self) -> usize {
        self.ran_on_day.len()
    }

    pub fn already_run_today(&self, appliance_id: usize, step: u64) -> bool {
        self.ran_on_day[appliance_id] == Some(step / SLOTS_PER_DAY as u64)
    }

    /// Per-appliance "already ran today" flags as seen at `step`.
    pub fn already_run_flags(&self, step: u64) -> Vec<bool> {
        (0..self.ran_on_day.len())
            .map(|id| self.already_run_today(id, step))
            .collect()
    }

    /// Apply the first-step actions of an accepted proposal.
    ///
    /// Safe-mode and fallback proposals leave the state untouched. All
    /// assignments are absolute, so replaying the same proposal is a no-op.
    pub fn commit(&mut self, proposal: &Proposal, step: u64, catalog: &[Appliance]) {
        let Proposal::Optimal(plan) = proposal else {
            debug!(
                house_id = self.house_id,
                step,
                status = %proposal.status(),
                "no state advance for degraded proposal"
            );
            return;
        };

        self.soc_e_kwh = self.clamp_reported(
            "battery SoC",
            plan.next_soc_kwh,
            0.0,
            self.battery_capacity_kwh,
        );
        self.soc_th_kwh = self.clamp_reported(
            "thermal SoC",
            plan.next_soc_th_kwh,
            0.0,
            self.thermal_capacity_kwh,
        );
        self.fridge_temp_c = self.clamp_reported(
            "fridge temperature",
            plan.next_fridge_temp_c,
            FRIDGE_TEMP_MIN_C,
            FRIDGE_TEMP_MAX_C,
        );
        self.freezer_temp_c = self.clamp_reported(
            "freezer temperature",
            plan.next_freezer_temp_c,
            FREEZER_TEMP_MIN_C,
            FREEZER_TEMP_MAX_C,
        );

        let fridge_channel = self.fridge_channel();
        self.ledger.record(fridge_channel, step, plan.compressor_kw);

        let day = step / SLOTS_PER_DAY as u64;
        for name in &plan.starting_appliances {
            let Some(id) = catalog.iter().position(|a| &a.name == name) else {
                warn!(house_id = self.house_id, name, "ignoring start of unknown appliance");
                continue;
            };
            self.ran_on_day[id] = Some(day);
            self.ledger.record(id, step, 1.0);
        }
    }

    fn clamp_reported(&self, field: &'static str, value: f64, min: f64, max: f64) -> f64 {
        if value < min - BOUND_TOLERANCE || value > max + BOUND_TOLERANCE {
            warn!(
                error = %EmsError::StateOutOfRange {
                    house_id: self.house_id,
                    field,
                    value,
                    min,
                    max,
                },
                "clamping committed state"
            );
        }
        value.clamp(min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::proposal::OptimalProposal;
    use crate::domain::Tables;
    use proptest::prelude::*;

    fn test_home() -> HomeState {
        let tables = Tables::builtin();
        HomeState::new(0, 5.1, 10.0, 20.0, 1.0, 5.0, 10.0, tables.appliances.len())
    }

    fn optimal(starting: Vec<&str>) -> Proposal {
        Proposal::Optimal(OptimalProposal {
            house_id: 0,
            import_profile_kw: vec![0.0; SLOTS_PER_DAY],
            import_kw: 0.5,
            charge_kw: 0.0,
            discharge_kw: 0.0,
            next_soc_kwh: 6.0,
            next_soc_th_kwh: 9.5,
            next_fridge_temp_c: 4.1,
            next_freezer_temp_c: -17.9,
            compressor_kw: 0.2,
            excess_import_kw: 0.0,
            starting_appliances: starting.into_iter().map(String::from).collect(),
            explanation: "test".to_string(),
        })
    }

    #[test]
    fn test_ledger_ring_semantics() {
        let mut ledger = StartLedger::new(2, SLOTS_PER_DAY);
        ledger.record(0, 10, 1.0);
        assert_eq!(ledger.get(0, 10), 1.0);
        assert_eq!(ledger.get(1, 10), 0.0);
        assert_eq!(ledger.get(0, 9), 0.0);
        assert_eq!(ledger.get(0, -3), 0.0);

        // Same ring slot a full span later shadows the old entry.
        ledger.record(0, 10 + SLOTS_PER_DAY as u64, 1.0);
        assert_eq!(ledger.get(0, 10), 0.0);
        assert_eq!(ledger.get(0, 10 + SLOTS_PER_DAY as i64), 1.0);
    }

    #[test]
    fn test_commit_applies_first_step_actions() {
        let tables = Tables::builtin();
        let mut home = test_home();
        home.commit(&optimal(vec!["Dish washer"]), 20, &tables.appliances);

        assert_eq!(home.soc_e_kwh, 6.0);
        assert_eq!(home.soc_th_kwh, 9.5);
        assert_eq!(home.fridge_temp_c, 4.1);
        assert_eq!(home.freezer_temp_c, -17.9);
        assert_eq!(home.ledger.get(home.fridge_channel(), 20), 0.2);

        let id = tables.appliance_id("Dish washer").unwrap();
        assert!(home.already_run_today(id, 20));
        assert_eq!(home.ledger.get(id, 20), 1.0);
    }

    #[test]
    fn test_commit_is_idempotent() {
        let tables = Tables::builtin();
        let proposal = optimal(vec!["Dish washer"]);

        let mut once = test_home();
        once.commit(&proposal, 20, &tables.appliances);
        let mut twice = once.clone();
        twice.commit(&proposal, 20, &tables.appliances);

        assert_eq!(format!("{once:?}"), format!("{twice:?}"));
    }

    #[test]
    fn test_degraded_proposals_do_not_advance_state() {
        let tables = Tables::builtin();
        let mut home = test_home();
        let before = format!("{home:?}");

        home.commit(&Proposal::safe_mode(0), 5, &tables.appliances);
        assert_eq!(format!("{home:?}"), before);
    }

    #[test]
    fn test_out_of_range_commit_is_clamped() {
        let tables = Tables::builtin();
        let mut home = test_home();
        let mut plan = optimal(vec![]);
        if let Proposal::Optimal(p) = &mut plan {
            p.next_soc_kwh = 10.7;
            p.next_fridge_temp_c = 1.2;
        }
        home.commit(&plan, 0, &tables.appliances);
        assert_eq!(home.soc_e_kwh, 10.0);
        assert_eq!(home.fridge_temp_c, FRIDGE_TEMP_MIN_C);
    }

    #[test]
    fn test_already_run_resets_at_midnight() {
        let tables = Tables::builtin();
        let mut home = test_home();
        home.commit(&optimal(vec!["Dish washer"]), 20, &tables.appliances);

        let id = tables.appliance_id("Dish washer").unwrap();
        assert!(home.already_run_today(id, 20));
        assert!(home.already_run_today(id, 47));
        assert!(!home.already_run_today(id, 48));
        assert!(!home.already_run_today(id, 50));
    }

    proptest! {
        /// Whatever gets recorded, reads of other (channel, step) pairs
        /// within the ring span stay zero.
        #[test]
        fn prop_ledger_reads_are_isolated(
            channel in 0usize..3,
            step in 0u64..1000,
            value in 0.0f64..1.0,
        ) {
            let mut ledger = StartLedger::new(3, SLOTS_PER_DAY);
            ledger.record(channel, step, value);

            for other_channel in 0..3 {
                for offset in 1..SLOTS_PER_DAY as i64 {
                    let other_step = step as i64 - offset;
                    if other_channel != channel || other_step != step as i64 {
                        prop_assert_eq!(ledger.get(other_channel, other_step), 0.0);
                    }
                }
            }
            prop_assert_eq!(ledger.get(channel, step as i64), value);
        }
    }
}
