//! Rolling-horizon MILP planner for one home.
//!
//! Each planning pass builds a 48-step mixed-integer program coupling
//! battery and thermal-store dynamics, fridge/freezer temperature bands,
//! binary appliance starts, and a price-plus-penalty import objective, then
//! applies only the first slot of the solution. Loads started before the
//! horizon ("locked-in" power) are served unconditionally.

use anyhow::Result;
use async_trait::async_trait;
use good_lp::solvers::coin_cbc::coin_cbc;
use good_lp::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tracing::warn;

use crate::controller::PenaltyVector;
use crate::domain::home::{
    COMPRESSOR_MAX_KW, FREEZER_TEMP_MAX_C, FREEZER_TEMP_MIN_C, FRIDGE_TEMP_MAX_C,
    FRIDGE_TEMP_MIN_C, HEAT_PUMP_MAX_KW,
};
use crate::domain::{start_window, HomeState, OptimalProposal, Proposal, Tables};
use crate::domain::{SLOTS_PER_DAY, SLOT_HOURS};
use crate::error::EmsError;
use crate::optimizer::{fallback, HomePlanner, PlannerParams};

/// Cabinet warming drift while the compressor is off (°C per hour).
const FRIDGE_WARMING_RATE: f64 = 0.1196;
/// Cooling applied per kW of compressor input (°C per hour per kW).
const FRIDGE_COOLING_RATE: f64 = (0.1467 + 0.1196) / 0.3;
const FREEZER_WARMING_RATE: f64 = 15.0 / 67.0;
const FREEZER_COOLING_RATE: f64 = (7.0 / 25.0 + 15.0 / 67.0) / 0.3;

/// Grid price treated as peak pricing in the explanation rules (£/kWh).
const PEAK_PRICE_THRESHOLD: f64 = 0.20;

/// Tie-break noise bounds added to each slot's effective import price.
const NOISE_MIN: f64 = 1e-5;
const NOISE_MAX: f64 = 1e-4;

/// MPC planner backed by the CBC mixed-integer solver.
#[derive(Clone)]
pub struct MpcPlanner {
    params: PlannerParams,
    tables: Arc<Tables>,
}

impl MpcPlanner {
    pub fn new(params: PlannerParams, tables: Arc<Tables>) -> Self {
        Self { params, tables }
    }

    /// Plan one home's schedule; degrade to the dumb fallback when the
    /// solver reports anything but an optimal solution.
    pub fn propose_blocking(
        &self,
        snapshot: &HomeState,
        step: u64,
        penalties: &PenaltyVector,
    ) -> Proposal {
        match self.solve(snapshot, step, penalties) {
            Ok(plan) => Proposal::Optimal(plan),
            Err(err) => {
                warn!(
                    error = %EmsError::SolverNonOptimal {
                        house_id: snapshot.house_id,
                        step,
                        detail: err.to_string(),
                    },
                    "reverting to dumb fallback schedule"
                );
                fallback::dumb_proposal(snapshot, step, &self.tables)
            }
        }
    }

    fn solve(
        &self,
        home: &HomeState,
        step: u64,
        penalties: &PenaltyVector,
    ) -> Result<OptimalProposal, ResolutionError> {
        let horizon = SLOTS_PER_DAY;
        let delta = SLOT_HOURS;
        let p = &self.params;
        let catalog = &self.tables.appliances;

        // Table slices for this specific look-ahead.
        let slot_of = |k: usize| (step as usize + k) % SLOTS_PER_DAY;
        let base_elec: Vec<f64> = (0..horizon)
            .map(|k| self.tables.electric_demand_per_house[slot_of(k)])
            .collect();
        let heat_demand: Vec<f64> = (0..horizon)
            .map(|k| self.tables.heat_demand_per_house[slot_of(k)])
            .collect();
        let solar: Vec<f64> = (0..horizon)
            .map(|k| home.pv_capacity_kw * self.tables.solar_profile[slot_of(k)])
            .collect();
        let prices: Vec<f64> = (0..horizon)
            .map(|k| self.tables.price_grid_elec[slot_of(k)])
            .collect();

        let already_run = home.already_run_flags(step);

        let mut problem = ProblemVariables::new();
        let soc_e =
            problem.add_vector(variable().min(0.0).max(home.battery_capacity_kwh), horizon);
        let charge = problem.add_vector(variable().min(0.0).max(p.max_charge_kw), horizon);
        let discharge = problem.add_vector(variable().min(0.0).max(p.max_discharge_kw), horizon);
        let import = problem.add_vector(variable().min(0.0).max(p.import_limit_kw), horizon);
        let excess = problem.add_vector(variable().min(0.0), horizon);
        let heat_pump = problem.add_vector(variable().min(0.0).max(HEAT_PUMP_MAX_KW), horizon);
        let soc_th =
            problem.add_vector(variable().min(0.0).max(p.thermal_capacity_kwh), horizon);
        let fridge = problem.add_vector(
            variable().min(FRIDGE_TEMP_MIN_C).max(FRIDGE_TEMP_MAX_C),
            horizon,
        );
        let freezer = problem.add_vector(
            variable().min(FREEZER_TEMP_MIN_C).max(FREEZER_TEMP_MAX_C),
            horizon,
        );
        let compressor =
            problem.add_vector(variable().min(0.0).max(COMPRESSOR_MAX_KW), horizon);

        // Start variables only exist for appliances still eligible today.
        let starts: Vec<Option<Vec<Variable>>> = catalog
            .iter()
            .enumerate()
            .map(|(id, _)| {
                if already_run[id] {
                    None
                } else {
                    Some(problem.add_vector(variable().binary(), horizon))
                }
            })
            .collect();

        // Per-slot tie-break noise, sampled once before the objective is
        // assembled and never again within this solve.
        let mut rng = StdRng::seed_from_u64(noise_seed(home.house_id, step));
        let noise: Vec<f64> = (0..horizon).map(|_| rng.gen_range(NOISE_MIN..NOISE_MAX)).collect();

        let total_cost = (0..horizon)
            .map(|k| {
                delta * (prices[k] + penalties.get(k) + noise[k]) * import[k]
                    + p.excess_penalty * excess[k]
                    + delta * p.wear_cost_elec * discharge[k]
                    + delta * p.wear_cost_therm * heat_pump[k]
            })
            .sum::<Expression>();

        let mut model = problem.minimise(total_cost).using(coin_cbc);
        model.set_parameter("logLevel", "0");
        model.set_parameter("seconds", &p.time_limit_secs.to_string());

        // Loads committed before this horizon that are still running.
        let locked_in_power: Vec<f64> = (0..horizon)
            .map(|k| {
                catalog
                    .iter()
                    .enumerate()
                    .map(|(id, app)| {
                        let slots = app.slots() as i64;
                        let mut power = 0.0;
                        for past_k in (1 - slots)..0 {
                            if (k as i64 - past_k) < slots
                                && home.ledger.get(id, step as i64 + past_k) == 1.0
                            {
                                power += app.power_kw;
                            }
                        }
                        power
                    })
                    .sum()
            })
            .collect();

        for k in 0..horizon {
            // Import above the per-home share needs the penalised slack.
            model = model.with(constraint!(import[k] <= home.house_limit_kw + excess[k]));

            // Storage dynamics.
            let nu = p.battery_efficiency;
            if k == 0 {
                model = model.with(constraint!(
                    soc_e[0]
                        == (nu * delta) * charge[0] - (delta / nu) * discharge[0]
                            + home.soc_e_kwh
                ));
                model = model.with(constraint!(
                    soc_th[0]
                        == (p.cop * delta) * heat_pump[0]
                            + (home.soc_th_kwh - heat_demand[0] * delta)
                ));
                model = model.with(constraint!(
                    fridge[0]
                        == (-(FRIDGE_COOLING_RATE * delta)) * compressor[0]
                            + (home.fridge_temp_c + FRIDGE_WARMING_RATE * delta)
                ));
                model = model.with(constraint!(
                    freezer[0]
                        == (-(FREEZER_COOLING_RATE * delta)) * compressor[0]
                            + (home.freezer_temp_c + FREEZER_WARMING_RATE * delta)
                ));
            } else {
                model = model.with(constraint!(
                    soc_e[k]
                        == soc_e[k - 1] + (nu * delta) * charge[k]
                            - (delta / nu) * discharge[k]
                ));
                model = model.with(constraint!(
                    soc_th[k]
                        == soc_th[k - 1] + (p.cop * delta) * heat_pump[k]
                            - heat_demand[k] * delta
                ));
                model = model.with(constraint!(
                    fridge[k]
                        == fridge[k - 1] - (FRIDGE_COOLING_RATE * delta) * compressor[k]
                            + FRIDGE_WARMING_RATE * delta
                ));
                model = model.with(constraint!(
                    freezer[k]
                        == freezer[k - 1] - (FREEZER_COOLING_RATE * delta) * compressor[k]
                            + FREEZER_WARMING_RATE * delta
                ));
            }

            // Contribution of appliance runs scheduled inside the horizon.
            let flexible_load: Expression = catalog
                .iter()
                .enumerate()
                .filter_map(|(id, app)| {
                    starts[id].as_ref().map(|vars| {
                        let first = (k + 1).saturating_sub(app.slots());
                        (first..=k)
                            .map(|ks| app.power_kw * vars[ks])
                            .sum::<Expression>()
                    })
                })
                .sum();

            model = model.with(constraint!(
                flexible_load
                    + heat_pump[k]
                    + charge[k]
                    + COMPRESSOR_MAX_KW * compressor[k]
                    + (base_elec[k] + locked_in_power[k])
                    <= import[k] + discharge[k] + solar[k]
            ));
        }

        // Appliance start scheduling over the current window opening.
        for (id, app) in catalog.iter().enumerate() {
            let Some(vars) = &starts[id] else { continue };

            let window = start_window(app, step);
            let mut allowed = vec![false; horizon];
            for &k in &window.open_starts {
                allowed[k] = true;
            }
            for k in 0..horizon {
                if !allowed[k] {
                    model = model.with(constraint!(vars[k] == 0.0));
                }
            }
            if !window.open_starts.is_empty() {
                let starts_in_window: Expression = window
                    .open_starts
                    .iter()
                    .map(|&k| Expression::from(vars[k]))
                    .sum();
                model = model.with(constraint!(starts_in_window == 1.0));
            }
        }

        // The battery must end the look-ahead at least as full as it began.
        model = model.with(constraint!(soc_e[horizon - 1] >= home.soc_e_kwh));

        let solution = model.solve()?;

        let import_profile_kw: Vec<f64> =
            import.iter().map(|&v| solution.value(v).max(0.0)).collect();
        let import_kw = solution.value(import[0]);
        let charge_kw = solution.value(charge[0]);
        let discharge_kw = solution.value(discharge[0]);

        let starting_appliances: Vec<String> = catalog
            .iter()
            .enumerate()
            .filter(|(id, _)| {
                starts[*id]
                    .as_ref()
                    .is_some_and(|vars| solution.value(vars[0]) >= 0.5)
            })
            .map(|(_, app)| app.name.clone())
            .collect();

        let explanation = if discharge_kw > 0.0 && penalties.get(0) > 0.0 {
            format!(
                "Discharging {discharge_kw:.2} kW to protect the community transformer and avoid the penalty fee"
            )
        } else if charge_kw > 0.0 && solar[0] > import_kw {
            format!("Charging {charge_kw:.2} kW to soak up free excess solar energy")
        } else if discharge_kw > 0.0 && prices[0] >= PEAK_PRICE_THRESHOLD {
            format!("Discharging {discharge_kw:.2} kW to avoid peak base pricing")
        } else {
            format!("Normal operation. Grid price is £{:.2}/kWh", prices[0])
        };

        Ok(OptimalProposal {
            house_id: home.house_id,
            import_profile_kw,
            import_kw,
            charge_kw,
            discharge_kw,
            next_soc_kwh: solution.value(soc_e[0]),
            next_soc_th_kwh: solution.value(soc_th[0]),
            next_fridge_temp_c: solution.value(fridge[0]),
            next_freezer_temp_c: solution.value(freezer[0]),
            compressor_kw: solution.value(compressor[0]),
            excess_import_kw: solution.value(excess[0]),
            starting_appliances,
            explanation,
        })
    }
}

#[async_trait]
impl HomePlanner for MpcPlanner {
    async fn propose(
        &self,
        snapshot: HomeState,
        step: u64,
        penalties: PenaltyVector,
    ) -> Result<Proposal> {
        let planner = self.clone();
        let proposal = tokio::task::spawn_blocking(move || {
            planner.propose_blocking(&snapshot, step, &penalties)
        })
        .await?;
        Ok(proposal)
    }
}

/// Deterministic noise seed so a replay of the same `(house, step)` pair
/// reproduces the same schedule.
fn noise_seed(house_id: usize, step: u64) -> u64 {
    (house_id as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ step
}
