//! Simulation driver: advances wall-clock steps, lets the community
//! negotiate, applies the committed first-step actions, and accumulates the
//! traces the report is built from.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::config::AppConfig;
use crate::controller::CommunityController;
use crate::domain::{HomeState, Tables, SLOTS_PER_DAY, SLOT_HOURS};
use crate::optimizer::{HomePlanner, MpcPlanner, PlannerParams};
use crate::simulation::report::SimulationTrace;

pub struct SimulationDriver {
    homes: Vec<HomeState>,
    community: CommunityController,
    planner: Arc<dyn HomePlanner>,
    tables: Arc<Tables>,
}

impl SimulationDriver {
    /// Build the default community: identical homes splitting the grid
    /// connection evenly, planned by the MILP planner.
    pub fn from_config(cfg: &AppConfig, tables: Arc<Tables>) -> Self {
        let planner = Arc::new(MpcPlanner::new(
            PlannerParams::from_config(cfg),
            Arc::clone(&tables),
        ));
        Self::with_planner(cfg, tables, planner)
    }

    /// Same community, custom planner. Test seam.
    pub fn with_planner(
        cfg: &AppConfig,
        tables: Arc<Tables>,
        planner: Arc<dyn HomePlanner>,
    ) -> Self {
        let house_limit_kw = cfg.house.house_limit_kw(cfg.community.num_homes);
        let homes = (0..cfg.community.num_homes)
            .map(|house_id| {
                HomeState::new(
                    house_id,
                    cfg.house.pv_capacity_kw,
                    cfg.house.battery_capacity_kwh,
                    cfg.house.thermal_capacity_kwh,
                    house_limit_kw,
                    cfg.house.initial_soc_fraction * cfg.house.battery_capacity_kwh,
                    cfg.house.initial_soc_fraction * cfg.house.thermal_capacity_kwh,
                    tables.appliances.len(),
                )
            })
            .collect();

        let community = CommunityController::new(
            cfg.community.transformer_limit_kw,
            cfg.community.penalty_increment,
            cfg.community.max_iterations,
        );

        Self {
            homes,
            community,
            planner,
            tables,
        }
    }

    pub fn homes(&self) -> &[HomeState] {
        &self.homes
    }

    /// Run the hierarchical simulation for `steps` half-hour steps.
    pub async fn run(&mut self, steps: u64) -> SimulationTrace {
        let started = Instant::now();
        info!(
            started_at = %chrono::Utc::now().to_rfc3339(),
            num_homes = self.homes.len(),
            steps,
            transformer_limit_kw = self.community.transformer_limit_kw(),
            "starting community simulation"
        );

        let mut trace = SimulationTrace::default();

        for step in 0..steps {
            let outcome = self
                .community
                .negotiate(&self.homes, self.planner.as_ref(), step)
                .await;

            let slot = step as usize % SLOTS_PER_DAY;
            let solar_per_house_kw =
                self.homes.first().map_or(0.0, |h| h.pv_capacity_kw) * self.tables.solar_profile[slot];

            // Physical community demand realised this step: grid import plus
            // on-site sources, minus what the batteries soak up.
            let actual_demand_kw: f64 = outcome
                .approved
                .iter()
                .map(|p| {
                    p.first_step_import_kw() + solar_per_house_kw + p.discharge_kw()
                        - p.charge_kw()
                })
                .sum();

            let total_import_kw: f64 = outcome
                .approved
                .iter()
                .map(|p| p.first_step_import_kw())
                .sum();
            let co2_kg = total_import_kw * SLOT_HOURS * self.tables.co2_grid[slot];

            // Commit first-step actions serially, in house-id order.
            for home in self.homes.iter_mut() {
                if let Some(proposal) = outcome
                    .approved
                    .iter()
                    .find(|p| p.house_id() == home.house_id)
                {
                    home.commit(proposal, step, &self.tables.appliances);
                }
            }

            if let Some(h0) = outcome.approved.iter().find(|p| p.house_id() == 0) {
                info!(
                    step,
                    status = %h0.status(),
                    battery_kwh = self.homes[0].soc_e_kwh,
                    starting = ?h0.starting_appliances(),
                    "house 0: {}",
                    h0.explanation()
                );
                trace.h0_import_kw.push(h0.first_step_import_kw());
                trace.h0_charge_kw.push(h0.charge_kw());
                trace.h0_discharge_kw.push(h0.discharge_kw());
                trace
                    .h0_starts
                    .push(h0.starting_appliances().to_vec());
            }

            trace.community_demand_kw.push(outcome.first_slot_total_kw);
            trace.actual_demand_kw.push(actual_demand_kw);
            trace.co2_kg.push(co2_kg);
            trace.h0_soc_kwh.push(self.homes[0].soc_e_kwh);
            trace.h0_fridge_temp_c.push(self.homes[0].fridge_temp_c);
            trace.h0_solar_kw.push(solar_per_house_kw);
        }

        let peak_kw = trace
            .community_demand_kw
            .iter()
            .copied()
            .fold(0.0, f64::max);
        let limit_kw = self.community.transformer_limit_kw();
        info!(
            steps,
            elapsed_secs = started.elapsed().as_secs_f64(),
            peak_kw,
            transformer_limit_kw = limit_kw,
            "simulation complete"
        );
        if peak_kw <= limit_kw + 0.1 {
            info!("transformer limit protected");
        } else {
            warn!("community breached the transformer limit");
        }

        trace
    }
}
