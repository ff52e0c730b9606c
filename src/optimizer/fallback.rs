//! Degraded "dumb house" schedule used when the MILP solve fails.
//!
//! The fallback serves only the immediate slot: background load, any
//! appliance whose window opens right now (started naively), and loads
//! still running from earlier starts, net of current solar. The battery
//! and the thermal plant stay idle.

use crate::domain::{FallbackProposal, HomeState, Proposal, Tables};
use crate::domain::{SLOTS_PER_DAY, STEPS_PER_HOUR};

pub fn dumb_proposal(home: &HomeState, step: u64, tables: &Tables) -> Proposal {
    let slot = step as usize % SLOTS_PER_DAY;
    let solar_kw = home.pv_capacity_kw * tables.solar_profile[slot];

    let mut demand_kw = tables.electric_demand_per_house[slot];

    let mut starting_appliances = Vec::new();
    for (id, app) in tables.appliances.iter().enumerate() {
        if home.already_run_today(id, step) {
            continue;
        }
        let opens_at = (app.earliest_start_hour * STEPS_PER_HOUR as f64) as usize;
        if slot == opens_at {
            starting_appliances.push(app.name.clone());
            demand_kw += app.power_kw;
        }
    }

    for (id, app) in tables.appliances.iter().enumerate() {
        for past_k in 1..app.slots() as i64 {
            let past_t = step as i64 - past_k;
            if past_t >= 0 && home.ledger.get(id, past_t) == 1.0 {
                demand_kw += app.power_kw;
                break;
            }
        }
    }

    let import_kw = (demand_kw - solar_kw).max(0.0);
    let mut import_profile_kw = vec![0.0; SLOTS_PER_DAY];
    import_profile_kw[0] = import_kw;

    Proposal::DumbFallback(FallbackProposal {
        house_id: home.house_id,
        import_profile_kw,
        import_kw,
        compressor_kw: 1.0,
        starting_appliances,
        explanation: "OPTIMISATION FAILED: reverting to dumb house mode".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProposalStatus;

    fn home_with(tables: &Tables) -> HomeState {
        HomeState::new(2, 5.1, 10.0, 20.0, 1.0, 5.0, 10.0, tables.appliances.len())
    }

    #[test]
    fn test_serves_base_load_net_of_solar() {
        let mut tables = Tables::builtin();
        tables.appliances.clear();
        tables.electric_demand_per_house = vec![0.4; SLOTS_PER_DAY];
        tables.solar_profile = vec![0.0; SLOTS_PER_DAY];

        let home = home_with(&tables);
        let proposal = dumb_proposal(&home, 0, &tables);

        assert_eq!(proposal.status(), ProposalStatus::DumbFallback);
        assert_eq!(proposal.first_step_import_kw(), 0.4);
        assert!(proposal.import_profile_kw()[1..].iter().all(|&kw| kw == 0.0));
        assert_eq!(proposal.charge_kw(), 0.0);
        assert_eq!(proposal.discharge_kw(), 0.0);
    }

    #[test]
    fn test_solar_can_cover_all_demand() {
        let mut tables = Tables::builtin();
        tables.appliances.clear();
        tables.solar_profile = vec![1.0; SLOTS_PER_DAY];

        let home = home_with(&tables);
        let proposal = dumb_proposal(&home, 0, &tables);
        assert_eq!(proposal.first_step_import_kw(), 0.0);
    }

    #[test]
    fn test_window_opening_appliances_start_naively() {
        let mut tables = Tables::builtin();
        tables.solar_profile = vec![0.0; SLOTS_PER_DAY];
        let home = home_with(&tables);

        // At 08:00 the cooker hob (3 kW) and microwave (1.7 kW) both open.
        let proposal = dumb_proposal(&home, 16, &tables);
        assert_eq!(
            proposal.starting_appliances(),
            ["Cooker hob".to_string(), "Microwave".to_string()]
        );
        let expected = 0.15 + 3.0 + 1.7;
        assert!((proposal.first_step_import_kw() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_already_started_loads_stay_served() {
        let mut tables = Tables::builtin();
        tables.solar_profile = vec![0.0; SLOTS_PER_DAY];
        let mut home = home_with(&tables);
        let id = tables.appliance_id("Dish washer").unwrap();
        home.ledger.record(id, 19, 1.0);

        // Two slots into a four-slot run.
        let proposal = dumb_proposal(&home, 21, &tables);
        assert!((proposal.first_step_import_kw() - (0.15 + 1.0)).abs() < 1e-9);
    }

    #[test]
    fn test_appliance_already_run_today_not_restarted() {
        let mut tables = Tables::builtin();
        tables.solar_profile = vec![0.0; SLOTS_PER_DAY];
        let mut home = home_with(&tables);

        // Pretend both ran earlier today via a committed plan.
        let plan = crate::domain::OptimalProposal {
            house_id: 2,
            import_profile_kw: vec![0.0; SLOTS_PER_DAY],
            import_kw: 0.0,
            charge_kw: 0.0,
            discharge_kw: 0.0,
            next_soc_kwh: 5.0,
            next_soc_th_kwh: 10.0,
            next_fridge_temp_c: 4.0,
            next_freezer_temp_c: -18.0,
            compressor_kw: 0.0,
            excess_import_kw: 0.0,
            starting_appliances: vec!["Cooker hob".to_string(), "Microwave".to_string()],
            explanation: String::new(),
        };
        home.commit(&crate::domain::Proposal::Optimal(plan), 2, &tables.appliances);

        let proposal = dumb_proposal(&home, 16, &tables);
        assert!(proposal.starting_appliances().is_empty());
        assert!((proposal.first_step_import_kw() - 0.15).abs() < 1e-9);
    }
}
