use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::domain::appliance::Appliance;
use crate::domain::SLOTS_PER_DAY;
use crate::error::EmsError;

/// Static half-hourly profiles and the appliance catalog.
///
/// All profiles are per-house and cover one day in 48 slots; the solar
/// profile is a unit multiplier scaled by each home's PV capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tables {
    pub electric_demand_per_house: Vec<f64>,
    pub heat_demand_per_house: Vec<f64>,
    pub solar_profile: Vec<f64>,
    pub price_grid_elec: Vec<f64>,
    pub co2_grid: Vec<f64>,
    pub appliances: Vec<Appliance>,
}

impl Tables {
    /// The builtin test-grid profiles and household catalog.
    pub fn builtin() -> Self {
        BUILTIN.clone()
    }

    /// Load tables from a TOML file, replacing the builtin set.
    pub fn load(path: &Path) -> Result<Self, EmsError> {
        let text = std::fs::read_to_string(path)?;
        let tables: Tables =
            toml::from_str(&text).map_err(|e| EmsError::Table(e.to_string()))?;
        tables.validate()?;
        Ok(tables)
    }

    pub fn validate(&self) -> Result<(), EmsError> {
        let profiles: [(&'static str, &[f64]); 5] = [
            ("electric_demand_per_house", &self.electric_demand_per_house),
            ("heat_demand_per_house", &self.heat_demand_per_house),
            ("solar_profile", &self.solar_profile),
            ("price_grid_elec", &self.price_grid_elec),
            ("co2_grid", &self.co2_grid),
        ];
        for (name, profile) in profiles {
            if profile.len() != SLOTS_PER_DAY {
                return Err(EmsError::TableLength {
                    name,
                    len: profile.len(),
                    expected: SLOTS_PER_DAY,
                });
            }
        }

        let mut names = HashSet::new();
        for app in &self.appliances {
            app.validate()?;
            if !names.insert(app.name.as_str()) {
                return Err(EmsError::InvalidCatalog {
                    name: app.name.clone(),
                    reason: "duplicate name".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Catalog index of an appliance by name.
    pub fn appliance_id(&self, name: &str) -> Option<usize> {
        self.appliances.iter().position(|a| a.name == name)
    }

    /// Ledger channel reserved for the fridge compressor, after the catalog.
    pub fn fridge_channel(&self) -> usize {
        self.appliances.len()
    }

    /// Longest appliance run in slots.
    pub fn max_slots(&self) -> usize {
        self.appliances.iter().map(Appliance::slots).max().unwrap_or(0)
    }
}

static BUILTIN: Lazy<Tables> = Lazy::new(|| Tables {
    // Low background load.
    electric_demand_per_house: vec![0.15; SLOTS_PER_DAY],

    heat_demand_per_house: vec![
        0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.1, //
        0.2, 0.5, 1.2, 1.8, 2.0, 1.8, 1.0, 0.5, //
        0.3, 0.3, 0.3, 0.3, 0.3, 0.3, 0.3, 0.3, //
        0.3, 0.3, 0.3, 0.3, 0.3, 0.3, 0.3, 0.4, //
        0.5, 0.8, 1.2, 1.5, 1.8, 2.0, 2.0, 1.8, //
        1.5, 1.0, 0.8, 0.5, 0.3, 0.2, 0.2, 0.1,
    ],

    // Clear-sky bell, unit multiplier peaking at midday.
    solar_profile: vec![
        0.00, 0.00, 0.00, 0.00, 0.00, 0.00, 0.00, 0.00, //
        0.00, 0.00, 0.00, 0.00, 0.02, 0.05, 0.10, 0.18, //
        0.28, 0.40, 0.52, 0.64, 0.75, 0.84, 0.91, 0.96, //
        0.99, 1.00, 0.99, 0.96, 0.91, 0.84, 0.75, 0.64, //
        0.52, 0.40, 0.28, 0.18, 0.10, 0.05, 0.02, 0.00, //
        0.00, 0.00, 0.00, 0.00, 0.00, 0.00, 0.00, 0.00,
    ],

    price_grid_elec: vec![
        0.07, 0.07, 0.07, 0.07, 0.07, 0.07, 0.07, 0.07, //
        0.08, 0.09, 0.10, 0.12, 0.25, 0.30, 0.35, 0.37, //
        0.37, 0.35, 0.30, 0.25, 0.20, 0.18, 0.18, 0.18, //
        0.18, 0.18, 0.18, 0.18, 0.20, 0.22, 0.25, 0.28, //
        0.40, 0.45, 0.50, 0.50, 0.45, 0.40, 0.30, 0.25, //
        0.20, 0.15, 0.12, 0.10, 0.09, 0.08, 0.07, 0.07,
    ],

    co2_grid: vec![
        0.40, 0.40, 0.39, 0.38, 0.37, 0.36, 0.37, 0.38, //
        0.39, 0.40, 0.40, 0.39, 0.38, 0.37, 0.36, 0.35, //
        0.34, 0.33, 0.32, 0.31, 0.30, 0.29, 0.29, 0.30, //
        0.32, 0.35, 0.38, 0.40, 0.41, 0.40, 0.39, 0.35, //
        0.32, 0.30, 0.29, 0.29, 0.30, 0.35, 0.38, 0.39, //
        0.38, 0.37, 0.37, 0.36, 0.36, 0.37, 0.38, 0.39,
    ],

    // The fridge is not catalogued here; its compressor is a continuous
    // decision inside the planner.
    appliances: vec![
        Appliance::new("Dish washer", 9.0, 17.0, 2.0, 1.0),
        Appliance::new("Washing machine", 9.0, 12.0, 1.5, 1.2),
        Appliance::new("Spin dryer", 13.0, 18.0, 1.0, 2.5),
        Appliance::new("Cooker hob", 8.0, 9.0, 0.5, 3.0),
        Appliance::new("Cooker oven", 18.0, 19.0, 0.5, 5.0),
        Appliance::new("Microwave", 8.0, 9.0, 0.5, 1.7),
        Appliance::new("Interior lighting", 18.0, 24.0, 6.0, 0.84),
        Appliance::new("Laptop", 18.0, 24.0, 2.0, 0.1),
        Appliance::new("Desktop", 18.0, 24.0, 3.0, 0.3),
        Appliance::new("Vacuum cleaner", 9.0, 17.0, 0.5, 1.2),
        Appliance::new("Electric car", 18.0, 8.0, 3.0, 3.5),
    ],
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_is_valid() {
        let tables = Tables::builtin();
        assert!(tables.validate().is_ok());
        assert_eq!(tables.electric_demand_per_house.len(), SLOTS_PER_DAY);
        assert_eq!(tables.appliances.len(), 11);
        assert_eq!(tables.fridge_channel(), 11);
        assert_eq!(tables.max_slots(), 12); // interior lighting, 6 h
    }

    #[test]
    fn test_appliance_lookup() {
        let tables = Tables::builtin();
        assert_eq!(tables.appliance_id("Cooker oven"), Some(4));
        assert_eq!(tables.appliance_id("Sauna"), None);
    }

    #[test]
    fn test_short_profile_rejected() {
        let mut tables = Tables::builtin();
        tables.price_grid_elec.truncate(24);
        match tables.validate() {
            Err(EmsError::TableLength { name, len, expected }) => {
                assert_eq!(name, "price_grid_elec");
                assert_eq!(len, 24);
                assert_eq!(expected, 48);
            }
            other => panic!("expected length rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_appliance_rejected() {
        let mut tables = Tables::builtin();
        let dup = tables.appliances[0].clone();
        tables.appliances.push(dup);
        assert!(matches!(
            tables.validate(),
            Err(EmsError::InvalidCatalog { .. })
        ));
    }

    #[test]
    fn test_load_round_trip() {
        let tables = Tables::builtin();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(toml::to_string(&tables).unwrap().as_bytes())
            .unwrap();

        let loaded = Tables::load(file.path()).unwrap();
        assert_eq!(loaded.price_grid_elec, tables.price_grid_elec);
        assert_eq!(loaded.appliances, tables.appliances);
    }

    #[test]
    fn test_load_rejects_bad_catalog() {
        let mut tables = Tables::builtin();
        tables.appliances[0].duration_hours = 30.0;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(toml::to_string(&tables).unwrap().as_bytes())
            .unwrap();

        assert!(matches!(
            Tables::load(file.path()),
            Err(EmsError::InvalidCatalog { .. })
        ));
    }
}
