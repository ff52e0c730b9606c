use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::Validate;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    #[serde(default)]
    pub simulation: SimulationConfig,

    #[validate(nested)]
    #[serde(default)]
    pub community: CommunityConfig,

    #[validate(nested)]
    #[serde(default)]
    pub house: HouseConfig,

    #[validate(nested)]
    #[serde(default)]
    pub planner: PlannerConfig,

    #[serde(default)]
    pub tables: TablesConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// Simulation driver configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct SimulationConfig {
    /// Number of half-hour steps to simulate.
    #[serde(default = "default_steps")]
    #[validate(range(min = 1))]
    pub steps: u64,
}

/// Community-level negotiation configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CommunityConfig {
    #[serde(default = "default_num_homes")]
    #[validate(range(min = 1, max = 1000))]
    pub num_homes: usize,

    /// Shared transformer import cap (kW).
    #[serde(default = "default_transformer_limit")]
    #[validate(range(min = 0.0))]
    pub transformer_limit_kw: f64,

    /// Penalty price added to a breached slot per iteration (currency/kWh).
    #[serde(default = "default_penalty_increment")]
    #[validate(range(min = 0.0))]
    pub penalty_increment: f64,

    #[serde(default = "default_max_iterations")]
    #[validate(range(min = 1, max = 1000))]
    pub max_iterations: u32,
}

/// Per-home physical hardware configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct HouseConfig {
    #[serde(default = "default_battery_capacity")]
    #[validate(range(min = 0.0, max = 1000.0))]
    pub battery_capacity_kwh: f64,

    #[serde(default = "default_thermal_capacity")]
    #[validate(range(min = 0.0, max = 1000.0))]
    pub thermal_capacity_kwh: f64,

    /// Heat pump coefficient of performance.
    #[serde(default = "default_cop")]
    #[validate(range(min = 0.1, max = 10.0))]
    pub cop: f64,

    #[serde(default = "default_max_charge")]
    #[validate(range(min = 0.0, max = 100.0))]
    pub max_charge_kw: f64,

    #[serde(default = "default_max_discharge")]
    #[validate(range(min = 0.0, max = 100.0))]
    pub max_discharge_kw: f64,

    #[serde(default = "default_battery_efficiency")]
    #[validate(range(min = 0.5, max = 1.0))]
    pub battery_efficiency: f64,

    /// Thermal store efficiency. Catalog value carried as-is.
    #[serde(default = "default_thermal_efficiency")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub thermal_efficiency: f64,

    /// Initial state of charge as a fraction of capacity, applied to both
    /// the electrical and thermal stores.
    #[serde(default = "default_initial_soc_fraction")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub initial_soc_fraction: f64,

    #[serde(default = "default_pv_capacity")]
    #[validate(range(min = 0.0, max = 100.0))]
    pub pv_capacity_kw: f64,

    /// Hard per-home grid import bound (kW). The softer per-home share of
    /// the transformer is derived as `import_limit_kw / num_homes`.
    #[serde(default = "default_import_limit")]
    #[validate(range(min = 0.0, max = 1000.0))]
    pub import_limit_kw: f64,

    /// Battery wear cost per kWh discharged.
    #[serde(default = "default_wear_cost_elec")]
    #[validate(range(min = 0.0))]
    pub wear_cost_elec: f64,

    /// Heat pump wear cost per kWh of electrical input.
    #[serde(default = "default_wear_cost_therm")]
    #[validate(range(min = 0.0))]
    pub wear_cost_therm: f64,
}

/// MPC planner configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct PlannerConfig {
    /// Wall-clock ceiling for a single solve (seconds).
    #[serde(default = "default_time_limit_secs")]
    #[validate(range(min = 1, max = 3600))]
    pub time_limit_secs: u64,

    /// Objective coefficient discouraging imports above the per-home share.
    #[serde(default = "default_excess_penalty")]
    #[validate(range(min = 0.0))]
    pub excess_penalty: f64,
}

/// Static table source configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TablesConfig {
    /// Optional TOML file overriding the builtin profiles and catalog.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Output artifact configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_results_path")]
    pub results_path: PathBuf,

    #[serde(default = "default_chart_path")]
    pub chart_path: PathBuf,
}

// Default value functions
fn default_steps() -> u64 { 96 }
fn default_num_homes() -> usize { 5 }
fn default_transformer_limit() -> f64 { 5.0 }
fn default_penalty_increment() -> f64 { 0.2 }
fn default_max_iterations() -> u32 { 10 }
fn default_battery_capacity() -> f64 { 10.0 }
fn default_thermal_capacity() -> f64 { 20.0 }
fn default_cop() -> f64 { 3.0 }
fn default_max_charge() -> f64 { 10.0 }
fn default_max_discharge() -> f64 { 10.0 }
fn default_battery_efficiency() -> f64 { 0.95 }
fn default_thermal_efficiency() -> f64 { 0.098 }
fn default_initial_soc_fraction() -> f64 { 0.5 }
fn default_pv_capacity() -> f64 { 5.1 }
fn default_import_limit() -> f64 { 5.0 }
fn default_wear_cost_elec() -> f64 { 0.005 }
fn default_wear_cost_therm() -> f64 { 0.001 }
fn default_time_limit_secs() -> u64 { 10 }
fn default_excess_penalty() -> f64 { 1000.0 }
fn default_results_path() -> PathBuf { PathBuf::from("simulation_results.json") }
fn default_chart_path() -> PathBuf { PathBuf::from("simulation_results.svg") }

impl Default for SimulationConfig {
    fn default() -> Self {
        Self { steps: default_steps() }
    }
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            num_homes: default_num_homes(),
            transformer_limit_kw: default_transformer_limit(),
            penalty_increment: default_penalty_increment(),
            max_iterations: default_max_iterations(),
        }
    }
}

impl Default for HouseConfig {
    fn default() -> Self {
        Self {
            battery_capacity_kwh: default_battery_capacity(),
            thermal_capacity_kwh: default_thermal_capacity(),
            cop: default_cop(),
            max_charge_kw: default_max_charge(),
            max_discharge_kw: default_max_discharge(),
            battery_efficiency: default_battery_efficiency(),
            thermal_efficiency: default_thermal_efficiency(),
            initial_soc_fraction: default_initial_soc_fraction(),
            pv_capacity_kw: default_pv_capacity(),
            import_limit_kw: default_import_limit(),
            wear_cost_elec: default_wear_cost_elec(),
            wear_cost_therm: default_wear_cost_therm(),
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            time_limit_secs: default_time_limit_secs(),
            excess_penalty: default_excess_penalty(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_path: default_results_path(),
            chart_path: default_chart_path(),
        }
    }
}

impl HouseConfig {
    /// Per-home share of the grid connection, the soft import cap.
    pub fn house_limit_kw(&self, num_homes: usize) -> f64 {
        self.import_limit_kw / num_homes as f64
    }
}

impl AppConfig {
    /// Load configuration from TOML files and environment variables
    ///
    /// Configuration is loaded in this order (later overrides earlier):
    /// 1. config/default.toml (base configuration)
    /// 2. an explicit file passed on the command line, if any
    /// 3. Environment variables with EMS__ prefix
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Toml::file("config/default.toml"));

        if let Some(path) = file {
            figment = figment.merge(Toml::file(path));
        }

        // Override with environment variables (EMS__COMMUNITY__NUM_HOMES -> community.num_homes)
        figment = figment.merge(Env::prefixed("EMS__").split("__"));

        let config: AppConfig = figment
            .extract()
            .context("Failed to parse configuration")?;

        config
            .validate()
            .context("Configuration validation failed")?;

        Ok(config)
    }
}
