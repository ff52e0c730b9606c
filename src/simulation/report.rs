//! Persistence and charting for a finished simulation run.

use anyhow::Result;
use plotters::prelude::*;
use serde::Serialize;
use std::fs::File;
use std::path::Path;

use crate::domain::SLOTS_PER_DAY;
use crate::error::EmsError;

/// Everything recorded during a run; house-0 series mirror what the chart
/// shows for a single home.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationTrace {
    /// Accepted aggregate import at the first slot of each step (kW).
    pub community_demand_kw: Vec<f64>,
    /// Realised physical demand per step (kW).
    pub actual_demand_kw: Vec<f64>,
    /// Import carbon tally per step (kg CO2).
    pub co2_kg: Vec<f64>,
    pub h0_soc_kwh: Vec<f64>,
    pub h0_fridge_temp_c: Vec<f64>,
    pub h0_import_kw: Vec<f64>,
    pub h0_charge_kw: Vec<f64>,
    pub h0_discharge_kw: Vec<f64>,
    pub h0_solar_kw: Vec<f64>,
    pub h0_starts: Vec<Vec<String>>,
}

/// Document persisted to `simulation_results.json`.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub community_demand: Vec<f64>,
    pub h0_soc: Vec<f64>,
}

impl SimulationTrace {
    pub fn report(&self) -> SimulationReport {
        SimulationReport {
            community_demand: self.community_demand_kw.clone(),
            h0_soc: self.h0_soc_kwh.clone(),
        }
    }

    /// Write the results document: UTF-8, pretty-printed with 4-space indent.
    pub fn write_json(&self, path: &Path) -> Result<(), EmsError> {
        let file = File::create(path)?;
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(file, formatter);
        self.report().serialize(&mut serializer)?;
        Ok(())
    }

    /// Render the run overview as an SVG: community demand against the
    /// transformer limit on top, house-0 battery SoC with the grid price
    /// underneath.
    pub fn render_chart(
        &self,
        path: &Path,
        transformer_limit_kw: f64,
        price_grid_elec: &[f64],
    ) -> Result<()> {
        let steps = self.community_demand_kw.len();
        if steps == 0 {
            anyhow::bail!("nothing to chart: no steps recorded");
        }

        let root = SVGBackend::new(path, (1024, 768)).into_drawing_area();
        root.fill(&WHITE)?;
        let (upper, lower) = root.split_vertically(384);

        let demand_max = self
            .community_demand_kw
            .iter()
            .copied()
            .fold(transformer_limit_kw, f64::max);

        let mut demand_chart = ChartBuilder::on(&upper)
            .caption(
                format!(
                    "Community demand, {}",
                    chrono::Local::now().format("%Y-%m-%d %H:%M")
                ),
                ("sans-serif", 20),
            )
            .margin(10)
            .x_label_area_size(30)
            .y_label_area_size(45)
            .build_cartesian_2d(0..steps, 0f64..demand_max * 1.2)?;
        demand_chart
            .configure_mesh()
            .x_desc("step")
            .y_desc("kW")
            .draw()?;

        demand_chart
            .draw_series(LineSeries::new(
                self.community_demand_kw.iter().copied().enumerate(),
                &BLUE,
            ))?
            .label("community demand")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));
        demand_chart
            .draw_series(LineSeries::new(
                (0..steps).map(|t| (t, transformer_limit_kw)),
                &RED,
            ))?
            .label("transformer limit")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));
        demand_chart
            .configure_series_labels()
            .border_style(&BLACK)
            .draw()?;

        let soc_max = self.h0_soc_kwh.iter().copied().fold(1.0, f64::max);
        let price_max = price_grid_elec.iter().copied().fold(0.1, f64::max);

        let mut soc_chart = ChartBuilder::on(&lower)
            .caption("House 0 battery vs. grid price", ("sans-serif", 20))
            .margin(10)
            .x_label_area_size(30)
            .y_label_area_size(45)
            .right_y_label_area_size(45)
            .build_cartesian_2d(0..steps, 0f64..soc_max * 1.2)?
            .set_secondary_coord(0..steps, 0f64..price_max * 1.2);
        soc_chart
            .configure_mesh()
            .x_desc("step")
            .y_desc("kWh")
            .draw()?;
        soc_chart
            .configure_secondary_axes()
            .y_desc("£/kWh")
            .draw()?;

        soc_chart
            .draw_series(LineSeries::new(
                self.h0_soc_kwh.iter().copied().enumerate(),
                &GREEN,
            ))?
            .label("house 0 SoC")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &GREEN));
        soc_chart
            .draw_secondary_series(LineSeries::new(
                (0..steps).map(|t| (t, price_grid_elec[t % SLOTS_PER_DAY])),
                &MAGENTA,
            ))?
            .label("grid price")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &MAGENTA));
        soc_chart
            .configure_series_labels()
            .border_style(&BLACK)
            .draw()?;

        root.present()?;
        Ok(())
    }
}
