//! Hierarchical home energy management for a small community microgrid.
//!
//! Each home plans its own 24-hour electrical and thermal schedule with a
//! rolling-horizon MPC formulation; a community controller reconciles the
//! proposed import profiles against a shared transformer limit by iteratively
//! publishing half-hourly penalty prices, then commits each home's first-step
//! actions and advances physical state.

pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod optimizer;
pub mod simulation;
pub mod telemetry;
