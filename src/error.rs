use thiserror::Error;

/// Error kinds surfaced by the controller.
///
/// Per-home solver failures and unresolved transformer breaches are logged
/// and degraded, never fatal; catalog and table problems abort startup.
#[derive(Debug, Error)]
pub enum EmsError {
    #[error("invalid appliance catalog entry '{name}': {reason}")]
    InvalidCatalog { name: String, reason: String },

    #[error("profile '{name}' has {len} entries, expected {expected}")]
    TableLength {
        name: &'static str,
        len: usize,
        expected: usize,
    },

    #[error("table file error: {0}")]
    Table(String),

    #[error("house {house_id} solve at step {step} was non-optimal: {detail}")]
    SolverNonOptimal {
        house_id: usize,
        step: u64,
        detail: String,
    },

    #[error("transformer limit still breached after {iterations} iterations at step {step}")]
    TransformerBreachUnresolved { step: u64, iterations: u32 },

    #[error("house {house_id} committed {field} = {value} outside [{min}, {max}]")]
    StateOutOfRange {
        house_id: usize,
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EmsError::InvalidCatalog {
            name: "Cooker oven".to_string(),
            reason: "duration exceeds 24 h".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid appliance catalog entry 'Cooker oven': duration exceeds 24 h"
        );

        let err = EmsError::StateOutOfRange {
            house_id: 3,
            field: "battery SoC",
            value: 10.4,
            min: 0.0,
            max: 10.0,
        };
        assert!(err.to_string().contains("house 3"));
        assert!(err.to_string().contains("battery SoC"));
    }
}
