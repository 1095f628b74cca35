use serde::{Deserialize, Serialize};

/// A single measured value with its standard error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub value: f64,
    pub error: f64,
    #[serde(default)]
    pub missing: bool,
}

impl Observation {
    pub fn new(value: f64, error: f64) -> Self {
        Self {
            value,
            error,
            missing: false,
        }
    }

    /// A placeholder cell: present in the table but excluded from fitting.
    pub fn missing() -> Self {
        Self {
            value: 0.0,
            error: 1.0,
            missing: true,
        }
    }

    pub fn is_present(&self) -> bool {
        !self.missing
    }
}

/// An RDC cell; `absolute` marks measurements where only the magnitude is known.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RdcObservation {
    pub observation: Observation,
    #[serde(default)]
    pub absolute: bool,
}

impl RdcObservation {
    pub fn new(value: f64, error: f64) -> Self {
        Self {
            observation: Observation::new(value, error),
            absolute: false,
        }
    }

    pub fn absolute(value: f64, error: f64) -> Self {
        Self {
            observation: Observation::new(value, error),
            absolute: true,
        }
    }
}
