use thiserror::Error;

use super::config::ConfigError;
use crate::core::catalogue::ModelError;
use crate::core::geometry::GeometryError;
use crate::core::integration::IntegrationError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Geometric degeneracy: {source}")]
    Geometry {
        #[from]
        source: GeometryError,
    },

    #[error("Model error: {source}")]
    Model {
        #[from]
        source: ModelError,
    },

    #[error("Constraint violated: {0}")]
    Constraint(String),

    #[error("Integration failed: {source}")]
    Integration {
        #[from]
        source: IntegrationError,
    },

    #[error("Non-finite {observable} back-calculated for {site}")]
    NonFinite {
        observable: &'static str,
        site: String,
    },

    #[error("Optimisation failed: {0}")]
    Optimisation(String),

    #[error("Configuration error: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Internal logic error: {0}")]
    Internal(String),
}

/// Coarse classification of an [`EngineError`] for callers that branch on the failure type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    GeometricDegeneracy,
    ConstraintViolation,
    IntegrationFailure,
    OptimiserFailure,
    Internal,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) | EngineError::Config { .. } => ErrorKind::Validation,
            EngineError::Model { source } => match source {
                ModelError::UnknownModel(_) => ErrorKind::Validation,
                ModelError::AmplitudeOutOfRange { .. } => ErrorKind::ConstraintViolation,
            },
            EngineError::Geometry { .. } | EngineError::NonFinite { .. } => {
                ErrorKind::GeometricDegeneracy
            }
            EngineError::Constraint(_) => ErrorKind::ConstraintViolation,
            EngineError::Integration { .. } => ErrorKind::IntegrationFailure,
            EngineError::Optimisation(_) => ErrorKind::OptimiserFailure,
            EngineError::Internal(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_level_errors_convert_with_their_kind() {
        let err: EngineError = GeometryError::ZeroAxis.into();
        assert_eq!(err.kind(), ErrorKind::GeometricDegeneracy);

        let err: EngineError = IntegrationError::NonFinite.into();
        assert_eq!(err.kind(), ErrorKind::IntegrationFailure);

        let err: EngineError = ModelError::UnknownModel("cone".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn amplitude_range_errors_are_constraint_violations() {
        let err: EngineError = ModelError::AmplitudeOutOfRange {
            param: "cone_theta",
            value: 4.0,
            lower: 0.0,
            upper: std::f64::consts::PI,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
        assert!(err.to_string().contains("cone_theta"));
    }

    #[test]
    fn non_finite_message_names_the_site() {
        let err = EngineError::NonFinite {
            observable: "PCS",
            site: "#dom:5@N".to_string(),
        };
        assert_eq!(err.to_string(), "Non-finite PCS back-calculated for #dom:5@N");
    }
}
