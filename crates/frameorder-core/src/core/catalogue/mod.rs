//! # Frame-Order Model Catalogue
//!
//! The closed set of motional models and everything each one declares about itself.
//!
//! ## Overview
//!
//! A model is selected through [`ModelKind`]. Given its amplitude parameters it resolves
//! into a [`Motion`], a tagged variant that carries the effective amplitudes. Free-rotor
//! variants pin the torsion at pi, torsionless variants drop the torsion entirely, and a
//! model whose amplitudes all vanish collapses onto [`Motion::Rigid`]. All numerical
//! code dispatches on `Motion` and never on model names.
//!
//! ## Architecture
//!
//! - **Model identity and parameters** (this module) - Names, amplitude descriptors,
//!   defaults and bounds
//! - **Frame-order matrices** ([`matrices`]) - Analytic first- and second-degree matrices
//! - **Sampling domains** ([`domain`]) - Sobol' mapping, rejection predicates and
//!   quadrature normalisers

use phf::{Map, phf_map};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod domain;
pub mod matrices;

pub use domain::{SampleRotation, pseudo_ellipse_theta_max};
pub use matrices::{first_degree, frame_order_matrices, second_degree};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("Unknown frame-order model '{0}'")]
    UnknownModel(String),
    #[error("Amplitude '{param}' = {value} lies outside [{lower}, {upper}]")]
    AmplitudeOutOfRange {
        param: &'static str,
        value: f64,
        lower: f64,
        upper: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ModelKind {
    Rigid,
    Rotor,
    FreeRotor,
    IsoCone,
    IsoConeTorsionless,
    IsoConeFreeRotor,
    PseudoEllipse,
    PseudoEllipseTorsionless,
    PseudoEllipseFreeRotor,
    DoubleRotor,
}

static MODEL_NAMES: Map<&'static str, ModelKind> = phf_map! {
    "rigid" => ModelKind::Rigid,
    "rotor" => ModelKind::Rotor,
    "free rotor" => ModelKind::FreeRotor,
    "iso cone" => ModelKind::IsoCone,
    "iso cone, torsionless" => ModelKind::IsoConeTorsionless,
    "iso cone, free rotor" => ModelKind::IsoConeFreeRotor,
    "pseudo-ellipse" => ModelKind::PseudoEllipse,
    "pseudo-ellipse, torsionless" => ModelKind::PseudoEllipseTorsionless,
    "pseudo-ellipse, free rotor" => ModelKind::PseudoEllipseFreeRotor,
    "double rotor" => ModelKind::DoubleRotor,
};

impl ModelKind {
    pub const ALL: [ModelKind; 10] = [
        ModelKind::Rigid,
        ModelKind::Rotor,
        ModelKind::FreeRotor,
        ModelKind::IsoCone,
        ModelKind::IsoConeTorsionless,
        ModelKind::IsoConeFreeRotor,
        ModelKind::PseudoEllipse,
        ModelKind::PseudoEllipseTorsionless,
        ModelKind::PseudoEllipseFreeRotor,
        ModelKind::DoubleRotor,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Rigid => "rigid",
            ModelKind::Rotor => "rotor",
            ModelKind::FreeRotor => "free rotor",
            ModelKind::IsoCone => "iso cone",
            ModelKind::IsoConeTorsionless => "iso cone, torsionless",
            ModelKind::IsoConeFreeRotor => "iso cone, free rotor",
            ModelKind::PseudoEllipse => "pseudo-ellipse",
            ModelKind::PseudoEllipseTorsionless => "pseudo-ellipse, torsionless",
            ModelKind::PseudoEllipseFreeRotor => "pseudo-ellipse, free rotor",
            ModelKind::DoubleRotor => "double rotor",
        }
    }

    /// Amplitude parameters in the order they occupy in the flat parameter vector.
    pub fn amplitude_params(&self) -> &'static [AmplitudeParam] {
        use AmplitudeParam::*;
        match self {
            ModelKind::Rigid | ModelKind::FreeRotor => &[],
            ModelKind::Rotor => &[ConeSigmaMax],
            ModelKind::IsoCone => &[ConeTheta, ConeSigmaMax],
            ModelKind::IsoConeTorsionless | ModelKind::IsoConeFreeRotor => &[ConeTheta],
            ModelKind::PseudoEllipse => &[ConeThetaX, ConeThetaY, ConeSigmaMax],
            ModelKind::PseudoEllipseTorsionless | ModelKind::PseudoEllipseFreeRotor => {
                &[ConeThetaX, ConeThetaY]
            }
            ModelKind::DoubleRotor => &[ConeSigmaMax, ConeSigmaMax2],
        }
    }

    pub fn is_rigid(&self) -> bool {
        matches!(self, ModelKind::Rigid)
    }

    pub fn is_free_rotor(&self) -> bool {
        matches!(
            self,
            ModelKind::FreeRotor | ModelKind::IsoConeFreeRotor | ModelKind::PseudoEllipseFreeRotor
        )
    }

    pub fn is_torsionless(&self) -> bool {
        matches!(
            self,
            ModelKind::IsoConeTorsionless | ModelKind::PseudoEllipseTorsionless
        )
    }

    /// Models with two pivots along a caller-fixed inter-pivot axis.
    pub fn uses_second_pivot(&self) -> bool {
        matches!(self, ModelKind::DoubleRotor)
    }

    /// Number of amplitude parameters, used as part of the model complexity.
    pub fn amplitude_count(&self) -> usize {
        self.amplitude_params().len()
    }

    /// Resolves the model and its amplitudes into the effective motion.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::AmplitudeOutOfRange`] if any amplitude used by the model lies
    /// outside its physical bounds.
    pub fn motion(&self, amplitudes: &Amplitudes) -> Result<Motion, ModelError> {
        for param in self.amplitude_params() {
            param.check(amplitudes.get(*param))?;
        }

        let torsion = |sigma: f64| if sigma == 0.0 { None } else { Some(sigma) };
        let motion = match self {
            ModelKind::Rigid => Motion::Rigid,
            ModelKind::Rotor => Motion::Rotor {
                sigma_max: amplitudes.cone_sigma_max,
            },
            ModelKind::FreeRotor => Motion::Rotor { sigma_max: PI },
            ModelKind::IsoCone => Motion::IsoCone {
                theta_max: amplitudes.cone_theta,
                sigma_max: torsion(amplitudes.cone_sigma_max),
            },
            ModelKind::IsoConeTorsionless => Motion::IsoCone {
                theta_max: amplitudes.cone_theta,
                sigma_max: None,
            },
            ModelKind::IsoConeFreeRotor => Motion::IsoCone {
                theta_max: amplitudes.cone_theta,
                sigma_max: Some(PI),
            },
            ModelKind::PseudoEllipse => Motion::PseudoEllipse {
                theta_x: amplitudes.cone_theta_x,
                theta_y: amplitudes.cone_theta_y,
                sigma_max: torsion(amplitudes.cone_sigma_max),
            },
            ModelKind::PseudoEllipseTorsionless => Motion::PseudoEllipse {
                theta_x: amplitudes.cone_theta_x,
                theta_y: amplitudes.cone_theta_y,
                sigma_max: None,
            },
            ModelKind::PseudoEllipseFreeRotor => Motion::PseudoEllipse {
                theta_x: amplitudes.cone_theta_x,
                theta_y: amplitudes.cone_theta_y,
                sigma_max: Some(PI),
            },
            ModelKind::DoubleRotor => Motion::DoubleRotor {
                sigma_max: amplitudes.cone_sigma_max,
                sigma_max_2: amplitudes.cone_sigma_max_2,
            },
        };
        Ok(motion.collapsed())
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MODEL_NAMES
            .get(s.trim())
            .copied()
            .ok_or_else(|| ModelError::UnknownModel(s.to_string()))
    }
}

impl TryFrom<String> for ModelKind {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ModelKind> for String {
    fn from(kind: ModelKind) -> Self {
        kind.name().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AmplitudeParam {
    ConeTheta,
    ConeThetaX,
    ConeThetaY,
    ConeSigmaMax,
    ConeSigmaMax2,
}

impl AmplitudeParam {
    pub fn name(&self) -> &'static str {
        match self {
            AmplitudeParam::ConeTheta => "cone_theta",
            AmplitudeParam::ConeThetaX => "cone_theta_x",
            AmplitudeParam::ConeThetaY => "cone_theta_y",
            AmplitudeParam::ConeSigmaMax => "cone_sigma_max",
            AmplitudeParam::ConeSigmaMax2 => "cone_sigma_max_2",
        }
    }

    /// Physical bounds; every amplitude is a half-angle in `[0, pi]`.
    pub fn bounds(&self) -> (f64, f64) {
        (0.0, PI)
    }

    pub fn default_value(&self) -> f64 {
        match self {
            AmplitudeParam::ConeTheta => 0.5,
            AmplitudeParam::ConeThetaX => 0.3,
            AmplitudeParam::ConeThetaY => 0.6,
            AmplitudeParam::ConeSigmaMax | AmplitudeParam::ConeSigmaMax2 => 0.5,
        }
    }

    fn check(&self, value: f64) -> Result<(), ModelError> {
        let (lower, upper) = self.bounds();
        if value.is_finite() && value >= lower && value <= upper {
            Ok(())
        } else {
            Err(ModelError::AmplitudeOutOfRange {
                param: self.name(),
                value,
                lower,
                upper,
            })
        }
    }
}

/// Amplitude parameters of all models; each model reads only the fields it declares.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Amplitudes {
    pub cone_theta: f64,
    pub cone_theta_x: f64,
    pub cone_theta_y: f64,
    pub cone_sigma_max: f64,
    pub cone_sigma_max_2: f64,
}

impl Amplitudes {
    /// Catalogue defaults for the parameters `kind` declares, zero elsewhere.
    pub fn defaults_for(kind: ModelKind) -> Self {
        let mut amplitudes = Self::default();
        for param in kind.amplitude_params() {
            amplitudes.set(*param, param.default_value());
        }
        amplitudes
    }

    pub fn get(&self, param: AmplitudeParam) -> f64 {
        match param {
            AmplitudeParam::ConeTheta => self.cone_theta,
            AmplitudeParam::ConeThetaX => self.cone_theta_x,
            AmplitudeParam::ConeThetaY => self.cone_theta_y,
            AmplitudeParam::ConeSigmaMax => self.cone_sigma_max,
            AmplitudeParam::ConeSigmaMax2 => self.cone_sigma_max_2,
        }
    }

    /// Copy with every amplitude of `kind` clamped into its physical bounds.
    ///
    /// Minimisers may probe slightly outside the feasible region while the constraint
    /// penalty pulls them back; the target evaluates those probes at the nearest boundary.
    pub fn clamped(&self, kind: ModelKind) -> Self {
        let mut clamped = *self;
        for param in kind.amplitude_params() {
            let (lower, upper) = param.bounds();
            let value = self.get(*param);
            if value.is_finite() {
                clamped.set(*param, value.clamp(lower, upper));
            }
        }
        clamped
    }

    pub fn set(&mut self, param: AmplitudeParam, value: f64) {
        match param {
            AmplitudeParam::ConeTheta => self.cone_theta = value,
            AmplitudeParam::ConeThetaX => self.cone_theta_x = value,
            AmplitudeParam::ConeThetaY => self.cone_theta_y = value,
            AmplitudeParam::ConeSigmaMax => self.cone_sigma_max = value,
            AmplitudeParam::ConeSigmaMax2 => self.cone_sigma_max_2 = value,
        }
    }
}

/// The effective motion of a model instance.
///
/// Cone torsions are `None` for torsion-free distributions. Angles are in radians and are
/// interpreted in the motional eigenframe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Motion {
    Rigid,
    Rotor {
        sigma_max: f64,
    },
    IsoCone {
        theta_max: f64,
        sigma_max: Option<f64>,
    },
    PseudoEllipse {
        theta_x: f64,
        theta_y: f64,
        sigma_max: Option<f64>,
    },
    DoubleRotor {
        sigma_max: f64,
        sigma_max_2: f64,
    },
}

impl Motion {
    /// Replaces motions with a vanishing tilt by the torsion-only motion they reduce to.
    fn collapsed(self) -> Self {
        match self {
            Motion::Rotor { sigma_max } if sigma_max == 0.0 => Motion::Rigid,
            Motion::IsoCone {
                theta_max,
                sigma_max,
            } if theta_max == 0.0 => Motion::Rotor {
                sigma_max: sigma_max.unwrap_or(0.0),
            }
            .collapsed(),
            Motion::PseudoEllipse {
                theta_x,
                theta_y,
                sigma_max,
            } if theta_x == 0.0 || theta_y == 0.0 => Motion::Rotor {
                sigma_max: sigma_max.unwrap_or(0.0),
            }
            .collapsed(),
            Motion::DoubleRotor {
                sigma_max,
                sigma_max_2,
            } if sigma_max == 0.0 && sigma_max_2 == 0.0 => Motion::Rigid,
            other => other,
        }
    }

    pub fn is_rigid(&self) -> bool {
        matches!(self, Motion::Rigid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_names_round_trip_through_the_lookup_table() {
        for kind in ModelKind::ALL {
            assert_eq!(kind.name().parse::<ModelKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_model_name_is_rejected() {
        assert_eq!(
            "cone".parse::<ModelKind>(),
            Err(ModelError::UnknownModel("cone".to_string()))
        );
    }

    #[test]
    fn free_rotor_pins_torsion_at_pi() {
        let motion = ModelKind::FreeRotor.motion(&Amplitudes::default()).unwrap();
        assert_eq!(motion, Motion::Rotor { sigma_max: PI });
    }

    #[test]
    fn rotor_with_full_torsion_resolves_to_the_free_rotor_motion() {
        let amplitudes = Amplitudes {
            cone_sigma_max: PI,
            ..Default::default()
        };
        assert_eq!(
            ModelKind::Rotor.motion(&amplitudes).unwrap(),
            ModelKind::FreeRotor.motion(&amplitudes).unwrap()
        );
    }

    #[test]
    fn zero_amplitudes_collapse_to_rigid() {
        let zero = Amplitudes::default();
        for kind in ModelKind::ALL.iter().filter(|k| !k.is_free_rotor()) {
            assert_eq!(kind.motion(&zero).unwrap(), Motion::Rigid, "{kind}");
        }
    }

    #[test]
    fn cone_without_tilt_reduces_to_rotor() {
        let amplitudes = Amplitudes {
            cone_theta: 0.0,
            cone_sigma_max: 0.4,
            ..Default::default()
        };
        assert_eq!(
            ModelKind::IsoCone.motion(&amplitudes).unwrap(),
            Motion::Rotor { sigma_max: 0.4 }
        );
    }

    #[test]
    fn cone_with_zero_torsion_is_torsionless() {
        let amplitudes = Amplitudes {
            cone_theta: 0.3,
            ..Default::default()
        };
        assert_eq!(
            ModelKind::IsoCone.motion(&amplitudes).unwrap(),
            ModelKind::IsoConeTorsionless.motion(&amplitudes).unwrap()
        );
    }

    #[test]
    fn out_of_range_amplitude_is_reported() {
        let amplitudes = Amplitudes {
            cone_theta: 3.5,
            ..Default::default()
        };
        assert!(matches!(
            ModelKind::IsoConeTorsionless.motion(&amplitudes),
            Err(ModelError::AmplitudeOutOfRange { param: "cone_theta", .. })
        ));
    }

    #[test]
    fn parameters_only_checked_for_declared_amplitudes() {
        let amplitudes = Amplitudes {
            cone_theta: -1.0,
            cone_sigma_max: 0.2,
            ..Default::default()
        };
        assert!(ModelKind::Rotor.motion(&amplitudes).is_ok());
    }

    #[test]
    fn model_kind_deserializes_from_its_name() {
        #[derive(Deserialize)]
        struct Wrapper {
            model: ModelKind,
        }
        let parsed: Wrapper = toml::from_str("model = \"pseudo-ellipse, free rotor\"").unwrap();
        assert_eq!(parsed.model, ModelKind::PseudoEllipseFreeRotor);
    }
}
