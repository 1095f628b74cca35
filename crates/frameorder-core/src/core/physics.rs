//! Physical constants and the prefactors of the paramagnetic observables.
//!
//! Distances handled by the rest of the library are in Angstrom; the prefactors below take
//! care of the conversion to SI units so that PCS values come out in ppm and RDC values in Hz.

use phf::{Map, phf_map};
use std::f64::consts::PI;

pub const MU0: f64 = 4.0 * PI * 1e-7;
pub const BOLTZMANN: f64 = 1.380650424e-23;
pub const PLANCK: f64 = 6.62606876e-34;
pub const H_BAR: f64 = PLANCK / (2.0 * PI);

pub const GAMMA_1H: f64 = 26.7522212e7;
pub const GAMMA_13C: f64 = 6.728e7;
pub const GAMMA_15N: f64 = -2.7126e7;
pub const GAMMA_17O: f64 = -3.628e7;
pub const GAMMA_31P: f64 = 10.841e7;

const ANGSTROM: f64 = 1e-10;

static GYROMAGNETIC_RATIOS: Map<&'static str, f64> = phf_map! {
    "1H" => GAMMA_1H,
    "13C" => GAMMA_13C,
    "15N" => GAMMA_15N,
    "17O" => GAMMA_17O,
    "31P" => GAMMA_31P,
};

/// Looks up the gyromagnetic ratio (rad s^-1 T^-1) of an isotope such as `"15N"`.
pub fn gyromagnetic_ratio(isotope: &str) -> Option<f64> {
    GYROMAGNETIC_RATIOS.get(isotope).copied()
}

/// Converts a proton Larmor frequency in Hz into the field strength in Tesla.
pub fn field_from_proton_frequency(frequency: f64) -> f64 {
    frequency * 2.0 * PI / GAMMA_1H
}

/// PCS prefactor such that `pcs = c * (r^T A r) / |r|^5` gives ppm for `r` in Angstrom.
pub fn pcs_constant(temperature: f64, proton_frequency: f64) -> f64 {
    let field = field_from_proton_frequency(proton_frequency);
    let si = MU0 / (4.0 * PI) * 15.0 * BOLTZMANN * temperature / (field * field);
    1e6 * si / ANGSTROM.powi(3)
}

/// Dipolar constant `-mu0 / (4 pi) * gI * gS * hbar / r^3` for a distance in Angstrom.
pub fn dipolar_constant(gamma_i: f64, gamma_s: f64, distance: f64) -> f64 {
    let r = distance * ANGSTROM;
    -MU0 / (4.0 * PI) * gamma_i * gamma_s * H_BAR / (r * r * r)
}

/// RDC prefactor such that `rdc = c * u^T A u` in Hz.
pub fn rdc_constant(gamma_i: f64, gamma_s: f64, distance: f64) -> f64 {
    3.0 / (2.0 * PI) * dipolar_constant(gamma_i, gamma_s, distance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isotope_lookup_finds_known_nuclei() {
        assert_eq!(gyromagnetic_ratio("15N"), Some(GAMMA_15N));
        assert_eq!(gyromagnetic_ratio("1H"), Some(GAMMA_1H));
        assert_eq!(gyromagnetic_ratio("2H"), None);
    }

    #[test]
    fn field_of_800_mhz_spectrometer_is_about_18_8_tesla() {
        let field = field_from_proton_frequency(800e6);
        assert!((field - 18.79).abs() < 0.01);
    }

    #[test]
    fn nh_rdc_constant_has_expected_magnitude() {
        let c = rdc_constant(GAMMA_15N, GAMMA_1H, 1.02);
        assert!(c > 3.3e4 && c < 3.6e4);
    }

    #[test]
    fn pcs_constant_scales_with_temperature_and_inverse_square_field() {
        let base = pcs_constant(300.0, 600e6);
        assert!((pcs_constant(600.0, 600e6) / base - 2.0).abs() < 1e-12);
        assert!((pcs_constant(300.0, 1200e6) / base - 0.25).abs() < 1e-12);
    }
}
