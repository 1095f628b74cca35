//! # Numerical Integration
//!
//! The two integration back-ends used to average observables over a motional distribution.
//!
//! - **Quasi-random points** ([`sobol`]) - A Gray-code Sobol' generator with optional
//!   per-replica digital shifts, mapped onto the natural angles of each motional model.
//! - **Adaptive quadrature** ([`quadrature`]) - Vector-valued adaptive Gauss-Kronrod
//!   integration that nests to handle the two- and three-dimensional model domains.
//! - **Observable kernels** ([`kernels`]) - The PCS and RDC formulas evaluated at one sample.

use thiserror::Error;

pub mod kernels;
pub mod quadrature;
pub mod sobol;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum IntegrationError {
    #[error("Adaptive quadrature did not converge after {subdivisions} subdivisions (error estimate {error_estimate:e})")]
    NotConverged {
        subdivisions: usize,
        error_estimate: f64,
    },
    #[error("Non-finite value encountered during integration")]
    NonFinite,
    #[error("Sobol' sequences are limited to {max} dimensions, {requested} requested")]
    TooManyDimensions { requested: usize, max: usize },
}
