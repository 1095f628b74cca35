//! # Engine Module
//!
//! The stateful machinery of a frame-order analysis: everything between a validated data
//! bundle and an optimised model.
//!
//! ## Overview
//!
//! A [`problem::Problem`] flattens the caller's spins, interatomic vectors and alignments into
//! dense observation rows. A [`state::FrameOrderModel`] holds the parameters being fitted,
//! which [`params::ParamLayout`] packs into the flat vector seen by the minimisers. The
//! [`target::Target`] back-calculates the motionally averaged observables through
//! [`averaging`] and reduces them to chi-squared.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Integration, grid, staged-refinement, Monte-Carlo,
//!   distribution and protocol settings, loadable from TOML
//! - **State Tracking** ([`state`]) - The model instance, per-stage records and diagnostics
//! - **Parameters** ([`params`]) - Parameter semantics, packing order and scaling
//! - **Constraints** ([`constraints`]) - Linear inequalities `A x >= b`
//! - **Minimisers** ([`minimise`]) - Grid search, simplex, gradient methods and the method of
//!   multipliers
//! - **Error Propagation** ([`monte_carlo`]) - Replica perturbation and summary statistics
//! - **Pivot Normalisation** ([`pivot`]) - Projection of a free pivot onto the rotation axis
//! - **Ensembles** ([`distribution`]) - Pseudo-Brownian, uniform and linear-mode ensembles
//! - **Progress Monitoring** ([`progress`]) - Callback-based progress events
//! - **Error Handling** ([`error`]) - The API-boundary error and its kinds

pub mod averaging;
pub mod config;
pub mod constraints;
pub mod distribution;
pub mod error;
pub mod minimise;
pub mod monte_carlo;
pub mod params;
pub mod pivot;
pub mod problem;
pub mod progress;
pub mod state;
pub mod target;
