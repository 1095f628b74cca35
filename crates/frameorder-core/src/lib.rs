//! # Frame-Order Core Library
//!
//! A library for characterising the rigid-body motion of one protein domain relative to
//! another from paramagnetic NMR data: pseudocontact shifts (PCS) and residual dipolar
//! couplings (RDC) measured under several lanthanide alignments.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless geometry, the motional model catalogue with its
//!   analytic frame-order matrices, numerical integration kernels and the arena-backed data
//!   bundle of spins, interatomic vectors and alignments.
//!
//! - **[`engine`]: The Logic Core.** The stateful machinery: parameter packing, the
//!   chi-squared target, linear constraints, grid search and local minimisers, Monte-Carlo
//!   error propagation and ensemble generation.
//!
//! - **[`workflows`]: The Public API.** Ties `engine` and `core` together behind the
//!   `setup`/`evaluate`/`optimise`/`propagate_errors`/`distribute` operations and the staged
//!   nested-model protocol.

pub mod core;
pub mod engine;
pub mod workflows;
