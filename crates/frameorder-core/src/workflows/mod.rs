//! # Workflows Module
//!
//! The public entry points of the library. Each workflow validates its inputs up front,
//! drives the `engine` layer and reports progress through a
//! [`ProgressReporter`](crate::engine::progress::ProgressReporter).
//!
//! ## Submodules
//!
//! - [`analysis`]: A single frame-order model against one data bundle: set-up, evaluation,
//!   back-calculation, optimisation, Monte-Carlo error propagation, ensemble generation and
//!   pivot projection.
//! - [`protocol`]: The nested model sequence, each model seeded from those fitted before it
//!   and all of them ranked by AIC.

pub mod analysis;
pub mod protocol;
