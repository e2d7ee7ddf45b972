//! Domain layer for the Strategos decision engine
//!
//! This module contains the decision-round data types, the error taxonomy,
//! and the ports that external collaborators implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DecisionError, DecisionResult};
