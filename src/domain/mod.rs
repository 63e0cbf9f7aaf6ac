//! Domain layer - Core value types and port definitions
//!
//! This module defines the types the rollover engine reasons about and the
//! trait (port) that cluster adapters implement, following hexagonal
//! architecture principles.

pub mod model;
pub mod ports;

pub use model::*;
pub use ports::*;
