//! Headless search core (ports + adapters).

pub mod services;
