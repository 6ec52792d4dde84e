//! Services layer (ports + adapters).
//!
//! - `ports`: pure contracts/types (matches, events, file lookup, settings).
//! - `adapters`: OS/runtime specific implementations (IO/async).

pub mod adapters;
pub mod ports;
