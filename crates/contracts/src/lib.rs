//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the road-quality workspace.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Sensor timestamps are seconds (`f64`) on the acquisition clock shared by all drivers
//! - `frame_id` is assigned by the fusion engine, monotonically increasing per tick

mod analysis;
mod config;
mod error;
mod frame;
mod sensor;
mod settings;
mod sink;

pub use analysis::*;
pub use config::*;
pub use error::*;
pub use frame::*;
pub use sensor::*;
pub use settings::*;
pub use sink::*;
