//! Concrete drivers for the haunt engine and construction of the
//! [`HardwareRegistry`](haunt::registry::HardwareRegistry) from
//! `configs.yaml`.
//!
//! - [`govee`]: UDP smart light
//! - [`player`]: audio through an external player process
//! - [`hardware`]: wiring configuration to drivers, simulated where no real
//!   driver exists

pub mod error;
pub mod govee;
pub mod hardware;
pub mod player;

pub use error::InitError;
pub use govee::GoveeLight;
pub use hardware::{Hardware, build_hardware};
pub use player::PlayerAudio;
