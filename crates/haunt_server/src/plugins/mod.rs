//! Server plugins for the haunt controller.
//!
//! - `detection`: sensor polling, trigger handling and scene launches
//! - `shutdown`: Ctrl-C handling with emergency cleanup before exit

pub mod detection;
pub mod shutdown;

pub use detection::{DetectionPlugin, SceneEngine, Sensors};
pub use shutdown::ShutdownPlugin;
