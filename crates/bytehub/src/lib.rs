//! Content-probed demultiplexing of one byte stream among many protocol
//! subsystems.
//!
//! Several protocols share one transport with no common framing and no
//! addressing. bytehub finds the owner of each frame by asking the enabled
//! subsystems to recognize it, skips frames nobody claims when their length
//! can be determined, and drops input until the line goes quiet when it
//! cannot.
//!
//! # Crate Structure
//!
//! - [`transport`]: Byte sources and the read pump feeding a session
//! - [`probe`]: The fixed-capacity lookahead buffer
//! - [`hub`]: Registry, sessions, the receive state machine and control plane
//! - [`subsys`]: Built-in subsystems used by the CLI and demos

/// Re-export transport types.
pub mod transport {
    pub use bytehub_transport::*;
}

/// Re-export probe buffer types.
pub mod probe {
    pub use bytehub_probe::*;
}

/// Re-export hub types.
pub mod hub {
    pub use bytehub_core::*;
}

pub mod subsys;
