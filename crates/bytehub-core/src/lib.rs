//! Content-probed demultiplexing of one byte stream among many subsystems.
//!
//! Subsystems register with a shared [`Registry`] and are enabled per
//! [`Session`]. Each delivery of bytes runs the receive state machine:
//! probe by content, then by frame size, then discard, and dispatch every
//! claimed frame to exactly one subsystem.

pub mod config;
pub mod control;
pub mod error;
pub mod hub;
pub mod receive;
pub mod registry;
pub mod session;
pub mod set;
pub mod stats;
pub mod subsystem;

pub use config::HubConfig;
pub use control::{
    execute, status_code, ControlCommand, ControlReply, SESSION_STATUS, SUBSYS_DISABLE,
    SUBSYS_ENABLE,
};
pub use error::{BusyReason, HubError, Result};
pub use hub::Hub;
pub use receive::Mode;
pub use registry::{Registry, SubsystemInfo};
pub use session::{DisableOutcome, Session, SessionHandle, SessionStatus};
pub use set::SubsystemSet;
pub use stats::SessionStats;
pub use subsystem::{
    Attachment, Capabilities, Consumed, SessionContext, SizeProbe, Subsystem, SubsystemError,
};
