//! Byte sources for bytehub sessions.
//!
//! The hub itself never reads from a transport. This crate owns the other
//! side of that seam:
//! - [`TransportInfo`] describes a connection to the subsystems attached to it
//! - [`ByteStream`] wraps the concrete sources (Unix sockets, stdin, files)
//! - [`ReadPump`] turns any `Read` into a sequence of chunk deliveries
//!
//! Everything here is transport plumbing. Demultiplexing lives in
//! `bytehub-core`.

pub mod error;
pub mod pump;
pub mod stream;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use pump::{PumpSummary, ReadPump, DEFAULT_CHUNK_SIZE};
pub use stream::{ByteStream, TransportInfo, TransportKind};

#[cfg(unix)]
pub use uds::UnixDomainSocket;

#[cfg(feature = "async")]
pub use pump::pump_async;
