//! Bounded lookahead for content-probed byte streams.
//!
//! A [`ProbeBuffer`] holds the bytes a session has seen but nobody has
//! claimed yet. An [`Intake`] pairs that buffer with the chunk currently
//! being delivered and always reads from exactly one of them:
//! - the buffer's unread region while it is nonempty
//! - otherwise the delivered chunk at its own read cursor
//!
//! Bytes move from the chunk into the buffer only when probing needs more
//! input than one delivery provides. Nothing is dropped or read twice.

pub mod buffer;
pub mod error;
pub mod intake;

pub use buffer::{ProbeBuffer, DEFAULT_CAPACITY, MIN_CAPACITY};
pub use error::{ProbeError, Result};
pub use intake::{Intake, Source};
