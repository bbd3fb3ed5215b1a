//! Built-in subsystems.
//!
//! These are small, complete protocol handlers used by the `bytehub` CLI,
//! the demos and the integration tests:
//! - [`MarkerSubsystem`] claims input that starts with a fixed 4-byte marker
//! - [`FramedSubsystem`] handles binary frames with a channel/length header
//! - [`LineSubsystem`] handles `$`-prefixed ASCII sentences ending in `\n`
//!
//! Each reports completed frames as [`FrameEvent`]s through an optional
//! [`FrameSink`].

use std::sync::mpsc;
use std::sync::Arc;

use bytehub_core::Subsystem;
use bytes::Bytes;

mod framed;
mod line;
mod marker;

pub use framed::{FramedSubsystem, FRAME_HEADER_LEN, FRAME_MAGIC};
pub use line::{LineSubsystem, DEFAULT_MAX_LINE};
pub use marker::{MarkerSubsystem, DEFAULT_MARKER};

/// A frame a built-in subsystem finished receiving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameEvent {
    pub subsystem: &'static str,
    pub session_id: u64,
    pub payload: Bytes,
}

/// Where built-in subsystems report frames.
pub type FrameSink = mpsc::Sender<FrameEvent>;

/// Selector for the built-in subsystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum Builtin {
    Marker,
    Framed,
    Line,
}

impl Builtin {
    pub const ALL: [Builtin; 3] = [Builtin::Marker, Builtin::Framed, Builtin::Line];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Marker => marker::NAME,
            Builtin::Framed => framed::NAME,
            Builtin::Line => line::NAME,
        }
    }

    /// Construct the subsystem with default settings.
    pub fn instantiate(self, sink: Option<FrameSink>) -> Arc<dyn Subsystem> {
        match self {
            Builtin::Marker => Arc::new(MarkerSubsystem::new(DEFAULT_MARKER).with_sink(sink)),
            Builtin::Framed => Arc::new(FramedSubsystem::all_channels().with_sink(sink)),
            Builtin::Line => Arc::new(LineSubsystem::new(DEFAULT_MAX_LINE).with_sink(sink)),
        }
    }
}

pub(crate) fn report(
    sink: &Option<FrameSink>,
    subsystem: &'static str,
    session_id: u64,
    payload: &[u8],
) {
    if let Some(sink) = sink {
        let _ = sink.send(FrameEvent {
            subsystem,
            session_id,
            payload: Bytes::copy_from_slice(payload),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names_are_distinct() {
        let names: Vec<_> = Builtin::ALL.iter().map(|b| b.name()).collect();
        assert_eq!(names, vec!["marker", "framed", "line"]);
        for builtin in Builtin::ALL {
            assert_eq!(builtin.instantiate(None).name(), builtin.name());
        }
    }
}
