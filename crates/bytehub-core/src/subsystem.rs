//! The capability contract every pluggable subsystem implements.
//!
//! A [`Subsystem`] is registered once and may be enabled on many sessions.
//! Enabling calls [`Subsystem::attach`], which returns the per-session
//! [`Attachment`] the receive path probes and dispatches to. The attachment
//! is handed back through [`Subsystem::detach`] when the subsystem is
//! disabled or the session closes.
//!
//! Every call must return promptly: the receive path calls them inline
//! while processing a delivery.

use std::num::NonZeroUsize;

use bytehub_transport::TransportInfo;

/// Error type subsystems report from `attach`. Propagated unchanged.
pub type SubsystemError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Optional operations a subsystem supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// The subsystem implements [`Attachment::probe_size`].
    pub size_probe: bool,
}

impl Capabilities {
    /// Content probing and consuming only.
    pub const CONTENT_ONLY: Self = Self { size_probe: false };
    /// Content probing plus frame-length recognition.
    pub const WITH_SIZE_PROBE: Self = Self { size_probe: true };
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::CONTENT_ONLY
    }
}

/// Result of asking a subsystem for the length of an unclaimed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeProbe {
    /// The frame at the head is this many bytes long.
    Recognized(NonZeroUsize),
    /// The head does not look like a frame this subsystem knows.
    Unrecognized,
    /// Reserved: the subsystem cannot size frames but could detect their end.
    /// Treated the same as `Unrecognized`.
    Unsupported,
}

impl SizeProbe {
    /// `Recognized(len)` for nonzero `len`, `Unrecognized` for zero.
    pub fn from_len(len: usize) -> Self {
        NonZeroUsize::new(len).map_or(SizeProbe::Unrecognized, SizeProbe::Recognized)
    }
}

/// Result of handing bytes of a claimed frame to its subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumed {
    /// Every offered byte belongs to the frame and it is not finished yet.
    NeedMore,
    /// The frame ended after this many of the offered bytes.
    Complete(usize),
}

/// What a subsystem learns about the session it is attached to.
#[derive(Debug, Clone, Copy)]
pub struct SessionContext<'a> {
    pub session_id: u64,
    pub transport: &'a TransportInfo,
}

/// A pluggable protocol handler.
pub trait Subsystem: Send + Sync + 'static {
    /// Name used in logs and status output.
    fn name(&self) -> &str;

    /// Bytes that must be available before content probing is meaningful.
    ///
    /// Values larger than the session's probe buffer are clamped to it.
    fn min_probe_bytes(&self) -> usize {
        1
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Create the per-session handle.
    fn attach(&self, ctx: &SessionContext<'_>) -> Result<Box<dyn Attachment>, SubsystemError>;

    /// Release a handle created by [`attach`](Self::attach).
    fn detach(&self, attachment: Box<dyn Attachment>) {
        drop(attachment);
    }
}

impl std::fmt::Debug for dyn Subsystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subsystem")
            .field("name", &self.name())
            .field("min_probe_bytes", &self.min_probe_bytes())
            .finish()
    }
}

/// Per-session state of an enabled subsystem.
pub trait Attachment: Send {
    /// Does the frame at `head` belong to this subsystem?
    ///
    /// `head` holds at least `min_probe_bytes` bytes.
    fn probe_content(&mut self, head: &[u8]) -> bool;

    /// Length of the unclaimed frame at `head`, if recognizable.
    fn probe_size(&mut self, head: &[u8]) -> SizeProbe {
        let _ = head;
        SizeProbe::Unsupported
    }

    /// Receive bytes of a frame this subsystem claimed.
    fn consume(&mut self, bytes: &[u8]) -> Consumed;
}
