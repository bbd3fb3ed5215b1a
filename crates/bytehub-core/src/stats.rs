use serde::Serialize;

/// Byte and frame counters for one session.
///
/// `delivered_bytes` always equals `dispatched_bytes + discarded_bytes()`
/// plus whatever is still waiting in the probe buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Bytes handed to `deliver`.
    pub delivered_bytes: u64,
    /// Bytes consumed by subsystems as part of claimed frames.
    pub dispatched_bytes: u64,
    /// Bytes skipped as frames of a recognized length nobody claimed.
    pub discarded_fixed_bytes: u64,
    /// Bytes dropped while waiting for the stream to go quiet.
    pub discarded_timed_bytes: u64,
    /// Bytes currently held in the probe buffer.
    pub buffered_bytes: u64,
    /// Claimed frames that completed.
    pub frames_dispatched: u64,
    /// Unclaimed frames skipped by length.
    pub frames_discarded: u64,
    /// Times the stream became unparseable and timed discard started.
    pub timed_discards: u64,
    /// Content probe calls made.
    pub content_probes: u64,
    /// Size probe calls made.
    pub size_probes: u64,
}

impl SessionStats {
    /// All bytes dropped without reaching a subsystem.
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded_fixed_bytes + self.discarded_timed_bytes
    }

    /// True when every delivered byte is accounted for.
    pub fn is_conserved(&self) -> bool {
        self.delivered_bytes == self.dispatched_bytes + self.discarded_bytes() + self.buffered_bytes
    }
}
