//! The receive state machine.
//!
//! Each delivery runs [`Receiver::run`] over an [`Intake`] that merges the
//! session's probe buffer with the newly arrived chunk. The machine loops
//! until both are exhausted or a probing phase needs more input, in which
//! case the chunk's remainder is stashed in the probe buffer.

use std::fmt;
use std::time::{Duration, Instant};

use bytehub_probe::{Intake, Source};
use tracing::{debug, warn};

use crate::session::SessionShared;
use crate::set::SubsystemSet;
use crate::stats::SessionStats;
use crate::subsystem::{Consumed, SizeProbe};

/// The phase a session's receive path is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Asking enabled subsystems whether the head belongs to them.
    ProbeContent,
    /// Nobody claimed the head; asking for a frame length to skip.
    ProbeSize,
    /// Skipping a frame of known length that nobody claimed.
    DiscardFixed { remaining: usize },
    /// Dropping everything until the stream stays quiet until `deadline`.
    DiscardTimed { deadline: Instant },
    /// Handing bytes to the subsystem at `index` until its frame ends.
    Dispatch { index: usize },
}

impl Mode {
    pub fn name(&self) -> &'static str {
        match self {
            Mode::ProbeContent => "probe-content",
            Mode::ProbeSize => "probe-size",
            Mode::DiscardFixed { .. } => "discard-fixed",
            Mode::DiscardTimed { .. } => "discard-timed",
            Mode::Dispatch { .. } => "dispatch",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::DiscardFixed { remaining } => write!(f, "discard-fixed({remaining})"),
            Mode::Dispatch { index } => write!(f, "dispatch({index})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Receive-side state owned by the delivering thread.
pub(crate) struct Receiver {
    mode: Mode,
    probed: SubsystemSet,
    /// Subsystems that ended a frame without consuming anything. They sit
    /// out content probing until the stream advances, even across claims.
    empty_claims: SubsystemSet,
    stats: SessionStats,
    quiet_period: Duration,
}

impl Receiver {
    pub(crate) fn new(max_subsystems: usize, quiet_period: Duration) -> Self {
        Self {
            mode: Mode::ProbeContent,
            probed: SubsystemSet::new(max_subsystems),
            empty_claims: SubsystemSet::new(max_subsystems),
            stats: SessionStats::default(),
            quiet_period,
        }
    }

    pub(crate) fn mode(&self) -> Mode {
        self.mode
    }

    /// Counters; `buffered_bytes` is left for the owner of the buffer to fill.
    pub(crate) fn stats(&self) -> SessionStats {
        self.stats
    }

    pub(crate) fn run(&mut self, intake: &mut Intake<'_>, shared: &SessionShared, now: Instant) {
        let delivered = intake.chunk_remaining().len();
        self.stats.delivered_bytes += delivered as u64;
        self.advanced(delivered);
        if intake.source() == Source::Buffer {
            intake.stash();
        }

        if let Mode::DiscardTimed { deadline } = self.mode {
            if now >= deadline {
                warn!(
                    session = shared.id(),
                    discarded = self.stats.discarded_timed_bytes,
                    "unparseable input ended, resuming content probing"
                );
                self.enter(shared, Mode::ProbeContent);
            }
        }

        while !intake.is_exhausted() {
            let proceed = match self.mode {
                Mode::ProbeContent => self.probe_content(intake, shared),
                Mode::ProbeSize => self.probe_size(intake, shared, now),
                Mode::DiscardFixed { remaining } => {
                    self.discard_fixed(intake, shared, remaining);
                    true
                }
                Mode::DiscardTimed { .. } => {
                    self.discard_timed(intake, now);
                    true
                }
                Mode::Dispatch { index } => {
                    self.dispatch(intake, shared, index);
                    true
                }
            };
            if !proceed {
                break;
            }
        }
    }

    fn probe_content(&mut self, intake: &mut Intake<'_>, shared: &SessionShared) -> bool {
        let available = intake.available();
        let mut starved = false;

        for (index, min_probe_bytes) in shared.content_candidates(&self.probed, &self.empty_claims)
        {
            if available < min_probe_bytes {
                starved = true;
                continue;
            }
            let Some(mut checkout) = shared.checkout_enabled(index) else {
                continue;
            };
            let matched = checkout.attachment.probe_content(intake.head());
            self.stats.content_probes += 1;
            self.probed.insert(index);

            if shared.checkin_probe(checkout, matched) {
                self.probed.clear();
                self.enter(shared, Mode::Dispatch { index });
                return true;
            }
        }

        if starved {
            return self.await_input(intake);
        }
        self.probed.clear();
        self.enter(shared, Mode::ProbeSize);
        true
    }

    fn probe_size(&mut self, intake: &mut Intake<'_>, shared: &SessionShared, now: Instant) -> bool {
        for index in shared.size_candidates() {
            let Some(mut checkout) = shared.checkout_enabled(index) else {
                continue;
            };
            let probe = checkout.attachment.probe_size(intake.head());
            self.stats.size_probes += 1;
            shared.checkin_probe(checkout, false);

            if let SizeProbe::Recognized(len) = probe {
                self.stats.frames_discarded += 1;
                self.enter(
                    shared,
                    Mode::DiscardFixed {
                        remaining: len.get(),
                    },
                );
                return true;
            }
        }

        if intake.is_saturated() {
            self.stats.timed_discards += 1;
            self.enter(
                shared,
                Mode::DiscardTimed {
                    deadline: now + self.quiet_period,
                },
            );
            return true;
        }
        self.await_input(intake)
    }

    fn discard_fixed(&mut self, intake: &mut Intake<'_>, shared: &SessionShared, remaining: usize) {
        let n = remaining.min(intake.available());
        intake.consume(n);
        self.stats.discarded_fixed_bytes += n as u64;
        self.advanced(n);

        let remaining = remaining - n;
        if remaining == 0 {
            self.enter(shared, Mode::ProbeContent);
        } else {
            self.mode = Mode::DiscardFixed { remaining };
        }
    }

    fn discard_timed(&mut self, intake: &mut Intake<'_>, now: Instant) {
        let n = intake.available();
        intake.consume(n);
        self.stats.discarded_timed_bytes += n as u64;
        self.advanced(n);
        self.mode = Mode::DiscardTimed {
            deadline: now + self.quiet_period,
        };
    }

    fn dispatch(&mut self, intake: &mut Intake<'_>, shared: &SessionShared, index: usize) {
        let Some(mut checkout) = shared.checkout_target(index) else {
            warn!(
                session = shared.id(),
                index, "dispatch target has no attachment, resuming content probing"
            );
            self.enter(shared, Mode::ProbeContent);
            return;
        };

        let offered = intake.available();
        match checkout.attachment.consume(intake.head()) {
            Consumed::NeedMore => {
                intake.consume(offered);
                self.stats.dispatched_bytes += offered as u64;
                self.advanced(offered);
                shared.finish_dispatch(checkout, false);
            }
            Consumed::Complete(reported) => {
                let n = if reported > offered {
                    warn!(
                        session = shared.id(),
                        index, reported, offered, "subsystem consumed more bytes than offered"
                    );
                    offered
                } else {
                    reported
                };
                intake.consume(n);
                self.stats.dispatched_bytes += n as u64;
                self.stats.frames_dispatched += 1;
                shared.finish_dispatch(checkout, true);

                if n == 0 {
                    self.empty_claims.insert(index);
                } else {
                    self.advanced(n);
                }
                self.enter(shared, Mode::ProbeContent);
                if intake.source() == Source::Buffer {
                    intake.stash();
                }
            }
        }
    }

    /// Keep going if the buffer could be topped up from the chunk; otherwise
    /// stash what is left of the chunk and end this delivery.
    fn await_input(&mut self, intake: &mut Intake<'_>) -> bool {
        match intake.source() {
            Source::Buffer => {
                let topped_up = intake.stash();
                self.advanced(topped_up);
                topped_up > 0
            }
            Source::Chunk => {
                intake.stash();
                false
            }
        }
    }

    /// The head moved or grew, so empty frames may be claimed again.
    fn advanced(&mut self, bytes: usize) {
        if bytes > 0 {
            self.empty_claims.clear();
        }
    }

    fn enter(&mut self, shared: &SessionShared, next: Mode) {
        debug!(session = shared.id(), from = %self.mode, to = %next, "receive mode change");
        self.mode = next;
    }
}
