use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use bytehub_probe::{Intake, ProbeBuffer};
use bytehub_transport::TransportInfo;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::HubConfig;
use crate::error::{BusyReason, HubError, Result};
use crate::receive::{Mode, Receiver};
use crate::registry::Registry;
use crate::set::SubsystemSet;
use crate::stats::SessionStats;
use crate::subsystem::{Attachment, Capabilities, SessionContext, Subsystem};

/// What a successful disable did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisableOutcome {
    /// The subsystem was not enabled on this session.
    NotEnabled,
    /// The subsystem was detached before returning.
    Detached,
    /// The subsystem is in use by the receive path and will be detached
    /// once its current frame or probe ends. It no longer receives new frames.
    Deferred,
}

/// Point-in-time view of a session, as reported to the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub id: u64,
    pub transport: String,
    pub enabled: Vec<usize>,
    pub dispatch_target: Option<usize>,
    pub mode: String,
    pub closed: bool,
    pub stats: SessionStats,
}

struct AttachedSlot {
    subsystem: Arc<dyn Subsystem>,
    /// `None` while checked out by the receive path.
    attachment: Option<Box<dyn Attachment>>,
    min_probe_bytes: usize,
    capabilities: Capabilities,
    detach_pending: bool,
}

enum Slot {
    Vacant,
    Enabling,
    Attached(AttachedSlot),
}

struct SlotTable {
    enabled: SubsystemSet,
    slots: Vec<Slot>,
    dispatch_target: Option<usize>,
    closed: bool,
    mode: Mode,
    stats: SessionStats,
}

/// An attachment taken out of its slot for a callback made without locks.
pub(crate) struct Checkout {
    index: usize,
    subsystem: Arc<dyn Subsystem>,
    pub(crate) attachment: Box<dyn Attachment>,
}

/// Session state shared between the delivering thread and control handles.
pub(crate) struct SessionShared {
    id: u64,
    transport: TransportInfo,
    registry: Arc<Registry>,
    probe_capacity: usize,
    table: Mutex<SlotTable>,
}

impl SessionShared {
    fn new(
        id: u64,
        transport: TransportInfo,
        registry: Arc<Registry>,
        probe_capacity: usize,
    ) -> Self {
        let capacity = registry.capacity();
        Self {
            id,
            transport,
            registry,
            probe_capacity,
            table: Mutex::new(SlotTable {
                enabled: SubsystemSet::new(capacity),
                slots: (0..capacity).map(|_| Slot::Vacant).collect(),
                dispatch_target: None,
                closed: false,
                mode: Mode::ProbeContent,
                stats: SessionStats::default(),
            }),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    fn enable(&self, index: usize) -> Result<()> {
        let subsystem = {
            let mut table = self.lock();
            if table.closed {
                return Err(HubError::SessionClosed(self.id));
            }
            match table.slots.get(index) {
                None => return Err(HubError::NotFound(index)),
                Some(Slot::Enabling) => {
                    return Err(HubError::Busy {
                        index,
                        reason: BusyReason::EnableInProgress,
                    })
                }
                Some(Slot::Attached(slot)) if slot.detach_pending => {
                    return Err(HubError::Busy {
                        index,
                        reason: BusyReason::DetachPending,
                    })
                }
                Some(Slot::Attached(_)) => return Err(HubError::AlreadyEnabled(index)),
                Some(Slot::Vacant) => {}
            }
            let subsystem = self.registry.begin_enable(index)?;
            table.slots[index] = Slot::Enabling;
            subsystem
        };

        let ctx = SessionContext {
            session_id: self.id,
            transport: &self.transport,
        };
        let attached = subsystem.attach(&ctx);

        let mut table = self.lock();
        let attachment = match attached {
            Ok(attachment) => attachment,
            Err(source) => {
                table.slots[index] = Slot::Vacant;
                drop(table);
                self.registry.finish_enable(index, false);
                warn!(
                    session = self.id,
                    name = subsystem.name(),
                    index,
                    error = %source,
                    "subsystem attach failed"
                );
                return Err(HubError::AttachFailed {
                    index,
                    name: subsystem.name().to_string(),
                    source,
                });
            }
        };

        if table.closed {
            table.slots[index] = Slot::Vacant;
            drop(table);
            subsystem.detach(attachment);
            self.registry.finish_enable(index, false);
            return Err(HubError::SessionClosed(self.id));
        }

        let min_probe_bytes = subsystem.min_probe_bytes().clamp(1, self.probe_capacity);
        let capabilities = subsystem.capabilities();
        let name = subsystem.name().to_string();
        table.slots[index] = Slot::Attached(AttachedSlot {
            subsystem,
            attachment: Some(attachment),
            min_probe_bytes,
            capabilities,
            detach_pending: false,
        });
        table.enabled.insert(index);
        drop(table);
        self.registry.finish_enable(index, true);

        info!(session = self.id, %name, index, "subsystem enabled");
        Ok(())
    }

    fn disable(&self, index: usize) -> Result<DisableOutcome> {
        let mut guard = self.lock();
        let table = &mut *guard;
        if table.closed {
            return Err(HubError::SessionClosed(self.id));
        }
        let Some(slot) = table.slots.get_mut(index) else {
            return Err(HubError::NotFound(index));
        };
        let attached = match slot {
            Slot::Vacant => return Ok(DisableOutcome::NotEnabled),
            Slot::Enabling => {
                return Err(HubError::Busy {
                    index,
                    reason: BusyReason::EnableInProgress,
                })
            }
            Slot::Attached(attached) => attached,
        };
        if attached.detach_pending {
            return Ok(DisableOutcome::Deferred);
        }

        table.enabled.remove(index);
        if table.dispatch_target == Some(index) || attached.attachment.is_none() {
            attached.detach_pending = true;
            debug!(session = self.id, index, "subsystem in use, detach deferred");
            return Ok(DisableOutcome::Deferred);
        }

        let retired = std::mem::replace(slot, Slot::Vacant);
        drop(guard);
        if let Slot::Attached(attached) = retired {
            self.retire(index, attached);
        }
        Ok(DisableOutcome::Detached)
    }

    /// Enabled subsystems in neither `probed` nor `excluded`, with their
    /// clamped minimum probe size.
    pub(crate) fn content_candidates(
        &self,
        probed: &SubsystemSet,
        excluded: &SubsystemSet,
    ) -> Vec<(usize, usize)> {
        let table = self.lock();
        table
            .enabled
            .iter()
            .filter(|index| !probed.contains(*index) && !excluded.contains(*index))
            .filter_map(|index| match &table.slots[index] {
                Slot::Attached(slot) => Some((index, slot.min_probe_bytes)),
                _ => None,
            })
            .collect()
    }

    /// Enabled subsystems that can size frames.
    pub(crate) fn size_candidates(&self) -> Vec<usize> {
        let table = self.lock();
        table
            .enabled
            .iter()
            .filter(|index| {
                matches!(&table.slots[*index], Slot::Attached(slot) if slot.capabilities.size_probe)
            })
            .collect()
    }

    /// Take the attachment of an enabled subsystem for a probe.
    pub(crate) fn checkout_enabled(&self, index: usize) -> Option<Checkout> {
        let mut guard = self.lock();
        let table = &mut *guard;
        if !table.enabled.contains(index) {
            return None;
        }
        Self::take(table, index)
    }

    /// Take the attachment of the dispatch target, even if disable is pending.
    pub(crate) fn checkout_target(&self, index: usize) -> Option<Checkout> {
        let mut guard = self.lock();
        let table = &mut *guard;
        if table.dispatch_target != Some(index) {
            return None;
        }
        Self::take(table, index)
    }

    fn take(table: &mut SlotTable, index: usize) -> Option<Checkout> {
        match table.slots.get_mut(index) {
            Some(Slot::Attached(slot)) => slot.attachment.take().map(|attachment| Checkout {
                index,
                subsystem: Arc::clone(&slot.subsystem),
                attachment,
            }),
            _ => None,
        }
    }

    /// Return a probed attachment. A claim becomes the dispatch target unless
    /// the subsystem was disabled meanwhile; returns whether the claim stands.
    pub(crate) fn checkin_probe(&self, checkout: Checkout, claimed: bool) -> bool {
        let index = checkout.index;
        let mut guard = self.lock();
        let table = &mut *guard;
        let Some(Slot::Attached(slot)) = table.slots.get_mut(index) else {
            drop(guard);
            self.orphan(checkout);
            return false;
        };
        if !slot.detach_pending {
            slot.attachment = Some(checkout.attachment);
            if claimed {
                table.dispatch_target = Some(index);
            }
            return claimed;
        }

        let retired = std::mem::replace(&mut table.slots[index], Slot::Vacant);
        drop(guard);
        self.retire_checked_out(retired, checkout);
        false
    }

    /// Return the dispatch target's attachment. `frame_done` ends the
    /// dispatch and runs any deferred detach.
    pub(crate) fn finish_dispatch(&self, checkout: Checkout, frame_done: bool) {
        let index = checkout.index;
        let mut guard = self.lock();
        let table = &mut *guard;
        if frame_done {
            table.dispatch_target = None;
        }
        let Some(Slot::Attached(slot)) = table.slots.get_mut(index) else {
            drop(guard);
            self.orphan(checkout);
            return;
        };
        if !(frame_done && slot.detach_pending) {
            slot.attachment = Some(checkout.attachment);
            return;
        }

        let retired = std::mem::replace(&mut table.slots[index], Slot::Vacant);
        drop(guard);
        self.retire_checked_out(retired, checkout);
    }

    fn retire_checked_out(&self, retired: Slot, checkout: Checkout) {
        match retired {
            Slot::Attached(mut attached) => {
                attached.attachment = Some(checkout.attachment);
                self.retire(checkout.index, attached);
            }
            _ => self.orphan(checkout),
        }
    }

    fn orphan(&self, checkout: Checkout) {
        error!(
            session = self.id,
            index = checkout.index,
            "checked-out subsystem lost its slot"
        );
        checkout.subsystem.detach(checkout.attachment);
    }

    fn publish(&self, mode: Mode, stats: SessionStats) {
        let mut table = self.lock();
        table.mode = mode;
        table.stats = stats;
    }

    fn enabled(&self) -> Vec<usize> {
        self.lock().enabled.iter().collect()
    }

    fn status(&self) -> SessionStatus {
        let table = self.lock();
        SessionStatus {
            id: self.id,
            transport: self.transport.to_string(),
            enabled: table.enabled.iter().collect(),
            dispatch_target: table.dispatch_target,
            mode: table.mode.to_string(),
            closed: table.closed,
            stats: table.stats,
        }
    }

    /// Detach everything still attached. Runs once.
    fn shutdown(&self) {
        let retired: Vec<(usize, AttachedSlot)> = {
            let mut guard = self.lock();
            let table = &mut *guard;
            if table.closed {
                return;
            }
            table.closed = true;
            table.enabled.clear();
            table.dispatch_target = None;
            let mut retired = Vec::new();
            for (index, slot) in table.slots.iter_mut().enumerate() {
                if matches!(slot, Slot::Attached(_)) {
                    if let Slot::Attached(attached) = std::mem::replace(slot, Slot::Vacant) {
                        retired.push((index, attached));
                    }
                }
            }
            retired
        };

        for (index, attached) in retired {
            self.retire(index, attached);
        }
        debug!(session = self.id, transport = %self.transport, "session closed");
    }

    /// Run detach and drop this session's registry reference.
    fn retire(&self, index: usize, attached: AttachedSlot) {
        let AttachedSlot {
            subsystem,
            attachment,
            ..
        } = attached;
        match attachment {
            Some(attachment) => subsystem.detach(attachment),
            None => error!(
                session = self.id,
                index, "retiring a subsystem whose attachment is checked out"
            ),
        }
        self.registry.release(index);
        info!(
            session = self.id,
            name = subsystem.name(),
            index,
            "subsystem disabled"
        );
    }

    fn lock(&self) -> MutexGuard<'_, SlotTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One connection's demultiplexing state.
///
/// Bytes are fed in with [`deliver`](Self::deliver) from a single thread.
/// Enabling and disabling subsystems may happen concurrently through a
/// [`SessionHandle`]. Dropping the session detaches every subsystem still
/// enabled on it.
pub struct Session {
    shared: Arc<SessionShared>,
    probe: ProbeBuffer,
    rx: Receiver,
}

impl Session {
    pub(crate) fn open(
        id: u64,
        transport: TransportInfo,
        registry: Arc<Registry>,
        config: &HubConfig,
    ) -> Result<Self> {
        let probe = ProbeBuffer::try_with_capacity(config.probe_buffer_capacity)?;
        let rx = Receiver::new(registry.capacity(), config.quiet_period());
        let shared = SessionShared::new(id, transport, registry, probe.capacity());
        debug!(session = id, transport = %shared.transport, capacity = probe.capacity(), "session opened");
        Ok(Self {
            shared: Arc::new(shared),
            probe,
            rx,
        })
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn transport(&self) -> &TransportInfo {
        &self.shared.transport
    }

    /// A cloneable control-plane handle to this session.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Attach the registered subsystem at `index` to this session.
    pub fn enable(&self, index: usize) -> Result<()> {
        self.shared.enable(index)
    }

    /// Detach the subsystem at `index`. A no-op if it is not enabled.
    pub fn disable(&self, index: usize) -> Result<DisableOutcome> {
        self.shared.disable(index)
    }

    /// Indices of enabled subsystems, ascending.
    pub fn enabled(&self) -> Vec<usize> {
        self.shared.enabled()
    }

    /// Feed newly arrived bytes through the receive state machine.
    pub fn deliver(&mut self, bytes: &[u8]) {
        self.deliver_at(bytes, Instant::now());
    }

    /// Like [`deliver`](Self::deliver) with an explicit clock reading.
    ///
    /// An empty `bytes` still evaluates the quiet-period deadline.
    pub fn deliver_at(&mut self, bytes: &[u8], now: Instant) {
        let Session { shared, probe, rx } = self;
        let mut intake = Intake::new(probe, bytes);
        rx.run(&mut intake, shared, now);
        debug_assert!(
            intake.chunk_remaining().is_empty(),
            "delivery returned with unstashed bytes"
        );

        let stats = self.stats();
        self.shared.publish(self.rx.mode(), stats);
    }

    pub fn mode(&self) -> Mode {
        self.rx.mode()
    }

    pub fn stats(&self) -> SessionStats {
        let mut stats = self.rx.stats();
        stats.buffered_bytes = self.probe.len() as u64;
        stats
    }

    /// The probe buffer's current unread lookahead.
    pub fn buffered(&self) -> &[u8] {
        self.probe.unread()
    }

    pub fn status(&self) -> SessionStatus {
        let mut status = self.shared.status();
        status.mode = self.rx.mode().to_string();
        status.stats = self.stats();
        status
    }

    /// Detach every enabled subsystem and release the session.
    pub fn close(self) {
        self.shared.shutdown();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.shared.id)
            .field("transport", &self.shared.transport)
            .field("mode", &self.rx.mode())
            .field("probe", &self.probe)
            .finish()
    }
}

/// Control-plane access to a session from any thread.
///
/// Outlives the session safely: once it is closed, lifecycle calls fail
/// with [`HubError::SessionClosed`].
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<SessionShared>,
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn enable(&self, index: usize) -> Result<()> {
        self.shared.enable(index)
    }

    pub fn disable(&self, index: usize) -> Result<DisableOutcome> {
        self.shared.disable(index)
    }

    pub fn enabled(&self) -> Vec<usize> {
        self.shared.enabled()
    }

    /// Status as of the end of the most recent delivery.
    pub fn status(&self) -> SessionStatus {
        self.shared.status()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.shared.id)
            .finish()
    }
}
