use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{error, info};

use crate::error::{BusyReason, HubError, Result};
use crate::subsystem::{Capabilities, Subsystem};

struct Entry {
    subsystem: Arc<dyn Subsystem>,
    enabled_refcount: usize,
    enable_in_progress: bool,
}

/// Snapshot of one registry slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubsystemInfo {
    pub index: usize,
    pub name: String,
    pub min_probe_bytes: usize,
    pub size_probe: bool,
    pub enabled_refcount: usize,
    pub enable_in_progress: bool,
}

/// Fixed-capacity table of registered subsystems, shared by all sessions.
///
/// The table lock is held only for bookkeeping. Subsystem callbacks are
/// never invoked while it is held.
pub struct Registry {
    slots: Mutex<Vec<Option<Entry>>>,
    capacity: usize,
}

impl Registry {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Mutex::new((0..capacity).map(|_| None).collect()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Place `subsystem` in the lowest free slot and return its index.
    pub fn register(&self, subsystem: Arc<dyn Subsystem>) -> Result<usize> {
        let mut slots = self.lock();
        let Some(index) = slots.iter().position(Option::is_none) else {
            return Err(HubError::CapacityExceeded {
                capacity: self.capacity,
            });
        };
        let name = subsystem.name().to_string();
        slots[index] = Some(Entry {
            subsystem,
            enabled_refcount: 0,
            enable_in_progress: false,
        });
        drop(slots);

        info!(%name, index, "registered subsystem");
        Ok(index)
    }

    /// Remove the subsystem at `index` and hand it back.
    ///
    /// Fails without side effects while any session has it enabled.
    pub fn unregister(&self, index: usize) -> Result<Arc<dyn Subsystem>> {
        let mut slots = self.lock();
        let entry = slots
            .get(index)
            .and_then(Option::as_ref)
            .ok_or(HubError::NotFound(index))?;
        if entry.enable_in_progress {
            return Err(HubError::Busy {
                index,
                reason: BusyReason::EnableInProgress,
            });
        }
        if entry.enabled_refcount != 0 {
            return Err(HubError::Busy {
                index,
                reason: BusyReason::Referenced {
                    refcount: entry.enabled_refcount,
                },
            });
        }
        let entry = slots[index].take().ok_or(HubError::NotFound(index))?;
        drop(slots);

        info!(name = entry.subsystem.name(), index, "unregistered subsystem");
        Ok(entry.subsystem)
    }

    /// Snapshot of the slot at `index`, if occupied.
    pub fn info(&self, index: usize) -> Option<SubsystemInfo> {
        let slots = self.lock();
        slots
            .get(index)
            .and_then(Option::as_ref)
            .map(|entry| Self::describe(index, entry))
    }

    /// Snapshots of every occupied slot, by index.
    pub fn list(&self) -> Vec<SubsystemInfo> {
        let slots = self.lock();
        slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|entry| Self::describe(index, entry)))
            .collect()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.lock().iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First half of an enable: pin the subsystem and mark it in progress.
    ///
    /// The caller runs attach without any lock held and then reports the
    /// outcome through [`finish_enable`](Self::finish_enable).
    pub(crate) fn begin_enable(&self, index: usize) -> Result<Arc<dyn Subsystem>> {
        let mut slots = self.lock();
        let entry = slots
            .get_mut(index)
            .and_then(Option::as_mut)
            .ok_or(HubError::NotFound(index))?;
        if entry.enable_in_progress {
            return Err(HubError::Busy {
                index,
                reason: BusyReason::EnableInProgress,
            });
        }
        entry.enable_in_progress = true;
        entry.enabled_refcount += 1;
        Ok(Arc::clone(&entry.subsystem))
    }

    /// Second half of an enable. A failed attach gives the reference back.
    pub(crate) fn finish_enable(&self, index: usize, attached: bool) {
        let mut slots = self.lock();
        match slots.get_mut(index).and_then(Option::as_mut) {
            Some(entry) => {
                entry.enable_in_progress = false;
                if !attached {
                    entry.enabled_refcount = entry.enabled_refcount.saturating_sub(1);
                }
            }
            None => error!(index, "enable finished for a vacant registry slot"),
        }
    }

    /// Drop one session's reference after its detach has run.
    pub(crate) fn release(&self, index: usize) {
        let mut slots = self.lock();
        match slots.get_mut(index).and_then(Option::as_mut) {
            Some(entry) if entry.enabled_refcount > 0 => entry.enabled_refcount -= 1,
            Some(entry) => error!(
                name = entry.subsystem.name(),
                index, "subsystem released more often than enabled"
            ),
            None => error!(index, "release of a vacant registry slot"),
        }
    }

    fn describe(index: usize, entry: &Entry) -> SubsystemInfo {
        let Capabilities { size_probe } = entry.subsystem.capabilities();
        SubsystemInfo {
            index,
            name: entry.subsystem.name().to_string(),
            min_probe_bytes: entry.subsystem.min_probe_bytes(),
            size_probe,
            enabled_refcount: entry.enabled_refcount,
            enable_in_progress: entry.enable_in_progress,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Option<Entry>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("capacity", &self.capacity)
            .field("registered", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystem::{Attachment, Consumed, SessionContext, SubsystemError};

    struct Named(&'static str);

    struct Nothing;

    impl Attachment for Nothing {
        fn probe_content(&mut self, _head: &[u8]) -> bool {
            false
        }

        fn consume(&mut self, bytes: &[u8]) -> Consumed {
            Consumed::Complete(bytes.len())
        }
    }

    impl Subsystem for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn min_probe_bytes(&self) -> usize {
            4
        }

        fn attach(
            &self,
            _ctx: &SessionContext<'_>,
        ) -> std::result::Result<Box<dyn Attachment>, SubsystemError> {
            Ok(Box::new(Nothing))
        }
    }

    fn named(name: &'static str) -> Arc<dyn Subsystem> {
        Arc::new(Named(name))
    }

    #[test]
    fn register_fills_lowest_free_slot() {
        let registry = Registry::new(3);
        assert_eq!(registry.register(named("a")).unwrap(), 0);
        assert_eq!(registry.register(named("b")).unwrap(), 1);
        assert_eq!(registry.register(named("c")).unwrap(), 2);

        registry.unregister(1).unwrap();
        assert_eq!(registry.register(named("d")).unwrap(), 1);
        assert_eq!(registry.info(1).unwrap().name, "d");
    }

    #[test]
    fn register_reports_capacity_exceeded() {
        let registry = Registry::new(2);
        registry.register(named("a")).unwrap();
        registry.register(named("b")).unwrap();
        let err = registry.register(named("c")).unwrap_err();
        assert!(matches!(err, HubError::CapacityExceeded { capacity: 2 }));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn unregister_empty_or_out_of_range_is_not_found() {
        let registry = Registry::new(2);
        assert!(matches!(registry.unregister(0), Err(HubError::NotFound(0))));
        assert!(matches!(registry.unregister(9), Err(HubError::NotFound(9))));
    }

    #[test]
    fn unregister_refuses_referenced_subsystem() {
        let registry = Registry::new(2);
        let index = registry.register(named("a")).unwrap();
        registry.begin_enable(index).unwrap();
        registry.finish_enable(index, true);

        let err = registry.unregister(index).unwrap_err();
        assert!(matches!(
            err,
            HubError::Busy {
                reason: BusyReason::Referenced { refcount: 1 },
                ..
            }
        ));
        let info = registry.info(index).unwrap();
        assert_eq!(info.enabled_refcount, 1);

        registry.release(index);
        assert!(registry.unregister(index).is_ok());
        assert!(registry.is_empty());
    }

    #[test]
    fn concurrent_enable_is_busy_until_finished() {
        let registry = Registry::new(2);
        let index = registry.register(named("a")).unwrap();
        registry.begin_enable(index).unwrap();

        let err = registry.begin_enable(index).unwrap_err();
        assert!(err.is_retryable());
        assert!(registry.info(index).unwrap().enable_in_progress);

        registry.finish_enable(index, false);
        let info = registry.info(index).unwrap();
        assert!(!info.enable_in_progress);
        assert_eq!(info.enabled_refcount, 0, "failed attach rolls back the reference");
    }

    #[test]
    fn list_describes_occupied_slots() {
        let registry = Registry::new(4);
        registry.register(named("a")).unwrap();
        registry.register(named("b")).unwrap();
        registry.unregister(0).unwrap();

        let list = registry.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].index, 1);
        assert_eq!(list[0].min_probe_bytes, 4);
        assert!(!list[0].size_probe);
    }
}
