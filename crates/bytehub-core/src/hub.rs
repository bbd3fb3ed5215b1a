use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytehub_transport::TransportInfo;
use tracing::error;

use crate::config::HubConfig;
use crate::error::{HubError, Result};
use crate::registry::Registry;
use crate::session::Session;
use crate::subsystem::Subsystem;

/// Entry point: owns the shared registry and opens sessions against it.
#[derive(Debug)]
pub struct Hub {
    registry: Arc<Registry>,
    config: HubConfig,
    next_session_id: AtomicU64,
}

impl Hub {
    /// Create a hub; configuration values below their floors are raised.
    pub fn new(config: HubConfig) -> Self {
        let config = config.normalized();
        Self {
            registry: Arc::new(Registry::new(config.max_subsystems)),
            config,
            next_session_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Register a subsystem; see [`Registry::register`].
    pub fn register(&self, subsystem: Arc<dyn Subsystem>) -> Result<usize> {
        self.registry.register(subsystem)
    }

    /// Unregister a subsystem; see [`Registry::unregister`].
    pub fn unregister(&self, index: usize) -> Result<Arc<dyn Subsystem>> {
        self.registry.unregister(index)
    }

    /// Open a session for a newly attached transport.
    ///
    /// No subsystem is enabled on the returned session.
    pub fn open(&self, transport: TransportInfo) -> Result<Session> {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        Session::open(id, transport, Arc::clone(&self.registry), &self.config).inspect_err(
            |err: &HubError| error!(session = id, error = %err, "session open failed"),
        )
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receive::Mode;

    #[test]
    fn new_normalizes_config() {
        let hub = Hub::new(HubConfig {
            max_subsystems: 1,
            probe_buffer_capacity: 1,
            quiet_period_ms: 5,
        });
        assert_eq!(hub.config().max_subsystems, 2);
        assert_eq!(hub.registry().capacity(), 2);
        assert_eq!(hub.config().probe_buffer_capacity, 16);
    }

    #[test]
    fn sessions_get_distinct_ids() {
        let hub = Hub::default();
        let a = hub.open(TransportInfo::memory("a")).unwrap();
        let b = hub.open(TransportInfo::memory("b")).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.transport().name, "a");
        assert_eq!(a.mode(), Mode::ProbeContent);
        assert!(a.enabled().is_empty());
    }
}
