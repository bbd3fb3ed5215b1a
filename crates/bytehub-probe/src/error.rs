/// Errors that can occur while sizing a probe buffer.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The requested capacity is below the enforced floor.
    #[error("probe buffer capacity {requested} below minimum {min}")]
    CapacityTooSmall { requested: usize, min: usize },

    /// Backing storage could not be reserved.
    #[error("failed to allocate {capacity}-byte probe buffer")]
    Allocation { capacity: usize },
}

pub type Result<T> = std::result::Result<T, ProbeError>;
