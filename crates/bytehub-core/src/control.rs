//! Control-plane commands addressed to a session.
//!
//! Commands carry a fixed numeric id and a binary payload. Enable and
//! disable take the subsystem index as a 4-byte little-endian signed
//! integer.

use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

use crate::error::{HubError, Result};
use crate::session::{DisableOutcome, SessionHandle, SessionStatus};

/// Enable the subsystem whose index is in the payload.
pub const SUBSYS_ENABLE: u32 = 0xFF01;
/// Disable the subsystem whose index is in the payload.
pub const SUBSYS_DISABLE: u32 = 0xFF02;
/// Report the session's status. Takes no payload.
pub const SESSION_STATUS: u32 = 0xFF03;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlCommand {
    pub id: u32,
    pub payload: Bytes,
}

impl ControlCommand {
    pub fn new(id: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }

    pub fn enable(index: i32) -> Self {
        Self::new(SUBSYS_ENABLE, Bytes::copy_from_slice(&index.to_le_bytes()))
    }

    pub fn disable(index: i32) -> Self {
        Self::new(SUBSYS_DISABLE, Bytes::copy_from_slice(&index.to_le_bytes()))
    }

    pub fn status() -> Self {
        Self::new(SESSION_STATUS, Bytes::new())
    }

    /// Decode the payload as a subsystem index.
    pub fn index(&self) -> Result<usize> {
        let raw: [u8; 4] = self.payload[..].try_into().map_err(|_| {
            HubError::InvalidPayload(format!(
                "expected 4-byte index, got {} bytes",
                self.payload.len()
            ))
        })?;
        let index = i32::from_le_bytes(raw);
        usize::try_from(index)
            .map_err(|_| HubError::InvalidPayload(format!("negative subsystem index {index}")))
    }
}

/// Successful outcome of [`execute`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum ControlReply {
    Enabled { index: usize },
    Disabled { index: usize, outcome: DisableOutcome },
    Status(SessionStatus),
}

/// Run one control command against a session.
pub fn execute(handle: &SessionHandle, command: &ControlCommand) -> Result<ControlReply> {
    debug!(session = handle.id(), command = command.id, "control command");
    match command.id {
        SUBSYS_ENABLE => {
            let index = command.index()?;
            handle.enable(index)?;
            Ok(ControlReply::Enabled { index })
        }
        SUBSYS_DISABLE => {
            let index = command.index()?;
            let outcome = handle.disable(index)?;
            Ok(ControlReply::Disabled { index, outcome })
        }
        SESSION_STATUS => Ok(ControlReply::Status(handle.status())),
        other => Err(HubError::UnknownCommand(other)),
    }
}

/// Numeric status for a control reply: 0 on success, the error's code otherwise.
pub fn status_code(result: &Result<ControlReply>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(err) => err.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_payload_is_little_endian() {
        let command = ControlCommand::enable(258);
        assert_eq!(command.payload.as_ref(), &[2, 1, 0, 0]);
        assert_eq!(command.index().unwrap(), 258);
    }

    #[test]
    fn negative_index_is_invalid() {
        let err = ControlCommand::disable(-1).index().unwrap_err();
        assert!(matches!(err, HubError::InvalidPayload(_)));
        assert_eq!(err.code(), -14);
    }

    #[test]
    fn short_payload_is_invalid() {
        let command = ControlCommand::new(SUBSYS_ENABLE, &b"\x01\x00"[..]);
        let err = command.index().unwrap_err();
        assert!(err.to_string().contains("got 2 bytes"));
    }

    #[test]
    fn reply_serializes_with_tag() {
        let reply = ControlReply::Disabled {
            index: 2,
            outcome: DisableOutcome::Deferred,
        };
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "reply": "disabled", "index": 2, "outcome": "deferred" })
        );
    }
}
