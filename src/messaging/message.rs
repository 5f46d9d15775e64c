//! Notification wire format
//!
//! ```text
//! +-------+---------+--------+------------+-------------+---------+
//! | "MF"  | version | opcode | origin u32 | payload len | payload |
//! | 2     | 1       | 1      | 4 (LE)     | 1           | <= 240  |
//! +-------+---------+--------+------------+-------------+---------+
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{channel, opcodes};
use crate::error::{FarmError, Result};
use crate::state_machine::ServiceStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Opcode {
    StartPending,
    StartComplete,
    StopPending,
    StopComplete,
    Error,
    ConfigurationChanged,
}

impl Opcode {
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::StartPending => opcodes::START_PENDING,
            Self::StartComplete => opcodes::START_COMPLETE,
            Self::StopPending => opcodes::STOP_PENDING,
            Self::StopComplete => opcodes::STOP_COMPLETE,
            Self::Error => opcodes::ERROR,
            Self::ConfigurationChanged => opcodes::CONFIGURATION_CHANGED,
        }
    }

    /// Service status a receiver moves to, `None` for configuration opcodes
    pub fn service_status(&self) -> Option<ServiceStatus> {
        match self {
            Self::StartPending | Self::StopPending => Some(ServiceStatus::Pending),
            Self::StartComplete => Some(ServiceStatus::Running),
            Self::StopComplete => Some(ServiceStatus::Stopped),
            Self::Error => Some(ServiceStatus::InError),
            Self::ConfigurationChanged => None,
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = FarmError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            opcodes::START_PENDING => Ok(Opcode::StartPending),
            opcodes::START_COMPLETE => Ok(Opcode::StartComplete),
            opcodes::STOP_PENDING => Ok(Opcode::StopPending),
            opcodes::STOP_COMPLETE => Ok(Opcode::StopComplete),
            opcodes::ERROR => Ok(Opcode::Error),
            opcodes::CONFIGURATION_CHANGED => Ok(Opcode::ConfigurationChanged),
            other => Err(FarmError::messaging(format!("unknown opcode 0x{other:02x}"))),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartPending => write!(f, "start_pending"),
            Self::StartComplete => write!(f, "start_complete"),
            Self::StopPending => write!(f, "stop_pending"),
            Self::StopComplete => write!(f, "stop_complete"),
            Self::Error => write!(f, "error"),
            Self::ConfigurationChanged => write!(f, "configuration_changed"),
        }
    }
}

/// One best-effort notification, conventionally carrying a node identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub opcode: Opcode,
    /// Sender instance, so a process can ignore its own broadcasts
    pub origin: u32,
    pub payload: String,
}

impl NotificationMessage {
    pub fn new(opcode: Opcode, origin: u32, payload: impl Into<String>) -> Self {
        Self {
            opcode,
            origin,
            payload: payload.into(),
        }
    }

    /// Encode a frame, truncating the payload on a character boundary
    pub fn encode(&self, max_payload: usize) -> Vec<u8> {
        let limit = max_payload.min(channel::MAX_PAYLOAD_BYTES);
        let mut end = self.payload.len().min(limit);
        while !self.payload.is_char_boundary(end) {
            end -= 1;
        }
        let payload = &self.payload.as_bytes()[..end];

        let mut frame = Vec::with_capacity(channel::HEADER_LEN + payload.len());
        frame.extend_from_slice(&channel::MAGIC);
        frame.push(channel::VERSION);
        frame.push(self.opcode.as_u8());
        frame.extend_from_slice(&self.origin.to_le_bytes());
        frame.push(payload.len() as u8);
        frame.extend_from_slice(payload);
        frame
    }

    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() < channel::HEADER_LEN {
            return Err(FarmError::messaging(format!(
                "frame of {} bytes is shorter than the {} byte header",
                frame.len(),
                channel::HEADER_LEN
            )));
        }
        if frame[..2] != channel::MAGIC {
            return Err(FarmError::messaging("frame magic mismatch"));
        }
        if frame[2] != channel::VERSION {
            return Err(FarmError::messaging(format!(
                "unsupported frame version {}",
                frame[2]
            )));
        }

        let opcode = Opcode::try_from(frame[3])?;
        let origin = u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);
        let declared = frame[8] as usize;
        let payload = &frame[channel::HEADER_LEN..];
        if payload.len() != declared {
            return Err(FarmError::messaging(format!(
                "payload length {} does not match declared {declared}",
                payload.len()
            )));
        }
        let payload = std::str::from_utf8(payload)
            .map_err(|e| FarmError::messaging(format!("payload is not UTF-8: {e}")))?;

        Ok(Self::new(opcode, origin, payload))
    }
}
