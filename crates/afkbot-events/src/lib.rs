/// Core event and packet types for afkbot
///
/// This crate holds the plain data exchanged between the transport, the
/// session workers and the runner, so those crates can depend on it
/// without depending on each other.
mod client_events;
mod outbound_packets;
mod session_events;

pub use client_events::ClientEvent;
pub use outbound_packets::OutboundPacket;
pub use session_events::SessionEvent;

use serde::{Deserialize, Serialize};

// ============================================================================
// Position
// ============================================================================

/// Absolute player position and look as last reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64, yaw: f32, pitch: f32) -> Self {
        Self {
            x,
            y,
            z,
            yaw,
            pitch,
        }
    }

    /// Copy of this position moved along the X axis
    pub fn offset_x(&self, offset: f64) -> Self {
        Self {
            x: self.x + offset,
            ..*self
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({:.2}, {:.2}, {:.2}) yaw={:.1} pitch={:.1}",
            self.x, self.y, self.z, self.yaw, self.pitch
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_x_only_moves_x() {
        let pos = Position::new(10.0, 64.0, 10.0, 90.0, -5.0);
        let moved = pos.offset_x(-0.15);

        assert!((moved.x - 9.85).abs() < 1e-9);
        assert_eq!(moved.y, pos.y);
        assert_eq!(moved.z, pos.z);
        assert_eq!(moved.yaw, pos.yaw);
        assert_eq!(moved.pitch, pos.pitch);
    }
}
