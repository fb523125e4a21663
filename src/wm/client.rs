use serde::Serialize;
use x11rb::protocol::xproto::Window;

use crate::wm::monitor::MonitorId;
use crate::x11::WindowChanges;

/// Window geometry
///
/// All four fields are signed: policy may park windows off-screen, and
/// width/height are passed through from policy untouched until they reach
/// the protocol boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Geometry {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }
}

/// Identifier handed out to policy code for a managed window.
///
/// Ids start at 1, grow strictly and are never reused within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ClientId(pub u32);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A managed top-level window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub id: ClientId,

    /// Geometry last recorded for the window (from the server or from policy)
    pub geometry: Geometry,

    pub border_width: u16,

    /// Server handle, fixed for the lifetime of the client
    pub window: Window,

    /// Owning monitor (non-owning back reference)
    pub monitor: MonitorId,
}

impl Client {
    pub(crate) fn new(
        id: ClientId,
        window: Window,
        monitor: MonitorId,
        geometry: Geometry,
        border_width: u16,
    ) -> Self {
        Self {
            id,
            geometry,
            border_width,
            window,
            monitor,
        }
    }

    /// Record the fields set in `changes`; width/height stay at least 1
    pub(crate) fn apply_changes(&mut self, changes: &WindowChanges) {
        if let Some(x) = changes.x {
            self.geometry.x = x;
        }
        if let Some(y) = changes.y {
            self.geometry.y = y;
        }
        if let Some(width) = changes.width {
            self.geometry.width = width.max(1);
        }
        if let Some(height) = changes.height {
            self.geometry.height = height.max(1);
        }
        if let Some(border_width) = changes.border_width {
            self.border_width = border_width;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_changes_keeps_unset_fields() {
        let mut client = Client::new(ClientId(1), 0x400, MonitorId(0), Geometry::new(1, 2, 30, 40), 1);
        client.apply_changes(&WindowChanges::size(-5, 600));
        assert_eq!(client.geometry, Geometry::new(1, 2, 1, 600));
        assert_eq!(client.border_width, 1);
    }
}
