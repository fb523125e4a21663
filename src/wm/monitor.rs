use crate::wm::client::{ClientId, Geometry};

/// Index of a monitor inside the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonitorId(pub(crate) usize);

/// Display output region owning a set of clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Monitor {
    pub id: MonitorId,
    pub geometry: Geometry,

    /// Owned clients, most recently added first. The order only gives
    /// iteration a stable shape; it has no layout meaning.
    pub(crate) clients: Vec<ClientId>,
}

impl Monitor {
    pub(crate) fn new(id: MonitorId) -> Self {
        Self {
            id,
            geometry: Geometry::default(),
            clients: Vec::new(),
        }
    }

    pub fn clients(&self) -> &[ClientId] {
        &self.clients
    }

    /// Update to the reported screen size. Returns false when nothing changed.
    pub fn resize(&mut self, width: i32, height: i32) -> bool {
        if self.geometry.width == width && self.geometry.height == height {
            return false;
        }
        self.geometry.width = width;
        self.geometry.height = height;
        true
    }
}
