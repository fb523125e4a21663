//! Client/Monitor Registry
//!
//! Sole owner of client and monitor lifetime. Clients live in an arena keyed
//! by [`ClientId`]; each monitor keeps the ordered list of ids it owns, so
//! removal is an index operation with no back-pointer patching.

use std::collections::HashMap;
use tracing::debug;
use x11rb::protocol::xproto::Window;

use crate::wm::client::{Client, ClientId, Geometry};
use crate::wm::monitor::{Monitor, MonitorId};

#[derive(Debug)]
pub struct Registry {
    clients: HashMap<ClientId, Client>,
    monitors: Vec<Monitor>,
    active: Option<MonitorId>,
    next_id: u32,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
            monitors: Vec::new(),
            active: None,
            next_id: 1,
        }
    }

    /// Active monitor, created on first use
    pub fn ensure_monitor(&mut self) -> MonitorId {
        if let Some(id) = self.active {
            return id;
        }
        let id = MonitorId(self.monitors.len());
        debug!("Registry: creating monitor {:?}", id);
        self.monitors.push(Monitor::new(id));
        self.active = Some(id);
        id
    }

    pub fn monitor(&self) -> Option<&Monitor> {
        self.active.map(|id| &self.monitors[id.0])
    }

    pub fn monitor_mut(&mut self) -> &mut Monitor {
        let id = self.ensure_monitor();
        &mut self.monitors[id.0]
    }

    /// Allocate a client with a fresh id and attach it to `monitor`, newest first.
    pub fn create_client(
        &mut self,
        window: Window,
        monitor: MonitorId,
        geometry: Geometry,
        border_width: u16,
    ) -> ClientId {
        let id = ClientId(self.next_id);
        self.next_id += 1;

        self.monitors[monitor.0].clients.insert(0, id);
        self.clients
            .insert(id, Client::new(id, window, monitor, geometry, border_width));
        debug!("Registry: client {} created for window 0x{:x}", id, window);
        id
    }

    /// Remove a client from its monitor and hand ownership back to the caller.
    ///
    /// The returned value is dropped by the caller once protocol-side cleanup
    /// for the handle is done.
    pub fn detach(&mut self, id: ClientId) -> Option<Client> {
        let client = self.clients.remove(&id)?;
        self.monitors[client.monitor.0].clients.retain(|&c| c != id);
        debug!("Registry: client {} detached", id);
        Some(client)
    }

    pub fn find_by_handle(&self, window: Window) -> Option<&Client> {
        self.iter().find(|c| c.window == window)
    }

    pub fn find_by_id(&self, id: ClientId) -> Option<&Client> {
        self.iter().find(|c| c.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: ClientId) -> Option<&mut Client> {
        self.clients.get_mut(&id)
    }

    /// Clients of the active monitor in monitor order
    pub fn iter(&self) -> impl Iterator<Item = &Client> {
        self.monitor()
            .map(|m| m.clients.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|id| self.clients.get(id))
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geom(x: i32) -> Geometry {
        Geometry::new(x, 0, 100, 50)
    }

    #[test]
    fn test_ids_strictly_increase_and_are_never_reused() {
        let mut registry = Registry::new();
        let mon = registry.ensure_monitor();

        let a = registry.create_client(10, mon, geom(0), 0);
        let b = registry.create_client(11, mon, geom(1), 0);
        assert!(b > a);

        registry.detach(b).unwrap();
        let c = registry.create_client(11, mon, geom(2), 0);
        assert!(c > b);
        assert_eq!(c, ClientId(3));
    }

    #[test]
    fn test_find_after_create_returns_recorded_geometry() {
        let mut registry = Registry::new();
        let mon = registry.ensure_monitor();
        let id = registry.create_client(0x400001, mon, Geometry::new(-20, 5, 300, 200), 2);

        let client = registry.find_by_handle(0x400001).unwrap();
        assert_eq!(client.id, id);
        assert_eq!(client.geometry, Geometry::new(-20, 5, 300, 200));
        assert_eq!(client.border_width, 2);
        assert_eq!(registry.find_by_id(id).unwrap().window, 0x400001);
    }

    #[test]
    fn test_detach_keeps_relative_order_of_others() {
        let mut registry = Registry::new();
        let mon = registry.ensure_monitor();
        let a = registry.create_client(1, mon, geom(0), 0);
        let b = registry.create_client(2, mon, geom(0), 0);
        let c = registry.create_client(3, mon, geom(0), 0);
        let d = registry.create_client(4, mon, geom(0), 0);
        assert_eq!(registry.monitor().unwrap().clients(), &[d, c, b, a]);

        let removed = registry.detach(c).unwrap();
        assert_eq!(removed.window, 3);
        assert!(registry.find_by_handle(3).is_none());
        assert!(registry.find_by_id(c).is_none());
        assert_eq!(registry.monitor().unwrap().clients(), &[d, b, a]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_detach_unknown_is_none() {
        let mut registry = Registry::new();
        assert!(registry.detach(ClientId(42)).is_none());
        assert!(registry.find_by_handle(42).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_monitor_created_once() {
        let mut registry = Registry::new();
        assert!(registry.monitor().is_none());
        let first = registry.ensure_monitor();
        let second = registry.ensure_monitor();
        assert_eq!(first, second);

        assert!(registry.monitor_mut().resize(1920, 1080));
        assert!(!registry.monitor_mut().resize(1920, 1080));
        assert_eq!(registry.monitor().unwrap().geometry.height, 1080);
    }
}
