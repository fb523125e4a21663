//! Protocol Session
//!
//! Screen-level state: the root window, its event selection, the grabbed
//! key bindings and the reported screen size.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};
use x11rb::protocol::xproto::{EventMask, Keysym, ModMask, Window};

use crate::wm::registry::Registry;
use crate::x11::{Modifiers, XConn};

/// Root event selection needed to act as the window manager
pub fn root_event_mask() -> EventMask {
    EventMask::SUBSTRUCTURE_REDIRECT
        | EventMask::SUBSTRUCTURE_NOTIFY
        | EventMask::BUTTON_PRESS
        | EventMask::ENTER_WINDOW
        | EventMask::LEAVE_WINDOW
        | EventMask::STRUCTURE_NOTIFY
        | EventMask::PROPERTY_CHANGE
}

/// One grabbed keyboard shortcut
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyBinding {
    pub modifiers: Modifiers,
    pub keysym: Keysym,
}

impl KeyBinding {
    pub fn new(modifiers: Modifiers, keysym: Keysym) -> Self {
        Self { modifiers, keysym }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScreenSize {
    pub width: u16,
    pub height: u16,
}

#[derive(Debug)]
pub struct Session {
    root: Window,
    screen: ScreenSize,
    bindings: Vec<KeyBinding>,
}

impl Session {
    pub fn new(root: Window) -> Self {
        Self {
            root,
            screen: ScreenSize {
                width: 0,
                height: 0,
            },
            bindings: Vec::new(),
        }
    }

    pub fn root(&self) -> Window {
        self.root
    }

    pub fn screen(&self) -> ScreenSize {
        self.screen
    }

    pub fn bindings(&self) -> &[KeyBinding] {
        &self.bindings
    }

    /// Subscribe the root to the structural and input events a window
    /// manager needs. Protocol errors are handled by the dispatcher, which
    /// sees them in the event stream; the round trip here surfaces anything
    /// the selection itself provoked before the first pump.
    pub fn configure_root<C: XConn>(&self, conn: &C) -> Result<()> {
        conn.select_root_input(root_event_mask())
            .context("Failed to become the window manager")?;
        conn.sync()?;
        info!("Registered as window manager on root 0x{:x}", self.root);
        Ok(())
    }

    /// Replace the grabbed key set: ungrab everything, then grab exactly `bindings`.
    pub fn install_key_bindings<C: XConn>(
        &mut self,
        conn: &C,
        bindings: Vec<KeyBinding>,
    ) -> Result<()> {
        conn.ungrab_keys()?;
        for binding in &bindings {
            let keycodes = conn.keycodes_for(binding.keysym);
            if keycodes.is_empty() {
                warn!(
                    "No keycode produces keysym 0x{:x}, binding not grabbed",
                    binding.keysym
                );
                continue;
            }
            for keycode in keycodes {
                debug!(
                    "Grabbing keycode {} (keysym 0x{:x}, mods 0x{:x})",
                    keycode,
                    binding.keysym,
                    binding.modifiers.bits()
                );
                conn.grab_key(keycode, ModMask::from(binding.modifiers))?;
            }
        }
        self.bindings = bindings;
        Ok(())
    }

    /// Re-grab the current binding set, e.g. after the keyboard mapping changed
    pub fn reinstall_key_bindings<C: XConn>(&mut self, conn: &C) -> Result<()> {
        let bindings = std::mem::take(&mut self.bindings);
        self.install_key_bindings(conn, bindings)
    }

    /// Re-read the screen size and push it into the monitor.
    /// Returns true when the monitor geometry changed.
    pub fn refresh_geometry<C: XConn>(&mut self, conn: &C, registry: &mut Registry) -> Result<bool> {
        let (width, height) = conn.screen_size()?;
        self.screen = ScreenSize { width, height };

        let changed = registry
            .monitor_mut()
            .resize(i32::from(width), i32::from(height));
        if changed {
            info!("Screen size: {}x{}", width, height);
        }
        Ok(changed)
    }
}
