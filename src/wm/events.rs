//! Events Module
//!
//! Classifies decoded server events into the notification vocabulary and
//! routes them. While an interactive drag is active, pointer events are
//! redirected into `mouseDrag` notifications until the button is released.

use anyhow::Result;
use tracing::{debug, trace};
use x11rb::protocol::xproto::Window;

use super::WindowManager;
use super::notify::{ButtonPressPayload, DragPayload, EnterPayload, KeyPressPayload, Notification};
use crate::x11::{XConn, XEvent};

impl<C: XConn> WindowManager<C> {
    /// Handle one event
    pub(crate) fn handle_event(&mut self, event: XEvent) -> Result<()> {
        trace!("Event: {}", event.name());

        if self.drag.is_some() {
            match event {
                XEvent::MotionNotify { x, y, state } => return self.on_drag_motion(x, y, state),
                XEvent::ButtonPress { .. } => return Ok(()),
                XEvent::ButtonRelease { .. } => return self.end_drag(),
                _ => {}
            }
        }

        match event {
            XEvent::MapRequest { window } => self.on_map_request(window),
            XEvent::DestroyNotify { window } => self.on_gone(window, true),
            XEvent::UnmapNotify { window } => self.on_gone(window, false),
            XEvent::ButtonPress {
                window,
                x,
                y,
                button,
                state,
            } => self.on_button_press(window, x, y, button, state),
            XEvent::KeyPress {
                x,
                y,
                keycode,
                state,
            } => {
                let keysym = self.conn.keysym_for(keycode);
                debug!("KeyPress: keycode={} keysym=0x{:x} state=0x{:x}", keycode, keysym, state);
                self.emit(Notification::KeyPress(KeyPressPayload {
                    x: i32::from(x),
                    y: i32::from(y),
                    keysym,
                    keycode,
                    modifiers: state,
                }));
                Ok(())
            }
            XEvent::EnterNotify { window } => {
                if let Some(id) = self.registry.find_by_handle(window).map(|c| c.id) {
                    self.emit(Notification::EnterNotify(EnterPayload { id }));
                }
                Ok(())
            }
            XEvent::ConfigureRequest { window, changes } => {
                // acknowledge as asked; policy adjusts through move/resize
                debug!("ConfigureRequest: window=0x{:x} {:?}", window, changes);
                if let Some(id) = self.registry.find_by_handle(window).map(|c| c.id) {
                    if let Some(client) = self.registry.get_mut(id) {
                        client.apply_changes(&changes);
                    }
                }
                self.conn.configure_window(window, &changes)
            }
            XEvent::ConfigureNotify { window, .. } if window == self.session.root() => {
                self.session.refresh_geometry(&self.conn, &mut self.registry)?;
                Ok(())
            }
            XEvent::MappingNotify { keyboard } => {
                if keyboard {
                    self.conn.refresh_keyboard_mapping()?;
                    self.session.reinstall_key_bindings(&self.conn)?;
                }
                Ok(())
            }
            XEvent::FocusIn { window } => {
                // clients keep whatever focus they take; nothing is reasserted
                trace!("FocusIn: window=0x{:x}", window);
                Ok(())
            }
            XEvent::Error(error) => {
                error.check()?;
                Ok(())
            }
            XEvent::ButtonRelease { .. }
            | XEvent::MotionNotify { .. }
            | XEvent::ConfigureNotify { .. }
            | XEvent::Expose { .. }
            | XEvent::PropertyNotify { .. }
            | XEvent::Other => Ok(()),
        }
    }

    fn on_map_request(&mut self, window: Window) -> Result<()> {
        if self.registry.find_by_handle(window).is_some() {
            debug!("MapRequest: 0x{:x} already managed", window);
            return Ok(());
        }
        let Some(attrs) = self.conn.window_attributes(window)? else {
            return Ok(());
        };
        if attrs.override_redirect {
            return Ok(());
        }
        self.manage(window, attrs)?;
        Ok(())
    }

    fn on_gone(&mut self, window: Window, destroyed: bool) -> Result<()> {
        match self.registry.find_by_handle(window).map(|c| c.id) {
            Some(id) => self.unmanage(id, destroyed),
            None => Ok(()),
        }
    }

    fn on_button_press(
        &mut self,
        window: Window,
        x: i16,
        y: i16,
        button: u8,
        state: u16,
    ) -> Result<()> {
        let Some(id) = self.registry.find_by_handle(window).map(|c| c.id) else {
            return Ok(());
        };
        debug!("ButtonPress: id={} button={} state=0x{:x}", id, button, state);
        self.emit(Notification::ButtonPress(ButtonPressPayload {
            id,
            x: i32::from(x),
            y: i32::from(y),
            button,
            state,
        }));

        // a handler that started a drag keeps the press for itself
        if self.drag.is_none() {
            self.conn.replay_pointer()?;
        }
        Ok(())
    }

    fn on_drag_motion(&mut self, x: i16, y: i16, state: u16) -> Result<()> {
        let Some(drag) = self.drag else {
            return Ok(());
        };
        self.emit(Notification::MouseDrag(DragPayload {
            x: i32::from(drag.origin_x),
            y: i32::from(drag.origin_y),
            move_x: i32::from(x),
            move_y: i32::from(y),
            state,
        }));
        Ok(())
    }

    fn end_drag(&mut self) -> Result<()> {
        debug!("drag: released");
        self.drag = None;
        self.conn.ungrab_pointer()?;
        self.conn.flush()
    }
}
