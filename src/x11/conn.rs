//! x11rb implementation of [`XConn`]

use std::cell::RefCell;
use std::os::unix::io::{AsRawFd, RawFd};

use anyhow::{Context, Result};
use tracing::{debug, info};
use x11rb::connection::Connection;
use x11rb::errors::ReplyError;
use x11rb::protocol::Event;
use x11rb::protocol::xproto::{
    self, Allow, Atom, AtomEnum, ButtonIndex, ChangeWindowAttributesAux, ClientMessageEvent,
    ConfigWindow, ConfigureNotifyEvent, ConfigureRequestEvent, ConfigureWindowAux,
    ConnectionExt as _, Cursor, EventMask, GrabMode, GrabStatus, InputFocus, Keycode, Keysym,
    Mapping, ModMask, Window,
};
use x11rb::rust_connection::RustConnection;
use x11rb::{CURRENT_TIME, NONE};

use super::errors::{BAD_DRAWABLE, BAD_WINDOW};
use super::{FatalError, MapState, ProtocolError, WindowAttributes, WindowChanges, XConn, XEvent};
use crate::wm::client::Geometry;

/// AnyKey for UngrabKey
const ANY_KEY: Keycode = 0;

/// "fleur" glyph in the core cursor font
const XC_FLEUR: u16 = 52;

struct Atoms {
    wm_protocols: Atom,
    wm_take_focus: Atom,
}

impl Atoms {
    fn intern(conn: &RustConnection) -> Result<Self> {
        let protocols = conn.intern_atom(false, b"WM_PROTOCOLS")?;
        let take_focus = conn.intern_atom(false, b"WM_TAKE_FOCUS")?;
        Ok(Self {
            wm_protocols: protocols.reply().context("Failed to intern WM_PROTOCOLS")?.atom,
            wm_take_focus: take_focus.reply().context("Failed to intern WM_TAKE_FOCUS")?.atom,
        })
    }
}

/// Cached keycode -> keysym table
#[derive(Debug, Default)]
struct KeyboardMapping {
    min_keycode: Keycode,
    keysyms_per_keycode: usize,
    keysyms: Vec<Keysym>,
}

impl KeyboardMapping {
    fn fetch(conn: &RustConnection) -> Result<Self> {
        let setup = conn.setup();
        let min_keycode = setup.min_keycode;
        let max_keycode = setup.max_keycode;

        let reply = conn
            .get_keyboard_mapping(min_keycode, max_keycode - min_keycode + 1)?
            .reply()
            .context("Failed to read keyboard mapping")?;

        Ok(Self {
            min_keycode,
            keysyms_per_keycode: reply.keysyms_per_keycode as usize,
            keysyms: reply.keysyms,
        })
    }

    fn keysym(&self, keycode: Keycode) -> Keysym {
        if self.keysyms_per_keycode == 0 || keycode < self.min_keycode {
            return 0;
        }
        let idx = (keycode - self.min_keycode) as usize * self.keysyms_per_keycode;
        self.keysyms.get(idx).copied().unwrap_or(0)
    }

    fn keycodes(&self, keysym: Keysym) -> Vec<Keycode> {
        if self.keysyms_per_keycode == 0 {
            return Vec::new();
        }
        self.keysyms
            .chunks(self.keysyms_per_keycode)
            .enumerate()
            .filter(|(_, syms)| syms.contains(&keysym))
            .filter_map(|(i, _)| {
                u8::try_from(i)
                    .ok()
                    .and_then(|i| self.min_keycode.checked_add(i))
            })
            .collect()
    }
}

/// Live connection to the X server
pub struct X11Conn {
    conn: RustConnection,
    root: Window,
    atoms: Atoms,
    keymap: RefCell<KeyboardMapping>,
    drag_cursor: Cursor,
}

impl X11Conn {
    /// Open the display named by `display` (or `$DISPLAY`).
    ///
    /// An unreachable server is reported as [`FatalError::Connect`].
    pub fn connect(display: Option<&str>) -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(display).map_err(|e| FatalError::Connect {
            display: display
                .map(str::to_owned)
                .or_else(|| std::env::var("DISPLAY").ok())
                .unwrap_or_default(),
            reason: e.to_string(),
        })?;

        let root = conn.setup().roots[screen_num].root;
        info!("Connected to X server, screen {}, root window 0x{:x}", screen_num, root);

        let atoms = Atoms::intern(&conn)?;
        let keymap = KeyboardMapping::fetch(&conn)?;
        let drag_cursor = Self::create_drag_cursor(&conn)?;

        Ok(Self {
            conn,
            root,
            atoms,
            keymap: RefCell::new(keymap),
            drag_cursor,
        })
    }

    fn create_drag_cursor(conn: &RustConnection) -> Result<Cursor> {
        let font = conn.generate_id()?;
        conn.open_font(font, b"cursor")?;
        let cursor = conn.generate_id()?;
        conn.create_glyph_cursor(
            cursor,
            font,
            font,
            XC_FLEUR,
            XC_FLEUR + 1,
            0,
            0,
            0,
            0xffff,
            0xffff,
            0xffff,
        )?;
        conn.close_font(font)?;
        Ok(cursor)
    }
}

impl AsRawFd for X11Conn {
    fn as_raw_fd(&self) -> RawFd {
        self.conn.stream().as_raw_fd()
    }
}

/// Error codes a query gets back when its window no longer exists
fn is_vanished_code(code: u8) -> bool {
    code == BAD_WINDOW || code == BAD_DRAWABLE
}

/// Fold a BadWindow/BadDrawable reply into "the window is gone". Any other
/// error reply is fatal.
fn vanished<T>(result: std::result::Result<T, ReplyError>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ReplyError::X11Error(e)) if is_vanished_code(e.error_code) => {
            debug!(
                "X11 reply error treated as vanished window: request_code={}, error_code={}",
                e.major_opcode, e.error_code
            );
            Ok(None)
        }
        Err(ReplyError::X11Error(e)) => Err(anyhow::Error::new(FatalError::Protocol {
            request: e.major_opcode,
            code: e.error_code,
        })),
        Err(ReplyError::ConnectionError(e)) => {
            Err(anyhow::Error::new(e).context(FatalError::ConnectionLost))
        }
    }
}

fn coord(v: i32) -> i16 {
    v.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

fn extent(v: i32) -> u16 {
    v.clamp(1, i32::from(u16::MAX)) as u16
}

fn requested_changes(e: &ConfigureRequestEvent) -> WindowChanges {
    let mask = u16::from(e.value_mask);
    let has = |flag: ConfigWindow| mask & u16::from(flag) != 0;
    WindowChanges {
        x: has(ConfigWindow::X).then_some(i32::from(e.x)),
        y: has(ConfigWindow::Y).then_some(i32::from(e.y)),
        width: has(ConfigWindow::WIDTH).then_some(i32::from(e.width)),
        height: has(ConfigWindow::HEIGHT).then_some(i32::from(e.height)),
        border_width: has(ConfigWindow::BORDER_WIDTH).then_some(e.border_width),
    }
}

fn decode(event: Event) -> XEvent {
    match event {
        Event::MapRequest(e) => XEvent::MapRequest { window: e.window },
        Event::DestroyNotify(e) => XEvent::DestroyNotify { window: e.window },
        Event::UnmapNotify(e) => XEvent::UnmapNotify { window: e.window },
        Event::ButtonPress(e) => XEvent::ButtonPress {
            window: e.event,
            x: e.event_x,
            y: e.event_y,
            button: e.detail,
            state: u16::from(e.state),
        },
        Event::ButtonRelease(e) => XEvent::ButtonRelease {
            window: e.event,
            button: e.detail,
        },
        // Only seen under the drag grab, which is held on the root
        Event::MotionNotify(e) => XEvent::MotionNotify {
            x: e.root_x,
            y: e.root_y,
            state: u16::from(e.state),
        },
        Event::KeyPress(e) => XEvent::KeyPress {
            x: e.event_x,
            y: e.event_y,
            keycode: e.detail,
            state: u16::from(e.state),
        },
        Event::EnterNotify(e) => XEvent::EnterNotify { window: e.event },
        Event::ConfigureRequest(e) => XEvent::ConfigureRequest {
            window: e.window,
            changes: requested_changes(&e),
        },
        Event::ConfigureNotify(e) => XEvent::ConfigureNotify {
            window: e.window,
            width: e.width,
            height: e.height,
        },
        Event::Expose(e) => XEvent::Expose { window: e.window },
        Event::PropertyNotify(e) => XEvent::PropertyNotify { window: e.window },
        Event::MappingNotify(e) => XEvent::MappingNotify {
            keyboard: e.request == Mapping::KEYBOARD,
        },
        Event::FocusIn(e) => XEvent::FocusIn { window: e.event },
        Event::Error(e) => XEvent::Error(ProtocolError {
            request: e.major_opcode,
            code: e.error_code,
            bad_value: e.bad_value,
        }),
        _ => XEvent::Other,
    }
}

impl XConn for X11Conn {
    fn root(&self) -> Window {
        self.root
    }

    fn screen_size(&self) -> Result<(u16, u16)> {
        let geom = self
            .conn
            .get_geometry(self.root)?
            .reply()
            .context("Failed to read root window geometry")?;
        Ok((geom.width, geom.height))
    }

    fn select_root_input(&self, mask: EventMask) -> Result<()> {
        self.conn
            .change_window_attributes(self.root, &ChangeWindowAttributesAux::new().event_mask(mask))?
            .check()
            .context("Failed to select events on root window - is another window manager running?")?;
        Ok(())
    }

    fn select_input(&self, window: Window, mask: EventMask) -> Result<()> {
        self.conn
            .change_window_attributes(window, &ChangeWindowAttributesAux::new().event_mask(mask))?;
        Ok(())
    }

    fn window_attributes(&self, window: Window) -> Result<Option<WindowAttributes>> {
        let attrs = self.conn.get_window_attributes(window)?;
        let geom = self.conn.get_geometry(window)?;

        let Some(attrs) = vanished(attrs.reply())? else {
            return Ok(None);
        };
        let Some(geom) = vanished(geom.reply())? else {
            return Ok(None);
        };

        let map_state = if attrs.map_state == xproto::MapState::VIEWABLE {
            MapState::Viewable
        } else if attrs.map_state == xproto::MapState::UNVIEWABLE {
            MapState::Unviewable
        } else {
            MapState::Unmapped
        };

        Ok(Some(WindowAttributes {
            geometry: Geometry::new(
                i32::from(geom.x),
                i32::from(geom.y),
                i32::from(geom.width),
                i32::from(geom.height),
            ),
            border_width: geom.border_width,
            override_redirect: attrs.override_redirect,
            map_state,
        }))
    }

    fn transient_for(&self, window: Window) -> Result<Option<Window>> {
        let cookie = self.conn.get_property(
            false,
            window,
            AtomEnum::WM_TRANSIENT_FOR,
            AtomEnum::WINDOW,
            0,
            1,
        )?;
        let Some(reply) = vanished(cookie.reply())? else {
            return Ok(None);
        };
        let parent = reply.value32().and_then(|mut v| v.next());
        Ok(parent.filter(|&w| w != NONE))
    }

    fn top_level_windows(&self) -> Result<Vec<Window>> {
        let tree = self
            .conn
            .query_tree(self.root)?
            .reply()
            .context("Failed to query root window tree")?;
        Ok(tree.children)
    }

    fn configure_window(&self, window: Window, changes: &WindowChanges) -> Result<()> {
        let mut aux = ConfigureWindowAux::new();
        if let Some(x) = changes.x {
            aux = aux.x(x);
        }
        if let Some(y) = changes.y {
            aux = aux.y(y);
        }
        if let Some(width) = changes.width {
            aux = aux.width(u32::from(extent(width)));
        }
        if let Some(height) = changes.height {
            aux = aux.height(u32::from(extent(height)));
        }
        if let Some(border_width) = changes.border_width {
            aux = aux.border_width(u32::from(border_width));
        }
        self.conn.configure_window(window, &aux)?;
        Ok(())
    }

    fn send_configure_notify(
        &self,
        window: Window,
        geometry: Geometry,
        border_width: u16,
    ) -> Result<()> {
        let event = ConfigureNotifyEvent {
            response_type: xproto::CONFIGURE_NOTIFY_EVENT,
            sequence: 0,
            event: window,
            window,
            above_sibling: NONE,
            x: coord(geometry.x),
            y: coord(geometry.y),
            width: extent(geometry.width),
            height: extent(geometry.height),
            border_width,
            override_redirect: false,
        };
        self.conn
            .send_event(false, window, EventMask::STRUCTURE_NOTIFY, event)?;
        Ok(())
    }

    fn map_window(&self, window: Window) -> Result<()> {
        self.conn.map_window(window)?;
        Ok(())
    }

    fn grab_button(&self, window: Window, button: ButtonIndex, modifiers: ModMask) -> Result<()> {
        self.conn.grab_button(
            false,
            window,
            EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE,
            GrabMode::SYNC,
            GrabMode::ASYNC,
            NONE,
            NONE,
            button,
            modifiers,
        )?;
        Ok(())
    }

    fn ungrab_buttons(&self, window: Window) -> Result<()> {
        self.conn
            .ungrab_button(ButtonIndex::ANY, window, ModMask::ANY)?;
        Ok(())
    }

    fn grab_key(&self, keycode: Keycode, modifiers: ModMask) -> Result<()> {
        self.conn.grab_key(
            true,
            self.root,
            modifiers,
            keycode,
            GrabMode::ASYNC,
            GrabMode::ASYNC,
        )?;
        Ok(())
    }

    fn ungrab_keys(&self) -> Result<()> {
        self.conn.ungrab_key(ANY_KEY, self.root, ModMask::ANY)?;
        Ok(())
    }

    fn keycodes_for(&self, keysym: Keysym) -> Vec<Keycode> {
        self.keymap.borrow().keycodes(keysym)
    }

    fn keysym_for(&self, keycode: Keycode) -> Keysym {
        self.keymap.borrow().keysym(keycode)
    }

    fn refresh_keyboard_mapping(&self) -> Result<()> {
        let fresh = KeyboardMapping::fetch(&self.conn)?;
        *self.keymap.borrow_mut() = fresh;
        debug!("Keyboard mapping refreshed");
        Ok(())
    }

    fn set_input_focus(&self, window: Window) -> Result<()> {
        self.conn
            .set_input_focus(InputFocus::POINTER_ROOT, window, CURRENT_TIME)?;
        Ok(())
    }

    fn supports_take_focus(&self, window: Window) -> Result<bool> {
        let cookie = self.conn.get_property(
            false,
            window,
            self.atoms.wm_protocols,
            AtomEnum::ATOM,
            0,
            64,
        )?;
        let Some(reply) = vanished(cookie.reply())? else {
            return Ok(false);
        };
        let take_focus = self.atoms.wm_take_focus;
        Ok(reply
            .value32()
            .is_some_and(|mut protocols| protocols.any(|atom| atom == take_focus)))
    }

    fn send_take_focus(&self, window: Window) -> Result<()> {
        let event = ClientMessageEvent::new(
            32,
            window,
            self.atoms.wm_protocols,
            [self.atoms.wm_take_focus, CURRENT_TIME, 0, 0, 0],
        );
        self.conn
            .send_event(false, window, EventMask::NO_EVENT, event)?;
        Ok(())
    }

    fn replay_pointer(&self) -> Result<()> {
        self.conn.allow_events(Allow::REPLAY_POINTER, CURRENT_TIME)?;
        Ok(())
    }

    fn grab_server(&self) -> Result<()> {
        self.conn.grab_server()?;
        Ok(())
    }

    fn ungrab_server(&self) -> Result<()> {
        self.conn.ungrab_server()?;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.conn
            .get_input_focus()?
            .reply()
            .context("X11 round trip failed")?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Connection::flush(&self.conn)?;
        Ok(())
    }

    fn grab_pointer(&self) -> Result<bool> {
        let reply = self
            .conn
            .grab_pointer(
                false,
                self.root,
                EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE | EventMask::POINTER_MOTION,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                NONE,
                self.drag_cursor,
                CURRENT_TIME,
            )?
            .reply()
            .context("GrabPointer failed")?;
        Ok(reply.status == GrabStatus::SUCCESS)
    }

    fn ungrab_pointer(&self) -> Result<()> {
        self.conn.ungrab_pointer(CURRENT_TIME)?;
        Ok(())
    }

    fn query_pointer(&self) -> Result<Option<(i16, i16)>> {
        let reply = vanished(self.conn.query_pointer(self.root)?.reply())?;
        Ok(reply
            .filter(|r| r.same_screen)
            .map(|r| (r.root_x, r.root_y)))
    }

    fn poll_event(&self) -> Result<Option<XEvent>> {
        match self.conn.poll_for_event() {
            Ok(event) => Ok(event.map(decode)),
            Err(e) => Err(anyhow::Error::new(e).context(FatalError::ConnectionLost)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x11::errors::BAD_VALUE;
    use x11rb::protocol::ErrorKind;
    use x11rb::x11_utils::X11Error;

    fn error_reply(error_kind: ErrorKind, error_code: u8) -> ReplyError {
        ReplyError::X11Error(X11Error {
            error_kind,
            error_code,
            sequence: 1,
            bad_value: 0x400,
            minor_opcode: 0,
            major_opcode: 14,
            extension_name: None,
            request_name: None,
        })
    }

    #[test]
    fn test_missing_window_reply_is_vanished() {
        let gone: std::result::Result<u32, ReplyError> = Err(error_reply(ErrorKind::Window, BAD_WINDOW));
        assert_eq!(vanished(gone).unwrap(), None);
        let gone: std::result::Result<u32, ReplyError> =
            Err(error_reply(ErrorKind::Drawable, BAD_DRAWABLE));
        assert_eq!(vanished(gone).unwrap(), None);
        assert_eq!(vanished::<u32>(Ok(7)).unwrap(), Some(7));
    }

    #[test]
    fn test_other_error_reply_is_fatal() {
        let result: std::result::Result<u32, ReplyError> = Err(error_reply(ErrorKind::Value, BAD_VALUE));
        let err = vanished(result).unwrap_err();
        match err.downcast_ref::<FatalError>() {
            Some(FatalError::Protocol { request, code }) => {
                assert_eq!(*request, 14);
                assert_eq!(*code, BAD_VALUE);
            }
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    fn mapping() -> KeyboardMapping {
        // keycodes 8..=11, two columns each
        KeyboardMapping {
            min_keycode: 8,
            keysyms_per_keycode: 2,
            keysyms: vec![0x61, 0x41, 0xff0d, 0, 0x31, 0x21, 0x61, 0x41],
        }
    }

    #[test]
    fn test_keysym_uses_first_column() {
        let map = mapping();
        assert_eq!(map.keysym(8), 0x61);
        assert_eq!(map.keysym(9), 0xff0d);
        assert_eq!(map.keysym(7), 0);
        assert_eq!(map.keysym(200), 0);
    }

    #[test]
    fn test_keycodes_cover_every_column() {
        let map = mapping();
        assert_eq!(map.keycodes(0x61), vec![8, 11]);
        assert_eq!(map.keycodes(0x21), vec![10]);
        assert!(map.keycodes(0xffff).is_empty());
        assert!(KeyboardMapping::default().keycodes(0x61).is_empty());
    }

    #[test]
    fn test_protocol_values_are_clamped() {
        assert_eq!(coord(-40_000), i16::MIN);
        assert_eq!(coord(-12), -12);
        assert_eq!(extent(0), 1);
        assert_eq!(extent(-5), 1);
        assert_eq!(extent(100_000), u16::MAX);
    }
}
