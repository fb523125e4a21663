//! X11 protocol seam
//!
//! Everything the window manager core asks of the X server goes through the
//! [`XConn`] trait, so the core can be driven by a real connection
//! ([`X11Conn`]) or by a recording fake in tests. Events are decoded into
//! [`XEvent`], which only carries the fields the core reads.

pub mod conn;
pub mod errors;
#[cfg(test)]
pub mod mock;

use anyhow::Result;
use bitflags::bitflags;
use x11rb::protocol::xproto::{ButtonIndex, EventMask, Keycode, Keysym, ModMask, Window};

use crate::wm::client::Geometry;

pub use conn::X11Conn;
pub use errors::{ErrorDisposition, FatalError, ProtocolError};

bitflags! {
    /// Core protocol modifier bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Modifiers: u16 {
        const SHIFT = 1 << 0;
        const LOCK = 1 << 1;
        const CONTROL = 1 << 2;
        const MOD1 = 1 << 3;
        const MOD2 = 1 << 4;
        const MOD3 = 1 << 5;
        const MOD4 = 1 << 6;
        const MOD5 = 1 << 7;
    }
}

impl Modifiers {
    /// Parse a modifier name as written in the configuration file.
    /// Case-insensitive and accepts the alt/super/ctrl aliases, unlike the
    /// generated `from_name`, which only knows the flag identifiers.
    pub fn from_config_name(name: &str) -> Option<Self> {
        let flag = match name.to_ascii_lowercase().as_str() {
            "shift" => Self::SHIFT,
            "lock" => Self::LOCK,
            "control" | "ctrl" => Self::CONTROL,
            "mod1" | "alt" => Self::MOD1,
            "mod2" => Self::MOD2,
            "mod3" => Self::MOD3,
            "mod4" | "super" => Self::MOD4,
            "mod5" => Self::MOD5,
            _ => return None,
        };
        Some(flag)
    }
}

impl From<Modifiers> for ModMask {
    fn from(mods: Modifiers) -> Self {
        ModMask::from(mods.bits())
    }
}

/// Window map state as reported by GetWindowAttributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapState {
    Unmapped,
    Unviewable,
    Viewable,
}

/// Attributes and geometry of a window, read in one round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowAttributes {
    pub geometry: Geometry,
    pub border_width: u16,
    pub override_redirect: bool,
    pub map_state: MapState,
}

/// Subset of a ConfigureWindow request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowChanges {
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub border_width: Option<u16>,
}

impl WindowChanges {
    pub fn position(x: i32, y: i32) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }

    pub fn size(width: i32, height: i32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            ..Self::default()
        }
    }

    pub fn geometry(geometry: Geometry) -> Self {
        Self {
            x: Some(geometry.x),
            y: Some(geometry.y),
            width: Some(geometry.width),
            height: Some(geometry.height),
            border_width: None,
        }
    }
}

/// Decoded server event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XEvent {
    MapRequest {
        window: Window,
    },
    DestroyNotify {
        window: Window,
    },
    UnmapNotify {
        window: Window,
    },
    ButtonPress {
        window: Window,
        x: i16,
        y: i16,
        button: u8,
        state: u16,
    },
    ButtonRelease {
        window: Window,
        button: u8,
    },
    MotionNotify {
        x: i16,
        y: i16,
        state: u16,
    },
    KeyPress {
        x: i16,
        y: i16,
        keycode: Keycode,
        state: u16,
    },
    EnterNotify {
        window: Window,
    },
    ConfigureRequest {
        window: Window,
        changes: WindowChanges,
    },
    ConfigureNotify {
        window: Window,
        width: u16,
        height: u16,
    },
    Expose {
        window: Window,
    },
    PropertyNotify {
        window: Window,
    },
    MappingNotify {
        keyboard: bool,
    },
    FocusIn {
        window: Window,
    },
    Error(ProtocolError),
    /// Anything the core has no use for
    Other,
}

impl XEvent {
    /// Short event name for diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            XEvent::MapRequest { .. } => "MapRequest",
            XEvent::DestroyNotify { .. } => "DestroyNotify",
            XEvent::UnmapNotify { .. } => "UnmapNotify",
            XEvent::ButtonPress { .. } => "ButtonPress",
            XEvent::ButtonRelease { .. } => "ButtonRelease",
            XEvent::MotionNotify { .. } => "MotionNotify",
            XEvent::KeyPress { .. } => "KeyPress",
            XEvent::EnterNotify { .. } => "EnterNotify",
            XEvent::ConfigureRequest { .. } => "ConfigureRequest",
            XEvent::ConfigureNotify { .. } => "ConfigureNotify",
            XEvent::Expose { .. } => "Expose",
            XEvent::PropertyNotify { .. } => "PropertyNotify",
            XEvent::MappingNotify { .. } => "MappingNotify",
            XEvent::FocusIn { .. } => "FocusIn",
            XEvent::Error(_) => "Error",
            XEvent::Other => "Other",
        }
    }
}

/// Requests the window manager core issues against the X server.
///
/// Methods that only queue a request return once it is buffered; the
/// `window_attributes`, `transient_for`, `top_level_windows`,
/// `supports_take_focus`, `grab_pointer`, `query_pointer` and `sync` calls
/// are round trips. Reads on a window that vanished report `Ok(None)`.
pub trait XConn {
    fn root(&self) -> Window;

    /// Current root window size
    fn screen_size(&self) -> Result<(u16, u16)>;

    /// Select events on the root. Fails if another window manager already
    /// owns substructure redirection.
    fn select_root_input(&self, mask: EventMask) -> Result<()>;
    fn select_input(&self, window: Window, mask: EventMask) -> Result<()>;

    fn window_attributes(&self, window: Window) -> Result<Option<WindowAttributes>>;
    fn transient_for(&self, window: Window) -> Result<Option<Window>>;
    /// Children of the root in stacking order
    fn top_level_windows(&self) -> Result<Vec<Window>>;

    fn configure_window(&self, window: Window, changes: &WindowChanges) -> Result<()>;
    /// Synthetic ConfigureNotify sent to the window itself
    fn send_configure_notify(
        &self,
        window: Window,
        geometry: Geometry,
        border_width: u16,
    ) -> Result<()>;
    fn map_window(&self, window: Window) -> Result<()>;

    /// Passive grab reporting press/release, pointer in synchronous mode
    fn grab_button(&self, window: Window, button: ButtonIndex, modifiers: ModMask) -> Result<()>;
    /// Release every button grab on `window`
    fn ungrab_buttons(&self, window: Window) -> Result<()>;

    fn grab_key(&self, keycode: Keycode, modifiers: ModMask) -> Result<()>;
    /// Release every key grab on the root
    fn ungrab_keys(&self) -> Result<()>;
    /// All keycodes producing `keysym` in the cached keyboard mapping
    fn keycodes_for(&self, keysym: Keysym) -> Vec<Keycode>;
    /// Unshifted keysym of `keycode`, 0 when unmapped
    fn keysym_for(&self, keycode: Keycode) -> Keysym;
    fn refresh_keyboard_mapping(&self) -> Result<()>;

    fn set_input_focus(&self, window: Window) -> Result<()>;
    fn supports_take_focus(&self, window: Window) -> Result<bool>;
    fn send_take_focus(&self, window: Window) -> Result<()>;
    /// Release a frozen pointer and replay the event to the client
    fn replay_pointer(&self) -> Result<()>;

    fn grab_server(&self) -> Result<()>;
    fn ungrab_server(&self) -> Result<()>;
    /// Round trip: every request sent so far has been processed
    fn sync(&self) -> Result<()>;
    fn flush(&self) -> Result<()>;

    /// Active pointer grab on the root for an interactive drag. Returns false
    /// if the server refused the grab.
    fn grab_pointer(&self) -> Result<bool>;
    fn ungrab_pointer(&self) -> Result<()>;
    /// Pointer position relative to the root
    fn query_pointer(&self) -> Result<Option<(i16, i16)>>;

    /// Next queued event without blocking
    fn poll_event(&self) -> Result<Option<XEvent>>;
}
