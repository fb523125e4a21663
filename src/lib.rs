//! Area Tile
//!
//! Runtime core of a minimal tiling window manager for X11: a registry of
//! managed windows, an event classifier and dispatcher, a focus/grab
//! protocol, and a control surface for placement policy that lives in
//! registered handlers.

pub mod config;
pub mod keysym;
pub mod wm;
pub mod x11;
pub mod x11_async;

pub use wm::client::{ClientId, Geometry};
pub use wm::notify::{EventKind, Notification};
pub use wm::{Options, WindowManager};
pub use x11::{X11Conn, XConn};
