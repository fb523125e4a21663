//! Window Manager Core
//!
//! [`WindowManager`] is the session context: it owns the connection, the
//! client registry, focus state and the callback table, and exposes the
//! control surface (setup, scan, move, resize, focus, run, on). Placement
//! policy lives in the registered handlers, which receive the manager back
//! and may call into the control surface while an event is being handled.

pub mod client;
pub mod events;
pub mod focus;
pub mod monitor;
pub mod notify;
pub mod registry;
pub mod session;

use std::os::fd::AsRawFd;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info};
use x11rb::protocol::xproto::{EventMask, Window};

use crate::x11::{MapState, WindowAttributes, WindowChanges, XConn};
use crate::x11_async::EventStream;
use client::{Client, ClientId};
use focus::{DragChord, FocusState, GrabProfile};
use notify::{CallbackTable, EventKind, Handler, Notification, WindowPayload};
use registry::Registry;
use session::{KeyBinding, ScreenSize, Session};

/// Events a managed window is subscribed to
fn client_event_mask() -> EventMask {
    EventMask::ENTER_WINDOW
        | EventMask::FOCUS_CHANGE
        | EventMask::PROPERTY_CHANGE
        | EventMask::STRUCTURE_NOTIFY
}

/// Tunables handed to the manager by the host
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub drag_chord: DragChord,
    pub key_bindings: Vec<KeyBinding>,
}

/// Interactive drag in progress; origin is the pointer position at start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DragState {
    origin_x: i16,
    origin_y: i16,
}

pub struct WindowManager<C> {
    conn: C,
    session: Session,
    registry: Registry,
    focus: FocusState,
    callbacks: CallbackTable<C>,
    drag: Option<DragState>,
    options: Options,
    /// First protocol failure hit inside a call that cannot return it
    failure: Option<anyhow::Error>,
}

impl<C: XConn> WindowManager<C> {
    pub fn new(conn: C, options: Options) -> Self {
        let root = conn.root();
        Self {
            conn,
            session: Session::new(root),
            registry: Registry::new(),
            focus: FocusState::new(root),
            callbacks: CallbackTable::new(),
            drag: None,
            options,
            failure: None,
        }
    }

    pub fn conn(&self) -> &C {
        &self.conn
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Managed client by id
    pub fn client(&self, id: ClientId) -> Option<&Client> {
        self.registry.find_by_id(id)
    }

    /// Window currently holding input focus (the root when no client has it)
    pub fn focused_window(&self) -> Window {
        self.focus.focused()
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Become the window manager: subscribe the root, size the monitor and
    /// grab the configured keys. Must run once before anything else.
    pub fn setup(&mut self) -> Result<ScreenSize> {
        self.session.configure_root(&self.conn)?;
        self.registry.ensure_monitor();
        self.session.refresh_geometry(&self.conn, &mut self.registry)?;
        let bindings = self.options.key_bindings.clone();
        self.session.install_key_bindings(&self.conn, bindings)?;
        self.conn.flush()?;
        Ok(self.session.screen())
    }

    /// Adopt the windows that existed before we started. Plain windows are
    /// managed first, transients after them. Returns how many were adopted.
    pub fn scan(&mut self) -> Result<usize> {
        let windows = self.conn.top_level_windows()?;
        let mut transients = Vec::new();
        let mut adopted = 0;

        for &window in &windows {
            let Some(attrs) = self.conn.window_attributes(window)? else {
                continue;
            };
            if !is_adoptable(&attrs) {
                continue;
            }
            if self.conn.transient_for(window)?.is_some() {
                transients.push(window);
                continue;
            }
            if self.adopt(window, attrs)? {
                adopted += 1;
            }
        }

        // attributes may have changed while the plain windows were handled
        for window in transients {
            let Some(attrs) = self.conn.window_attributes(window)? else {
                continue;
            };
            if is_adoptable(&attrs) && self.adopt(window, attrs)? {
                adopted += 1;
            }
        }

        info!("Scan adopted {} of {} top-level windows", adopted, windows.len());
        self.take_failure()?;
        Ok(adopted)
    }

    fn adopt(&mut self, window: Window, attrs: WindowAttributes) -> Result<bool> {
        if self.registry.find_by_handle(window).is_some() {
            return Ok(false);
        }
        self.manage(window, attrs)?;
        Ok(true)
    }

    /// Move a managed window. Unknown ids are ignored.
    pub fn move_window(&mut self, id: ClientId, x: i32, y: i32) {
        let Some(client) = self.registry.get_mut(id) else {
            debug!("move: unknown client {}", id);
            return;
        };
        client.geometry.x = x;
        client.geometry.y = y;
        let window = client.window;

        debug!("move: id={} x={} y={}", id, x, y);
        let result = self
            .conn
            .configure_window(window, &WindowChanges::position(x, y))
            .and_then(|_| self.conn.flush());
        self.record_failure("move", result);
    }

    /// Resize a managed window. Unknown ids are ignored.
    pub fn resize_window(&mut self, id: ClientId, width: i32, height: i32) {
        let Some(client) = self.registry.get_mut(id) else {
            debug!("resize: unknown client {}", id);
            return;
        };
        client.geometry.width = width.max(1);
        client.geometry.height = height.max(1);
        let (window, width, height) = (client.window, client.geometry.width, client.geometry.height);

        debug!("resize: id={} width={} height={}", id, width, height);
        let result = self
            .conn
            .configure_window(window, &WindowChanges::size(width, height))
            .and_then(|_| self.conn.flush());
        self.record_failure("resize", result);
    }

    /// Give input focus to `id`, or to the root when `None` or unknown
    pub fn focus(&mut self, id: Option<ClientId>) {
        let target = id
            .and_then(|id| self.registry.find_by_id(id))
            .map(|client| client.window)
            .unwrap_or_else(|| self.session.root());
        let result = self.focus.set(&self.conn, target, self.options.drag_chord);
        self.record_failure("focus", result);
    }

    /// Start tracking an interactive pointer drag. Motion is reported as
    /// `mouseDrag` until the button is released. A refused grab leaves
    /// things as they were.
    pub fn begin_drag(&mut self) {
        if self.drag.is_some() {
            return;
        }
        let result = self.try_begin_drag();
        self.record_failure("drag", result);
    }

    fn try_begin_drag(&mut self) -> Result<()> {
        if !self.conn.grab_pointer()? {
            debug!("drag: pointer grab refused");
            return Ok(());
        }
        let Some((x, y)) = self.conn.query_pointer()? else {
            self.conn.ungrab_pointer()?;
            return Ok(());
        };
        debug!("drag: start at {},{}", x, y);
        self.drag = Some(DragState {
            origin_x: x,
            origin_y: y,
        });
        Ok(())
    }

    /// Replace the grabbed key set
    pub fn set_key_bindings(&mut self, bindings: Vec<KeyBinding>) {
        self.options.key_bindings = bindings.clone();
        let result = self
            .session
            .install_key_bindings(&self.conn, bindings)
            .and_then(|_| self.conn.flush());
        self.record_failure("key bindings", result);
    }

    /// Register the handler for an event kind by name. Unknown names are ignored.
    pub fn on<F>(&mut self, name: &str, handler: F)
    where
        F: FnMut(&mut WindowManager<C>, &Notification) + 'static,
    {
        match name.parse::<EventKind>() {
            Ok(kind) => self.on_kind(kind, handler),
            Err(e) => debug!("on: {}", e),
        }
    }

    pub fn on_kind<F>(&mut self, kind: EventKind, handler: F)
    where
        F: FnMut(&mut WindowManager<C>, &Notification) + 'static,
    {
        let handler: Handler<C> = Box::new(handler);
        self.callbacks.set(kind, handler);
    }

    /// Invoke the handler for `notification`, if any. A notification raised
    /// while the handler of its kind is running is delivered after that
    /// handler returns.
    fn emit(&mut self, notification: Notification) {
        let kind = notification.kind();
        if self.callbacks.is_running(kind) {
            debug!("Deferring nested {} notification", kind.name());
            self.callbacks.defer(notification);
            return;
        }
        let Some(mut handler) = self.callbacks.take(kind) else {
            return;
        };
        handler(self, &notification);
        self.callbacks.restore(kind, handler);

        while let Some(next) = self.callbacks.next_deferred(kind) {
            self.emit(next);
        }
    }

    /// Add sequence
    fn manage(&mut self, window: Window, attrs: WindowAttributes) -> Result<ClientId> {
        let monitor = self.registry.ensure_monitor();
        let id = self
            .registry
            .create_client(window, monitor, attrs.geometry, attrs.border_width);
        info!(
            "Managing window 0x{:x} as client {} at {:?}",
            window, id, attrs.geometry
        );

        self.emit(Notification::Add(WindowPayload {
            id,
            x: attrs.geometry.x,
            y: attrs.geometry.y,
            width: attrs.geometry.width,
            height: attrs.geometry.height,
            border_width: attrs.border_width,
        }));

        // the add handler may have moved or resized the client
        let Some(client) = self.registry.find_by_id(id) else {
            return Ok(id);
        };
        let (geometry, border_width) = (client.geometry, client.border_width);

        // the add handler may also have focused it
        let focused = self.focus.focused() == window;
        let profile = if focused {
            GrabProfile::Focused
        } else {
            GrabProfile::Unfocused
        };

        self.conn.send_configure_notify(window, geometry, border_width)?;
        self.conn.select_input(window, client_event_mask())?;
        focus::apply_grab_profile(&self.conn, window, profile, self.options.drag_chord)?;
        self.conn
            .configure_window(window, &WindowChanges::geometry(geometry))?;
        self.conn.map_window(window)?;
        if focused {
            self.focus.reassert(&self.conn)?;
        }

        self.emit(Notification::Rearrange);
        Ok(id)
    }

    /// Remove sequence. `destroyed` means the window handle is already gone
    /// and no protocol cleanup is attempted.
    fn unmanage(&mut self, id: ClientId, destroyed: bool) -> Result<()> {
        self.emit(Notification::Remove(id));

        let Some(client) = self.registry.detach(id) else {
            return Ok(());
        };
        info!(
            "Unmanaging client {} (window 0x{:x}, destroyed={})",
            id, client.window, destroyed
        );

        if !destroyed {
            self.conn.grab_server()?;
            let cleanup = self
                .conn
                .ungrab_buttons(client.window)
                .and_then(|_| self.conn.sync());
            self.conn.ungrab_server()?;
            cleanup?;
        }
        drop(client);

        self.focus(None);
        self.emit(Notification::Rearrange);
        Ok(())
    }

    /// Remember the first failure of a control-surface call; the next pump
    /// reports it.
    fn record_failure(&mut self, operation: &str, result: Result<()>) {
        if let Err(e) = result {
            error!("{} failed: {:#}", operation, e);
            if self.failure.is_none() {
                self.failure = Some(e);
            }
        }
    }

    fn take_failure(&mut self) -> Result<()> {
        match self.failure.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// One dispatch pass: sync, then handle queued events until none remain
    pub fn pump(&mut self) -> Result<usize> {
        self.conn.sync()?;
        let mut handled = 0;
        while let Some(event) = self.conn.poll_event()? {
            self.handle_event(event)?;
            self.take_failure()?;
            handled += 1;
        }
        self.conn.flush()?;
        self.take_failure()?;
        Ok(handled)
    }
}

impl<C: XConn + AsRawFd> WindowManager<C> {
    /// Dispatch events as the connection becomes readable. `fallback` is the
    /// interval of an extra pump in case a wakeup was missed. Returns only on
    /// a fatal error.
    pub async fn run(&mut self, fallback: Duration) -> Result<()> {
        let stream = EventStream::new(self.conn.as_raw_fd())?;
        let mut ticker = tokio::time::interval(fallback);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        self.pump()?;
        loop {
            tokio::select! {
                _ = stream.wait_readable() => {}
                _ = ticker.tick() => {}
            }
            self.pump()?;
        }
    }
}

fn is_adoptable(attrs: &WindowAttributes) -> bool {
    !attrs.override_redirect && attrs.map_state == MapState::Viewable
}
