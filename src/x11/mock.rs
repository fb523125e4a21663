//! Recording fake X server for tests

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};

use anyhow::Result;
use x11rb::protocol::xproto::{ButtonIndex, EventMask, Keycode, Keysym, ModMask, Window};

use super::{MapState, WindowAttributes, WindowChanges, XConn, XEvent};
use crate::wm::client::Geometry;

pub const ROOT: Window = 0x100;

/// One request issued against the fake server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    SelectRootInput(u32),
    SelectInput { window: Window, mask: u32 },
    ConfigureWindow { window: Window, changes: WindowChanges },
    SendConfigureNotify { window: Window, geometry: Geometry, border_width: u16 },
    MapWindow(Window),
    GrabButton { window: Window, button: u8, modifiers: u16 },
    UngrabButtons(Window),
    GrabKey { keycode: Keycode, modifiers: u16 },
    UngrabKeys,
    RefreshKeyboardMapping,
    SetInputFocus(Window),
    SendTakeFocus(Window),
    ReplayPointer,
    GrabServer,
    UngrabServer,
    Sync,
    Flush,
    GrabPointer,
    UngrabPointer,
}

pub struct MockConn {
    calls: RefCell<Vec<Call>>,
    windows: RefCell<HashMap<Window, WindowAttributes>>,
    stacking: RefCell<Vec<Window>>,
    transients: RefCell<HashMap<Window, Window>>,
    take_focus: RefCell<HashSet<Window>>,
    keymap: RefCell<HashMap<Keysym, Vec<Keycode>>>,
    events: RefCell<VecDeque<XEvent>>,
    screen: Cell<(u16, u16)>,
    pointer: Cell<Option<(i16, i16)>>,
    pointer_grab_ok: Cell<bool>,
}

impl MockConn {
    pub fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            windows: RefCell::new(HashMap::new()),
            stacking: RefCell::new(Vec::new()),
            transients: RefCell::new(HashMap::new()),
            take_focus: RefCell::new(HashSet::new()),
            keymap: RefCell::new(HashMap::new()),
            events: RefCell::new(VecDeque::new()),
            screen: Cell::new((1920, 1080)),
            pointer: Cell::new(Some((500, 400))),
            pointer_grab_ok: Cell::new(true),
        }
    }

    /// Viewable top-level window at the given geometry
    pub fn add_window(&self, window: Window, geometry: Geometry) {
        self.add_window_with(window, geometry, false, MapState::Viewable);
    }

    pub fn add_window_with(
        &self,
        window: Window,
        geometry: Geometry,
        override_redirect: bool,
        map_state: MapState,
    ) {
        self.windows.borrow_mut().insert(
            window,
            WindowAttributes {
                geometry,
                border_width: 1,
                override_redirect,
                map_state,
            },
        );
        self.stacking.borrow_mut().push(window);
    }

    pub fn set_transient(&self, window: Window, parent: Window) {
        self.transients.borrow_mut().insert(window, parent);
    }

    pub fn set_take_focus(&self, window: Window) {
        self.take_focus.borrow_mut().insert(window);
    }

    pub fn set_keycodes(&self, keysym: Keysym, keycodes: Vec<Keycode>) {
        self.keymap.borrow_mut().insert(keysym, keycodes);
    }

    pub fn set_screen(&self, width: u16, height: u16) {
        self.screen.set((width, height));
    }

    pub fn set_pointer(&self, pointer: Option<(i16, i16)>) {
        self.pointer.set(pointer);
    }

    pub fn refuse_pointer_grab(&self) {
        self.pointer_grab_ok.set(false);
    }

    /// Forget a window, as if it was destroyed server side
    pub fn destroy_window(&self, window: Window) {
        self.windows.borrow_mut().remove(&window);
        self.stacking.borrow_mut().retain(|&w| w != window);
    }

    pub fn push_event(&self, event: XEvent) {
        self.events.borrow_mut().push_back(event);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) -> Result<()> {
        self.calls.borrow_mut().push(call);
        Ok(())
    }
}

impl XConn for MockConn {
    fn root(&self) -> Window {
        ROOT
    }

    fn screen_size(&self) -> Result<(u16, u16)> {
        Ok(self.screen.get())
    }

    fn select_root_input(&self, mask: EventMask) -> Result<()> {
        self.record(Call::SelectRootInput(u32::from(mask)))
    }

    fn select_input(&self, window: Window, mask: EventMask) -> Result<()> {
        self.record(Call::SelectInput {
            window,
            mask: u32::from(mask),
        })
    }

    fn window_attributes(&self, window: Window) -> Result<Option<WindowAttributes>> {
        Ok(self.windows.borrow().get(&window).copied())
    }

    fn transient_for(&self, window: Window) -> Result<Option<Window>> {
        Ok(self.transients.borrow().get(&window).copied())
    }

    fn top_level_windows(&self) -> Result<Vec<Window>> {
        Ok(self.stacking.borrow().clone())
    }

    fn configure_window(&self, window: Window, changes: &WindowChanges) -> Result<()> {
        self.record(Call::ConfigureWindow {
            window,
            changes: *changes,
        })
    }

    fn send_configure_notify(
        &self,
        window: Window,
        geometry: Geometry,
        border_width: u16,
    ) -> Result<()> {
        self.record(Call::SendConfigureNotify {
            window,
            geometry,
            border_width,
        })
    }

    fn map_window(&self, window: Window) -> Result<()> {
        self.record(Call::MapWindow(window))
    }

    fn grab_button(&self, window: Window, button: ButtonIndex, modifiers: ModMask) -> Result<()> {
        self.record(Call::GrabButton {
            window,
            button: u8::from(button),
            modifiers: u16::from(modifiers),
        })
    }

    fn ungrab_buttons(&self, window: Window) -> Result<()> {
        self.record(Call::UngrabButtons(window))
    }

    fn grab_key(&self, keycode: Keycode, modifiers: ModMask) -> Result<()> {
        self.record(Call::GrabKey {
            keycode,
            modifiers: u16::from(modifiers),
        })
    }

    fn ungrab_keys(&self) -> Result<()> {
        self.record(Call::UngrabKeys)
    }

    fn keycodes_for(&self, keysym: Keysym) -> Vec<Keycode> {
        self.keymap.borrow().get(&keysym).cloned().unwrap_or_default()
    }

    fn keysym_for(&self, keycode: Keycode) -> Keysym {
        self.keymap
            .borrow()
            .iter()
            .find(|(_, codes)| codes.contains(&keycode))
            .map(|(&sym, _)| sym)
            .unwrap_or(0)
    }

    fn refresh_keyboard_mapping(&self) -> Result<()> {
        self.record(Call::RefreshKeyboardMapping)
    }

    fn set_input_focus(&self, window: Window) -> Result<()> {
        self.record(Call::SetInputFocus(window))
    }

    fn supports_take_focus(&self, window: Window) -> Result<bool> {
        Ok(self.take_focus.borrow().contains(&window))
    }

    fn send_take_focus(&self, window: Window) -> Result<()> {
        self.record(Call::SendTakeFocus(window))
    }

    fn replay_pointer(&self) -> Result<()> {
        self.record(Call::ReplayPointer)
    }

    fn grab_server(&self) -> Result<()> {
        self.record(Call::GrabServer)
    }

    fn ungrab_server(&self) -> Result<()> {
        self.record(Call::UngrabServer)
    }

    fn sync(&self) -> Result<()> {
        self.record(Call::Sync)
    }

    fn flush(&self) -> Result<()> {
        self.record(Call::Flush)
    }

    fn grab_pointer(&self) -> Result<bool> {
        self.record(Call::GrabPointer)?;
        Ok(self.pointer_grab_ok.get())
    }

    fn ungrab_pointer(&self) -> Result<()> {
        self.record(Call::UngrabPointer)
    }

    fn query_pointer(&self) -> Result<Option<(i16, i16)>> {
        Ok(self.pointer.get())
    }

    fn poll_event(&self) -> Result<Option<XEvent>> {
        Ok(self.events.borrow_mut().pop_front())
    }
}
