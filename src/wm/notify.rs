//! Notification Bridge
//!
//! Maps the internal event vocabulary onto externally supplied handlers.
//! There is at most one handler per [`EventKind`]; registering again
//! replaces the previous handler, and an event without a handler is dropped
//! after the core's own bookkeeping.

use std::collections::VecDeque;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::wm::WindowManager;
use crate::wm::client::ClientId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Add,
    Remove,
    Rearrange,
    ButtonPress,
    MouseDrag,
    ConfigureRequest,
    KeyPress,
    EnterNotify,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::Add,
        EventKind::Remove,
        EventKind::Rearrange,
        EventKind::ButtonPress,
        EventKind::MouseDrag,
        EventKind::ConfigureRequest,
        EventKind::KeyPress,
        EventKind::EnterNotify,
    ];

    /// Registration name
    pub fn name(self) -> &'static str {
        match self {
            EventKind::Add => "add",
            EventKind::Remove => "remove",
            EventKind::Rearrange => "rearrange",
            EventKind::ButtonPress => "buttonPress",
            EventKind::MouseDrag => "mouseDrag",
            EventKind::ConfigureRequest => "configureRequest",
            EventKind::KeyPress => "keyPress",
            EventKind::EnterNotify => "enterNotify",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown event kind: {0}")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| UnknownEventKind(s.to_owned()))
    }
}

/// Geometry of a newly managed window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowPayload {
    pub id: ClientId,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub border_width: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ButtonPressPayload {
    pub id: ClientId,
    pub x: i32,
    pub y: i32,
    pub button: u8,
    pub state: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeyPressPayload {
    pub x: i32,
    pub y: i32,
    pub keysym: u32,
    pub keycode: u8,
    #[serde(rename = "mod")]
    pub modifiers: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EnterPayload {
    pub id: ClientId,
}

/// Pointer motion during an interactive drag: `x`/`y` is where the drag
/// started, `move_x`/`move_y` where the pointer is now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DragPayload {
    pub x: i32,
    pub y: i32,
    pub move_x: i32,
    pub move_y: i32,
    pub state: u16,
}

/// Event delivered to a registered handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Notification {
    Add(WindowPayload),
    Remove(ClientId),
    Rearrange,
    ButtonPress(ButtonPressPayload),
    MouseDrag(DragPayload),
    KeyPress(KeyPressPayload),
    EnterNotify(EnterPayload),
}

impl Notification {
    pub fn kind(&self) -> EventKind {
        match self {
            Notification::Add(_) => EventKind::Add,
            Notification::Remove(_) => EventKind::Remove,
            Notification::Rearrange => EventKind::Rearrange,
            Notification::ButtonPress(_) => EventKind::ButtonPress,
            Notification::MouseDrag(_) => EventKind::MouseDrag,
            Notification::KeyPress(_) => EventKind::KeyPress,
            Notification::EnterNotify(_) => EventKind::EnterNotify,
        }
    }
}

/// Handler slot. Handlers get the window manager back so they can drive the
/// control surface from inside the event cycle.
pub type Handler<C> = Box<dyn FnMut(&mut WindowManager<C>, &Notification)>;

pub struct CallbackTable<C> {
    slots: [Option<Handler<C>>; EventKind::ALL.len()],
    running: [bool; EventKind::ALL.len()],
    /// Raised while the handler of their kind was running
    deferred: VecDeque<Notification>,
}

impl<C> CallbackTable<C> {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
            running: [false; EventKind::ALL.len()],
            deferred: VecDeque::new(),
        }
    }

    /// Install `handler`, replacing any previous one for `kind`
    pub fn set(&mut self, kind: EventKind, handler: Handler<C>) {
        self.slots[kind.slot()] = Some(handler);
    }

    pub fn is_registered(&self, kind: EventKind) -> bool {
        self.slots[kind.slot()].is_some()
    }

    /// Whether the handler for `kind` is currently out of its slot
    pub(crate) fn is_running(&self, kind: EventKind) -> bool {
        self.running[kind.slot()]
    }

    /// Borrow the handler out of its slot for the duration of a call
    pub(crate) fn take(&mut self, kind: EventKind) -> Option<Handler<C>> {
        let handler = self.slots[kind.slot()].take();
        self.running[kind.slot()] = handler.is_some();
        handler
    }

    /// Put a handler back unless it was replaced while it ran
    pub(crate) fn restore(&mut self, kind: EventKind, handler: Handler<C>) {
        self.running[kind.slot()] = false;
        let slot = &mut self.slots[kind.slot()];
        if slot.is_none() {
            *slot = Some(handler);
        }
    }

    /// Hold a notification until the running handler of its kind returns
    pub(crate) fn defer(&mut self, notification: Notification) {
        self.deferred.push_back(notification);
    }

    /// Oldest held notification of `kind`
    pub(crate) fn next_deferred(&mut self, kind: EventKind) -> Option<Notification> {
        let index = self.deferred.iter().position(|n| n.kind() == kind)?;
        self.deferred.remove(index)
    }
}

impl<C> Default for CallbackTable<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x11::mock::MockConn;

    #[test]
    fn test_kind_names_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(kind.name().parse::<EventKind>(), Ok(kind));
        }
        assert_eq!(
            "focusIn".parse::<EventKind>(),
            Err(UnknownEventKind("focusIn".into()))
        );
    }

    #[test]
    fn test_payloads_serialize_flat() {
        let add = Notification::Add(WindowPayload {
            id: ClientId(4),
            x: -10,
            y: 20,
            width: 640,
            height: 480,
            border_width: 1,
        });
        assert_eq!(
            serde_json::to_string(&add).unwrap(),
            r#"{"id":4,"x":-10,"y":20,"width":640,"height":480,"border_width":1}"#
        );

        let key = Notification::KeyPress(KeyPressPayload {
            x: 1,
            y: 2,
            keysym: 0xff0d,
            keycode: 36,
            modifiers: 0x40,
        });
        assert_eq!(
            serde_json::to_string(&key).unwrap(),
            r#"{"x":1,"y":2,"keysym":65293,"keycode":36,"mod":64}"#
        );

        assert_eq!(serde_json::to_string(&Notification::Remove(ClientId(9))).unwrap(), "9");
        assert_eq!(serde_json::to_string(&Notification::Rearrange).unwrap(), "null");
    }

    #[test]
    fn test_restore_keeps_handler_installed_during_call() {
        let mut table: CallbackTable<MockConn> = CallbackTable::new();
        table.set(EventKind::Add, Box::new(|_, _| {}));

        let running = table.take(EventKind::Add).unwrap();
        assert!(!table.is_registered(EventKind::Add));

        // re-registration while the handler runs wins
        table.set(EventKind::Add, Box::new(|_, _| {}));
        table.restore(EventKind::Add, running);
        assert!(table.is_registered(EventKind::Add));
        assert!(!table.is_registered(EventKind::Remove));
    }

    #[test]
    fn test_deferred_notifications_come_back_by_kind_in_order() {
        let mut table: CallbackTable<MockConn> = CallbackTable::new();
        table.set(EventKind::Add, Box::new(|_, _| {}));
        assert!(!table.is_running(EventKind::Add));

        let running = table.take(EventKind::Add).unwrap();
        assert!(table.is_running(EventKind::Add));
        table.defer(Notification::Remove(ClientId(1)));
        table.defer(Notification::Rearrange);
        table.defer(Notification::Remove(ClientId(2)));
        table.restore(EventKind::Add, running);
        assert!(!table.is_running(EventKind::Add));

        assert_eq!(
            table.next_deferred(EventKind::Remove),
            Some(Notification::Remove(ClientId(1)))
        );
        assert_eq!(
            table.next_deferred(EventKind::Remove),
            Some(Notification::Remove(ClientId(2)))
        );
        assert_eq!(table.next_deferred(EventKind::Remove), None);
        assert_eq!(table.next_deferred(EventKind::Rearrange), Some(Notification::Rearrange));
    }

    #[test]
    fn test_take_of_empty_slot_is_not_running() {
        let mut table: CallbackTable<MockConn> = CallbackTable::new();
        assert!(table.take(EventKind::KeyPress).is_none());
        assert!(!table.is_running(EventKind::KeyPress));
    }
}
