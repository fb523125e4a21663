//! Focus Module
//!
//! Input focus and the button grab profiles that go with it. An unfocused
//! client grabs every button so a click can be reported (and then replayed);
//! the focused client only keeps the drag chord grabbed.

use anyhow::Result;
use tracing::debug;
use x11rb::protocol::xproto::{ButtonIndex, ModMask, Window};

use crate::x11::{Modifiers, XConn};

/// Modifier + button combination that starts an interactive drag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragChord {
    pub modifiers: Modifiers,
    pub button: u8,
}

impl Default for DragChord {
    fn default() -> Self {
        Self {
            modifiers: Modifiers::MOD4,
            button: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrabProfile {
    /// Any button with any modifiers
    Unfocused,
    /// Only the drag chord
    Focused,
}

/// Replace the button grabs on `window` with `profile`
pub fn apply_grab_profile<C: XConn>(
    conn: &C,
    window: Window,
    profile: GrabProfile,
    chord: DragChord,
) -> Result<()> {
    conn.ungrab_buttons(window)?;
    match profile {
        GrabProfile::Unfocused => conn.grab_button(window, ButtonIndex::ANY, ModMask::ANY),
        GrabProfile::Focused => conn.grab_button(
            window,
            ButtonIndex::from(chord.button),
            ModMask::from(chord.modifiers),
        ),
    }
}

/// Which window currently holds input focus
#[derive(Debug)]
pub struct FocusState {
    root: Window,
    focused: Window,
}

impl FocusState {
    pub fn new(root: Window) -> Self {
        Self {
            root,
            focused: root,
        }
    }

    pub fn focused(&self) -> Window {
        self.focused
    }

    /// Move input focus to `target`, the root meaning "no client".
    /// Focusing the window that already has focus is a no-op.
    pub fn set<C: XConn>(&mut self, conn: &C, target: Window, chord: DragChord) -> Result<()> {
        if target == self.focused {
            return Ok(());
        }

        if target != self.root {
            apply_grab_profile(conn, target, GrabProfile::Focused, chord)?;
        }
        self.send_input_focus(conn, target)?;

        debug!("Focus 0x{:x} -> 0x{:x}", self.focused, target);
        self.focused = target;
        Ok(())
    }

    /// Send the input focus for the current target again. A window focused
    /// before it was mapped needs this once it becomes viewable.
    pub fn reassert<C: XConn>(&self, conn: &C) -> Result<()> {
        if self.focused == self.root {
            return Ok(());
        }
        debug!("Focus reasserted on 0x{:x}", self.focused);
        self.send_input_focus(conn, self.focused)
    }

    fn send_input_focus<C: XConn>(&self, conn: &C, target: Window) -> Result<()> {
        conn.set_input_focus(target)?;
        if target != self.root && conn.supports_take_focus(target)? {
            conn.send_take_focus(target)?;
        }
        conn.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x11::mock::{Call, MockConn, ROOT};

    #[test]
    fn test_unfocused_profile_grabs_everything() {
        let conn = MockConn::new();
        apply_grab_profile(&conn, 0x200, GrabProfile::Unfocused, DragChord::default()).unwrap();
        assert_eq!(
            conn.calls(),
            vec![
                Call::UngrabButtons(0x200),
                Call::GrabButton {
                    window: 0x200,
                    button: 0,
                    modifiers: u16::from(ModMask::ANY),
                },
            ]
        );
    }

    #[test]
    fn test_focus_installs_chord_and_take_focus() {
        let conn = MockConn::new();
        conn.set_take_focus(0x200);
        let mut focus = FocusState::new(ROOT);

        focus.set(&conn, 0x200, DragChord::default()).unwrap();
        assert_eq!(
            conn.calls(),
            vec![
                Call::UngrabButtons(0x200),
                Call::GrabButton {
                    window: 0x200,
                    button: 3,
                    modifiers: Modifiers::MOD4.bits(),
                },
                Call::SetInputFocus(0x200),
                Call::SendTakeFocus(0x200),
                Call::Flush,
            ]
        );
        assert_eq!(focus.focused(), 0x200);
    }

    #[test]
    fn test_refocus_is_noop() {
        let conn = MockConn::new();
        let mut focus = FocusState::new(ROOT);
        focus.set(&conn, 0x200, DragChord::default()).unwrap();
        conn.clear_calls();

        focus.set(&conn, 0x200, DragChord::default()).unwrap();
        assert!(conn.calls().is_empty());
    }

    #[test]
    fn test_reassert_resends_focus_without_grabs() {
        let conn = MockConn::new();
        conn.set_take_focus(0x200);
        let mut focus = FocusState::new(ROOT);
        focus.reassert(&conn).unwrap();
        assert!(conn.calls().is_empty());

        focus.set(&conn, 0x200, DragChord::default()).unwrap();
        conn.clear_calls();
        focus.reassert(&conn).unwrap();
        assert_eq!(
            conn.calls(),
            vec![
                Call::SetInputFocus(0x200),
                Call::SendTakeFocus(0x200),
                Call::Flush,
            ]
        );
        assert_eq!(focus.focused(), 0x200);
    }

    #[test]
    fn test_root_focus_installs_no_grab() {
        let conn = MockConn::new();
        let mut focus = FocusState::new(ROOT);
        focus.set(&conn, 0x200, DragChord::default()).unwrap();
        conn.clear_calls();

        focus.set(&conn, ROOT, DragChord::default()).unwrap();
        assert_eq!(conn.calls(), vec![Call::SetInputFocus(ROOT), Call::Flush]);
        assert_eq!(focus.focused(), ROOT);
    }
}
