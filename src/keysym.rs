//! Keysym names
//!
//! Maps the key names accepted in the configuration file to X keysyms.
//! Single printable ASCII characters map to themselves (Latin-1 keysyms
//! equal their code point); anything not covered can be given as `0xHEX`.

use x11rb::protocol::xproto::Keysym;

pub const XK_BACKSPACE: Keysym = 0xFF08;
pub const XK_TAB: Keysym = 0xFF09;
pub const XK_RETURN: Keysym = 0xFF0D;
pub const XK_ESCAPE: Keysym = 0xFF1B;
pub const XK_DELETE: Keysym = 0xFFFF;
pub const XK_F1: Keysym = 0xFFBE;

const NAMED: &[(&str, Keysym)] = &[
    ("BackSpace", XK_BACKSPACE),
    ("Tab", XK_TAB),
    ("Return", XK_RETURN),
    ("Escape", XK_ESCAPE),
    ("Delete", XK_DELETE),
    ("Home", 0xFF50),
    ("Left", 0xFF51),
    ("Up", 0xFF52),
    ("Right", 0xFF53),
    ("Down", 0xFF54),
    ("Page_Up", 0xFF55),
    ("Page_Down", 0xFF56),
    ("End", 0xFF57),
    ("Print", 0xFF61),
    ("Insert", 0xFF63),
    ("Menu", 0xFF67),
    ("space", 0x0020),
    ("apostrophe", 0x0027),
    ("comma", 0x002C),
    ("minus", 0x002D),
    ("period", 0x002E),
    ("slash", 0x002F),
    ("semicolon", 0x003B),
    ("equal", 0x003D),
    ("bracketleft", 0x005B),
    ("backslash", 0x005C),
    ("bracketright", 0x005D),
    ("grave", 0x0060),
    ("Super_L", 0xFFEB),
    ("Super_R", 0xFFEC),
];

/// Resolve a key name, `F1`..`F24`, a single character or a `0x` literal
pub fn from_name(name: &str) -> Option<Keysym> {
    if let Some(hex) = name.strip_prefix("0x").or_else(|| name.strip_prefix("0X")) {
        return Keysym::from_str_radix(hex, 16).ok();
    }

    if let Some(&(_, sym)) = NAMED.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
        return Some(sym);
    }

    if let Some(n) = name.strip_prefix(['F', 'f']).and_then(|n| n.parse::<u32>().ok()) {
        if (1..=24).contains(&n) {
            return Some(XK_F1 + n - 1);
        }
    }

    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        // keysyms for letters are the lowercase code points
        (Some(c), None) if c.is_ascii_graphic() => Some(Keysym::from(c.to_ascii_lowercase())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_and_literal_keys() {
        assert_eq!(from_name("Return"), Some(XK_RETURN));
        assert_eq!(from_name("return"), Some(XK_RETURN));
        assert_eq!(from_name("0xff0d"), Some(XK_RETURN));
        assert_eq!(from_name("F4"), Some(0xFFC1));
        assert_eq!(from_name("F12"), Some(0xFFC9));
        assert_eq!(from_name("F25"), None);
    }

    #[test]
    fn test_single_characters() {
        assert_eq!(from_name("j"), Some(0x6A));
        assert_eq!(from_name("J"), Some(0x6A));
        assert_eq!(from_name("1"), Some(0x31));
        // "f" alone is the letter, not a function key
        assert_eq!(from_name("f"), Some(0x66));
        assert_eq!(from_name("nope"), None);
        assert_eq!(from_name(""), None);
    }
}
