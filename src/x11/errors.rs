//! Protocol error classification
//!
//! Asynchronous window management races with clients: a window can vanish
//! between a request being queued and executed, focus and grabs can lose to
//! another client, drawing can hit a dead drawable. Those pairs are ignored.
//! Anything else is unexpected and ends the session.

use thiserror::Error;
use tracing::{debug, error};

// Core request opcodes
pub const X_CONFIGURE_WINDOW: u8 = 12;
pub const X_GRAB_BUTTON: u8 = 28;
pub const X_GRAB_KEY: u8 = 33;
pub const X_SET_INPUT_FOCUS: u8 = 42;
pub const X_COPY_AREA: u8 = 62;
pub const X_POLY_SEGMENT: u8 = 66;
pub const X_POLY_FILL_RECTANGLE: u8 = 70;
pub const X_POLY_TEXT8: u8 = 74;

// Core error codes
pub const BAD_VALUE: u8 = 2;
pub const BAD_WINDOW: u8 = 3;
pub const BAD_MATCH: u8 = 8;
pub const BAD_DRAWABLE: u8 = 9;
pub const BAD_ACCESS: u8 = 10;

/// (request opcode, error code) pairs that are expected races
const BENIGN: &[(u8, u8)] = &[
    (X_SET_INPUT_FOCUS, BAD_MATCH),
    (X_POLY_TEXT8, BAD_DRAWABLE),
    (X_POLY_FILL_RECTANGLE, BAD_DRAWABLE),
    (X_POLY_SEGMENT, BAD_DRAWABLE),
    (X_CONFIGURE_WINDOW, BAD_MATCH),
    (X_GRAB_BUTTON, BAD_ACCESS),
    (X_GRAB_KEY, BAD_ACCESS),
    (X_COPY_AREA, BAD_DRAWABLE),
];

/// Error reported by the server for an earlier request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolError {
    /// Major opcode of the failed request
    pub request: u8,
    pub code: u8,
    pub bad_value: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    Ignore,
    Fatal,
}

impl ProtocolError {
    pub fn disposition(&self) -> ErrorDisposition {
        if self.code == BAD_WINDOW || BENIGN.contains(&(self.request, self.code)) {
            ErrorDisposition::Ignore
        } else {
            ErrorDisposition::Fatal
        }
    }

    /// Swallow allow-listed errors, escalate the rest
    pub fn check(self) -> Result<(), FatalError> {
        match self.disposition() {
            ErrorDisposition::Ignore => {
                debug!(
                    "Ignoring X11 error: request_code={}, error_code={}, resource=0x{:x}",
                    self.request, self.code, self.bad_value
                );
                Ok(())
            }
            ErrorDisposition::Fatal => {
                error!(
                    "Fatal X11 error: request_code={}, error_code={}, resource=0x{:x}",
                    self.request, self.code, self.bad_value
                );
                Err(FatalError::Protocol {
                    request: self.request,
                    code: self.code,
                })
            }
        }
    }
}

/// Conditions the window manager cannot continue from
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("cannot connect to X server {display}: {reason}")]
    Connect { display: String, reason: String },

    #[error("unexpected X11 error: request code={request}, error code={code}")]
    Protocol { request: u8, code: u8 },

    #[error("X11 connection lost")]
    ConnectionLost,
}
