//! Notification flags: the stage/outcome channel that replaces exceptions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stage or outcome of a request, delivered with every notification.
///
/// Negative codes are failures; each request ends with exactly one
/// terminal flag (`RESPONSE_IS_READY` or any failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum Flag {
    WrongUrl = -3,
    ErrorMessage = -2,
    RequestUnaccepted = -1,
    RequestAccepted = 0,
    ResponseIsReady = 1,
    DataSent = 5,
}

impl Flag {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -3 => Some(Flag::WrongUrl),
            -2 => Some(Flag::ErrorMessage),
            -1 => Some(Flag::RequestUnaccepted),
            0 => Some(Flag::RequestAccepted),
            1 => Some(Flag::ResponseIsReady),
            5 => Some(Flag::DataSent),
            _ => None,
        }
    }

    pub fn is_error(self) -> bool {
        self.code() < 0
    }

    /// No further flag follows a terminal one for the same request.
    pub fn is_terminal(self) -> bool {
        self.is_error() || self == Flag::ResponseIsReady
    }

    pub fn name(self) -> &'static str {
        match self {
            Flag::WrongUrl => "WRONG_URL",
            Flag::ErrorMessage => "ERROR_MESSAGE",
            Flag::RequestUnaccepted => "REQUEST_UNACCEPTED",
            Flag::RequestAccepted => "REQUEST_ACCEPTED",
            Flag::ResponseIsReady => "RESPONSE_IS_READY",
            Flag::DataSent => "DATA_SENT",
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.code())
    }
}
