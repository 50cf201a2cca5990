//! Error handling for the modem driver.
//!
//! Every public operation returns a `Result` or a plain success flag; the
//! AT engine itself never panics on a recoverable condition (a timeout or
//! an `ERROR` response is data, not a bug).

use core::fmt;

/// Driver error kinds, matching the taxonomy in the crate's design notes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The response matcher's deadline elapsed before any terminator matched.
    Timeout,
    /// The modem returned `ERROR` or a command-specific failure terminator.
    Protocol,
    /// The caller addressed an unknown, closed, or out-of-range mux.
    InvalidSocket,
    /// A response did not have the shape the parser expected.
    Parse,
    /// A mandatory step during GPRS bring-up failed.
    GprsSetup,
    /// The scratch or AT command buffer would have overflowed.
    BufferFull,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Timeout => write!(f, "timed out waiting for modem response"),
            Error::Protocol => write!(f, "modem returned an error response"),
            Error::InvalidSocket => write!(f, "socket mux id is unknown or out of range"),
            Error::Parse => write!(f, "unexpected response shape from modem"),
            Error::GprsSetup => write!(f, "GPRS bring-up sequence failed"),
            Error::BufferFull => write!(f, "fixed-capacity buffer is full"),
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = core::result::Result<T, Error>;
