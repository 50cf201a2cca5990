//! Driver for SIMCom SIM800/808/868/900 cellular modems over a
//! byte-oriented serial transport.
//!
//! The crate owns the AT request/response engine, URC dispatch and the
//! 5-way socket multiplexing layer; the physical transport, monotonic
//! clock, cooperative yield hook and debug sink are traits the host
//! application implements. See [`session::ModemSession`] for the entry
//! point.
#![cfg_attr(not(test), no_std)]

pub mod at;
pub mod config;
pub mod error;
pub mod logger;
pub mod matcher;
pub mod misc;
pub mod phonebook;
pub mod ringbuffer;
pub mod session;
pub mod sms;
pub mod socket;
pub mod transport;
pub mod types;
pub mod ussd;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{Error, Result};
pub use session::ModemSession;
