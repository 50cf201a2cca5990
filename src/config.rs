//! Compile-time and runtime configuration surfaces.
//!
//! `RX_BUFFER` and `PHONEBOOK_RESULTS` are const generics on
//! [`crate::session::ModemSession`] rather than crate-wide constants, so a
//! host can size several sessions differently in one binary. `MUX_COUNT`
//! is protocol-mandated and therefore a plain constant, not configurable.
//! `USE_HEX` is the `hex-transport` Cargo feature. `MODEM_VARIANT` is the
//! runtime [`ModemVariant`] enum below.

/// Number of logical TCP connections multiplexed over the AT channel.
/// Fixed by the SIMCom protocol, not by this driver.
pub const MUX_COUNT: usize = 5;

/// Default ring buffer capacity per socket, used when a caller doesn't
/// pick a different `RX_BUFFER` const generic.
pub const DEFAULT_RX_BUFFER: usize = 64;

/// Default maximum number of indices `find_phonebook_entries` returns.
pub const DEFAULT_PHONEBOOK_RESULTS: usize = 5;

/// Capacity of the matcher's scratch buffer. Large enough to hold any
/// single AT response line this driver parses; see DESIGN.md for why this
/// is fixed-capacity rather than the growing buffer spec.md describes.
pub const SCRATCH_CAPACITY: usize = 256;

/// SIMCom chip variant. Affects only the reported model string and
/// whether `+CIPSSL` (TLS) is usable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModemVariant {
    Sim800,
    Sim808,
    Sim868,
    Sim900,
}

impl ModemVariant {
    /// Human-readable model name, as reported by `get_modem_name`.
    pub const fn model_name(self) -> &'static str {
        match self {
            ModemVariant::Sim800 => "SIMCom SIM800",
            ModemVariant::Sim808 => "SIMCom SIM808",
            ModemVariant::Sim868 => "SIMCom SIM868",
            ModemVariant::Sim900 => "SIMCom SIM900",
        }
    }

    /// The SIM900 doesn't implement `AT+CIPSSL`; every other variant does.
    pub const fn supports_tls(self) -> bool {
        !matches!(self, ModemVariant::Sim900)
    }
}
