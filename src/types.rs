//! Shared data model types from spec.md §3.

use heapless::String;

/// SIM card status, derived from `+CPIN?`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimStatus {
    Error,
    Ready,
    Locked,
}

/// Network registration status. Numeric values match the modem's own
/// `+CREG`/`+CEREG` codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegStatus {
    Unregistered = 0,
    OkHome = 1,
    Searching = 2,
    Denied = 3,
    Unknown = 4,
    OkRoaming = 5,
}

impl RegStatus {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => RegStatus::Unregistered,
            1 => RegStatus::OkHome,
            2 => RegStatus::Searching,
            3 => RegStatus::Denied,
            5 => RegStatus::OkRoaming,
            _ => RegStatus::Unknown,
        }
    }

    pub fn is_registered(self) -> bool {
        matches!(self, RegStatus::OkHome | RegStatus::OkRoaming)
    }
}

/// Connection state of one [`crate::socket::SocketSlot`], per the state
/// machine in spec.md §4.4.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Absent,
    Connecting,
    Connected,
    Draining,
}

/// Result of `AT+CIPSTATUS=<mux>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketStatus {
    Connected,
    Closed,
    Closing,
    RemoteClosing,
    Initial,
    Unknown,
}

/// Phonebook storage backend (`AT+CPBS`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhonebookStorageType {
    Sim,
    Phone,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct PhonebookStorage {
    pub storage_type: Option<PhonebookStorageType>,
    pub used: u8,
    pub total: u8,
}

/// One phonebook row. `type_tag` is `"INTERNATIONAL"` when the numeric
/// type returned by the modem is 145, else `"NATIONAL"`.
#[derive(Clone, Debug)]
pub struct PhonebookEntry {
    pub number: String<40>,
    pub text: String<32>,
    pub type_tag: &'static str,
}

/// SMS preferred-storage backend (`AT+CPMS`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageStorageType {
    Sim,
    Phone,
    SimPreferred,
    PhonePreferred,
    EitherPreferred,
}

/// Result of `AT+CPMS?`: three parallel `<name,used,total>` tuples, one
/// each for read/delete, write/send, and receive storage.
#[derive(Clone, Copy, Debug)]
pub struct MessageStorage {
    pub storage_type: [MessageStorageType; 3],
    pub used: [u8; 3],
    pub total: [u8; 3],
}

/// SMS status as reported in `+CMGR`/`+CMGL` responses. The literal
/// status-string form (`"REC READ"` etc.) is authoritative -- see
/// DESIGN.md for why, over the alternate constant-based comparison also
/// present in the source this was distilled from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SmsStatus {
    RecRead,
    RecUnread,
    StoUnsent,
    StoSent,
    All,
}

impl SmsStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SmsStatus::RecRead => "REC READ",
            SmsStatus::RecUnread => "REC UNREAD",
            SmsStatus::StoUnsent => "STO UNSENT",
            SmsStatus::StoSent => "STO SENT",
            SmsStatus::All => "ALL",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "REC READ" => Some(SmsStatus::RecRead),
            "REC UNREAD" => Some(SmsStatus::RecUnread),
            "STO UNSENT" => Some(SmsStatus::StoUnsent),
            "STO SENT" => Some(SmsStatus::StoSent),
            "ALL" => Some(SmsStatus::All),
            _ => None,
        }
    }
}

/// SMS Data Coding Scheme alphabet, decoded from bits 3..2 of the DCS byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SmsAlphabet {
    Gsm7,
    Data8Bit,
    Ucs2,
    Reserved,
}

impl SmsAlphabet {
    pub fn from_dcs(dcs: u8) -> Self {
        match (dcs >> 2) & 0b11 {
            0b00 => SmsAlphabet::Gsm7,
            0b01 => SmsAlphabet::Data8Bit,
            0b10 => SmsAlphabet::Ucs2,
            _ => SmsAlphabet::Reserved,
        }
    }
}

/// One received/stored SMS message, already decoded for GSM-7/UCS2.
#[derive(Clone, Debug)]
pub struct Sms {
    pub status: Option<SmsStatus>,
    pub originating_address: String<24>,
    pub alpha_tag: String<24>,
    pub timestamp: String<24>,
    pub alphabet: Option<SmsAlphabet>,
    pub message: String<160>,
}

/// `AT+CMGDA` bulk delete selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteAllSmsMethod {
    Read = 1,
    Unread = 2,
    Sent = 3,
    Unsent = 4,
    Received = 5,
    All = 6,
}

impl Default for PhonebookEntry {
    fn default() -> Self {
        Self {
            number: String::new(),
            text: String::new(),
            type_tag: "NATIONAL",
        }
    }
}

impl Default for MessageStorage {
    fn default() -> Self {
        Self {
            storage_type: [MessageStorageType::Sim; 3],
            used: [0; 3],
            total: [0; 3],
        }
    }
}

impl Default for Sms {
    fn default() -> Self {
        Self {
            status: None,
            originating_address: String::new(),
            alpha_tag: String::new(),
            timestamp: String::new(),
            alphabet: None,
            message: String::new(),
        }
    }
}
