//! Phonebook feature leaves (spec.md §4.7): `AT+CPBS`/`AT+CPBW`/`AT+CPBR`/
//! `AT+CPBF`.

use crate::config::{DEFAULT_TIMEOUT_MS, DEFAULT_PHONEBOOK_RESULTS};
use crate::error::{Error, Result};
use crate::logger::DebugSink;
use crate::send_at;
use crate::session::ModemSession;
use crate::transport::{Clock, Transport, Yield};
use crate::types::{PhonebookEntry, PhonebookStorage, PhonebookStorageType};

impl<T: Transport, C: Clock, Y: Yield, S: DebugSink, const RX: usize> ModemSession<T, C, Y, S, RX> {
    pub fn get_phonebook_storage(&mut self) -> Result<PhonebookStorage> {
        self.reset_scratch();
        send_at!(self.transport_mut(), "+CPBS?");
        if self.wait_response(DEFAULT_TIMEOUT_MS, &[]) != 1 {
            return Err(Error::Timeout);
        }
        parse_cpbs(self.last_response()).ok_or(Error::Parse)
    }

    pub fn set_phonebook_storage(&mut self, storage: PhonebookStorageType) -> bool {
        self.reset_scratch();
        let code = match storage {
            PhonebookStorageType::Sim => "SM",
            PhonebookStorageType::Phone => "ME",
        };
        send_at!(self.transport_mut(), "+CPBS=\"", code, "\"");
        self.exec_ok(DEFAULT_TIMEOUT_MS)
    }

    /// `AT+CPBW=<index>,"<number>",<type>,"<text>"`. `index = 0` lets the
    /// modem pick the first free slot, mirroring `AT+CPBW=,...`.
    pub fn add_phonebook_entry(&mut self, index: u16, number: &str, text: &str) -> bool {
        self.reset_scratch();
        let type_code: u8 = if number.starts_with('+') { 145 } else { 129 };
        if index == 0 {
            send_at!(
                self.transport_mut(),
                "+CPBW=,\"",
                number,
                "\",",
                type_code,
                ",\"",
                text,
                "\""
            );
        } else {
            send_at!(
                self.transport_mut(),
                "+CPBW=",
                index,
                ",\"",
                number,
                "\",",
                type_code,
                ",\"",
                text,
                "\""
            );
        }
        self.exec_ok(DEFAULT_TIMEOUT_MS)
    }

    pub fn delete_phonebook_entry(&mut self, index: u16) -> bool {
        self.reset_scratch();
        send_at!(self.transport_mut(), "+CPBW=", index);
        self.exec_ok(DEFAULT_TIMEOUT_MS)
    }

    pub fn read_phonebook_entry(&mut self, index: u16) -> Result<PhonebookEntry> {
        self.reset_scratch();
        send_at!(self.transport_mut(), "+CPBR=", index);
        if self.wait_response(DEFAULT_TIMEOUT_MS, &[]) != 1 {
            return Err(Error::Timeout);
        }
        parse_cpbr_line(self.last_response()).ok_or(Error::Parse)
    }

    /// `AT+CPBF="<needle>"`, bounded to `PHONEBOOK_RESULTS` matches (the
    /// default, [`crate::config::DEFAULT_PHONEBOOK_RESULTS`], unless the
    /// caller passes a different `limit`).
    pub fn find_phonebook_entries(
        &mut self,
        needle: &str,
        limit: usize,
    ) -> Result<heapless::Vec<PhonebookEntry, DEFAULT_PHONEBOOK_RESULTS>> {
        self.reset_scratch();
        send_at!(self.transport_mut(), "+CPBF=\"", needle, "\"");
        if self.wait_response(10_000, &[]) != 1 {
            return Err(Error::Timeout);
        }
        let text = self.last_response();
        let mut out = heapless::Vec::new();
        let cap = limit.min(DEFAULT_PHONEBOOK_RESULTS);
        for line in text.lines().filter(|l| l.trim_start().starts_with("+CPBF:")) {
            if out.len() >= cap {
                break;
            }
            if let Some(entry) = parse_cpbr_line(line) {
                let _ = out.push(entry);
            }
        }
        Ok(out)
    }
}

fn parse_cpbs(text: &str) -> Option<PhonebookStorage> {
    let header_start = text.find("+CPBS:")? + 6;
    let header_line_end = text[header_start..].find("\r\n").map(|i| header_start + i).unwrap_or(text.len());
    let header = &text[header_start..header_line_end];
    let mut fields = header.split(',').map(|s| s.trim());
    let storage_type = match fields.next()?.trim_matches('"') {
        "ME" => Some(PhonebookStorageType::Phone),
        "SM" => Some(PhonebookStorageType::Sim),
        _ => None,
    };
    let used = fields.next()?.parse().ok()?;
    let total = fields.next()?.parse().ok()?;
    Some(PhonebookStorage {
        storage_type,
        used,
        total,
    })
}

/// Parses one `+CPBR: <index>,"<number>",<type>,"<text>"` or
/// `+CPBF: ...` line into a [`PhonebookEntry`]. The `type_tag` is
/// `"INTERNATIONAL"` for numeric type 145, `"NATIONAL"` otherwise.
fn parse_cpbr_line(text: &str) -> Option<PhonebookEntry> {
    let marker = if text.contains("+CPBR:") {
        "+CPBR:"
    } else {
        "+CPBF:"
    };
    let header_start = text.find(marker)? + marker.len();
    let header_line_end = text[header_start..].find("\r\n").map(|i| header_start + i).unwrap_or(text.len());
    let header = &text[header_start..header_line_end];
    let mut fields = header.split(',').map(|s| s.trim());
    let _index = fields.next()?;
    let number = fields.next()?.trim_matches('"');
    let type_code: u16 = fields.next()?.parse().ok()?;
    let entry_text = fields.next().unwrap_or("\"\"").trim_matches('"');

    Some(PhonebookEntry {
        number: heapless::String::try_from(number).unwrap_or_default(),
        text: heapless::String::try_from(entry_text).unwrap_or_default(),
        type_tag: if type_code == 145 {
            "INTERNATIONAL"
        } else {
            "NATIONAL"
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModemVariant;
    use crate::testutil::{MockTransport, RecordingSink, StepClock};
    use crate::transport::NoYield;

    fn session(
        script: &[u8],
    ) -> ModemSession<MockTransport, StepClock, NoYield, RecordingSink, 64> {
        ModemSession::new(
            MockTransport::new(script),
            StepClock::new(1),
            NoYield,
            RecordingSink::default(),
            ModemVariant::Sim800,
        )
    }

    #[test]
    fn parses_cpbr_international_number() {
        let text = "+CPBR: 1,\"+15551234567\",145,\"Alice\"\r\n\r\nOK\r\n";
        let entry = parse_cpbr_line(text).unwrap();
        assert_eq!(entry.number.as_str(), "+15551234567");
        assert_eq!(entry.text.as_str(), "Alice");
        assert_eq!(entry.type_tag, "INTERNATIONAL");
    }

    #[test]
    fn parses_cpbr_national_number() {
        let text = "+CPBR: 2,\"5551234567\",129,\"Bob\"\r\n\r\nOK\r\n";
        let entry = parse_cpbr_line(text).unwrap();
        assert_eq!(entry.type_tag, "NATIONAL");
    }

    #[test]
    fn find_phonebook_entries_bounds_to_limit() {
        let script = b"+CPBF: 1,\"+15551111111\",145,\"A\"\r\n+CPBF: 2,\"+15552222222\",145,\"B\"\r\n+CPBF: 3,\"+15553333333\",145,\"C\"\r\n\r\nOK\r\n";
        let mut s = session(script);
        let results = s.find_phonebook_entries("5", 2).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn add_phonebook_entry_with_auto_index() {
        let mut s = session(b"OK\r\n");
        assert!(s.add_phonebook_entry(0, "+15551234567", "Carol"));
        assert_eq!(
            s.transport_mut().written(),
            b"AT+CPBW=,\"+15551234567\",145,\"Carol\"\r\n"
        );
    }
}
