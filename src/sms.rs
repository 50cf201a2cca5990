//! SMS feature leaves (spec.md §4.7 + the UCS2 send path recovered from
//! `sendSMS_UTF16` in `original_source`).

use crate::config::DEFAULT_TIMEOUT_MS;
use crate::error::{Error, Result};
use crate::logger::DebugSink;
use crate::send_at;
use crate::session::ModemSession;
use crate::transport::{Clock, Transport, Yield};
use crate::types::{DeleteAllSmsMethod, MessageStorage, MessageStorageType, Sms, SmsAlphabet, SmsStatus};

impl<T: Transport, C: Clock, Y: Yield, S: DebugSink, const RX: usize> ModemSession<T, C, Y, S, RX> {
    /// Sends a GSM-7 text message via `AT+CMGF=1` / `AT+CMGS`.
    pub fn send_sms(&mut self, number: &str, text: &str) -> Result<()> {
        self.reset_scratch();
        send_at!(self.transport_mut(), "+CMGF=1");
        if self.wait_response(DEFAULT_TIMEOUT_MS, &[]) != 1 {
            return Err(Error::Protocol);
        }

        self.reset_scratch();
        send_at!(self.transport_mut(), "+CMGS=\"", number, "\"");
        if self.wait_response(DEFAULT_TIMEOUT_MS, &[b"> "]) != 1 {
            return Err(Error::Protocol);
        }
        self.transport_mut().write(text.as_bytes());
        self.transport_mut().write(&[0x1a]);
        self.transport_mut().flush();
        if self.wait_response(10_000, &[b"+CMGS:"]) != 1 {
            return Err(Error::Protocol);
        }
        Ok(())
    }

    /// Sends a UCS2/UTF-16 message (`AT+CSCS="UCS2"` then `AT+CMGS`),
    /// hex-encoding each UTF-16 code unit big-endian. Present in the
    /// source this driver is modeled on as `sendSMS_UTF16`; the
    /// distillation dropped it, but nothing in the Non-goals excludes it.
    pub fn send_sms_ucs2(&mut self, number_ucs2_hex: &str, text: &str) -> Result<()> {
        self.reset_scratch();
        send_at!(self.transport_mut(), "+CMGF=1");
        if self.wait_response(DEFAULT_TIMEOUT_MS, &[]) != 1 {
            return Err(Error::Protocol);
        }
        self.reset_scratch();
        send_at!(self.transport_mut(), "+CSCS=\"UCS2\"");
        if self.wait_response(DEFAULT_TIMEOUT_MS, &[]) != 1 {
            return Err(Error::Protocol);
        }

        self.reset_scratch();
        send_at!(self.transport_mut(), "+CMGS=\"", number_ucs2_hex, "\"");
        if self.wait_response(DEFAULT_TIMEOUT_MS, &[b"> "]) != 1 {
            return Err(Error::Protocol);
        }
        let mut hex: heapless::String<320> = heapless::String::new();
        for unit in text.encode_utf16() {
            let _ = core::fmt::Write::write_fmt(&mut hex, format_args!("{unit:04X}"));
        }
        self.transport_mut().write(hex.as_bytes());
        self.transport_mut().write(&[0x1a]);
        self.transport_mut().flush();
        if self.wait_response(10_000, &[b"+CMGS:"]) != 1 {
            return Err(Error::Protocol);
        }
        Ok(())
    }

    /// Reads message `index` with `AT+CMGR=<index>`. The status string is
    /// matched against its literal suffix form (`"REC READ"`, ...) --
    /// see DESIGN.md for why that form is authoritative here.
    pub fn read_sms(&mut self, index: u16) -> Result<Sms> {
        self.reset_scratch();
        send_at!(self.transport_mut(), "+CMGR=", index);
        if self.wait_response(DEFAULT_TIMEOUT_MS, &[]) != 1 {
            return Err(Error::Timeout);
        }
        parse_cmgr(self.last_response()).ok_or(Error::Parse)
    }

    pub fn get_preferred_message_storage(&mut self) -> Result<MessageStorage> {
        self.reset_scratch();
        send_at!(self.transport_mut(), "+CPMS?");
        if self.wait_response(DEFAULT_TIMEOUT_MS, &[]) != 1 {
            return Err(Error::Timeout);
        }
        parse_cpms(self.last_response()).ok_or(Error::Parse)
    }

    pub fn set_preferred_message_storage(&mut self, storage: MessageStorageType) -> bool {
        self.reset_scratch();
        let code = storage_code(storage);
        send_at!(self.transport_mut(), "+CPMS=\"", code, "\"");
        self.exec_ok(DEFAULT_TIMEOUT_MS)
    }

    pub fn delete_sms(&mut self, index: u16) -> bool {
        self.reset_scratch();
        send_at!(self.transport_mut(), "+CMGD=", index);
        self.exec_ok(DEFAULT_TIMEOUT_MS)
    }

    /// `AT+CMGF=0` (PDU mode, required before `+CMGDA`) -> bare numeric
    /// `AT+CMGDA=<method>` -> `AT+CMGF=1` (back to text mode, best effort),
    /// matching `deleteAllSmsMessages`'s bracketing sequence exactly.
    pub fn delete_all_sms(&mut self, method: DeleteAllSmsMethod) -> bool {
        self.reset_scratch();
        send_at!(self.transport_mut(), "+CMGF=0");
        if !self.exec_ok(DEFAULT_TIMEOUT_MS) {
            return false;
        }

        self.reset_scratch();
        let code = method as u8;
        send_at!(self.transport_mut(), "+CMGDA=", code);
        let ok = self.exec_ok(25_000);

        self.reset_scratch();
        send_at!(self.transport_mut(), "+CMGF=1");
        self.exec_ok(DEFAULT_TIMEOUT_MS);

        ok
    }

    /// Enables `+CMTI` unsolicited new-message notifications via
    /// `AT+CNMI`. The notification itself is out of scope for the
    /// response matcher's three recognized URC shapes (spec.md §4.3); a
    /// host that enables this polls `get_unread_message_count` instead of
    /// expecting `wait_response` to surface `+CMTI` inline.
    pub fn receive_new_message_indication(&mut self, enable: bool) -> bool {
        self.reset_scratch();
        if enable {
            send_at!(self.transport_mut(), "+CNMI=2,1,0,0,0");
        } else {
            send_at!(self.transport_mut(), "+CNMI=0,0,0,0,0");
        }
        self.exec_ok(DEFAULT_TIMEOUT_MS)
    }

    /// Counts unread messages via `AT+CMGL="REC UNREAD"`. The status
    /// argument callers of the original passed was ignored by the
    /// underlying `AT+CMGL` call in every observed use -- this driver
    /// keeps that behavior rather than inventing a filter the wire
    /// protocol doesn't expose; see DESIGN.md.
    pub fn get_unread_message_count(&mut self) -> Result<u16> {
        self.reset_scratch();
        send_at!(self.transport_mut(), "+CMGL=\"REC UNREAD\"");
        if self.wait_response(10_000, &[]) != 1 {
            return Err(Error::Timeout);
        }
        let text = self.last_response();
        Ok(text.matches("+CMGL:").count() as u16)
    }
}

fn storage_code(storage: MessageStorageType) -> &'static str {
    match storage {
        MessageStorageType::Sim => "SM",
        MessageStorageType::Phone => "ME",
        MessageStorageType::SimPreferred => "SM_P",
        MessageStorageType::PhonePreferred => "ME_P",
        MessageStorageType::EitherPreferred => "MT",
    }
}

fn storage_from_code(code: &str) -> MessageStorageType {
    match code {
        "ME" => MessageStorageType::Phone,
        "SM_P" => MessageStorageType::SimPreferred,
        "ME_P" => MessageStorageType::PhonePreferred,
        "MT" => MessageStorageType::EitherPreferred,
        _ => MessageStorageType::Sim,
    }
}

/// Parses one `+CMGR: "<status>","<oaddr>","<alpha>","<ts>"\r\n<body>`
/// response. The DCS alphabet isn't present in `+CMGR`'s own header for
/// text mode, so alphabet is left `None` here; PDU-mode callers decode it
/// from the DCS byte via [`SmsAlphabet::from_dcs`] themselves.
fn parse_cmgr(text: &str) -> Option<Sms> {
    let header_start = text.find("+CMGR:")? + 6;
    let header_line_end = text[header_start..].find("\r\n")? + header_start;
    let header = &text[header_start..header_line_end];
    let mut fields = header.split(',');

    let status = fields
        .next()
        .map(|f| f.trim().trim_matches('"'))
        .and_then(SmsStatus::from_str);
    let oaddr = fields.next().map(|f| f.trim().trim_matches('"')).unwrap_or("");
    let alpha = fields.next().map(|f| f.trim().trim_matches('"')).unwrap_or("");
    let ts = fields.next().map(|f| f.trim().trim_matches('"')).unwrap_or("");

    let body_start = header_line_end + 2;
    let body_end = text[body_start..].find("\r\n").map(|i| body_start + i).unwrap_or(text.len());
    let body = text[body_start..body_end].trim();

    Some(Sms {
        status,
        originating_address: heapless::String::try_from(oaddr).unwrap_or_default(),
        alpha_tag: heapless::String::try_from(alpha).unwrap_or_default(),
        timestamp: heapless::String::try_from(ts).unwrap_or_default(),
        alphabet: Some(SmsAlphabet::Gsm7),
        message: heapless::String::try_from(body).unwrap_or_default(),
    })
}

/// Parses `+CPMS: "<t0>",<u0>,<m0>,"<t1>",<u1>,<m1>,"<t2>",<u2>,<m2>`.
fn parse_cpms(text: &str) -> Option<MessageStorage> {
    let header_start = text.find("+CPMS:")? + 6;
    let header_line_end = text[header_start..].find("\r\n").map(|i| header_start + i).unwrap_or(text.len());
    let header = &text[header_start..header_line_end];
    let mut parts: [&str; 9] = [""; 9];
    let mut count = 0;
    for p in header.split(',') {
        if count >= parts.len() {
            break;
        }
        parts[count] = p.trim();
        count += 1;
    }
    if count < 9 {
        return None;
    }
    let mut storage = MessageStorage::default();
    for slot in 0..3 {
        let name = parts[slot * 3].trim_matches('"');
        storage.storage_type[slot] = storage_from_code(name);
        storage.used[slot] = parts[slot * 3 + 1].parse().ok()?;
        storage.total[slot] = parts[slot * 3 + 2].parse().ok()?;
    }
    Some(storage)
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
    fn parses_cmgr_recread() {
        let text = "+CMGR: \"REC READ\",\"+15551234567\",,\"26/07/28,10:00:00+00\"\r\nhello there\r\n\r\nOK\r\n";
        let sms = parse_cmgr(text).unwrap();
        assert_eq!(sms.status, Some(SmsStatus::RecRead));
        assert_eq!(sms.originating_address.as_str(), "+15551234567");
        assert_eq!(sms.message.as_str(), "hello there");
    }

    #[test]
    fn parses_cpms_storage() {
        let text = "+CPMS: \"SM\",3,30,\"SM\",3,30,\"SM\",3,30\r\n\r\nOK\r\n";
        let storage = parse_cpms(text).unwrap();
        assert_eq!(storage.used[0], 3);
        assert_eq!(storage.total[0], 30);
        assert_eq!(storage.storage_type[0], MessageStorageType::Sim);
    }

    #[test]
    fn get_unread_message_count_counts_cmgl_lines() {
        let mut s = session(b"+CMGL: 1,\"REC UNREAD\"\r\nhi\r\n+CMGL: 2,\"REC UNREAD\"\r\nho\r\n\r\nOK\r\n");
        assert_eq!(s.get_unread_message_count().unwrap(), 2);
    }

    #[test]
    fn delete_all_sms_brackets_cmgda_with_pdu_mode_switch() {
        let mut s = session(b"OK\r\nOK\r\nOK\r\n");
        assert!(s.delete_all_sms(DeleteAllSmsMethod::Read));
        assert_eq!(
            s.transport_mut().written(),
            b"AT+CMGF=0\r\nAT+CMGDA=1\r\nAT+CMGF=1\r\n"
        );
    }
}
