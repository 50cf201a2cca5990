//! USSD feature leaf (spec.md §4.7): `AT+CUSD`, decoding the response
//! DCS byte (15 = GSM-7/ASCII, 72 = UCS2, anything else left as raw text).

use crate::config::DEFAULT_TIMEOUT_MS;
use crate::error::{Error, Result};
use crate::logger::DebugSink;
use crate::send_at;
use crate::session::ModemSession;
use crate::transport::{Clock, Transport, Yield};
use heapless::String;

impl<T: Transport, C: Clock, Y: Yield, S: DebugSink, const RX: usize> ModemSession<T, C, Y, S, RX> {
    /// Sends `code` as a USSD string and returns the decoded reply text.
    /// Matches `sendUSSD`'s sequence exactly: best-effort `+CMGF=1` and
    /// `+CSCS="HEX"` setup (the latter is what makes the modem hex-encode
    /// the `+CUSD:` payload `decode_cusd` assumes), then `+CUSD=1,"<code>"`
    /// whose own `OK`/`ERROR` is checked before a separate 10s wait for
    /// the `+CUSD:` reply line -- a modem `ERROR` on the command itself is
    /// therefore detected immediately rather than only after the full
    /// reply-wait timeout.
    pub fn send_ussd(&mut self, code: &str) -> Result<String<182>> {
        self.reset_scratch();
        send_at!(self.transport_mut(), "+CMGF=1");
        self.exec_ok(DEFAULT_TIMEOUT_MS);

        self.reset_scratch();
        send_at!(self.transport_mut(), "+CSCS=\"HEX\"");
        self.exec_ok(DEFAULT_TIMEOUT_MS);

        self.reset_scratch();
        send_at!(self.transport_mut(), "+CUSD=1,\"", code, "\"");
        if self.wait_response(DEFAULT_TIMEOUT_MS, &[]) != 1 {
            return Err(Error::Protocol);
        }

        self.reset_scratch();
        if self.wait_response(10_000, &[b"+CUSD:"]) != 1 {
            return Err(Error::Timeout);
        }
        if self.wait_response(10_000, &[b"\r\n"]) != 1 {
            return Err(Error::Timeout);
        }
        decode_cusd(self.last_response()).ok_or(Error::Parse)
    }
}

/// Parses `+CUSD: <n>,"<payload>",<dcs>` and decodes `<payload>` per
/// `<dcs>` (spec.md §8's boundary table): `15` is 8-bit data, hex-decoded
/// two characters per byte into ASCII/Latin-1 text; `72` is UCS2 (hex
/// pairs of UTF-16 code units); anything else returns the raw hex string
/// unmodified.
fn decode_cusd(text: &str) -> Option<String<182>> {
    let header_start = text.find("+CUSD:")? + 6;
    let header_line_end = text[header_start..].find("\r\n").map(|i| header_start + i).unwrap_or(text.len());
    let header = &text[header_start..header_line_end];

    let quote_start = header.find('"')? + 1;
    let quote_end = header[quote_start..].find('"')? + quote_start;
    let payload = &header[quote_start..quote_end];
    let dcs: u8 = header[quote_end + 1..]
        .trim_start_matches(|c: char| c == ',' || c.is_whitespace())
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect::<heapless::String<4>>()
        .parse()
        .unwrap_or(15);

    match dcs {
        15 => decode_8bit_hex(payload),
        72 => decode_ucs2_hex(payload),
        _ => String::try_from(payload).ok(),
    }
}

/// Hex-decodes two characters per byte, treating each byte as an
/// ASCII/Latin-1 character -- the DCS==15 "8-bit data" case.
fn decode_8bit_hex(hex: &str) -> Option<String<182>> {
    let bytes = hex.as_bytes();
    if bytes.len() % 2 != 0 {
        return None;
    }
    let mut out: String<182> = String::new();
    let mut i = 0;
    while i < bytes.len() {
        let chunk = core::str::from_utf8(&bytes[i..i + 2]).ok()?;
        let byte = u8::from_str_radix(chunk, 16).ok()?;
        out.push(byte as char).ok()?;
        i += 2;
    }
    Some(out)
}

fn decode_ucs2_hex(hex: &str) -> Option<String<182>> {
    let bytes = hex.as_bytes();
    if bytes.len() % 4 != 0 {
        return None;
    }
    let mut units: heapless::Vec<u16, 91> = heapless::Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let chunk = core::str::from_utf8(&bytes[i..i + 4]).ok()?;
        let unit = u16::from_str_radix(chunk, 16).ok()?;
        units.push(unit).ok()?;
        i += 4;
    }
    let mut out: String<182> = String::new();
    for c in char::decode_utf16(units.iter().copied()).map(|r| r.unwrap_or('\u{FFFD}')) {
        let _ = out.push(c);
    }
    Some(out)
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
    fn send_ussd_runs_setup_then_checks_command_ack_before_reply_wait() {
        let mut s = session(b"OK\r\nOK\r\nOK\r\n\r\n+CUSD: 0,\"48454C4C4F\",15\r\n");
        let reply = s.send_ussd("*123#").unwrap();
        assert_eq!(reply.as_str(), "HELLO");
        assert_eq!(
            s.transport_mut().written(),
            b"AT+CMGF=1\r\nAT+CSCS=\"HEX\"\r\nAT+CUSD=1,\"*123#\"\r\n"
        );
    }

    #[test]
    fn send_ussd_fails_fast_on_command_error() {
        let mut s = session(b"OK\r\nOK\r\nERROR\r\n");
        assert!(s.send_ussd("*123#").is_err());
    }

    #[test]
    fn decodes_dcs_15_as_8bit_hex() {
        let text = "+CUSD: 0,\"42616C616E63653A2024352E3030\",15\r\n\r\nOK\r\n";
        assert_eq!(decode_cusd(text).unwrap().as_str(), "Balance: $5.00");
    }

    #[test]
    fn decodes_ucs2_reply() {
        let text = "+CUSD: 0,\"00480065006C006C006F\",72\r\n\r\nOK\r\n";
        assert_eq!(decode_cusd(text).unwrap().as_str(), "Hello");
    }

    #[test]
    fn unknown_dcs_returns_raw_hex_string() {
        let text = "+CUSD: 0,\"48454C4C4F\",0\r\n\r\nOK\r\n";
        assert_eq!(decode_cusd(text).unwrap().as_str(), "48454C4C4F");
    }
}
