//! Location, time, battery, DTMF, call and NTP feature leaves. Present in
//! `original_source/src/TinyGsmClientSIM800.h` but described only at
//! interface level by the distillation -- supplemented here since the
//! Non-goals exclude neither.

use crate::config::DEFAULT_TIMEOUT_MS;
use crate::error::{Error, Result};
use crate::logger::DebugSink;
use crate::send_at;
use crate::session::ModemSession;
use crate::transport::{Clock, Transport, Yield};
use heapless::String;

/// Battery charge state, from `AT+CBC`'s first field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatteryChargeState {
    NotCharging,
    Charging,
    Finished,
    Unknown,
}

/// `AT+CBC` parsed three ways: raw percent, raw voltage (mV), and the
/// charge state, bundled the way `get_battery_stats` returns all three
/// from one command in the source this is modeled on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatteryStats {
    pub charge_state: BatteryChargeState,
    pub percent: u8,
    pub millivolts: u16,
}

impl<T: Transport, C: Clock, Y: Yield, S: DebugSink, const RX: usize> ModemSession<T, C, Y, S, RX> {
    /// `AT+CIPGSMLOC=1,1`: cell-tower-assisted location. Returns
    /// `(longitude, latitude)` as decimal-degree strings (kept as text;
    /// this driver does no floating-point parsing in `no_std`).
    pub fn get_gsm_location(&mut self) -> Result<(String<16>, String<16>)> {
        self.reset_scratch();
        send_at!(self.transport_mut(), "+CIPGSMLOC=1,1");
        if self.wait_response(10_000, &[]) != 1 {
            return Err(Error::Timeout);
        }
        let text = self.last_response();
        let header_start = text.find("+CIPGSMLOC:").map(|i| i + 11).ok_or(Error::Parse)?;
        let line_end = text[header_start..].find("\r\n").map(|i| header_start + i).unwrap_or(text.len());
        let mut fields = text[header_start..line_end].split(',').map(|s| s.trim());
        let _locationcode = fields.next().ok_or(Error::Parse)?;
        let lon = fields.next().ok_or(Error::Parse)?;
        let lat = fields.next().ok_or(Error::Parse)?;
        Ok((
            String::try_from(lon).map_err(|_| Error::Parse)?,
            String::try_from(lat).map_err(|_| Error::Parse)?,
        ))
    }

    /// `AT+CCLK?`. The modem reports one of three timestamp shapes
    /// depending on firmware/network settings; this driver normalizes
    /// none of them and returns the quoted field verbatim, matching the
    /// "three format variants" note carried over from the original.
    pub fn get_gsm_datetime(&mut self) -> Result<String<24>> {
        self.reset_scratch();
        send_at!(self.transport_mut(), "+CCLK?");
        if self.wait_response(DEFAULT_TIMEOUT_MS, &[]) != 1 {
            return Err(Error::Timeout);
        }
        let text = self.last_response();
        let start = text.find('"').map(|i| i + 1).ok_or(Error::Parse)?;
        let end = text[start..].find('"').map(|i| start + i).ok_or(Error::Parse)?;
        String::try_from(&text[start..end]).map_err(|_| Error::Parse)
    }

    pub fn get_battery_voltage(&mut self) -> Result<u16> {
        Ok(self.get_battery_stats()?.millivolts)
    }

    pub fn get_battery_percent(&mut self) -> Result<u8> {
        Ok(self.get_battery_stats()?.percent)
    }

    pub fn get_battery_charge_state(&mut self) -> Result<BatteryChargeState> {
        Ok(self.get_battery_stats()?.charge_state)
    }

    /// `AT+CBC`: `+CBC: <state>,<percent>,<millivolts>`.
    pub fn get_battery_stats(&mut self) -> Result<BatteryStats> {
        self.reset_scratch();
        send_at!(self.transport_mut(), "+CBC");
        if self.wait_response(DEFAULT_TIMEOUT_MS, &[]) != 1 {
            return Err(Error::Timeout);
        }
        let text = self.last_response();
        let header_start = text.find("+CBC:").map(|i| i + 5).ok_or(Error::Parse)?;
        let line_end = text[header_start..].find("\r\n").map(|i| header_start + i).unwrap_or(text.len());
        let mut fields = text[header_start..line_end].split(',').map(|s| s.trim());
        let state_code: u8 = fields.next().ok_or(Error::Parse)?.parse().map_err(|_| Error::Parse)?;
        let percent: u8 = fields.next().ok_or(Error::Parse)?.parse().map_err(|_| Error::Parse)?;
        let millivolts: u16 = fields.next().ok_or(Error::Parse)?.parse().map_err(|_| Error::Parse)?;
        Ok(BatteryStats {
            charge_state: match state_code {
                0 => BatteryChargeState::NotCharging,
                1 => BatteryChargeState::Charging,
                2 => BatteryChargeState::Finished,
                _ => BatteryChargeState::Unknown,
            },
            percent,
            millivolts,
        })
    }

    /// Stub: the SIM800/808/868/900 family has no general-purpose
    /// temperature sensor exposed over AT; TinyGSM's `getTemperature`
    /// always returns `0` on this chip family too. Kept as a named leaf
    /// so callers written against the wider TinyGSM interface compile
    /// unmodified, per the decision in DESIGN.md.
    pub fn get_temperature(&mut self) -> Result<f32> {
        Ok(0.0)
    }

    /// `AT+DTMF=<duration>,<digit>`; duration is clamped to [100, 1000]
    /// ms, matching the valid range the modem itself accepts.
    pub fn dtmf_send(&mut self, digit: char, duration_ms: u16) -> bool {
        self.reset_scratch();
        let clamped = duration_ms.clamp(100, 1000);
        send_at!(self.transport_mut(), "+DTMF=", clamped, ",", digit);
        self.exec_ok(DEFAULT_TIMEOUT_MS)
    }

    pub fn call_answer(&mut self) -> bool {
        self.reset_scratch();
        send_at!(self.transport_mut(), "A");
        self.exec_ok(DEFAULT_TIMEOUT_MS)
    }

    pub fn call_number(&mut self, number: &str) -> bool {
        self.reset_scratch();
        send_at!(self.transport_mut(), "D", number, ";");
        self.exec_ok(DEFAULT_TIMEOUT_MS)
    }

    pub fn call_hangup(&mut self) -> bool {
        self.reset_scratch();
        send_at!(self.transport_mut(), "H");
        self.exec_ok(DEFAULT_TIMEOUT_MS)
    }

    /// `AT+GSMBUSY=<1|0>`: rejects incoming calls when `busy` is true.
    pub fn set_gsm_busy(&mut self, busy: bool) -> bool {
        self.reset_scratch();
        let flag: u8 = if busy { 1 } else { 0 };
        send_at!(self.transport_mut(), "+GSMBUSY=", flag);
        self.exec_ok(DEFAULT_TIMEOUT_MS)
    }

    /// `AT+CLIP=1` then waits for a `+CLIP: "<number>",...` URC line,
    /// returning the caller's number.
    pub fn receive_caller_id(&mut self, timeout_ms: u32) -> Result<String<24>> {
        self.reset_scratch();
        send_at!(self.transport_mut(), "+CLIP=1");
        if self.wait_response(DEFAULT_TIMEOUT_MS, &[]) != 1 {
            return Err(Error::Protocol);
        }
        self.reset_scratch();
        if self.wait_response(timeout_ms, &[b"\r\n"]) != 1 {
            return Err(Error::Timeout);
        }
        let text = self.last_response();
        let start = text.find('"').map(|i| i + 1).ok_or(Error::Parse)?;
        let end = text[start..].find('"').map(|i| start + i).ok_or(Error::Parse)?;
        String::try_from(&text[start..end]).map_err(|_| Error::Parse)
    }

    /// `AT+CNTPCID=1` / `AT+CNTP="<server>",<quarter_hour_zone>` then
    /// `AT+CNTP`, waiting for the `+CNTP:` URC. The original's NTP sync
    /// function returns an unsigned error code where `-1` would signal
    /// "no response", impossible to represent in its own unsigned return
    /// type; this driver keeps the sentinel value explicit instead of
    /// coercing it into a valid-looking code -- see DESIGN.md.
    pub fn ntp_server_sync(&mut self, server: &str, quarter_hour_zone: i8) -> Option<u8> {
        self.reset_scratch();
        send_at!(self.transport_mut(), "+CNTPCID=1");
        self.exec_ok(DEFAULT_TIMEOUT_MS);

        self.reset_scratch();
        send_at!(self.transport_mut(), "+CNTP=\"", server, "\",", quarter_hour_zone);
        if !self.exec_ok(DEFAULT_TIMEOUT_MS) {
            return None;
        }

        self.reset_scratch();
        send_at!(self.transport_mut(), "+CNTP");
        if self.wait_response(10_000, &[b"+CNTP:"]) != 1 {
            return None;
        }
        let text = self.last_response();
        let start = text.find("+CNTP:").map(|i| i + 6)?;
        text[start..]
            .trim_start()
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect::<heapless::String<4>>()
            .parse()
            .ok()
    }

    pub fn ntp_error_string(code: u8) -> &'static str {
        match code {
            1 => "network time sync successful",
            2 => "network time sync failed",
            3 => "network error",
            4 => "DNS resolution failed",
            5 => "connection error",
            6 => "connection timeout",
            7 => "server response error",
            8 => "local time invalid",
            _ => "unknown NTP error",
        }
    }
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
    fn parses_battery_stats() {
        let mut s = session(b"+CBC: 0,85,4100\r\n\r\nOK\r\n");
        let stats = s.get_battery_stats().unwrap();
        assert_eq!(stats.charge_state, BatteryChargeState::NotCharging);
        assert_eq!(stats.percent, 85);
        assert_eq!(stats.millivolts, 4100);
    }

    #[test]
    fn get_temperature_stub_returns_zero() {
        let mut s = session(b"");
        assert_eq!(s.get_temperature().unwrap(), 0.0);
    }

    #[test]
    fn dtmf_send_clamps_duration() {
        let mut s = session(b"OK\r\n");
        assert!(s.dtmf_send('5', 50));
        assert_eq!(s.transport_mut().written(), b"AT+DTMF=100,5\r\n");
    }

    #[test]
    fn ntp_error_string_maps_known_code() {
        assert_eq!(
            ModemSession::<MockTransport, StepClock>::ntp_error_string(1),
            "network time sync successful"
        );
    }
}
