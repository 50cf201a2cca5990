//! The modem session: ties the transport, clock, yield hook, debug sink,
//! response matcher and socket table together into the driver's single
//! entry point (spec.md §4.6 "Modem Lifecycle Controller" plus the
//! socket operations of §4.4).
//!
//! Feature leaves (SMS, phonebook, USSD, battery/location/time/DTMF/call)
//! live in their own modules as further `impl` blocks on [`ModemSession`],
//! the way the teacher splits `registration.rs`/`pdp.rs` off `modem.rs`.

use crate::config::{self, ModemVariant};
use crate::error::{Error, Result};
use crate::logger::{DebugSink, NullSink};
use crate::matcher::ResponseMatcher;
use crate::send_at;
use crate::socket::SocketTable;
use crate::transport::{Clock, NoYield, Transport, Yield};
use crate::types::{RegStatus, SimStatus};
use heapless::String;

/// Default timeout for routine AT commands that don't override it.
pub const DEFAULT_TIMEOUT_MS: u32 = 1000;
/// Timeout for network registration polling commands.
pub const REGISTRATION_TIMEOUT_MS: u32 = 10_000;
/// Settle delay after a radio power-state change (`+CFUN`).
pub const RADIO_SETTLE_MS: u32 = 3_000;

/// Owns one modem's transport and derived state. `RX` sizes every
/// socket's ring buffer; `T`/`C`/`Y`/`S` are host-supplied collaborators.
pub struct ModemSession<
    T: Transport,
    C: Clock,
    Y: Yield = NoYield,
    S: DebugSink = NullSink,
    const RX: usize = { config::DEFAULT_RX_BUFFER },
> {
    transport: T,
    clock: C,
    yielder: Y,
    sink: S,
    variant: ModemVariant,
    matcher: ResponseMatcher<{ config::SCRATCH_CAPACITY }>,
    sockets: SocketTable<RX, { config::MUX_COUNT }>,
}

impl<T: Transport, C: Clock, Y: Yield, S: DebugSink, const RX: usize>
    ModemSession<T, C, Y, S, RX>
{
    pub fn new(transport: T, clock: C, yielder: Y, sink: S, variant: ModemVariant) -> Self {
        Self {
            transport,
            clock,
            yielder,
            sink,
            variant,
            matcher: ResponseMatcher::new(),
            sockets: SocketTable::new(),
        }
    }

    pub fn variant(&self) -> ModemVariant {
        self.variant
    }

    /// Human-readable model name for the configured [`ModemVariant`], per
    /// TinyGSM's `getModemName` (minus its `AT+GMM` firmware-string probe,
    /// which this driver doesn't need since the variant is already known
    /// at construction time rather than detected at runtime).
    pub fn get_modem_name(&self) -> &'static str {
        self.variant.model_name()
    }

    /// Direct access to the host collaborators, for feature-leaf modules
    /// that need to assemble an AT command with [`send_at!`] themselves.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub(crate) fn sockets_mut(&mut self) -> &mut SocketTable<RX, { config::MUX_COUNT }> {
        &mut self.sockets
    }

    pub(crate) fn sockets(&self) -> &SocketTable<RX, { config::MUX_COUNT }> {
        &self.sockets
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Waits up to `timeout_ms` for one of `terminators` to match,
    /// dispatching URCs against the socket table inline. Mirrors
    /// spec.md §4.2's `wait_response` exactly.
    pub fn wait_response(&mut self, timeout_ms: u32, terminators: &[&[u8]]) -> u8 {
        self.matcher.wait(
            &mut self.transport,
            &self.clock,
            &mut self.yielder,
            &mut self.sink,
            timeout_ms,
            terminators,
            &mut self.sockets,
        )
    }

    /// The text accumulated by the last [`ModemSession::wait_response`]
    /// call, not yet cleared.
    pub fn last_response(&self) -> &str {
        core::str::from_utf8(self.matcher.buffer()).unwrap_or("")
    }

    /// Clears the scratch buffer; call before assembling the next command
    /// so `last_response` reflects only that command's reply.
    pub fn reset_scratch(&mut self) {
        self.matcher.clear();
    }

    /// Sends a bare `AT` command (no feature-specific parsing) and waits
    /// for `OK`/`ERROR`, returning whether it was `OK`.
    pub fn exec_ok(&mut self, timeout_ms: u32) -> bool {
        self.wait_response(timeout_ms, &[]) == 1
    }

    // -- Lifecycle (spec.md §4.6) -----------------------------------

    /// Probes with a bounded sequence of bare `AT` (up to 10 tries, 1 s
    /// each) until `OK`, then `&FZ` (factory defaults + reset) and `E0`
    /// (echo off), then queries SIM status. If locked and `pin` was
    /// supplied, issues `AT+CPIN=<pin>` and re-queries. Returns true iff
    /// the SIM ends up `Ready`, or `Locked` with no PIN offered.
    pub fn init(&mut self, pin: Option<&str>) -> bool {
        let mut probed = false;
        for _ in 0..10 {
            self.reset_scratch();
            send_at!(&mut self.transport, "");
            if self.wait_response(1_000, &[]) == 1 {
                probed = true;
                break;
            }
        }
        if !probed {
            return false;
        }

        self.reset_scratch();
        send_at!(&mut self.transport, "&FZ");
        if !self.exec_ok(DEFAULT_TIMEOUT_MS) {
            return false;
        }

        self.reset_scratch();
        send_at!(&mut self.transport, "E0");
        if !self.exec_ok(DEFAULT_TIMEOUT_MS) {
            return false;
        }

        let status = match self.get_sim_status() {
            Ok(s) => s,
            Err(_) => return false,
        };
        match status {
            SimStatus::Ready => true,
            SimStatus::Locked => match pin {
                Some(pin) => {
                    self.sim_unlock(pin);
                    matches!(self.get_sim_status(), Ok(SimStatus::Ready))
                }
                None => true,
            },
            SimStatus::Error => false,
        }
    }

    /// `+CLTS=1` -> `&W` -> `+CFUN=0` -> `+CFUN=1,1` -> settle delay ->
    /// re-run [`ModemSession::init`].
    pub fn restart(&mut self, pin: Option<&str>) -> bool {
        self.reset_scratch();
        send_at!(&mut self.transport, "+CLTS=1");
        if !self.exec_ok(DEFAULT_TIMEOUT_MS) {
            return false;
        }
        self.reset_scratch();
        send_at!(&mut self.transport, "&W");
        if !self.exec_ok(DEFAULT_TIMEOUT_MS) {
            return false;
        }
        self.reset_scratch();
        send_at!(&mut self.transport, "+CFUN=0");
        if !self.exec_ok(DEFAULT_TIMEOUT_MS) {
            return false;
        }
        self.reset_scratch();
        send_at!(&mut self.transport, "+CFUN=1,1");
        if !self.exec_ok(RADIO_SETTLE_MS) {
            return false;
        }
        self.clock.delay_ms(RADIO_SETTLE_MS);
        self.init(pin)
    }

    /// The full `gprsConnect` bring-up sequence (spec.md §4.6): bearer
    /// profile via `+SAPBR`, PDP context via `+CGDCONT`, context
    /// activation, bearer open/query, attach, multiplexing/quick-send/
    /// manual-receive mode, `+CSTT`/`+CIICR` dial-up, IP readout and DNS
    /// configuration. Any step's non-success aborts with `false`.
    pub fn gprs_connect(&mut self, apn: &str, user: &str, pass: &str) -> bool {
        macro_rules! step {
            ($timeout:expr, $($frag:expr),+ $(,)?) => {{
                self.reset_scratch();
                send_at!(&mut self.transport, $($frag),+);
                if !self.exec_ok($timeout) {
                    return false;
                }
            }};
        }

        self.reset_scratch();
        send_at!(&mut self.transport, "+CIPSHUT");
        self.wait_response(60_000, &[]);

        step!(DEFAULT_TIMEOUT_MS, "+SAPBR=3,1,\"Contype\",\"GPRS\"");
        step!(DEFAULT_TIMEOUT_MS, "+SAPBR=3,1,\"APN\",\"", apn, "\"");
        if !user.is_empty() {
            step!(DEFAULT_TIMEOUT_MS, "+SAPBR=3,1,\"USER\",\"", user, "\"");
        }
        if !pass.is_empty() {
            step!(DEFAULT_TIMEOUT_MS, "+SAPBR=3,1,\"PWD\",\"", pass, "\"");
        }
        step!(DEFAULT_TIMEOUT_MS, "+CGDCONT=1,\"IP\",\"", apn, "\"");
        step!(60_000, "+CGACT=1,1");
        step!(85_000, "+SAPBR=1,1");
        step!(30_000, "+SAPBR=2,1");
        step!(60_000, "+CGATT=1");
        step!(DEFAULT_TIMEOUT_MS, "+CIPMUX=1");
        step!(DEFAULT_TIMEOUT_MS, "+CIPQSEND=1");
        step!(DEFAULT_TIMEOUT_MS, "+CIPRXGET=1");
        step!(DEFAULT_TIMEOUT_MS, "+CSTT=\"", apn, "\",\"", user, "\",\"", pass, "\"");
        step!(60_000, "+CIICR");
        step!(DEFAULT_TIMEOUT_MS, "+CIFSR;E0");
        step!(DEFAULT_TIMEOUT_MS, "+CDNSCFG=\"8.8.8.8\",\"8.8.4.4\"");
        true
    }

    /// `+CIPSHUT` (60s) then `+CGATT=0` (60s), per spec.md §4.6.
    pub fn gprs_disconnect(&mut self) -> bool {
        self.reset_scratch();
        send_at!(&mut self.transport, "+CIPSHUT");
        let shut_ok = self.wait_response(60_000, &[]) == 1;
        self.reset_scratch();
        send_at!(&mut self.transport, "+CGATT=0");
        let detach_ok = self.wait_response(60_000, &[]) == 1;
        shut_ok && detach_ok
    }

    /// `AT+CPOWD=1`: orderly power-down, waits for `NORMAL POWER DOWN`.
    pub fn poweroff(&mut self) -> bool {
        self.reset_scratch();
        send_at!(&mut self.transport, "+CPOWD=1");
        self.wait_response(DEFAULT_TIMEOUT_MS, &[b"NORMAL POWER DOWN\r\n"]) == 1
    }

    /// `AT+CFUN=0`, then the mandatory settle delay before the radio is
    /// considered off.
    pub fn radio_off(&mut self) -> bool {
        self.reset_scratch();
        send_at!(&mut self.transport, "+CFUN=0");
        let ok = self.exec_ok(DEFAULT_TIMEOUT_MS);
        if ok {
            self.clock.delay_ms(RADIO_SETTLE_MS);
        }
        ok
    }

    pub fn radio_on(&mut self) -> bool {
        self.reset_scratch();
        send_at!(&mut self.transport, "+CFUN=1");
        self.exec_ok(RADIO_SETTLE_MS)
    }

    /// `AT+CSCLK=<0|1>`: toggles the modem's own UART sleep mode.
    pub fn sleep_enable(&mut self, enable: bool) -> bool {
        self.reset_scratch();
        let flag: u8 = if enable { 1 } else { 0 };
        send_at!(&mut self.transport, "+CSCLK=", flag);
        self.exec_ok(DEFAULT_TIMEOUT_MS)
    }

    /// `AT+CNETLIGHT=<0|1>`: toggles the modem's network status LED.
    pub fn netlight_enable(&mut self, enable: bool) -> bool {
        self.reset_scratch();
        let flag: u8 = if enable { 1 } else { 0 };
        send_at!(&mut self.transport, "+CNETLIGHT=", flag);
        self.exec_ok(DEFAULT_TIMEOUT_MS)
    }

    /// Resets NVRAM to factory defaults and restores the settings this
    /// driver depends on (echo off, flow control off, 8N1, UART sleep
    /// off), then persists them with `AT&W`.
    pub fn factory_default(&mut self) -> bool {
        self.reset_scratch();
        send_at!(&mut self.transport, "&FZE0&W");
        if !self.exec_ok(DEFAULT_TIMEOUT_MS) {
            return false;
        }
        self.reset_scratch();
        send_at!(&mut self.transport, "+IPR=0");
        self.exec_ok(DEFAULT_TIMEOUT_MS);
        self.reset_scratch();
        send_at!(&mut self.transport, "+IFC=0,0");
        self.exec_ok(DEFAULT_TIMEOUT_MS);
        self.reset_scratch();
        send_at!(&mut self.transport, "+ICF=3,3");
        self.exec_ok(DEFAULT_TIMEOUT_MS);
        self.reset_scratch();
        send_at!(&mut self.transport, "+CSCLK=0");
        self.exec_ok(DEFAULT_TIMEOUT_MS);
        self.reset_scratch();
        send_at!(&mut self.transport, "&W");
        self.exec_ok(DEFAULT_TIMEOUT_MS)
    }

    /// `AT+IPR=<rate>`: sets the UART baud rate the modem expects on its
    /// next boot. The caller is responsible for reconfiguring its own
    /// UART peripheral to match.
    pub fn set_baud(&mut self, rate: u32) -> bool {
        self.reset_scratch();
        send_at!(&mut self.transport, "+IPR=", rate);
        self.exec_ok(DEFAULT_TIMEOUT_MS)
    }

    // -- SIM (spec.md §4.7) ------------------------------------------

    pub fn get_sim_status(&mut self) -> Result<SimStatus> {
        self.reset_scratch();
        send_at!(&mut self.transport, "+CPIN?");
        if self.wait_response(DEFAULT_TIMEOUT_MS, &[]) != 1 {
            return Err(Error::Timeout);
        }
        let text = self.last_response();
        if text.contains("READY") {
            Ok(SimStatus::Ready)
        } else if text.contains("SIM PIN") || text.contains("SIM PUK") {
            Ok(SimStatus::Locked)
        } else {
            Ok(SimStatus::Error)
        }
    }

    pub fn sim_unlock(&mut self, pin: &str) -> bool {
        self.reset_scratch();
        send_at!(&mut self.transport, "+CPIN=\"", pin, "\"");
        self.exec_ok(DEFAULT_TIMEOUT_MS)
    }

    pub fn get_sim_ccid(&mut self) -> Result<String<24>> {
        self.reset_scratch();
        send_at!(&mut self.transport, "+CCID");
        if self.wait_response(DEFAULT_TIMEOUT_MS, &[]) != 1 {
            return Err(Error::Timeout);
        }
        extract_trimmed_line(self.last_response(), "+CCID").ok_or(Error::Parse)
    }

    pub fn get_imei(&mut self) -> Result<String<24>> {
        self.reset_scratch();
        send_at!(&mut self.transport, "+GSN");
        if self.wait_response(DEFAULT_TIMEOUT_MS, &[]) != 1 {
            return Err(Error::Timeout);
        }
        first_digit_run(self.last_response()).ok_or(Error::Parse)
    }

    // -- Registration (spec.md §4.7) ----------------------------------

    pub fn get_registration_status(&mut self) -> Result<RegStatus> {
        self.reset_scratch();
        send_at!(&mut self.transport, "+CREG?");
        if self.wait_response(DEFAULT_TIMEOUT_MS, &[]) != 1 {
            return Err(Error::Timeout);
        }
        let text = self.last_response();
        let code = text
            .rsplit(',')
            .next()
            .and_then(|tail| tail.trim().chars().next())
            .and_then(|c| c.to_digit(10))
            .ok_or(Error::Parse)?;
        Ok(RegStatus::from_code(code as u8))
    }

    pub fn get_signal_quality(&mut self) -> Result<u8> {
        self.reset_scratch();
        send_at!(&mut self.transport, "+CSQ");
        if self.wait_response(DEFAULT_TIMEOUT_MS, &[]) != 1 {
            return Err(Error::Timeout);
        }
        let text = self.last_response();
        let after = text.find("+CSQ:").map(|i| &text[i + 5..]).unwrap_or(text);
        after
            .trim()
            .split(',')
            .next()
            .and_then(|v| v.trim().parse::<u8>().ok())
            .ok_or(Error::Parse)
    }

    pub fn get_operator(&mut self) -> Result<String<24>> {
        self.reset_scratch();
        send_at!(&mut self.transport, "+COPS?");
        if self.wait_response(DEFAULT_TIMEOUT_MS, &[]) != 1 {
            return Err(Error::Timeout);
        }
        quoted_field(self.last_response()).ok_or(Error::Parse)
    }

    pub fn is_network_connected(&mut self) -> bool {
        matches!(self.get_registration_status(), Ok(s) if s.is_registered())
    }

    /// Polls `get_registration_status` until registered or `timeout_ms`
    /// elapses, yielding between polls.
    pub fn wait_for_network(&mut self, timeout_ms: u32) -> bool {
        let deadline = self.clock.now_ms().saturating_add(timeout_ms);
        loop {
            if self.is_network_connected() {
                return true;
            }
            if self.clock.now_ms() >= deadline {
                return false;
            }
            self.yielder.yield_now();
        }
    }

    // -- Socket operations (spec.md §4.4) -----------------------------

    /// Opens mux `mux` as a TCP client to `host:port`, optionally
    /// TLS-wrapped. `mux` must be in `0..MUX_COUNT`. Issues `+CIPSSL=<0|1>`
    /// first when `ssl` is requested (failing that aborts without
    /// `+CIPSTART`), then `+CIPSTART=<mux>,"TCP","<host>",<port>` and
    /// waits up to `timeout_s` seconds for `CONNECT OK` (-> true) or
    /// `CONNECT FAIL`/`ALREADY CONNECT`/`ERROR`/`CLOSE OK` (all -> false).
    pub fn connect(&mut self, mux: u8, host: &str, port: u16, ssl: bool, timeout_s: u32) -> bool {
        if ssl && !self.variant.supports_tls() {
            return false;
        }
        {
            let slot = match self.sockets.get_mut(mux as usize) {
                Some(s) => s,
                None => return false,
            };
            slot.reset();
            slot.state = crate::types::ConnectionState::Connecting;
        }

        if ssl {
            self.reset_scratch();
            send_at!(&mut self.transport, "+CIPSSL=1");
            if !self.exec_ok(DEFAULT_TIMEOUT_MS) {
                if let Some(slot) = self.sockets.get_mut(mux as usize) {
                    slot.state = crate::types::ConnectionState::Absent;
                }
                return false;
            }
        } else {
            self.reset_scratch();
            send_at!(&mut self.transport, "+CIPSSL=0");
            self.exec_ok(DEFAULT_TIMEOUT_MS);
        }

        self.reset_scratch();
        send_at!(
            &mut self.transport,
            "+CIPSTART=",
            mux,
            ",\"TCP\",\"",
            host,
            "\",",
            port
        );
        let idx = self.wait_response(
            timeout_s.saturating_mul(1000),
            &[
                b"CONNECT OK\r\n",
                b"CONNECT FAIL\r\n",
                b"ALREADY CONNECT\r\n",
                b"ERROR\r\n",
                b"CLOSE OK\r\n",
            ],
        );
        let connected = idx == 1;
        if let Some(slot) = self.sockets.get_mut(mux as usize) {
            if connected {
                slot.state = crate::types::ConnectionState::Connected;
                slot.connected = true;
            } else {
                slot.state = crate::types::ConnectionState::Absent;
            }
        }
        connected
    }

    /// `AT+CIPSEND=<mux>,<len>`; waits for the `>` prompt, writes the raw
    /// bytes and flushes, then waits for `DATA ACCEPT:<mux>,<n>` and
    /// returns `n`. Any other response returns `0`.
    pub fn send(&mut self, mux: u8, data: &[u8]) -> usize {
        if !self.sockets.get(mux as usize).map(|s| s.connected).unwrap_or(false) {
            return 0;
        }
        self.reset_scratch();
        send_at!(&mut self.transport, "+CIPSEND=", mux, ",", data.len());
        if self.wait_response(DEFAULT_TIMEOUT_MS, &[b">"]) != 1 {
            return 0;
        }
        self.transport.write(data);
        self.transport.flush();

        // "DATA ACCEPT:<mux>," is matched as a terminator to stop right
        // after the comma; a second wait accumulates the remaining digits
        // and trailing CRLF into the same (uncleared) scratch buffer so
        // `last_response` holds the whole line for parsing.
        let mut prefix: heapless::String<24> = heapless::String::new();
        let _ = core::fmt::Write::write_fmt(&mut prefix, format_args!("DATA ACCEPT:{mux},"));
        if self.wait_response(REGISTRATION_TIMEOUT_MS, &[prefix.as_bytes(), b"SEND FAIL\r\n"]) != 1 {
            return 0;
        }
        if self.wait_response(REGISTRATION_TIMEOUT_MS, &[b"\r\n"]) != 1 {
            return 0;
        }
        parse_data_accept_count(self.last_response()).unwrap_or(0)
    }

    /// `AT+CIPRXGET=2,<mux>,<n>` (mode 3/hex under the `hex-transport`
    /// feature), fetching exactly `out.len()` bytes from the modem into
    /// the socket's ring buffer, then draining up to `out.len()` bytes
    /// from that buffer into `out`.
    pub fn read(&mut self, mux: u8, out: &mut [u8]) -> Result<usize> {
        if !out.is_empty() {
            self.fetch(mux, out.len())?;
        }
        let slot = self
            .sockets
            .get_mut(mux as usize)
            .ok_or(Error::InvalidSocket)?;
        let mut n = 0;
        while n < out.len() {
            match slot.rx.pop() {
                Some(b) => {
                    out[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        if slot.rx.is_empty() && !slot.connected {
            slot.state = crate::types::ConnectionState::Absent;
        }
        Ok(n)
    }

    /// If the ring buffer has bytes, returns its count. Otherwise, if the
    /// URC dispatcher flagged data waiting, issues `AT+CIPRXGET=4,<mux>`
    /// to learn the modem-buffered length; a zero-length answer probes
    /// `AT+CIPSTATUS=<mux>` to refresh `connected`. Stamps the slot's
    /// `last_poll_ms` with the current time on every call, regardless of
    /// which branch below actually talks to the modem.
    pub fn available(&mut self, mux: u8) -> usize {
        let now = self.clock.now_ms();
        let (ring_len, got_data) = match self.sockets.get_mut(mux as usize) {
            Some(s) => {
                s.last_poll_ms = now;
                (s.rx.len(), s.got_data)
            }
            None => return 0,
        };
        if ring_len > 0 {
            return ring_len;
        }
        if !got_data {
            return self.sockets.get(mux as usize).map(|s| s.available).unwrap_or(0);
        }

        self.reset_scratch();
        send_at!(&mut self.transport, "+CIPRXGET=4,", mux);
        if self.wait_response(DEFAULT_TIMEOUT_MS, &[]) != 1 {
            return self.sockets.get(mux as usize).map(|s| s.available).unwrap_or(0);
        }
        let reported = parse_ciprxget4(self.last_response()).unwrap_or(0);
        if let Some(slot) = self.sockets.get_mut(mux as usize) {
            slot.available = reported;
            slot.got_data = false;
        }
        if reported == 0 {
            let _ = self.status(mux);
        }
        reported
    }

    /// `AT+CIPCLOSE=<mux>,1` (quick close); `connected <- false`
    /// immediately, then waits for `OK` up to `max_wait_ms` (best effort).
    /// The slot transitions to [`crate::types::ConnectionState::Absent`]
    /// only once its ring buffer has fully drained (spec.md §4.4's
    /// `Draining` state).
    pub fn close_with_timeout(&mut self, mux: u8, max_wait_ms: u32) -> bool {
        {
            let slot = match self.sockets.get_mut(mux as usize) {
                Some(s) => s,
                None => return false,
            };
            slot.connected = false;
            slot.state = crate::types::ConnectionState::Draining;
        }
        self.reset_scratch();
        send_at!(&mut self.transport, "+CIPCLOSE=", mux, ",1");
        let ok = self.wait_response(max_wait_ms, &[]) == 1;
        if let Some(slot) = self.sockets.get_mut(mux as usize) {
            if slot.rx.is_empty() {
                slot.state = crate::types::ConnectionState::Absent;
            }
        }
        ok
    }

    /// [`ModemSession::close_with_timeout`] with the spec's default 15s
    /// wait.
    pub fn close(&mut self, mux: u8) -> bool {
        self.close_with_timeout(mux, 15_000)
    }

    pub fn status(&mut self, mux: u8) -> Result<crate::types::SocketStatus> {
        use crate::types::SocketStatus;
        self.reset_scratch();
        send_at!(&mut self.transport, "+CIPSTATUS=", mux);
        if self.wait_response(DEFAULT_TIMEOUT_MS, &[]) != 1 {
            return Err(Error::Timeout);
        }
        let text = self.last_response();
        // "REMOTE CLOSING" must be tested before "CLOSING" (substring).
        Ok(if text.contains("REMOTE CLOSING") {
            SocketStatus::RemoteClosing
        } else if text.contains("CLOSING") {
            SocketStatus::Closing
        } else if text.contains("CLOSED") {
            SocketStatus::Closed
        } else if text.contains("CONNECTED") {
            SocketStatus::Connected
        } else if text.contains("INITIAL") {
            SocketStatus::Initial
        } else {
            SocketStatus::Unknown
        })
    }

    /// Issues the `AT+CIPRXGET=2/3,<mux>,<want>` fetch. Waits on the short
    /// terminator `"+CIPRXGET:"` (matching TinyGSM's `modemRead()`, which
    /// calls `waitResponse(GF("+CIPRXGET:"))` rather than reading a whole
    /// line) so the match fires in `match_terminator` before the matcher's
    /// own `\r\n+CIPRXGET:` URC-tail check ever sees the same bytes. The
    /// remaining header fields (`<mode>,<mux>,<requested>,<confirmed>\n`)
    /// are then read directly off the transport the same way the URC
    /// dispatcher reads its own delimited integers, since they haven't
    /// reached scratch yet. `requested` bytes are pulled directly off the
    /// transport after that (two hex chars per byte under `hex-transport`)
    /// into the ring buffer, yielding between bytes when none are
    /// available and bounded by the default command timeout. Updates
    /// `slot.available`.
    fn fetch(&mut self, mux: u8, want: usize) -> Result<()> {
        if want == 0 {
            return Ok(());
        }
        self.reset_scratch();
        #[cfg(feature = "hex-transport")]
        send_at!(&mut self.transport, "+CIPRXGET=3,", mux, ",", want);
        #[cfg(not(feature = "hex-transport"))]
        send_at!(&mut self.transport, "+CIPRXGET=2,", mux, ",", want);

        if self.wait_response(DEFAULT_TIMEOUT_MS, &[b"+CIPRXGET:"]) != 1 {
            return Err(Error::Protocol);
        }

        let header_deadline = self.clock.now_ms().saturating_add(DEFAULT_TIMEOUT_MS);
        macro_rules! read_field {
            ($delim:expr) => {
                crate::matcher::read_delimited_u32(
                    &mut self.transport,
                    &mut self.yielder,
                    &self.clock,
                    header_deadline,
                    $delim,
                )
                .ok_or(Error::Parse)?
            };
        }
        let _mode = read_field!(b',');
        let _mux = read_field!(b',');
        let requested = read_field!(b',') as usize;
        let confirmed = read_field!(b'\n') as usize;

        let byte_budget = if cfg!(feature = "hex-transport") {
            requested * 2
        } else {
            requested
        };
        let deadline = self.clock.now_ms().saturating_add(DEFAULT_TIMEOUT_MS);
        #[cfg_attr(not(feature = "hex-transport"), allow(unused_mut))]
        let mut high_nibble: Option<u8> = None;
        let mut pulled = 0usize;
        while pulled < byte_budget {
            match self.transport.read_byte() {
                Some(byte) => {
                    pulled += 1;
                    #[cfg(feature = "hex-transport")]
                    {
                        if let Some(d) = (byte as char).to_digit(16) {
                            match high_nibble.take() {
                                None => high_nibble = Some(d as u8),
                                Some(hi) => {
                                    if let Some(slot) = self.sockets.get_mut(mux as usize) {
                                        slot.rx.push((hi << 4) | d as u8);
                                    }
                                }
                            }
                        }
                    }
                    #[cfg(not(feature = "hex-transport"))]
                    {
                        if let Some(slot) = self.sockets.get_mut(mux as usize) {
                            slot.rx.push(byte);
                        }
                    }
                }
                None => {
                    self.yielder.yield_now();
                    if self.clock.now_ms() >= deadline {
                        break;
                    }
                }
            }
        }

        // Consume the trailing "\r\nOK\r\n" (or "ERROR\r\n") best-effort;
        // a timeout here doesn't undo the bytes already queued.
        self.reset_scratch();
        self.wait_response(DEFAULT_TIMEOUT_MS, &[]);

        if let Some(slot) = self.sockets.get_mut(mux as usize) {
            slot.available = confirmed;
            slot.got_data = confirmed > 0;
        }
        Ok(())
    }
}

/// Parses `DATA ACCEPT:<mux>,<n>\r\n` (or the tail of it once the
/// `DATA ACCEPT:<mux>,` prefix has already matched as a terminator),
/// returning `n`.
fn parse_data_accept_count(text: &str) -> Option<usize> {
    let start = text.rfind("DATA ACCEPT:")? + "DATA ACCEPT:".len();
    let after_mux = text[start..].find(',').map(|i| start + i + 1)?;
    let end = text[after_mux..]
        .find("\r\n")
        .map(|i| after_mux + i)
        .unwrap_or(text.len());
    text[after_mux..end].trim().parse().ok()
}

/// Parses the `AT+CIPRXGET=4,<mux>` response's `+CIPRXGET: 4,<mux>,<len>`
/// line, returning `len`.
fn parse_ciprxget4(text: &str) -> Option<usize> {
    let start = text.rfind("+CIPRXGET:")? + "+CIPRXGET:".len();
    let end = text[start..].find("\r\n").map(|i| start + i).unwrap_or(text.len());
    text[start..end].split(',').last()?.trim().parse().ok()
}

/// Extracts the trimmed line after a `+PREFIX` echo, per the shape of
/// SIMCom's single-line informational responses (`+CCID`, `+COPS?`, ...).
fn extract_trimmed_line(text: &str, prefix: &str) -> Option<String<24>> {
    let after = text.find(prefix).map(|i| &text[i + prefix.len()..])?;
    let line = after.lines().find(|l| !l.trim().is_empty())?;
    String::try_from(line.trim()).ok()
}

fn first_digit_run(text: &str) -> Option<String<24>> {
    let digits: heapless::String<24> = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

fn quoted_field(text: &str) -> Option<String<24>> {
    let start = text.find('"')? + 1;
    let end = text[start..].find('"')? + start;
    String::try_from(&text[start..end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MockTransport, RecordingSink, StepClock};

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
    fn get_sim_status_parses_ready() {
        let mut s = session(b"+CPIN: READY\r\n\r\nOK\r\n");
        assert_eq!(s.get_sim_status().unwrap(), SimStatus::Ready);
    }

    #[test]
    fn get_sim_status_parses_locked() {
        let mut s = session(b"+CPIN: SIM PIN\r\n\r\nOK\r\n");
        assert_eq!(s.get_sim_status().unwrap(), SimStatus::Locked);
    }

    #[test]
    fn get_signal_quality_parses_csq() {
        let mut s = session(b"+CSQ: 18,0\r\n\r\nOK\r\n");
        assert_eq!(s.get_signal_quality().unwrap(), 18);
    }

    #[test]
    fn get_registration_status_parses_home_registered() {
        let mut s = session(b"+CREG: 0,1\r\n\r\nOK\r\n");
        let status = s.get_registration_status().unwrap();
        assert_eq!(status, RegStatus::OkHome);
        assert!(status.is_registered());
    }

    #[test]
    fn connect_sends_cipssl_then_cipstart_and_marks_connected() {
        let mut s = session(b"OK\r\nCONNECT OK\r\n");
        assert!(s.connect(0, "example.com", 80, false, 30));
        assert_eq!(
            s.transport_mut().written(),
            b"AT+CIPSSL=0\r\nAT+CIPSTART=0,\"TCP\",\"example.com\",80\r\n"
        );
        assert!(s.sockets().get(0).unwrap().connected);
    }

    #[test]
    fn connect_with_ssl_sends_cipssl_1() {
        let mut s = session(b"OK\r\nCONNECT OK\r\n");
        assert!(s.connect(0, "example.com", 443, true, 30));
        assert_eq!(
            s.transport_mut().written(),
            b"AT+CIPSSL=1\r\nAT+CIPSTART=0,\"TCP\",\"example.com\",443\r\n"
        );
    }

    #[test]
    fn connect_failure_leaves_socket_absent() {
        let mut s = session(b"OK\r\nCONNECT FAIL\r\n");
        assert!(!s.connect(0, "example.com", 80, false, 30));
        assert_eq!(
            s.sockets().get(0).unwrap().state,
            crate::types::ConnectionState::Absent
        );
    }

    #[test]
    fn connect_already_connect_counts_as_failure() {
        let mut s = session(b"OK\r\nALREADY CONNECT\r\n");
        assert!(!s.connect(0, "example.com", 80, false, 30));
    }

    #[test]
    fn connect_with_ssl_on_sim900_is_refused_without_transport_activity() {
        let mut s = ModemSession::<MockTransport, StepClock, NoYield, RecordingSink, 64>::new(
            MockTransport::new(b""),
            StepClock::new(1),
            NoYield,
            RecordingSink::default(),
            ModemVariant::Sim900,
        );
        assert!(!s.connect(0, "example.com", 443, true, 30));
        assert!(s.transport_mut().written().is_empty());
    }

    #[test]
    fn send_parses_data_accept_count() {
        let mut s = session(b"> \r\nDATA ACCEPT:1,9\r\n");
        s.sockets_mut().get_mut(1).unwrap().connected = true;
        let n = s.send(1, b"GET /\r\n\r\n");
        assert_eq!(n, 9);
    }

    #[test]
    fn send_on_unconnected_mux_returns_zero() {
        let mut s = session(b"");
        assert_eq!(s.send(2, b"x"), 0);
    }

    #[test]
    fn read_fetches_exact_bytes_via_ciprxget() {
        let mut s = session(b"\r\n+CIPRXGET: 2,1,5,0\nhello\r\nOK\r\n");
        s.sockets_mut().get_mut(1).unwrap().connected = true;
        let mut out = [0u8; 5];
        let n = s.read(1, &mut out).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&out, b"hello");
        assert_eq!(s.sockets().get(1).unwrap().available, 0);
    }

    #[test]
    fn available_queries_modem_when_ring_empty_and_got_data_set() {
        let mut s = session(b"+CIPRXGET: 4,1,7\r\n\r\nOK\r\n");
        s.sockets_mut().get_mut(1).unwrap().got_data = true;
        assert_eq!(s.available(1), 7);
        assert!(!s.sockets().get(1).unwrap().got_data);
    }

    #[test]
    fn available_stamps_last_poll_ms() {
        let mut s = session(b"");
        assert_eq!(s.sockets().get(0).unwrap().last_poll_ms, 0);
        s.available(0);
        let first = s.sockets().get(0).unwrap().last_poll_ms;
        s.available(0);
        let second = s.sockets().get(0).unwrap().last_poll_ms;
        assert!(second > first);
    }

    #[test]
    fn close_marks_disconnected_and_drains_to_absent() {
        let mut s = session(b"CLOSE OK\r\n");
        s.sockets_mut().get_mut(0).unwrap().connected = true;
        assert!(s.close(0));
        let slot = s.sockets().get(0).unwrap();
        assert!(!slot.connected);
        assert_eq!(slot.state, crate::types::ConnectionState::Absent);
    }

    #[test]
    fn status_prefers_remote_closing_over_closing_substring() {
        let mut s = session(b"+CIPSTATUS: 0,0,\"TCP\",\"\",\"\",REMOTE CLOSING\r\n\r\nOK\r\n");
        assert_eq!(s.status(0).unwrap(), crate::types::SocketStatus::RemoteClosing);
    }

    #[test]
    fn init_probes_at_then_resets_and_checks_sim() {
        let mut s = session(b"OK\r\nOK\r\nOK\r\n+CPIN: READY\r\n\r\nOK\r\n");
        assert!(s.init(None));
    }

    #[test]
    fn gprs_disconnect_runs_cipshut_then_cgatt_off() {
        let mut s = session(b"OK\r\nOK\r\n");
        assert!(s.gprs_disconnect());
        assert_eq!(
            s.transport_mut().written(),
            b"AT+CIPSHUT\r\nAT+CGATT=0\r\n"
        );
    }
}
