//! Response matcher (spec.md §4.2) -- the heart of the driver.
//!
//! Reads bytes until one of up to five caller-supplied terminator
//! patterns is matched, the timeout elapses, or a recognized URC is
//! detected and dispatched inline.

use crate::logger::DebugSink;
use crate::socket::SocketTable;
use crate::transport::{Clock, Transport, Yield};
use heapless::Vec;

/// Default terminators used when a caller passes an empty slice.
pub const DEFAULT_TERMINATORS: [&[u8]; 2] = [b"OK\r\n", b"ERROR\r\n"];

const CIPRXGET_URC_TAIL: &[u8] = b"\r\n+CIPRXGET:";
const RECEIVE_URC_TAIL: &[u8] = b"\r\n+RECEIVE:";
const CLOSED_URC_TAIL: &[u8] = b"CLOSED\r\n";

/// Reads a comma- or newline-delimited ASCII integer directly off the
/// transport, one byte at a time, stopping at (and consuming) the
/// delimiter. Used by the URC dispatcher to pull the small integers that
/// follow `+CIPRXGET:`/`+RECEIVE:` out of the stream without routing them
/// back through the scratch buffer.
pub(crate) fn read_delimited_u32(
    transport: &mut dyn Transport,
    yielder: &mut dyn Yield,
    clock: &dyn Clock,
    deadline_ms: u32,
    delimiter: u8,
) -> Option<u32> {
    let mut value: u32 = 0;
    loop {
        match transport.read_byte() {
            Some(b) if b == delimiter => return Some(value),
            Some(b) if b.is_ascii_digit() => {
                value = value.saturating_mul(10).saturating_add((b - b'0') as u32);
            }
            Some(_) => continue,
            None => {
                yielder.yield_now();
                if clock.now_ms() >= deadline_ms {
                    return None;
                }
            }
        }
    }
}

/// The response matcher. Generic over the scratch buffer capacity so a
/// [`crate::session::ModemSession`] can size it independently of the
/// per-socket ring buffers.
pub struct ResponseMatcher<const SCRATCH: usize> {
    scratch: Vec<u8, SCRATCH>,
}

impl<const SCRATCH: usize> ResponseMatcher<SCRATCH> {
    pub const fn new() -> Self {
        Self {
            scratch: Vec::new(),
        }
    }

    /// The bytes accumulated since the last [`ResponseMatcher::clear`],
    /// including whatever terminator last matched. Callers that need the
    /// text of a response (e.g. `+CSQ: 18,0`) read this right after
    /// [`ResponseMatcher::wait`] returns a nonzero index, before issuing
    /// the next command.
    pub fn buffer(&self) -> &[u8] {
        &self.scratch
    }

    /// Drops the accumulated scratch contents. Callers clear before
    /// sending a new command so the next `wait` starts from an empty
    /// buffer.
    pub fn clear(&mut self) {
        self.scratch.clear();
    }

    /// Waits up to `timeout_ms` for one of `terminators` (at most 5, an
    /// empty slice means [`DEFAULT_TERMINATORS`]) to match the suffix of
    /// the accumulated scratch buffer. Returns the 1-based index of the
    /// matched terminator, or `0` on timeout.
    ///
    /// URCs are recognized and dispatched inline against `sockets` while
    /// waiting; they never count as a match and never stop the loop.
    #[allow(clippy::too_many_arguments)]
    pub fn wait<const RX: usize, const MUX: usize>(
        &mut self,
        transport: &mut dyn Transport,
        clock: &dyn Clock,
        yielder: &mut dyn Yield,
        sink: &mut dyn DebugSink,
        timeout_ms: u32,
        terminators: &[&[u8]],
        sockets: &mut SocketTable<RX, MUX>,
    ) -> u8 {
        let terms: &[&[u8]] = if terminators.is_empty() {
            &DEFAULT_TERMINATORS
        } else {
            terminators
        };

        let deadline = clock.now_ms().saturating_add(timeout_ms);
        if timeout_ms == 0 {
            self.scratch.clear();
            return 0;
        }

        loop {
            yielder.yield_now();

            while transport.available() > 0 {
                let Some(byte) = transport.read_byte() else {
                    break;
                };
                if byte == 0 {
                    continue; // guard against NUL glitches
                }
                if self.scratch.push(byte).is_err() {
                    // Scratch is full and nothing matched yet; drop the
                    // oldest byte to keep making progress rather than
                    // wedging the matcher.
                    self.scratch.remove(0);
                    let _ = self.scratch.push(byte);
                }

                if let Some(index) = self.match_terminator(terms) {
                    return index;
                }

                if self.scratch.ends_with(CIPRXGET_URC_TAIL) {
                    if self.handle_ciprxget_urc(transport, clock, yielder, deadline, sockets) {
                        continue;
                    }
                    // mode != 1: this is part of a response, not a URC;
                    // the mode digits were appended back onto scratch by
                    // handle_ciprxget_urc, so fall through and keep
                    // waiting for a terminator to match it.
                    continue;
                }
                if self.scratch.ends_with(RECEIVE_URC_TAIL) {
                    self.handle_receive_urc(transport, clock, yielder, deadline, sockets);
                    continue;
                }
                if self.scratch.ends_with(CLOSED_URC_TAIL) {
                    self.handle_closed_urc(sockets);
                    continue;
                }
            }

            if clock.now_ms() >= deadline {
                self.trim_and_report_unhandled(sink);
                return 0;
            }
        }
    }

    fn match_terminator(&self, terms: &[&[u8]]) -> Option<u8> {
        for (i, term) in terms.iter().enumerate().take(5) {
            if !term.is_empty() && self.scratch.ends_with(term) {
                return Some((i + 1) as u8);
            }
        }
        None
    }

    /// `\r\n+CIPRXGET:` is only a URC when followed by mode `1`. Any other
    /// mode means this tail is part of a response to a data-fetch command
    /// and must be left in scratch so a terminator test can still match
    /// it. Returns `true` iff the URC was consumed (mode == 1).
    fn handle_ciprxget_urc<const RX: usize, const MUX: usize>(
        &mut self,
        transport: &mut dyn Transport,
        clock: &dyn Clock,
        yielder: &mut dyn Yield,
        deadline: u32,
        sockets: &mut SocketTable<RX, MUX>,
    ) -> bool {
        let Some(mode) = read_delimited_u32(transport, yielder, clock, deadline, b',') else {
            return false;
        };
        if mode == 1 {
            if let Some(mux) =
                read_delimited_u32(transport, yielder, clock, deadline, b'\n')
            {
                if let Some(slot) = sockets.get_mut(mux as usize) {
                    slot.got_data = true;
                }
            }
            self.scratch.clear();
            true
        } else {
            // Put the mode digits back so the terminator test on the next
            // iteration still sees them (e.g. "+CIPRXGET: 2,...").
            let mut digits = heapless::String::<10>::new();
            let _ = core::fmt::Write::write_fmt(&mut digits, format_args!("{mode}"));
            for b in digits.as_bytes() {
                let _ = self.scratch.push(*b);
            }
            false
        }
    }

    fn handle_receive_urc<const RX: usize, const MUX: usize>(
        &mut self,
        transport: &mut dyn Transport,
        clock: &dyn Clock,
        yielder: &mut dyn Yield,
        deadline: u32,
        sockets: &mut SocketTable<RX, MUX>,
    ) {
        let mux = read_delimited_u32(transport, yielder, clock, deadline, b',');
        let len = read_delimited_u32(transport, yielder, clock, deadline, b'\n');
        if let (Some(mux), Some(len)) = (mux, len) {
            if let Some(slot) = sockets.get_mut(mux as usize) {
                slot.got_data = true;
                slot.available = len as usize;
            }
        }
        self.scratch.clear();
    }

    /// `<mux>, CLOSED\r\n` -- the mux id is the integer immediately after
    /// the preceding CRLF, read back out of the already-buffered scratch
    /// (unlike the other two URCs, this one is fully inside scratch by
    /// the time its tail matches).
    fn handle_closed_urc<const RX: usize, const MUX: usize>(
        &mut self,
        sockets: &mut SocketTable<RX, MUX>,
    ) {
        let text = core::str::from_utf8(&self.scratch).unwrap_or("");
        let before_closed = text.len().saturating_sub(CLOSED_URC_TAIL.len());
        let head = &text[..before_closed];
        let line_start = head.rfind("\r\n").map(|i| i + 2).unwrap_or(0);
        let line = &head[line_start..];
        let mux_digits: heapless::String<4> = line
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if let Ok(mux) = mux_digits.parse::<usize>() {
            if let Some(slot) = sockets.get_mut(mux) {
                slot.connected = false;
            }
        }
        self.scratch.clear();
    }

    fn trim_and_report_unhandled(&mut self, sink: &mut dyn DebugSink) {
        let trimmed_len = {
            let s = core::str::from_utf8(&self.scratch).unwrap_or("");
            s.trim().len()
        };
        if trimmed_len > 0 {
            if let Ok(s) = core::str::from_utf8(&self.scratch) {
                crate::dbg_line!(sink, "unhandled: {}", s.trim());
            }
        }
        self.scratch.clear();
    }
}

impl<const SCRATCH: usize> Default for ResponseMatcher<SCRATCH> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::SocketTable;
    use crate::testutil::{MockTransport, RecordingSink, StepClock};
    use crate::transport::NoYield;

    fn wait_on(
        script: &[u8],
        timeout_ms: u32,
        terms: &[&[u8]],
    ) -> (u8, SocketTable<64, 5>) {
        let mut transport = MockTransport::new(script);
        let clock = StepClock::new(1);
        let mut yielder = NoYield;
        let mut sink = RecordingSink::default();
        let mut sockets: SocketTable<64, 5> = SocketTable::new();
        let mut matcher: ResponseMatcher<256> = ResponseMatcher::new();
        let idx = matcher.wait(
            &mut transport,
            &clock,
            &mut yielder,
            &mut sink,
            timeout_ms,
            terms,
            &mut sockets,
        );
        (idx, sockets)
    }

    #[test]
    fn matches_default_ok_terminator() {
        let (idx, _) = wait_on(b"OK\r\n", 1000, &[]);
        assert_eq!(idx, 1);
    }

    #[test]
    fn matches_error_terminator() {
        let (idx, _) = wait_on(b"ERROR\r\n", 1000, &[]);
        assert_eq!(idx, 2);
    }

    #[test]
    fn zero_timeout_returns_immediately() {
        let (idx, _) = wait_on(b"OK\r\n", 0, &[]);
        assert_eq!(idx, 0);
    }

    #[test]
    fn dispatches_ciprxget_notify_urc_without_matching() {
        let mut script: heapless::Vec<u8, 64> = heapless::Vec::new();
        script.extend_from_slice(b"\r\n+CIPRXGET: 1,2\n").unwrap();
        script.extend_from_slice(b"OK\r\n").unwrap();
        let (idx, sockets) = wait_on(&script, 1000, &[]);
        assert_eq!(idx, 1);
        assert!(sockets.get(2).unwrap().got_data);
    }

    #[test]
    fn ciprxget_mode_other_than_one_is_a_response_terminator() {
        let (idx, _) = wait_on(
            b"\r\n+CIPRXGET: 2,1,5,0\n",
            1000,
            &[b"+CIPRXGET:"],
        );
        assert_eq!(idx, 1);
    }

    #[test]
    fn dispatches_receive_urc() {
        let mut script: heapless::Vec<u8, 64> = heapless::Vec::new();
        script.extend_from_slice(b"\r\n+RECEIVE: 1,5\n").unwrap();
        script.extend_from_slice(b"OK\r\n").unwrap();
        let (idx, sockets) = wait_on(&script, 1000, &[]);
        assert_eq!(idx, 1);
        let slot = sockets.get(1).unwrap();
        assert!(slot.got_data);
        assert_eq!(slot.available, 5);
    }

    #[test]
    fn dispatches_closed_urc_mid_wait() {
        let mut script: heapless::Vec<u8, 64> = heapless::Vec::new();
        script.extend_from_slice(b"\r\n1, CLOSED\r\n").unwrap();
        script.extend_from_slice(b"OK\r\n").unwrap();
        let (idx, sockets) = wait_on(&script, 1000, &[]);
        assert_eq!(idx, 1);
        assert!(!sockets.get(1).unwrap().connected);
    }

    #[test]
    fn mux_out_of_range_in_urc_is_ignored() {
        let mut script: heapless::Vec<u8, 64> = heapless::Vec::new();
        script.extend_from_slice(b"\r\n+RECEIVE: 9,5\n").unwrap();
        script.extend_from_slice(b"OK\r\n").unwrap();
        let (idx, _sockets) = wait_on(&script, 1000, &[]);
        assert_eq!(idx, 1); // no panic, URC silently ignored
    }
}
