//! AT line assembler & writer (spec.md §4.1).
//!
//! Fragments are written in order with no separators inserted; callers
//! supply literal `,`/`"` fragments exactly as the wire format requires.

use crate::transport::Transport;
use core::fmt::Write as _;
use heapless::String;

/// One piece of an AT command. Implemented for the handful of fragment
/// kinds `sendAT`'s variadic argument list used in the source this driver
/// is modeled on: string literals, raw bytes, and integers.
pub trait AtFragment {
    fn write_to(&self, transport: &mut dyn Transport);
}

impl AtFragment for &str {
    fn write_to(&self, transport: &mut dyn Transport) {
        transport.write(self.as_bytes());
    }
}

impl AtFragment for char {
    fn write_to(&self, transport: &mut dyn Transport) {
        let mut buf = [0u8; 4];
        transport.write(self.encode_utf8(&mut buf).as_bytes());
    }
}

impl AtFragment for &[u8] {
    fn write_to(&self, transport: &mut dyn Transport) {
        transport.write(self);
    }
}

macro_rules! impl_at_fragment_int {
    ($($t:ty),+ $(,)?) => {
        $(
            impl AtFragment for $t {
                fn write_to(&self, transport: &mut dyn Transport) {
                    let mut buf: String<20> = String::new();
                    let _ = write!(&mut buf, "{}", self);
                    transport.write(buf.as_bytes());
                }
            }
        )+
    };
}

impl_at_fragment_int!(u8, u16, u32, i32, usize);

/// Begins an `AT` command: writes the literal `AT` prefix. Call
/// [`end_command`] after writing every fragment to terminate with CRLF
/// and flush.
pub fn begin_command(transport: &mut dyn Transport) {
    transport.write(b"AT");
}

/// Terminates an AT command with CRLF and flushes the transport.
pub fn end_command(transport: &mut dyn Transport) {
    transport.write(b"\r\n");
    transport.flush();
}

/// Assembles and sends `AT` + the concatenation of every fragment + CRLF,
/// then flushes. Mirrors the teacher's variadic `sendAT(...)`.
#[macro_export]
macro_rules! send_at {
    ($transport:expr, $($frag:expr),+ $(,)?) => {{
        $crate::at::begin_command($transport);
        $( $crate::at::AtFragment::write_to(&$frag, $transport); )+
        $crate::at::end_command($transport);
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockTransport;

    #[test]
    fn assembles_prefix_fragments_and_crlf() {
        let mut t = MockTransport::new(&[]);
        send_at!(&mut t, "+CIPSTART=", 1u8, ',', "\"TCP\",\"", "example.com", "\",", 80u16);
        assert_eq!(
            t.written(),
            b"AT+CIPSTART=1,\"TCP\",\"example.com\",80\r\n"
        );
    }

    #[test]
    fn plain_command_has_no_arguments() {
        let mut t = MockTransport::new(&[]);
        send_at!(&mut t, "E0");
        assert_eq!(t.written(), b"ATE0\r\n");
    }
}
