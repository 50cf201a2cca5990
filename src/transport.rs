//! Host-supplied collaborators: the byte transport, the monotonic clock
//! and the cooperative yield hook. None of these are implemented by this
//! crate for a specific chip; the host environment supplies them.

/// A minimal, non-blocking byte transport. The matcher never blocks
/// inside a single `read_byte`/`available` call -- all waiting happens in
/// the matcher's own deadline loop.
pub trait Transport {
    /// Returns the next buffered byte, or `None` if nothing is available
    /// right now. Must not block.
    fn read_byte(&mut self) -> Option<u8>;

    /// Writes bytes to the modem. May buffer internally; call `flush` to
    /// push buffered bytes out.
    fn write(&mut self, bytes: &[u8]);

    /// Flushes any buffered output.
    fn flush(&mut self);

    /// Number of bytes currently buffered and ready to read.
    fn available(&self) -> usize;
}

/// Blanket impl over the `embedded-io` traits, so a host that already has
/// a blocking UART wired up through `embedded-io` gets `Transport` for
/// free.
impl<T> Transport for T
where
    T: embedded_io::Read + embedded_io::Write + embedded_io::ReadReady,
{
    fn read_byte(&mut self) -> Option<u8> {
        if !self.read_ready().unwrap_or(false) {
            return None;
        }
        let mut buf = [0u8; 1];
        match self.read(&mut buf) {
            Ok(1) => Some(buf[0]),
            _ => None,
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        let _ = embedded_io::Write::write_all(self, bytes);
    }

    fn flush(&mut self) {
        let _ = embedded_io::Write::flush(self);
    }

    fn available(&self) -> usize {
        // embedded-io's ReadReady is boolean; report 1 byte available
        // rather than an exact count, since callers only ever branch on
        // zero-vs-nonzero.
        match embedded_io::ReadReady::read_ready(self) {
            Ok(true) => 1,
            _ => 0,
        }
    }
}

/// Monotonic millisecond time source plus a blocking delay, used by the
/// lifecycle sequences that need to wait out a fixed settle time (e.g.
/// 3 s after `+CFUN=1,1`).
pub trait Clock {
    /// Milliseconds since an arbitrary epoch. Must be monotonic.
    fn now_ms(&self) -> u32;

    /// Blocks the calling thread of control for `ms` milliseconds.
    fn delay_ms(&self, ms: u32);
}

/// A hook invoked frequently inside the matcher's wait loop so a host
/// event loop can service other work while the driver waits on the modem.
pub trait Yield {
    fn yield_now(&mut self);
}

/// Default, no-op [`Yield`] implementation.
#[derive(Default)]
pub struct NoYield;

impl Yield for NoYield {
    fn yield_now(&mut self) {}
}
