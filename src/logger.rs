//! Line-oriented debug sink, generalizing the teacher's UART `log!` macro
//! into a trait the host supplies instead of a hard-coded peripheral.

/// Optional debug sink consumed by the driver. Default is [`NullSink`].
pub trait DebugSink {
    fn write_line(&mut self, line: &str);
}

/// No-op sink; the default when a host doesn't want traces.
#[derive(Default)]
pub struct NullSink;

impl DebugSink for NullSink {
    fn write_line(&mut self, _line: &str) {}
}

/// Formats `$($arg)*` into a fixed-capacity line and forwards it to the
/// sink, mirroring the teacher's `log!` macro but routed through
/// [`DebugSink`] instead of a UART handle. Silently truncates lines
/// longer than 128 bytes rather than failing the caller.
#[macro_export]
macro_rules! dbg_line {
    ($sink:expr, $($arg:tt)*) => {{
        use core::fmt::Write as _;
        let mut buf: heapless::String<128> = heapless::String::new();
        let _ = core::write!(&mut buf, $($arg)*);
        $crate::logger::DebugSink::write_line($sink, &buf);
        #[cfg(feature = "defmt")]
        defmt::trace!("{}", buf.as_str());
    }};
}

/// Logs one half of an AT command exchange (`>>` for what was sent, `<<`
/// for what came back), in the same spirit as the teacher's `log_at!`.
#[macro_export]
macro_rules! dbg_at {
    (sent, $sink:expr, $cmd:expr) => {
        $crate::dbg_line!($sink, ">> {}", $cmd)
    };
    (recv, $sink:expr, $resp:expr) => {
        $crate::dbg_line!($sink, "<< {}", $resp)
    };
}
