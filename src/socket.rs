//! Socket table and per-mux ring buffers (spec.md §4.4/§4.5).
//!
//! Five logical TCP/UDP connections ("mux" ids 0..MUX) are multiplexed
//! over the one serial line. Each slot owns a fixed-capacity ring buffer
//! that the response matcher fills as `+CIPRXGET: 2,...` data responses
//! are read, and that [`crate::session::ModemSession`] drains on `read`.

use crate::ringbuffer::RingBuffer;
use crate::types::ConnectionState;

/// One logical connection's state and receive buffer.
pub struct SocketSlot<const RX: usize> {
    pub state: ConnectionState,
    /// Mirrors the wire state; flipped to `false` by the `<mux>, CLOSED`
    /// URC or by an explicit `close`.
    pub connected: bool,
    /// Set by the `+CIPRXGET: 1,<mux>` / `+RECEIVE: <mux>,<len>` URCs to
    /// tell the session there is data worth fetching with `AT+CIPRXGET=2`.
    pub got_data: bool,
    /// Best-known byte count waiting on the modem side for this mux, as
    /// last reported by a `+RECEIVE:` URC or a `+CIPRXGET: 4` query.
    pub available: usize,
    /// Clock reading of the last time this slot's pending-data state was
    /// polled (spec.md §3's "last-poll timestamp"), set by
    /// [`crate::session::ModemSession::available`]. `0` until the first
    /// poll.
    pub last_poll_ms: u32,
    pub rx: RingBuffer<RX>,
}

impl<const RX: usize> SocketSlot<RX> {
    pub const fn new() -> Self {
        Self {
            state: ConnectionState::Absent,
            connected: false,
            got_data: false,
            available: 0,
            last_poll_ms: 0,
            rx: RingBuffer::new(),
        }
    }

    pub fn reset(&mut self) {
        self.state = ConnectionState::Absent;
        self.connected = false;
        self.got_data = false;
        self.available = 0;
        self.last_poll_ms = 0;
        self.rx.clear();
    }
}

impl<const RX: usize> Default for SocketSlot<RX> {
    fn default() -> Self {
        Self::new()
    }
}

/// The fixed-size table of `MUX` socket slots.
pub struct SocketTable<const RX: usize, const MUX: usize> {
    slots: [SocketSlot<RX>; MUX],
}

impl<const RX: usize, const MUX: usize> SocketTable<RX, MUX> {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| SocketSlot::new()),
        }
    }

    pub fn get(&self, mux: usize) -> Option<&SocketSlot<RX>> {
        self.slots.get(mux)
    }

    pub fn get_mut(&mut self, mux: usize) -> Option<&mut SocketSlot<RX>> {
        self.slots.get_mut(mux)
    }

    /// The first mux id with [`ConnectionState::Absent`], if any -- used
    /// by `connect` when the caller doesn't pin a specific mux.
    pub fn first_free(&self) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.state == ConnectionState::Absent)
    }

    pub fn len(&self) -> usize {
        MUX
    }

    pub fn is_empty(&self) -> bool {
        MUX == 0
    }
}

impl<const RX: usize, const MUX: usize> Default for SocketTable<RX, MUX> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_free_finds_absent_slot() {
        let mut table: SocketTable<64, 5> = SocketTable::new();
        table.get_mut(0).unwrap().state = ConnectionState::Connected;
        table.get_mut(1).unwrap().state = ConnectionState::Connecting;
        assert_eq!(table.first_free(), Some(2));
    }

    #[test]
    fn reset_clears_all_fields() {
        let mut slot: SocketSlot<8> = SocketSlot::new();
        slot.connected = true;
        slot.got_data = true;
        slot.available = 3;
        slot.last_poll_ms = 42;
        slot.rx.push(1);
        slot.reset();
        assert!(!slot.connected);
        assert!(!slot.got_data);
        assert_eq!(slot.available, 0);
        assert_eq!(slot.last_poll_ms, 0);
        assert!(slot.rx.is_empty());
    }

    #[test]
    fn out_of_range_mux_returns_none() {
        let table: SocketTable<64, 5> = SocketTable::new();
        assert!(table.get(5).is_none());
    }
}
