//! PDU queue and DER matcher (C8).
//!
//! A fixed-capacity, power-of-two ring of outgoing PDUs. The network layer
//! enqueues; the Master FSM dequeues between token passes. `get_reply` is
//! the one operation allowed to skip the FIFO head: it scans from the
//! front for the first entry matching an outstanding Data-Expecting-Reply
//! and pops only that entry, atomically, leaving FIFO order intact for
//! everything else.

#[cfg(feature = "std")]
use std::collections::VecDeque;

#[cfg(not(feature = "std"))]
use alloc::{collections::VecDeque, vec::Vec};

use super::npdu_prefix::{ApduPrefix, NpduPrefix};

/// Default ring capacity. Must be a power of two.
pub const DEFAULT_CAPACITY: usize = 8;

/// Returned by `enqueue` when the ring is full; the network layer decides
/// whether to retry or drop. Not an internal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFull;

/// One outgoing PDU awaiting its turn on the wire.
#[derive(Debug, Clone)]
pub struct QueuedPdu {
    pub destination_mac: u8,
    pub data_expecting_reply: bool,
    pub data: Vec<u8>,
}

/// Bounded FIFO ring of [`QueuedPdu`]s with a reply-matching scan operation.
pub struct PduQueue {
    capacity: usize,
    entries: VecDeque<QueuedPdu>,
}

impl Default for PduQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PduQueue {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// `capacity` must be a power of two; debug-asserted here rather than
    /// returning an error since it is a compile-time-known configuration
    /// constant, never user input.
    pub fn with_capacity(capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two(), "PduQueue capacity must be a power of two");
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Enqueue a PDU for later transmission. FIFO order; never reorders.
    pub fn enqueue(&mut self, pdu: QueuedPdu) -> Result<(), QueueFull> {
        if self.is_full() {
            return Err(QueueFull);
        }
        self.entries.push_back(pdu);
        Ok(())
    }

    /// Peek the FIFO head without removing it.
    pub fn peek_front(&self) -> Option<&QueuedPdu> {
        self.entries.front()
    }

    /// Pop the FIFO head.
    pub fn pop_fifo(&mut self) -> Option<QueuedPdu> {
        self.entries.pop_front()
    }

    /// Scan from the head for the first entry whose NPDU bytes match the
    /// received DER's equivalence rule, and pop only that entry -- FIFO
    /// order among the rest is preserved.
    ///
    /// `decode` is injected (rather than calling [`super::npdu_prefix::decode`]
    /// directly) purely so tests can exercise the matcher against hand-built
    /// prefixes without round-tripping through real NPDU bytes.
    pub fn get_reply(
        &mut self,
        received_der: &[u8],
        decode: fn(&[u8]) -> Option<NpduPrefix>,
    ) -> Option<QueuedPdu> {
        let received = decode(received_der)?;
        let index = self.entries.iter().position(|pdu| {
            decode(&pdu.data)
                .map(|candidate| matches(&received, &candidate))
                .unwrap_or(false)
        })?;
        self.entries.remove(index)
    }
}

fn matches(received: &NpduPrefix, candidate: &NpduPrefix) -> bool {
    if received.protocol_version != candidate.protocol_version {
        return false;
    }

    match (&received.apdu, &candidate.apdu) {
        (a, b) if a.is_abort_or_reject() || b.is_abort_or_reject() => {
            a.invoke_id().is_some() && a.invoke_id() == b.invoke_id()
        }
        (ApduPrefix::ConfirmedRequest { .. }, _) | (_, ApduPrefix::ConfirmedRequest { .. }) => {
            received.apdu.invoke_id() == candidate.apdu.invoke_id()
                && received.apdu.invoke_id().is_some()
                && received.apdu.service_choice() == candidate.apdu.service_choice()
                && received.destination == candidate.destination
                && received.source == candidate.source
        }
        _ => false,
    }
}
