//! Receive FSM (C4): the octet-driven MS/TP frame parser.
//!
//! Consumes one input octet per [`ReceiveFsm::step`] call (or a bare silence
//! tick when no octet is available) and reports at most one frame event per
//! completed frame. The caller owning `ts` is responsible for consuming the
//! returned [`FrameEvent`] -- nothing here buffers more than one frame at a
//! time; at most one frame event is ever live at once.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use super::crc::{DataCrc, HeaderCrc};
use super::frame::{MstpFrame, MstpFrameType, BROADCAST_ADDRESS, MIN_DATA_CAPACITY, PREAMBLE};

/// Time a partially-received frame is allowed to sit silent before the
/// parser gives up and returns to `Idle` (~60 ms).
pub const T_FRAME_ABORT_MS: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveState {
    Idle,
    Preamble,
    Header,
    Data,
    DataCrc,
}

/// Local recovery reasons for `ReceivedInvalidFrame`, scoped to this parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingError {
    HeaderCrcMismatch,
    DataCrcMismatch,
    FrameTooLong { declared: usize, capacity: usize },
    Timeout,
    ReceiveError,
}

/// The single "last event" the receive FSM ever holds live, taken on
/// consume by whichever FSM owns `ts`.
#[derive(Debug, Clone)]
pub enum FrameEvent {
    ValidFrame(MstpFrame),
    ValidFrameNotForUs { frame_type: MstpFrameType, source: u8 },
    InvalidFrame(FramingError),
}

struct PartialHeader {
    index: usize,
    octets: [u8; 5],
    crc: HeaderCrc,
}

impl PartialHeader {
    fn new() -> Self {
        Self {
            index: 0,
            octets: [0; 5],
            crc: HeaderCrc::new(),
        }
    }
}

/// Octet-at-a-time MS/TP frame parser.
pub struct ReceiveFsm {
    state: ReceiveState,
    capacity: usize,
    header: PartialHeader,
    frame_type: MstpFrameType,
    destination: u8,
    source: u8,
    data_length: usize,
    data: Vec<u8>,
    data_octets_seen: usize,
    data_crc: DataCrc,
    data_crc_index: usize,
    frame_too_long: bool,
    any_octet_since_preamble: bool,
}

impl ReceiveFsm {
    /// `capacity` is the receive data buffer size; the conventional floor
    /// is 501 bytes, larger is permitted.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: ReceiveState::Idle,
            capacity: capacity.max(MIN_DATA_CAPACITY),
            header: PartialHeader::new(),
            frame_type: MstpFrameType::Token,
            destination: 0,
            source: 0,
            data_length: 0,
            data: Vec::new(),
            data_octets_seen: 0,
            data_crc: DataCrc::new(),
            data_crc_index: 0,
            frame_too_long: false,
            any_octet_since_preamble: false,
        }
    }

    pub fn state(&self) -> ReceiveState {
        self.state
    }

    fn reset_to_idle(&mut self) {
        self.state = ReceiveState::Idle;
        self.header = PartialHeader::new();
        self.data.clear();
        self.data_length = 0;
        self.data_octets_seen = 0;
        self.data_crc = DataCrc::new();
        self.data_crc_index = 0;
        self.frame_too_long = false;
        self.any_octet_since_preamble = false;
    }

    fn dispatch_complete(&mut self, ts: u8) -> FrameEvent {
        let destination = self.destination;
        let source = self.source;
        let frame_type = self.frame_type;
        let event = if destination == ts || destination == BROADCAST_ADDRESS {
            FrameEvent::ValidFrame(MstpFrame {
                frame_type,
                destination,
                source,
                data: core::mem::take(&mut self.data),
            })
        } else {
            FrameEvent::ValidFrameNotForUs { frame_type, source }
        };
        self.reset_to_idle();
        event
    }

    /// Advance the parser by one tick. Pass `octet = Some(byte)` when the
    /// serial driver has a byte ready, `None` for a bare timeout tick.
    /// `receive_error` mirrors a UART framing/overrun error reported by the
    /// driver this tick. `silence_ms` is the port's current silence-timer
    /// reading and `ts` is this station's current address (used only to
    /// classify `ValidFrame` vs `ValidFrameNotForUs`).
    pub fn step(
        &mut self,
        octet: Option<u8>,
        receive_error: bool,
        silence_ms: u32,
        ts: u8,
    ) -> Option<FrameEvent> {
        if receive_error {
            return self.on_receive_error();
        }

        if self.state != ReceiveState::Idle && silence_ms >= T_FRAME_ABORT_MS {
            let header_seen = self.any_octet_since_preamble;
            self.reset_to_idle();
            if header_seen {
                return Some(FrameEvent::InvalidFrame(FramingError::Timeout));
            }
            // Still in `Preamble`: spec.md's PREAMBLE transition says only
            // "return to IDLE", no event -- unlike HEADER/DATA/DATA_CRC,
            // which have consumed octets beyond preamble detection.
            return None;
        }

        let octet = match octet {
            Some(o) => o,
            None => return None,
        };

        match self.state {
            ReceiveState::Idle => {
                if octet == PREAMBLE[0] {
                    self.state = ReceiveState::Preamble;
                }
                None
            }
            ReceiveState::Preamble => {
                if octet == PREAMBLE[1] {
                    self.state = ReceiveState::Header;
                    self.header = PartialHeader::new();
                    self.any_octet_since_preamble = true;
                } else if octet == PREAMBLE[0] {
                    // stay in Preamble
                } else {
                    self.reset_to_idle();
                }
                None
            }
            ReceiveState::Header => self.step_header(octet, ts),
            ReceiveState::Data => self.step_data(octet),
            ReceiveState::DataCrc => self.step_data_crc(octet, ts),
        }
    }

    fn on_receive_error(&mut self) -> Option<FrameEvent> {
        match self.state {
            ReceiveState::Idle => None,
            _ => {
                self.reset_to_idle();
                Some(FrameEvent::InvalidFrame(FramingError::ReceiveError))
            }
        }
    }

    fn step_header(&mut self, octet: u8, ts: u8) -> Option<FrameEvent> {
        if self.header.index < 5 {
            self.header.octets[self.header.index] = octet;
            self.header.crc.update(octet);
            self.header.index += 1;
            return None;
        }

        // Sixth octet: the header CRC itself.
        self.header.crc.update(octet);
        if !self.header.crc.is_valid() {
            self.reset_to_idle();
            return Some(FrameEvent::InvalidFrame(FramingError::HeaderCrcMismatch));
        }

        self.frame_type = MstpFrameType::from_u8(self.header.octets[0]);
        self.destination = self.header.octets[1];
        self.source = self.header.octets[2];
        self.data_length =
            ((self.header.octets[3] as usize) << 8) | (self.header.octets[4] as usize);

        if self.data_length == 0 {
            return Some(self.dispatch_complete(ts));
        }

        self.frame_too_long = self.data_length > self.capacity;
        if !self.frame_too_long {
            self.data = Vec::with_capacity(self.data_length);
        }
        self.data_octets_seen = 0;
        self.data_crc = DataCrc::new();
        self.state = ReceiveState::Data;
        None
    }

    fn step_data(&mut self, octet: u8) -> Option<FrameEvent> {
        if !self.frame_too_long {
            self.data.push(octet);
        }
        self.data_crc.update(octet);
        self.data_octets_seen += 1;

        if self.data_octets_seen == self.data_length {
            self.state = ReceiveState::DataCrc;
            self.data_crc_index = 0;
        }
        None
    }

    fn step_data_crc(&mut self, octet: u8, ts: u8) -> Option<FrameEvent> {
        self.data_crc.update(octet);
        self.data_crc_index += 1;
        if self.data_crc_index < 2 {
            return None;
        }

        if self.frame_too_long {
            self.reset_to_idle();
            return Some(FrameEvent::InvalidFrame(FramingError::FrameTooLong {
                declared: self.data_length,
                capacity: self.capacity,
            }));
        }

        if !self.data_crc.is_valid() {
            self.reset_to_idle();
            return Some(FrameEvent::InvalidFrame(FramingError::DataCrcMismatch));
        }

        Some(self.dispatch_complete(ts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(fsm: &mut ReceiveFsm, octets: &[u8], ts: u8) -> Option<FrameEvent> {
        let mut last = None;
        for &o in octets {
            let ev = fsm.step(Some(o), false, 0, ts);
            if ev.is_some() {
                last = ev;
            }
        }
        last
    }

    /// Valid token frame, minimum case.
    #[test]
    fn scenario_1_valid_token() {
        let mut fsm = ReceiveFsm::new(501);
        let octets = [0x55, 0xFF, 0x00, 0x10, 0x05, 0x00, 0x00, 0x73];
        let event = feed(&mut fsm, &octets, 0x05).unwrap();
        match event {
            FrameEvent::ValidFrame(frame) => {
                assert_eq!(frame.frame_type, MstpFrameType::Token);
                assert_eq!(frame.destination, 0x10);
                assert_eq!(frame.source, 0x05);
                assert_eq!(frame.data_length(), 0);
            }
            other => panic!("expected ValidFrame, got {other:?}"),
        }
        assert_eq!(fsm.state(), ReceiveState::Idle);
    }

    /// Header CRC error.
    #[test]
    fn scenario_2_header_crc_error() {
        let mut fsm = ReceiveFsm::new(501);
        let octets = [0x55, 0xFF, 0x00, 0x10, 0x05, 0x00, 0x00, 0x00];
        let event = feed(&mut fsm, &octets, 0x05).unwrap();
        assert!(matches!(
            event,
            FrameEvent::InvalidFrame(FramingError::HeaderCrcMismatch)
        ));
        assert_eq!(fsm.state(), ReceiveState::Idle);
    }

    /// Frame addressed to a different station.
    #[test]
    fn scenario_3_not_for_us() {
        let mut fsm = ReceiveFsm::new(501);
        let octets = [0x55, 0xFF, 0x00, 0x10, 0x05, 0x00, 0x00, 0x73];
        let event = feed(&mut fsm, &octets, 0x06).unwrap();
        match event {
            FrameEvent::ValidFrameNotForUs { frame_type, source } => {
                assert_eq!(frame_type, MstpFrameType::Token);
                assert_eq!(source, 0x05);
            }
            other => panic!("expected ValidFrameNotForUs, got {other:?}"),
        }
    }

    /// Frame too long (data_length 0x02FF, buffer 501).
    #[test]
    fn scenario_4_frame_too_long() {
        let mut fsm = ReceiveFsm::new(501);
        let len: u16 = 0x02FF;
        let header = [
            MstpFrameType::BacnetDataExpectingReply.to_u8(),
            0x10,
            0x05,
            (len >> 8) as u8,
            (len & 0xFF) as u8,
        ];
        let hcrc = super::super::crc::header_crc_byte(&header);

        let mut octets = Vec::new();
        octets.extend_from_slice(&PREAMBLE);
        octets.extend_from_slice(&header);
        octets.push(hcrc);
        octets.extend(core::iter::repeat(0xAA).take(len as usize));
        // trailing (bogus) data CRC -- content doesn't matter, frame is
        // already doomed by length.
        octets.push(0x00);
        octets.push(0x00);

        let event = feed(&mut fsm, &octets, 0x10).unwrap();
        assert!(matches!(
            event,
            FrameEvent::InvalidFrame(FramingError::FrameTooLong { declared, capacity })
                if declared == len as usize && capacity == 501
        ));
        assert_eq!(fsm.state(), ReceiveState::Idle);
    }

    #[test]
    fn broadcast_destination_is_for_everyone() {
        let mut fsm = ReceiveFsm::new(501);
        let header = [0x00, 0xFF, 0x05, 0x00, 0x00];
        let hcrc = super::super::crc::header_crc_byte(&header);
        let mut octets = Vec::new();
        octets.extend_from_slice(&PREAMBLE);
        octets.extend_from_slice(&header);
        octets.push(hcrc);

        let event = feed(&mut fsm, &octets, 0x42).unwrap();
        assert!(matches!(event, FrameEvent::ValidFrame(_)));
    }

    /// PREAMBLE's own transition (spec.md) is silent: "return to IDLE", no
    /// event -- unlike HEADER/DATA/DATA_CRC, no octets beyond preamble
    /// detection have been consumed yet.
    #[test]
    fn silence_timeout_in_preamble_returns_silently_to_idle() {
        let mut fsm = ReceiveFsm::new(501);
        fsm.step(Some(0x55), false, 0, 0x05);
        assert_eq!(fsm.state(), ReceiveState::Preamble);

        let event = fsm.step(None, false, T_FRAME_ABORT_MS, 0x05);
        assert!(event.is_none());
        assert_eq!(fsm.state(), ReceiveState::Idle);
    }

    /// HEADER has consumed octets beyond preamble detection, so its timeout
    /// emits `ReceivedInvalidFrame` per spec.md.
    #[test]
    fn silence_timeout_in_header_emits_invalid_frame() {
        let mut fsm = ReceiveFsm::new(501);
        fsm.step(Some(0x55), false, 0, 0x05);
        fsm.step(Some(0xFF), false, 0, 0x05);
        assert_eq!(fsm.state(), ReceiveState::Header);

        let event = fsm.step(None, false, T_FRAME_ABORT_MS, 0x05);
        assert!(matches!(
            event,
            Some(FrameEvent::InvalidFrame(FramingError::Timeout))
        ));
        assert_eq!(fsm.state(), ReceiveState::Idle);
    }

    #[test]
    fn receive_error_mid_frame_aborts() {
        let mut fsm = ReceiveFsm::new(501);
        fsm.step(Some(0x55), false, 0, 0x05);
        fsm.step(Some(0xFF), false, 0, 0x05);
        assert_eq!(fsm.state(), ReceiveState::Header);

        let event = fsm.step(None, true, 0, 0x05);
        assert!(matches!(
            event,
            Some(FrameEvent::InvalidFrame(FramingError::ReceiveError))
        ));
        assert_eq!(fsm.state(), ReceiveState::Idle);
    }

    #[test]
    fn receive_error_in_idle_is_silent() {
        let mut fsm = ReceiveFsm::new(501);
        let event = fsm.step(None, true, 0, 0x05);
        assert!(event.is_none());
        assert_eq!(fsm.state(), ReceiveState::Idle);
    }

    #[test]
    fn single_bit_flip_in_header_always_invalidates() {
        let header = [0x00, 0x10, 0x05, 0x00, 0x00];
        let good_crc = super::super::crc::header_crc_byte(&header);
        for i in 0..5 {
            for bit in 0..8u8 {
                let mut flipped = header;
                flipped[i] ^= 1 << bit;
                let mut fsm = ReceiveFsm::new(501);
                let mut octets = Vec::new();
                octets.extend_from_slice(&PREAMBLE);
                octets.extend_from_slice(&flipped);
                octets.push(good_crc);
                let event = feed(&mut fsm, &octets, 0x10);
                assert!(
                    matches!(
                        event,
                        Some(FrameEvent::InvalidFrame(FramingError::HeaderCrcMismatch))
                    ),
                    "byte {i} bit {bit} should have invalidated the header"
                );
            }
        }
    }
}
