//! MS/TP frame codec (C2): wire-exact serialize/parse of the preamble,
//! header, and optional data+CRC sections described in ASHRAE 135 Clause 9.

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

use super::crc::{data_crc16, header_crc_byte, DataCrc, HeaderCrc};
use super::MstpError;

/// MS/TP preamble bytes.
pub const PREAMBLE: [u8; 2] = [0x55, 0xFF];

/// Fixed header size, including the preamble (2) and CRC (1) octets.
pub const HEADER_SIZE: usize = 8;

/// Conventional receive-buffer floor; implementations may size larger.
pub const MIN_DATA_CAPACITY: usize = 501;

/// Wire maximum for `data_length` (ASHRAE 135 Clause 9).
pub const MAX_DATA_LENGTH: usize = 1476;

/// MS/TP frame type, including the eight required codes and the
/// proprietary range (128..=255), which is forwarded transparently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MstpFrameType {
    Token,
    PollForMaster,
    ReplyToPollForMaster,
    TestRequest,
    TestResponse,
    BacnetDataExpectingReply,
    BacnetDataNotExpectingReply,
    ReplyPostponed,
    Proprietary(u8),
}

impl MstpFrameType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Token,
            1 => Self::PollForMaster,
            2 => Self::ReplyToPollForMaster,
            3 => Self::TestRequest,
            4 => Self::TestResponse,
            5 => Self::BacnetDataExpectingReply,
            6 => Self::BacnetDataNotExpectingReply,
            7 => Self::ReplyPostponed,
            other => Self::Proprietary(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::Token => 0,
            Self::PollForMaster => 1,
            Self::ReplyToPollForMaster => 2,
            Self::TestRequest => 3,
            Self::TestResponse => 4,
            Self::BacnetDataExpectingReply => 5,
            Self::BacnetDataNotExpectingReply => 6,
            Self::ReplyPostponed => 7,
            Self::Proprietary(v) => v,
        }
    }

    pub fn is_data(self) -> bool {
        matches!(
            self,
            Self::BacnetDataExpectingReply | Self::BacnetDataNotExpectingReply
        )
    }
}

/// MS/TP broadcast destination address.
pub const BROADCAST_ADDRESS: u8 = 0xFF;

/// A decoded (or about-to-be-encoded) MS/TP frame. `data_length` is never
/// stored separately from `data` -- it is always `data.len()`, so the two
/// can't desync the way the original C struct's explicit length field could.
#[derive(Debug, Clone)]
pub struct MstpFrame {
    pub frame_type: MstpFrameType,
    pub destination: u8,
    pub source: u8,
    pub data: Vec<u8>,
}

impl MstpFrame {
    pub fn new(
        frame_type: MstpFrameType,
        destination: u8,
        source: u8,
        data: Vec<u8>,
    ) -> Result<Self, MstpError> {
        if data.len() > MAX_DATA_LENGTH {
            return Err(MstpError::DataTooLong {
                len: data.len(),
                max: MAX_DATA_LENGTH,
            });
        }
        Ok(Self {
            frame_type,
            destination,
            source,
            data,
        })
    }

    pub fn token(destination: u8, source: u8) -> Self {
        Self {
            frame_type: MstpFrameType::Token,
            destination,
            source,
            data: Vec::new(),
        }
    }

    pub fn poll_for_master(destination: u8, source: u8) -> Self {
        Self {
            frame_type: MstpFrameType::PollForMaster,
            destination,
            source,
            data: Vec::new(),
        }
    }

    pub fn reply_to_poll_for_master(destination: u8, source: u8) -> Self {
        Self {
            frame_type: MstpFrameType::ReplyToPollForMaster,
            destination,
            source,
            data: Vec::new(),
        }
    }

    pub fn reply_postponed(destination: u8, source: u8) -> Self {
        Self {
            frame_type: MstpFrameType::ReplyPostponed,
            destination,
            source,
            data: Vec::new(),
        }
    }

    pub fn test_request(destination: u8, source: u8) -> Self {
        Self {
            frame_type: MstpFrameType::TestRequest,
            destination,
            source,
            data: Vec::new(),
        }
    }

    pub fn test_response(destination: u8, source: u8) -> Self {
        Self {
            frame_type: MstpFrameType::TestResponse,
            destination,
            source,
            data: Vec::new(),
        }
    }

    pub fn bacnet_data(
        destination: u8,
        source: u8,
        data: Vec<u8>,
        expecting_reply: bool,
    ) -> Result<Self, MstpError> {
        let frame_type = if expecting_reply {
            MstpFrameType::BacnetDataExpectingReply
        } else {
            MstpFrameType::BacnetDataNotExpectingReply
        };
        Self::new(frame_type, destination, source, data)
    }

    pub fn data_length(&self) -> usize {
        self.data.len()
    }

    /// Encoded length of this frame, including preamble, header and CRC,
    /// and data + data CRC if present.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.data.len() + if self.data.is_empty() { 0 } else { 2 }
    }

    /// Serialize into `buf`, returning the number of bytes written.
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<usize, MstpError> {
        let total = self.encoded_len();
        if buf.len() < total {
            return Err(MstpError::DataTooLong {
                len: total,
                max: buf.len(),
            });
        }
        let len = self.data.len() as u16;
        let header = [
            self.frame_type.to_u8(),
            self.destination,
            self.source,
            (len >> 8) as u8,
            (len & 0xFF) as u8,
        ];
        buf[0] = PREAMBLE[0];
        buf[1] = PREAMBLE[1];
        buf[2..7].copy_from_slice(&header);
        buf[7] = header_crc_byte(&header);

        if !self.data.is_empty() {
            let data_start = HEADER_SIZE;
            let data_end = data_start + self.data.len();
            buf[data_start..data_end].copy_from_slice(&self.data);
            let crc = data_crc16(&self.data);
            buf[data_end] = (crc & 0xFF) as u8;
            buf[data_end + 1] = (crc >> 8) as u8;
        }

        Ok(total)
    }

    /// Convenience alloc-backed encode.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.encoded_len()];
        let n = self
            .encode_into(&mut buf)
            .expect("buffer sized from encoded_len");
        buf.truncate(n);
        buf
    }

    /// Parse a complete, already-framed buffer (preamble through trailing
    /// CRC). Used by tests and by callers that already have a whole frame;
    /// the octet-driven [`super::receive_fsm::ReceiveFsm`] is what the wire
    /// actually drives.
    pub fn decode(data: &[u8]) -> Result<Self, MstpError> {
        if data.len() < HEADER_SIZE {
            return Err(MstpError::FrameTooShort {
                len: data.len(),
                min: HEADER_SIZE,
            });
        }
        if data[0] != PREAMBLE[0] || data[1] != PREAMBLE[1] {
            return Err(MstpError::BadPreamble);
        }

        let header = [data[2], data[3], data[4], data[5], data[6]];
        let header_crc = data[7];
        let mut acc = HeaderCrc::new();
        acc.update_all(&header);
        acc.update(header_crc);
        if !acc.is_valid() {
            return Err(MstpError::HeaderCrcMismatch);
        }

        let frame_type = MstpFrameType::from_u8(header[0]);
        let destination = header[1];
        let source = header[2];
        let data_length = ((header[3] as usize) << 8) | (header[4] as usize);

        if data_length == 0 {
            if data.len() != HEADER_SIZE {
                return Err(MstpError::LengthMismatch {
                    declared: data_length,
                    actual: data.len() - HEADER_SIZE,
                });
            }
            return Ok(Self {
                frame_type,
                destination,
                source,
                data: Vec::new(),
            });
        }

        let expected_total = HEADER_SIZE + data_length + 2;
        if data.len() != expected_total {
            return Err(MstpError::LengthMismatch {
                declared: data_length,
                actual: data.len().saturating_sub(HEADER_SIZE + 2),
            });
        }

        let payload = &data[HEADER_SIZE..HEADER_SIZE + data_length];
        let crc_lo = data[HEADER_SIZE + data_length];
        let crc_hi = data[HEADER_SIZE + data_length + 1];

        let mut dcrc = DataCrc::new();
        dcrc.update_all(payload);
        dcrc.update(crc_lo);
        dcrc.update(crc_hi);
        if !dcrc.is_valid() {
            return Err(MstpError::DataCrcMismatch);
        }

        Ok(Self {
            frame_type,
            destination,
            source,
            data: payload.to_vec(),
        })
    }

    pub fn is_token(&self) -> bool {
        matches!(self.frame_type, MstpFrameType::Token)
    }

    pub fn is_data(&self) -> bool {
        self.frame_type.is_data()
    }

    pub fn is_broadcast(&self) -> bool {
        self.destination == BROADCAST_ADDRESS
    }

    pub fn addressed_to(&self, station: u8) -> bool {
        self.destination == station || self.is_broadcast()
    }
}

/// Check that `address` is one of master (0..=127), slave (128..=254), or
/// broadcast (255). Every `u8` is a valid MS/TP address so this can never
/// fail, but keeping it names the three bands at call sites.
pub fn validate_mstp_address(_address: u8) {}

pub fn is_master_address(address: u8) -> bool {
    address <= 127
}

pub fn is_slave_address(address: u8) -> bool {
    (128..=254).contains(&address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_token() {
        let frame = MstpFrame::token(5, 3);
        let encoded = frame.encode();
        let decoded = MstpFrame::decode(&encoded).unwrap();
        assert_eq!(decoded.frame_type, MstpFrameType::Token);
        assert_eq!(decoded.destination, 5);
        assert_eq!(decoded.source, 3);
        assert_eq!(decoded.data_length(), 0);
    }

    #[test]
    fn encode_decode_data_frame() {
        let data = vec![0x01, 0x02, 0x03, 0x04];
        let frame = MstpFrame::bacnet_data(10, 20, data.clone(), true).unwrap();
        let encoded = frame.encode();
        let decoded = MstpFrame::decode(&encoded).unwrap();
        assert_eq!(decoded.frame_type, MstpFrameType::BacnetDataExpectingReply);
        assert_eq!(decoded.data, data);
    }

    /// Valid token frame, minimum case.
    #[test]
    fn scenario_1_valid_token() {
        let octets = [0x55, 0xFF, 0x00, 0x10, 0x05, 0x00, 0x00, 0x73];
        let frame = MstpFrame::decode(&octets).unwrap();
        assert_eq!(frame.frame_type, MstpFrameType::Token);
        assert_eq!(frame.destination, 0x10);
        assert_eq!(frame.source, 0x05);
        assert_eq!(frame.data_length(), 0);
    }

    /// Header CRC error.
    #[test]
    fn scenario_2_header_crc_error() {
        let octets = [0x55, 0xFF, 0x00, 0x10, 0x05, 0x00, 0x00, 0x00];
        assert!(matches!(
            MstpFrame::decode(&octets),
            Err(MstpError::HeaderCrcMismatch)
        ));
    }

    #[test]
    fn rejects_bad_preamble() {
        let mut bad = vec![0x00, 0xFF, 0x00, 0x05, 0x03, 0x00, 0x00, 0x00];
        assert!(MstpFrame::decode(&bad).is_err());
        bad[0] = 0x55;
        bad[1] = 0x00;
        assert!(MstpFrame::decode(&bad).is_err());
    }

    #[test]
    fn rejects_too_short() {
        let bad = [0x55, 0xFF, 0x00];
        assert!(matches!(
            MstpFrame::decode(&bad),
            Err(MstpError::FrameTooShort { .. })
        ));
    }

    #[test]
    fn max_data_length_enforced() {
        let data = vec![0u8; MAX_DATA_LENGTH + 1];
        assert!(MstpFrame::bacnet_data(10, 20, data, false).is_err());

        let data = vec![0u8; MAX_DATA_LENGTH];
        assert!(MstpFrame::bacnet_data(10, 20, data, false).is_ok());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn arb_frame_type() -> impl Strategy<Value = MstpFrameType> {
            (0u8..=255).prop_map(MstpFrameType::from_u8)
        }

        proptest! {
            /// `decode(encode(frame)) = frame` for all
            /// `frame_type, destination, source, data`.
            #[test]
            fn encode_decode_round_trips(
                frame_type in arb_frame_type(),
                destination in any::<u8>(),
                source in any::<u8>(),
                data in prop::collection::vec(any::<u8>(), 0..512),
            ) {
                let frame = MstpFrame::new(frame_type, destination, source, data.clone()).unwrap();
                let encoded = frame.encode();
                let decoded = MstpFrame::decode(&encoded).unwrap();
                prop_assert_eq!(decoded.frame_type, frame_type);
                prop_assert_eq!(decoded.destination, destination);
                prop_assert_eq!(decoded.source, source);
                prop_assert_eq!(decoded.data, data);
            }

            /// `encode` is idempotent given identical inputs.
            #[test]
            fn encode_is_idempotent(
                frame_type in arb_frame_type(),
                destination in any::<u8>(),
                source in any::<u8>(),
                data in prop::collection::vec(any::<u8>(), 0..128),
            ) {
                let frame = MstpFrame::new(frame_type, destination, source, data).unwrap();
                prop_assert_eq!(frame.encode(), frame.encode());
            }
        }
    }

    #[test]
    fn address_bands() {
        assert!(is_master_address(0));
        assert!(is_master_address(127));
        assert!(!is_master_address(128));
        assert!(!is_slave_address(127));
        assert!(is_slave_address(128));
        assert!(is_slave_address(254));
        assert!(!is_slave_address(255));
    }
}
