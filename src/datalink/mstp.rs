//! BACnet MS/TP (Master-Slave/Token-Passing) Data Link Implementation
//!
//! MS/TP is a deterministic, token-passing multi-master protocol layered on
//! half-duplex RS-485 (ASHRAE 135 Clause 9). This module implements the
//! datalink *core*: the octet-driven receive parser, the master-node
//! token-passing state machine, the minimal slave-node responder, and the
//! zero-configuration address-acquisition state machine, plus the framing
//! and CRC codecs and the outgoing PDU queue they all share.
//!
//! # Architecture
//!
//! Octets arrive at [`receive_fsm::ReceiveFsm`]. Once a frame validates, the
//! resulting [`receive_fsm::FrameEvent`] is handed to whichever of the three
//! node-level FSMs owns this station's address (`ts`): [`master_fsm`] for
//! masters (0..=127), [`slave_fsm`] for slaves (128..=254), or
//! [`zero_config`] while `ts == 255` and an address has not yet been
//! claimed. [`MstpPort`] is the per-port aggregate that owns all of this
//! state; [`MstpDataLink`] (std only) wraps a `Mutex<MstpPort>` behind the
//! crate's [`DataLink`] trait for host deployments.
//!
//! No global state is used anywhere in this module: the monotonic clock and
//! the serial sink are both capabilities ([`silence::MonotonicClock`],
//! [`SerialSink`]) passed in by the caller, not read from a singleton.

pub mod crc;
pub mod frame;
pub mod master_fsm;
pub mod npdu_prefix;
pub mod pdu_queue;
pub mod receive_fsm;
pub mod silence;
pub mod slave_fsm;
pub mod zero_config;

#[cfg(feature = "std")]
use std::{collections::VecDeque, sync::Mutex};

#[cfg(not(feature = "std"))]
use alloc::{collections::VecDeque, string::String, vec::Vec};

#[cfg(feature = "std")]
use std::fmt;

#[cfg(not(feature = "std"))]
use core::fmt;

use crate::datalink::{DataLinkAddress, DataLinkError, DataLinkType};

pub use frame::{MstpFrame, MstpFrameType};
pub use master_fsm::{MasterFsm, MasterState};
pub use pdu_queue::{PduQueue, QueueFull, QueuedPdu};
pub use receive_fsm::{FrameEvent, FramingError, ReceiveFsm};
pub use silence::{MonotonicClock, SilenceTimer};
pub use slave_fsm::{SlaveFsm, SlaveState};
pub use zero_config::{EntropySource, ZeroConfigFsm, ZeroConfigOutcome, ZeroConfigState};

#[cfg(feature = "std")]
pub use silence::StdClock;

/// Errors from the core's fallible constructors. Internal FSM error *kinds*
/// (`FramingError`, `ReceiveError`, `TokenLost`, `AddressConflict`,
/// `QueueFull`, `BufferExceeded`) are not `MstpError` variants -- they drive
/// local-recovery transitions and a `log` call, never cross the FSM step
/// boundary. Nothing at that layer is fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MstpError {
    /// Data exceeds what a buffer/frame can carry.
    DataTooLong { len: usize, max: usize },
    /// Frame shorter than the minimum encodable size.
    FrameTooShort { len: usize, min: usize },
    /// First two octets were not `0x55, 0xFF`.
    BadPreamble,
    /// Header CRC accumulator did not land on the fixed residue.
    HeaderCrcMismatch,
    /// Data CRC accumulator did not land on the fixed residue.
    DataCrcMismatch,
    /// Declared `data_length` does not match the octets actually present.
    LengthMismatch { declared: usize, actual: usize },
    /// Station address outside `0..=255`'s meaningful configuration (used
    /// only for constructor-time validation, e.g. a master configured with
    /// a slave address).
    InvalidStationAddress(u8),
    /// Baud rate outside the enumerated MS/TP set.
    InvalidBaudRate(u32),
    /// `Nmax_master` outside `1..=127`.
    InvalidMaxMaster(u8),
}

impl fmt::Display for MstpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DataTooLong { len, max } => {
                write!(f, "data length {len} exceeds maximum {max}")
            }
            Self::FrameTooShort { len, min } => {
                write!(f, "frame of {len} bytes is shorter than the minimum {min}")
            }
            Self::BadPreamble => write!(f, "invalid MS/TP preamble"),
            Self::HeaderCrcMismatch => write!(f, "header CRC mismatch"),
            Self::DataCrcMismatch => write!(f, "data CRC mismatch"),
            Self::LengthMismatch { declared, actual } => write!(
                f,
                "declared data length {declared} does not match {actual} octets received"
            ),
            Self::InvalidStationAddress(addr) => write!(f, "invalid station address {addr}"),
            Self::InvalidBaudRate(baud) => write!(f, "unsupported MS/TP baud rate {baud}"),
            Self::InvalidMaxMaster(max) => write!(f, "invalid Nmax_master {max}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for MstpError {}

impl From<MstpError> for DataLinkError {
    fn from(err: MstpError) -> Self {
        match err {
            MstpError::DataTooLong { .. }
            | MstpError::FrameTooShort { .. }
            | MstpError::BadPreamble
            | MstpError::HeaderCrcMismatch
            | MstpError::DataCrcMismatch
            | MstpError::LengthMismatch { .. } => DataLinkError::InvalidFrame,
            MstpError::InvalidStationAddress(a) => {
                DataLinkError::AddressError(format!("invalid MS/TP station address {a}"))
            }
            MstpError::InvalidBaudRate(b) => {
                DataLinkError::AddressError(format!("unsupported MS/TP baud rate {b}"))
            }
            MstpError::InvalidMaxMaster(m) => {
                DataLinkError::AddressError(format!("invalid Nmax_master {m}"))
            }
        }
    }
}

#[cfg(not(feature = "std"))]
fn format(args: core::fmt::Arguments<'_>) -> String {
    use alloc::string::ToString;
    args.to_string()
}

/// Serial-port capability the core transmits through and polls octets from.
/// The core never programs the UART itself -- baud rate, framing, and
/// RS-485 direction control are entirely the host's concern.
pub trait SerialSink {
    /// Write a complete, already-encoded MS/TP frame to the wire.
    fn send_frame(&mut self, bytes: &[u8]) -> Result<(), MstpError>;

    /// Poll for the next received octet, if any is ready. Must never block.
    fn poll_byte(&mut self) -> Option<u8>;
}

/// Wraps the host's [`SerialSink`] so every `send_frame` call also resets the
/// port's silence timer: transmitting is itself activity on the wire, so it
/// must reset the same clock the receive path resets. The node FSMs only
/// ever see this wrapper, never the raw sink, so a transmission always
/// zeroes the same silence reading their own timeouts (`T_usage_timeout`,
/// `T_reply_timeout`, ...) are measured against.
struct ResettingSink<'a> {
    inner: &'a mut dyn SerialSink,
    silence: &'a mut SilenceTimer,
    clock: &'a dyn MonotonicClock,
}

impl SerialSink for ResettingSink<'_> {
    fn send_frame(&mut self, bytes: &[u8]) -> Result<(), MstpError> {
        let result = self.inner.send_frame(bytes);
        self.silence.reset(self.clock);
        result
    }

    fn poll_byte(&mut self) -> Option<u8> {
        self.inner.poll_byte()
    }
}

/// MS/TP port configuration: the normative timing parameters and
/// zero-config tuning knobs a physical port needs beyond its station
/// address.
#[derive(Debug, Clone)]
pub struct MstpConfig {
    /// This station's address. `255` requests zero-configuration
    /// acquisition; `0..=127` is a pre-configured master; `128..=254` is a
    /// pre-configured slave.
    pub station_address: u8,
    /// Highest master address on the ring (`Nmax_master`, 1..=127).
    pub max_master: u8,
    /// Number of frames to send per token hold (`Nmax_info_frames`, >= 1).
    pub max_info_frames: u8,
    /// Receive data buffer capacity; the conventional floor is 501 bytes.
    pub receive_buffer_capacity: usize,
    /// Outgoing PDU queue capacity; must be a power of two.
    pub pdu_queue_capacity: usize,
    /// Serial baud rate; must be one of the enumerated MS/TP rates.
    pub baud_rate: u32,
}

/// The enumerated MS/TP baud rates.
pub const VALID_BAUD_RATES: [u32; 6] = [9600, 19200, 38400, 57600, 76800, 115200];

impl Default for MstpConfig {
    fn default() -> Self {
        Self {
            station_address: 1,
            max_master: 127,
            max_info_frames: 1,
            receive_buffer_capacity: frame::MIN_DATA_CAPACITY,
            pdu_queue_capacity: pdu_queue::DEFAULT_CAPACITY,
            baud_rate: 38400,
        }
    }
}

impl MstpConfig {
    pub fn validate(&self) -> Result<(), MstpError> {
        if self.max_master == 0 {
            return Err(MstpError::InvalidMaxMaster(self.max_master));
        }
        if !VALID_BAUD_RATES.contains(&self.baud_rate) {
            return Err(MstpError::InvalidBaudRate(self.baud_rate));
        }
        if self.station_address <= self.max_master {
            // Fine: pre-configured master within the ring.
        } else if self.station_address == 255 || frame::is_slave_address(self.station_address) {
            // Zero-config or pre-configured slave: fine.
        } else {
            return Err(MstpError::InvalidStationAddress(self.station_address));
        }
        Ok(())
    }
}

/// Which node-level FSM currently owns this port's traffic, keyed off `ts`.
enum NodeKind {
    Master(MasterFsm),
    Slave(SlaveFsm),
    ZeroConfig(ZeroConfigFsm),
}

/// A PDU delivered upward to the network layer: either indication of
/// received data, or "busy, try again" for an enqueue that overflowed the
/// PDU queue.
#[derive(Debug, Clone)]
pub struct DataIndication {
    pub expecting_reply: bool,
    pub source: u8,
    pub data: Vec<u8>,
}

/// The per-port aggregate owning every piece of state a physical MS/TP port
/// needs: the receive parser, the active node FSM, the silence timer, and
/// the outgoing PDU queue.
pub struct MstpPort {
    config: MstpConfig,
    ts: u8,
    receive: ReceiveFsm,
    silence: SilenceTimer,
    queue: PduQueue,
    node: NodeKind,
    inbox: VecDeque<DataIndication>,
}

impl MstpPort {
    /// Construct a port and drive both the Master FSM into `INITIALIZE` and
    /// (for zero-config nodes) the Zero-Config FSM into `INIT`.
    pub fn new(
        config: MstpConfig,
        clock: &dyn MonotonicClock,
        entropy: EntropySource,
    ) -> Result<Self, MstpError> {
        config.validate()?;
        let ts = config.station_address;
        let node = if ts == 255 {
            NodeKind::ZeroConfig(ZeroConfigFsm::new(entropy))
        } else if frame::is_master_address(ts) {
            NodeKind::Master(MasterFsm::new(ts, config.max_master, config.max_info_frames))
        } else {
            NodeKind::Slave(SlaveFsm::new(ts))
        };

        Ok(Self {
            receive: ReceiveFsm::new(config.receive_buffer_capacity),
            silence: SilenceTimer::new(clock),
            queue: PduQueue::with_capacity(config.pdu_queue_capacity),
            node,
            ts,
            config,
        })
    }

    /// Re-run initialization: returns the Master FSM to `INITIALIZE` and the
    /// Zero-Config FSM to `INIT`, as if a caller forced a reset by
    /// re-invoking init. Equivalent to constructing a fresh port with the
    /// same configuration; double-init is idempotent.
    pub fn reinitialize(&mut self, clock: &dyn MonotonicClock, entropy: EntropySource) {
        let ts = self.config.station_address;
        self.node = if ts == 255 {
            NodeKind::ZeroConfig(ZeroConfigFsm::new(entropy))
        } else if frame::is_master_address(ts) {
            NodeKind::Master(MasterFsm::new(ts, self.config.max_master, self.config.max_info_frames))
        } else {
            NodeKind::Slave(SlaveFsm::new(ts))
        };
        self.receive = ReceiveFsm::new(self.config.receive_buffer_capacity);
        self.silence.reset(clock);
    }

    pub fn ts(&self) -> u8 {
        self.ts
    }

    pub fn config(&self) -> &MstpConfig {
        &self.config
    }

    /// Update `Nmax_master` at runtime. The Master FSM clamps `Ns`/`Ps` only
    /// at its next transition, never mid-state.
    pub fn set_max_master(&mut self, max_master: u8) {
        self.config.max_master = max_master;
        if let NodeKind::Master(master) = &mut self.node {
            master.set_nmax_master(max_master);
        }
    }

    pub fn enqueue(&mut self, pdu: QueuedPdu) -> Result<(), QueueFull> {
        self.queue.enqueue(pdu)
    }

    pub fn pop_indication(&mut self) -> Option<DataIndication> {
        self.inbox.pop_front()
    }

    pub fn is_sole_master(&self) -> bool {
        matches!(&self.node, NodeKind::Master(m) if m.sole_master())
    }

    /// Drain every octet the sink currently has buffered, then run one
    /// timeout tick. This is the loop a host's main thread calls repeatedly;
    /// neither the receive parser nor any node FSM blocks.
    pub fn poll(&mut self, sink: &mut dyn SerialSink, clock: &dyn MonotonicClock) {
        while let Some(octet) = sink.poll_byte() {
            self.silence.reset(clock);
            self.step_octet(Some(octet), sink, clock);
        }
        self.step_octet(None, sink, clock);
    }

    fn step_octet(
        &mut self,
        octet: Option<u8>,
        sink: &mut dyn SerialSink,
        clock: &dyn MonotonicClock,
    ) {
        let silence_ms = self.silence.silence_ms(clock);
        let event = self.receive.step(octet, false, silence_ms, self.ts);

        let mut sink = ResettingSink {
            inner: sink,
            silence: &mut self.silence,
            clock,
        };

        match &mut self.node {
            NodeKind::Master(master) => {
                let outcome = master.step(event, silence_ms, &mut self.queue, &mut sink, clock);
                if let master_fsm::StepOutcome::DataIndication {
                    expecting_reply,
                    source,
                    data,
                } = outcome
                {
                    self.inbox.push_back(DataIndication {
                        expecting_reply,
                        source,
                        data,
                    });
                }
            }
            NodeKind::Slave(slave) => {
                let outcome = slave.step(event, silence_ms, &mut self.queue, &mut sink);
                if let slave_fsm::StepOutcome::DataIndication {
                    expecting_reply,
                    source,
                    data,
                } = outcome
                {
                    self.inbox.push_back(DataIndication {
                        expecting_reply,
                        source,
                        data,
                    });
                }
            }
            NodeKind::ZeroConfig(zc) => {
                let prior_state = zc.state();
                let outcome = zc.step(event.as_ref(), silence_ms, &mut sink, clock);
                if prior_state != ZeroConfigState::Confirm && zc.state() == ZeroConfigState::Confirm
                {
                    zc.send_confirm_probe(&mut sink);
                }
                if let ZeroConfigOutcome::Committed(addr) = outcome {
                    log::debug!("mstp port: zero-config committed ts={addr}");
                    self.ts = addr;
                    self.node = NodeKind::Master(MasterFsm::new(
                        addr,
                        self.config.max_master,
                        self.config.max_info_frames,
                    ));
                    self.config.station_address = addr;
                }
            }
        }
    }
}

/// MS/TP data link implementation wrapping an [`MstpPort`] behind a single
/// lock around enqueue/dequeue/peek/pop, satisfying `get_reply`'s
/// atomic-scan-and-pop requirement for host (multi-producer) deployments.
#[cfg(feature = "std")]
pub struct MstpDataLink {
    port: Mutex<MstpPort>,
    clock: StdClock,
    port_name: String,
}

#[cfg(feature = "std")]
impl MstpDataLink {
    pub fn new(port_name: &str, config: MstpConfig) -> Result<Self, DataLinkError> {
        let clock = StdClock;
        let port = MstpPort::new(config, &clock, default_entropy).map_err(DataLinkError::from)?;
        Ok(Self {
            port: Mutex::new(port),
            clock,
            port_name: port_name.to_string(),
        })
    }

    pub fn local_station(&self) -> u8 {
        self.port.lock().unwrap().ts()
    }

    pub fn is_sole_master(&self) -> bool {
        self.port.lock().unwrap().is_sole_master()
    }

    /// Poll the given serial sink and run one FSM step. Call this
    /// repeatedly from the host's main loop; it never blocks.
    pub fn poll(&self, sink: &mut dyn SerialSink) {
        self.port.lock().unwrap().poll(sink, &self.clock);
    }

    /// Inject a single already-validated frame directly, bypassing the
    /// octet-level parser -- used by tests and by hosts that already
    /// terminated framing elsewhere.
    #[cfg(test)]
    pub(crate) fn simulate_receive(&self, frame: MstpFrame) {
        let mut port = self.port.lock().unwrap();
        let silence_ms = port.silence.silence_ms(&self.clock);
        let event = Some(FrameEvent::ValidFrame(frame));
        let mut sink = NullSink;
        match &mut port.node {
            NodeKind::Master(master) => {
                let outcome =
                    master.step(event, silence_ms, &mut port.queue, &mut sink, &self.clock);
                if let master_fsm::StepOutcome::DataIndication {
                    expecting_reply,
                    source,
                    data,
                } = outcome
                {
                    port.inbox.push_back(DataIndication {
                        expecting_reply,
                        source,
                        data,
                    });
                }
            }
            NodeKind::Slave(slave) => {
                let outcome = slave.step(event, silence_ms, &mut port.queue, &mut sink);
                if let slave_fsm::StepOutcome::DataIndication {
                    expecting_reply,
                    source,
                    data,
                } = outcome
                {
                    port.inbox.push_back(DataIndication {
                        expecting_reply,
                        source,
                        data,
                    });
                }
            }
            NodeKind::ZeroConfig(_) => {}
        }
    }
}

#[cfg(test)]
struct NullSink;

#[cfg(test)]
impl SerialSink for NullSink {
    fn send_frame(&mut self, _bytes: &[u8]) -> Result<(), MstpError> {
        Ok(())
    }
    fn poll_byte(&mut self) -> Option<u8> {
        None
    }
}

#[cfg(feature = "std")]
impl super::DataLink for MstpDataLink {
    fn send_frame(&mut self, frame: &[u8], dest: &DataLinkAddress) -> super::Result<()> {
        let dest_addr = match dest {
            DataLinkAddress::MsTP(addr) => *addr,
            DataLinkAddress::Broadcast => frame::BROADCAST_ADDRESS,
            _ => {
                return Err(DataLinkError::AddressError(
                    "invalid address type for MS/TP".into(),
                ))
            }
        };

        let mut port = self.port.lock().unwrap();
        port.enqueue(QueuedPdu {
            destination_mac: dest_addr,
            data_expecting_reply: false,
            data: frame.to_vec(),
        })
        .map_err(|_| DataLinkError::InvalidFrame)
    }

    fn receive_frame(&mut self) -> super::Result<(Vec<u8>, DataLinkAddress)> {
        let mut port = self.port.lock().unwrap();
        match port.pop_indication() {
            Some(indication) => Ok((
                indication.data,
                DataLinkAddress::MsTP(indication.source),
            )),
            None => Err(DataLinkError::InvalidFrame),
        }
    }

    fn link_type(&self) -> DataLinkType {
        DataLinkType::MsTP
    }

    fn local_address(&self) -> DataLinkAddress {
        DataLinkAddress::MsTP(self.local_station())
    }
}

/// Default entropy source used when the host doesn't supply one: derives 16
/// bytes from the process's monotonic clock. Not cryptographically random --
/// zero-config only needs a nonzero `Npoll_slot` seed, never secrecy.
#[cfg(feature = "std")]
fn default_entropy() -> [u8; 16] {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let bytes = nanos.to_le_bytes();
    let mut out = [0u8; 16];
    let n = bytes.len().min(16);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

pub fn is_master_address(address: u8) -> bool {
    frame::is_master_address(address)
}

pub fn is_slave_address(address: u8) -> bool {
    frame::is_slave_address(address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::silence::TestClock;

    fn test_entropy() -> [u8; 16] {
        [7; 16]
    }

    struct RecordingSink {
        sent: Vec<Vec<u8>>,
        bytes: VecDeque<u8>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                sent: Vec::new(),
                bytes: VecDeque::new(),
            }
        }
    }

    impl SerialSink for RecordingSink {
        fn send_frame(&mut self, bytes: &[u8]) -> Result<(), MstpError> {
            self.sent.push(bytes.to_vec());
            Ok(())
        }
        fn poll_byte(&mut self) -> Option<u8> {
            self.bytes.pop_front()
        }
    }

    /// `send_frame` must reset the silence timer. A port that just
    /// transmitted a token should read zero silence on the very next tick,
    /// not whatever time has passed since the last *received* octet.
    #[test]
    fn sending_a_frame_resets_the_port_silence_timer() {
        let clock = TestClock::new();
        let config = MstpConfig {
            station_address: 5,
            max_master: 10,
            ..Default::default()
        };
        let mut port = MstpPort::new(config, &clock, test_entropy).unwrap();
        let mut sink = RecordingSink::new();

        // Let the bus go quiet long enough to fall into NO_TOKEN, then
        // POLL_FOR_MASTER, which transmits a PFM -- a send with no prior
        // received octet to reset silence for us.
        clock.advance(master_fsm::t_no_token_ms(5) as u64);
        port.step_octet(None, &mut sink, &clock);
        clock.advance(master_fsm::T_SLOT_MS as u64 * 5 + 1);
        port.step_octet(None, &mut sink, &clock);
        assert!(matches!(&port.node, NodeKind::Master(m) if m.state() == MasterState::PollForMaster));

        // The transition into POLL_FOR_MASTER happened on the step above;
        // the PFM itself goes out on the first step taken *in* the state.
        port.step_octet(None, &mut sink, &clock);
        assert!(!sink.sent.is_empty(), "PFM should have been transmitted");

        // The send above must have reset the port's silence timer: reading
        // it again immediately afterward yields (near) zero, not the ~550ms
        // of bus quiet that preceded it.
        assert_eq!(port.silence.silence_ms(&clock), 0);
    }

    #[test]
    fn config_validate_rejects_bad_baud() {
        let mut config = MstpConfig::default();
        config.baud_rate = 1200;
        assert!(matches!(
            config.validate(),
            Err(MstpError::InvalidBaudRate(1200))
        ));
    }

    #[test]
    fn config_validate_rejects_zero_max_master() {
        let mut config = MstpConfig::default();
        config.max_master = 0;
        assert!(matches!(
            config.validate(),
            Err(MstpError::InvalidMaxMaster(0))
        ));
    }

    #[test]
    fn port_new_picks_master_fsm_for_master_address() {
        let clock = StdClock;
        let config = MstpConfig {
            station_address: 5,
            ..Default::default()
        };
        let port = MstpPort::new(config, &clock, test_entropy).unwrap();
        assert!(matches!(port.node, NodeKind::Master(_)));
        assert_eq!(port.ts(), 5);
    }

    #[test]
    fn port_new_picks_slave_fsm_for_slave_address() {
        let clock = StdClock;
        let config = MstpConfig {
            station_address: 200,
            ..Default::default()
        };
        let port = MstpPort::new(config, &clock, test_entropy).unwrap();
        assert!(matches!(port.node, NodeKind::Slave(_)));
    }

    #[test]
    fn port_new_picks_zero_config_for_ts_255() {
        let clock = StdClock;
        let config = MstpConfig {
            station_address: 255,
            ..Default::default()
        };
        let port = MstpPort::new(config, &clock, test_entropy).unwrap();
        assert!(matches!(port.node, NodeKind::ZeroConfig(_)));
        assert_eq!(port.ts(), 255);
    }

    #[test]
    fn double_init_is_equivalent_to_single_init() {
        let clock = StdClock;
        let config = MstpConfig {
            station_address: 5,
            ..Default::default()
        };
        let mut port = MstpPort::new(config, &clock, test_entropy).unwrap();
        port.reinitialize(&clock, test_entropy);
        assert_eq!(port.ts(), 5);
        assert!(matches!(port.node, NodeKind::Master(_)));
    }

    #[test]
    fn datalink_roundtrip_enqueue_and_link_type() {
        let config = MstpConfig {
            station_address: 5,
            ..Default::default()
        };
        let mut link = MstpDataLink::new("COM1", config).unwrap();
        use super::super::DataLink;
        assert_eq!(link.link_type(), DataLinkType::MsTP);
        assert_eq!(link.local_address(), DataLinkAddress::MsTP(5));

        let npdu = vec![0x01, 0x02, 0x03, 0x04];
        assert!(link.send_frame(&npdu, &DataLinkAddress::MsTP(10)).is_ok());
        assert!(link
            .send_frame(&npdu, &DataLinkAddress::Broadcast)
            .is_ok());
    }

    #[test]
    fn simulated_der_delivers_indication_via_receive_frame() {
        let config = MstpConfig {
            station_address: 5,
            ..Default::default()
        };
        let mut link = MstpDataLink::new("COM1", config).unwrap();
        use super::super::DataLink;

        let frame = MstpFrame::bacnet_data(5, 10, vec![9, 9, 9], true).unwrap();
        link.simulate_receive(frame);

        let (data, source) = link.receive_frame().unwrap();
        assert_eq!(data, vec![9, 9, 9]);
        assert_eq!(source, DataLinkAddress::MsTP(10));
    }

    #[test]
    fn address_band_helpers() {
        assert!(is_master_address(0));
        assert!(is_master_address(127));
        assert!(!is_master_address(128));
        assert!(is_slave_address(200));
        assert!(!is_slave_address(255));
    }
}
