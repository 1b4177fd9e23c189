//! Zero-Configuration FSM (C7): dynamic MAC acquisition in `[64, 127]` by
//! passive learning plus a single active Test-Request probe.

use super::frame::MstpFrameType;
use super::master_fsm::{t_no_token_ms, T_SLOT_MS, T_USAGE_TIMEOUT_MS};
use super::receive_fsm::FrameEvent;
use super::silence::MonotonicClock;
use super::SerialSink;
use super::frame::MstpFrame;

/// Lower/upper bounds of the zero-config candidate range (`Nmin_poll_station
/// = 64`, `Nmax_poll_station = 127`).
pub const CANDIDATE_MIN: u8 = 64;
pub const CANDIDATE_MAX: u8 = 127;

/// Number of PFM rotations to observe (beyond `Npoll_slot`) with no sighting
/// of the candidate before claiming it (bacnet-stack's `Nmin_poll`, distinct
/// from the master FSM's token-rotation `Npoll`).
pub const ZERO_CONFIG_NMIN_POLL: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroConfigState {
    Init,
    Idle,
    Lurk,
    Claim,
    Confirm,
    Use,
}

/// Result of a [`ZeroConfigFsm::step`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroConfigOutcome {
    /// No change; `ts` stays 255, zero-config keeps running.
    Pending,
    /// The candidate MAC is committed; the caller should adopt it as `ts`
    /// and drop the zero-config FSM (the `USE` state is terminal, modeled
    /// by the FSM's absence afterward, not a reachable-but-inert variant).
    Committed(u8),
}

/// Caller-supplied entropy source: a 128-bit UUID generated once at `Init`.
/// No `rand` dependency is pulled in; the host supplies this capability,
/// the same shape as the clock and serial sink.
pub type EntropySource = fn() -> [u8; 16];

pub struct ZeroConfigFsm {
    state: ZeroConfigState,
    candidate: u8,
    npoll_slot: u8,
    poll_count: u32,
    zero_config_max_master: u8,
    zero_config_silence_ms: u32,
    uuid: [u8; 16],
}

impl ZeroConfigFsm {
    /// Enter `INIT` and immediately drive the transition into `IDLE`:
    /// seed candidate, derive `Npoll_slot` from the UUID, compute the
    /// silence threshold, reset `Poll_Count`.
    pub fn new(entropy: EntropySource) -> Self {
        let uuid = entropy();
        let npoll_slot = (u32::from_le_bytes([uuid[0], uuid[1], uuid[2], uuid[3]]) % 64 + 1) as u8;
        let mut fsm = Self {
            state: ZeroConfigState::Init,
            candidate: CANDIDATE_MIN,
            npoll_slot,
            poll_count: 0,
            zero_config_max_master: 0,
            zero_config_silence_ms: 0,
            uuid,
        };
        fsm.enter_init();
        fsm
    }

    fn enter_init(&mut self) {
        self.candidate = CANDIDATE_MIN;
        self.poll_count = 0;
        self.zero_config_max_master = 0;
        // Zero_Config_Silence = T_no_token + T_slot*(128 + Npoll_slot).
        // T_no_token itself depends on `ts`, which is not yet known (ts==255
        // during zero-config); bacnet-stack evaluates it with ts=0, the
        // smallest possible, which is also the most conservative (largest
        // remaining margin before the ring could plausibly decide we are
        // gone).
        self.zero_config_silence_ms =
            t_no_token_ms(0) + T_SLOT_MS * (128 + self.npoll_slot as u32);
        self.state = ZeroConfigState::Idle;
    }

    pub fn state(&self) -> ZeroConfigState {
        self.state
    }

    pub fn candidate(&self) -> u8 {
        self.candidate
    }

    pub fn npoll_slot(&self) -> u8 {
        self.npoll_slot
    }

    pub fn zero_config_max_master(&self) -> u8 {
        self.zero_config_max_master
    }

    pub fn uuid(&self) -> [u8; 16] {
        self.uuid
    }

    fn advance_candidate(&mut self) {
        self.candidate = if self.candidate >= CANDIDATE_MAX {
            CANDIDATE_MIN
        } else {
            self.candidate + 1
        };
        self.poll_count = 0;
    }

    pub fn step(
        &mut self,
        event: Option<&FrameEvent>,
        silence_ms: u32,
        sink: &mut dyn SerialSink,
        clock: &dyn MonotonicClock,
    ) -> ZeroConfigOutcome {
        match self.state {
            ZeroConfigState::Init => {
                self.enter_init();
                ZeroConfigOutcome::Pending
            }
            ZeroConfigState::Idle => self.step_idle(event, silence_ms),
            ZeroConfigState::Lurk => self.step_lurk(event, silence_ms, sink, clock),
            ZeroConfigState::Claim => self.step_claim(event, silence_ms),
            ZeroConfigState::Confirm => self.step_confirm(event, silence_ms),
            ZeroConfigState::Use => ZeroConfigOutcome::Committed(self.candidate),
        }
    }

    fn step_idle(&mut self, event: Option<&FrameEvent>, silence_ms: u32) -> ZeroConfigOutcome {
        match event {
            Some(FrameEvent::ValidFrame(_)) | Some(FrameEvent::ValidFrameNotForUs { .. }) => {
                self.state = ZeroConfigState::Lurk;
            }
            _ => {
                if silence_ms >= self.zero_config_silence_ms {
                    self.state = ZeroConfigState::Confirm;
                }
            }
        }
        ZeroConfigOutcome::Pending
    }

    fn step_lurk(
        &mut self,
        event: Option<&FrameEvent>,
        silence_ms: u32,
        sink: &mut dyn SerialSink,
        clock: &dyn MonotonicClock,
    ) -> ZeroConfigOutcome {
        let frame = match event {
            Some(FrameEvent::ValidFrame(frame)) => Some(frame),
            Some(FrameEvent::ValidFrameNotForUs { .. }) => None,
            Some(FrameEvent::InvalidFrame(_)) | None => {
                if event.is_none() && silence_ms >= self.zero_config_silence_ms {
                    self.state = ZeroConfigState::Idle;
                }
                return ZeroConfigOutcome::Pending;
            }
        };

        if let Some(frame) = frame {
            if frame.source == self.candidate {
                log::debug!(
                    "mstp zero-config: candidate {} in use, advancing",
                    self.candidate
                );
                self.advance_candidate();
                return ZeroConfigOutcome::Pending;
            }

            if frame.frame_type == MstpFrameType::PollForMaster && frame.source == 0 {
                if frame.destination > self.zero_config_max_master {
                    self.zero_config_max_master = frame.destination;
                }
                self.poll_count += 1;
            }
        }

        let threshold = ZERO_CONFIG_NMIN_POLL as u32 + self.npoll_slot as u32;
        if self.poll_count >= threshold {
            log::debug!(
                "mstp zero-config: claiming candidate {} after {} PFMs",
                self.candidate, self.poll_count
            );
            let pfm = MstpFrame::poll_for_master(self.candidate, 0);
            let _ = sink.send_frame(&pfm.encode());
            let _ = clock;
            self.poll_count = 0;
            self.state = ZeroConfigState::Claim;
        }
        ZeroConfigOutcome::Pending
    }

    fn step_claim(&mut self, event: Option<&FrameEvent>, silence_ms: u32) -> ZeroConfigOutcome {
        match event {
            Some(FrameEvent::ValidFrame(frame))
                if frame.frame_type == MstpFrameType::ReplyToPollForMaster
                    && frame.destination == self.candidate =>
            {
                log::debug!(
                    "mstp zero-config: candidate {} answered, advancing",
                    self.candidate
                );
                self.advance_candidate();
                self.state = ZeroConfigState::Lurk;
            }
            None if silence_ms >= T_USAGE_TIMEOUT_MS => {
                self.state = ZeroConfigState::Use;
            }
            _ => {}
        }
        if self.state == ZeroConfigState::Use {
            ZeroConfigOutcome::Committed(self.candidate)
        } else {
            ZeroConfigOutcome::Pending
        }
    }

    fn step_confirm(&mut self, event: Option<&FrameEvent>, silence_ms: u32) -> ZeroConfigOutcome {
        match event {
            Some(FrameEvent::ValidFrame(frame))
                if frame.frame_type == MstpFrameType::TestResponse
                    && frame.destination == self.candidate =>
            {
                self.state = ZeroConfigState::Use;
                ZeroConfigOutcome::Committed(self.candidate)
            }
            None if silence_ms >= super::master_fsm::T_REPLY_TIMEOUT_MS => {
                // No responder present is also acceptance.
                self.state = ZeroConfigState::Use;
                ZeroConfigOutcome::Committed(self.candidate)
            }
            _ => ZeroConfigOutcome::Pending,
        }
    }

    /// Emits the `TEST_REQUEST` probe on entry to `CONFIRM`. Exposed as a
    /// free operation rather than folded silently into `step` so the caller
    /// can distinguish "the FSM wants to transmit" from "the FSM is waiting";
    /// the port calls this exactly once per `CONFIRM` entry.
    pub fn send_confirm_probe(&self, sink: &mut dyn SerialSink) {
        let probe = MstpFrame::test_request(self.candidate, 0);
        let _ = sink.send_frame(&probe.encode());
    }
}
