//! Master FSM (C5): the token-passing master-node state machine.
//!
//! Implements the canonical MS/TP token-passing algorithm. The FSM owns `Ns`
//! (next station), `Ps` (poll station), the info-frame/PFM counters, and
//! `sole_master`. It is the only state machine permitted to initiate a token
//! pass or a poll sweep.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use super::frame::{MstpFrame, MstpFrameType, BROADCAST_ADDRESS};
use super::npdu_prefix;
use super::pdu_queue::{PduQueue, QueuedPdu};
use super::receive_fsm::FrameEvent;
use super::silence::MonotonicClock;
use super::SerialSink;

/// Normative/default timing parameters (milliseconds unless noted). The four
/// not pinned to a single normative value by the standard (`T_usage_timeout`,
/// `T_reply_timeout`, `Nretry_token`, `Npoll`) take the bacnet-stack
/// reference defaults -- see DESIGN.md.
pub const T_FRAME_ABORT_MS: u32 = 60;
pub const T_SLOT_MS: u32 = 10;
pub const T_USAGE_TIMEOUT_MS: u32 = 50;
pub const T_REPLY_TIMEOUT_MS: u32 = 295;
pub const T_REPLY_DELAY_MS: u32 = 250;
pub const NRETRY_TOKEN: u8 = 1;
pub const NPOLL: u8 = 50;

/// `T_no_token(ts) = 500 + 10 * ts`, computed rather than stored.
pub fn t_no_token_ms(ts: u8) -> u32 {
    500 + 10 * ts as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterState {
    Initialize,
    Idle,
    UseToken,
    WaitForReply,
    DoneWithToken,
    PassToken,
    NoToken,
    PollForMaster,
    AnswerDataRequest,
}

/// Outcome of a `MasterFsm::step` call: whether a data frame (DER/DNER) was
/// delivered upward to the network layer this tick.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    None,
    DataIndication {
        expecting_reply: bool,
        source: u8,
        data: Vec<u8>,
    },
}

/// Token-passing master-node state machine.
pub struct MasterFsm {
    state: MasterState,
    ts: u8,
    nmax_master: u8,
    nmax_info_frames: u8,
    ns: u8,
    ps: u8,
    token_count: u8,
    event_count: u8,
    retry_count: u8,
    frame_count: u8,
    sole_master: bool,
    /// Set by [`Self::enter_state`] and consumed by the first `step` call in
    /// the new state. States with an on-entry action (`PollForMaster` sends
    /// its `PFM` exactly once per entry) key off this rather than comparing
    /// silence readings, since entry doesn't always coincide with a send
    /// that would otherwise reset the port's silence timer to a recognizable
    /// sentinel.
    entered_state: bool,
    answer_wait: Option<AnswerWait>,
}

struct AnswerWait {
    source: u8,
    der_npdu: Vec<u8>,
}

impl MasterFsm {
    pub fn new(ts: u8, nmax_master: u8, nmax_info_frames: u8) -> Self {
        let mut fsm = Self {
            state: MasterState::Initialize,
            ts,
            nmax_master,
            nmax_info_frames: nmax_info_frames.max(1),
            ns: ts,
            ps: ts,
            token_count: 0,
            event_count: 0,
            retry_count: 0,
            frame_count: 0,
            sole_master: false,
            entered_state: false,
            answer_wait: None,
        };
        fsm.enter_initialize();
        fsm
    }

    pub fn state(&self) -> MasterState {
        self.state
    }

    pub fn sole_master(&self) -> bool {
        self.sole_master
    }

    pub fn ns(&self) -> u8 {
        self.ns
    }

    pub fn ps(&self) -> u8 {
        self.ps
    }

    /// Update the configured ring size. `Ns`/`Ps` are clamped only at the
    /// next `DONE_WITH_TOKEN`/`POLL_FOR_MASTER` transition, never mid-state.
    pub fn set_nmax_master(&mut self, nmax_master: u8) {
        self.nmax_master = nmax_master;
    }

    fn clamp_ring(&mut self) {
        if self.ns > self.nmax_master {
            self.ns = self.nmax_master;
        }
        if self.ps > self.nmax_master {
            self.ps = self.nmax_master;
        }
    }

    fn ring_size(&self) -> u32 {
        self.nmax_master as u32 + 1
    }

    fn next_in_ring(&self, station: u8) -> u8 {
        ((station as u32 + 1) % self.ring_size()) as u8
    }

    fn enter_initialize(&mut self) {
        self.ns = self.ts;
        self.ps = self.ts;
        self.token_count = 0;
        self.event_count = 0;
        self.retry_count = 0;
        self.frame_count = 0;
        self.sole_master = false;
        self.state = MasterState::Idle;
        log::debug!("mstp master[{}]: initialized, ns=ps=ts", self.ts);
    }

    /// Re-run initialization (host-triggered reset).
    pub fn reinitialize(&mut self) {
        self.enter_initialize();
    }

    /// Advance the FSM by one step. `event` is the frame event taken from
    /// the receive FSM this tick (only if addressed to `ts`, a broadcast, or
    /// observed in transit -- the caller is responsible for routing by
    /// `ts`). `silence_ms` is the current silence-timer reading.
    pub fn step(
        &mut self,
        event: Option<FrameEvent>,
        silence_ms: u32,
        queue: &mut PduQueue,
        sink: &mut dyn SerialSink,
        clock: &dyn MonotonicClock,
    ) -> StepOutcome {
        match self.state {
            MasterState::Initialize => {
                self.enter_initialize();
                StepOutcome::None
            }
            MasterState::Idle => self.step_idle(event, silence_ms, sink, clock),
            MasterState::UseToken => self.step_use_token(queue, sink, clock),
            MasterState::WaitForReply => self.step_wait_for_reply(event, silence_ms),
            MasterState::DoneWithToken => self.step_done_with_token(queue, sink, clock),
            MasterState::PassToken => self.step_pass_token(event, silence_ms, sink, clock),
            MasterState::NoToken => self.step_no_token(event, silence_ms, sink, clock),
            MasterState::PollForMaster => {
                self.step_poll_for_master(event, silence_ms, sink, clock)
            }
            MasterState::AnswerDataRequest => {
                self.step_answer_data_request(silence_ms, queue, sink, clock)
            }
        }
    }

    fn enter_state(&mut self, state: MasterState) {
        self.state = state;
        self.entered_state = true;
    }

    fn handle_addressed_valid_frame(
        &mut self,
        frame: &MstpFrame,
        sink: &mut dyn SerialSink,
        clock: &dyn MonotonicClock,
    ) {
        if frame.source == self.ts && frame.source != BROADCAST_ADDRESS {
            // Open Question resolution (DESIGN.md): a frame whose source
            // equals our own TS is an address conflict, not evidence of
            // another master -- never clears sole_master.
            log::warn!(
                "mstp master[{}]: address conflict, frame from own TS",
                self.ts
            );
            return;
        }
        self.sole_master = false;

        match frame.frame_type {
            MstpFrameType::PollForMaster => {
                let reply =
                    MstpFrame::reply_to_poll_for_master(frame.source, self.ts);
                send(sink, &reply, clock);
            }
            MstpFrameType::TestRequest => {
                let reply = MstpFrame::test_response(frame.source, self.ts);
                send(sink, &reply, clock);
            }
            _ => {}
        }
    }

    fn step_idle(
        &mut self,
        event: Option<FrameEvent>,
        silence_ms: u32,
        sink: &mut dyn SerialSink,
        clock: &dyn MonotonicClock,
    ) -> StepOutcome {
        match event {
            Some(FrameEvent::InvalidFrame(_)) => StepOutcome::None,
            Some(FrameEvent::ValidFrameNotForUs { .. }) => StepOutcome::None,
            Some(FrameEvent::ValidFrame(frame)) => {
                if frame.source == self.ts && frame.source != BROADCAST_ADDRESS {
                    log::warn!(
                        "mstp master[{}]: address conflict, frame from own TS",
                        self.ts
                    );
                    return StepOutcome::None;
                }
                self.sole_master = false;

                if !frame.addressed_to(self.ts) {
                    return StepOutcome::None;
                }
                match frame.frame_type {
                    MstpFrameType::Token => {
                        self.frame_count = 0;
                        self.enter_state(MasterState::UseToken);
                        StepOutcome::None
                    }
                    MstpFrameType::PollForMaster => {
                        let reply =
                            MstpFrame::reply_to_poll_for_master(frame.source, self.ts);
                        send(sink, &reply, clock);
                        StepOutcome::None
                    }
                    MstpFrameType::BacnetDataExpectingReply => {
                        self.answer_wait = Some(AnswerWait {
                            source: frame.source,
                            der_npdu: frame.data.clone(),
                        });
                        let outcome = StepOutcome::DataIndication {
                            expecting_reply: true,
                            source: frame.source,
                            data: frame.data,
                        };
                        self.enter_state(MasterState::AnswerDataRequest);
                        outcome
                    }
                    MstpFrameType::BacnetDataNotExpectingReply => {
                        StepOutcome::DataIndication {
                            expecting_reply: false,
                            source: frame.source,
                            data: frame.data,
                        }
                    }
                    MstpFrameType::TestRequest => {
                        let reply = MstpFrame::test_response(frame.source, self.ts);
                        send(sink, &reply, clock);
                        StepOutcome::None
                    }
                    _ => StepOutcome::None,
                }
            }
            None => {
                if silence_ms >= t_no_token_ms(self.ts) {
                    self.enter_state(MasterState::NoToken);
                }
                StepOutcome::None
            }
        }
    }

    fn step_use_token(
        &mut self,
        queue: &mut PduQueue,
        sink: &mut dyn SerialSink,
        clock: &dyn MonotonicClock,
    ) -> StepOutcome {
        let blocked = matches!(queue.peek_front(), Some(pdu) if pdu.destination_mac == self.ts);
        if queue.is_empty() || blocked {
            self.enter_state(MasterState::DoneWithToken);
            return StepOutcome::None;
        }

        let pdu: QueuedPdu = queue.pop_fifo().expect("checked non-empty above");
        let frame_type = if pdu.data_expecting_reply {
            MstpFrameType::BacnetDataExpectingReply
        } else {
            MstpFrameType::BacnetDataNotExpectingReply
        };
        let frame = MstpFrame {
            frame_type,
            destination: pdu.destination_mac,
            source: self.ts,
            data: pdu.data,
        };
        send(sink, &frame, clock);

        if pdu.data_expecting_reply {
            self.enter_state(MasterState::WaitForReply);
        } else {
            self.frame_count += 1;
            if self.frame_count >= self.nmax_info_frames || queue.is_empty() {
                self.enter_state(MasterState::DoneWithToken);
            }
        }
        StepOutcome::None
    }

    fn step_wait_for_reply(
        &mut self,
        event: Option<FrameEvent>,
        silence_ms: u32,
    ) -> StepOutcome {
        match event {
            Some(FrameEvent::ValidFrameNotForUs { .. }) => StepOutcome::None,
            Some(FrameEvent::ValidFrame(frame)) => {
                // Any reply-shaped frame addressed to us closes the wait.
                if frame.addressed_to(self.ts) {
                    self.enter_state(MasterState::DoneWithToken);
                    return StepOutcome::DataIndication {
                        expecting_reply: false,
                        source: frame.source,
                        data: frame.data,
                    };
                }
                StepOutcome::None
            }
            Some(FrameEvent::InvalidFrame(_)) => {
                self.enter_state(MasterState::DoneWithToken);
                StepOutcome::None
            }
            None => {
                if silence_ms >= T_REPLY_TIMEOUT_MS {
                    self.retry_count += 1;
                    log::debug!("mstp master[{}]: reply timeout, retry {}", self.ts, self.retry_count);
                    self.enter_state(MasterState::DoneWithToken);
                }
                StepOutcome::None
            }
        }
    }

    fn step_done_with_token(
        &mut self,
        queue: &mut PduQueue,
        sink: &mut dyn SerialSink,
        clock: &dyn MonotonicClock,
    ) -> StepOutcome {
        self.clamp_ring();

        if self.frame_count < self.nmax_info_frames && !queue.is_empty() {
            self.enter_state(MasterState::UseToken);
            return StepOutcome::None;
        }

        if !self.sole_master && self.ns != self.next_in_ring(self.ts) {
            let frame = MstpFrame::token(self.ns, self.ts);
            send(sink, &frame, clock);
            self.token_count = self.token_count.saturating_add(1);
            self.retry_count = 0;
            self.enter_state(MasterState::PassToken);
            return StepOutcome::None;
        }

        if self.token_count < NPOLL && self.ps != self.ns {
            self.ps = self.next_in_ring(self.ps);
            self.enter_state(MasterState::PollForMaster);
            return StepOutcome::None;
        }

        self.token_count = 0;
        self.frame_count = 0;
        self.enter_state(MasterState::Idle);
        StepOutcome::None
    }

    fn step_pass_token(
        &mut self,
        event: Option<FrameEvent>,
        silence_ms: u32,
        sink: &mut dyn SerialSink,
        clock: &dyn MonotonicClock,
    ) -> StepOutcome {
        match event {
            Some(FrameEvent::ValidFrame(frame)) => {
                self.handle_addressed_valid_frame(&frame, sink, clock);
                self.enter_state(MasterState::Idle);
                StepOutcome::None
            }
            Some(FrameEvent::ValidFrameNotForUs { .. }) => {
                self.sole_master = false;
                self.enter_state(MasterState::Idle);
                StepOutcome::None
            }
            Some(FrameEvent::InvalidFrame(_)) => StepOutcome::None,
            None => {
                if silence_ms >= T_USAGE_TIMEOUT_MS {
                    if self.retry_count < NRETRY_TOKEN {
                        let frame = MstpFrame::token(self.ns, self.ts);
                        send(sink, &frame, clock);
                        self.retry_count += 1;
                    } else {
                        log::debug!(
                            "mstp master[{}]: token lost to {}, advancing ns",
                            self.ts, self.ns
                        );
                        self.ns = self.next_in_ring(self.ns);
                        self.retry_count = 0;
                        self.enter_state(MasterState::PollForMaster);
                    }
                }
                StepOutcome::None
            }
        }
    }

    fn step_no_token(
        &mut self,
        event: Option<FrameEvent>,
        silence_ms: u32,
        sink: &mut dyn SerialSink,
        clock: &dyn MonotonicClock,
    ) -> StepOutcome {
        match event {
            Some(FrameEvent::ValidFrame(frame)) => {
                self.handle_addressed_valid_frame(&frame, sink, clock);
                self.enter_state(MasterState::Idle);
                StepOutcome::None
            }
            Some(FrameEvent::ValidFrameNotForUs { .. }) => {
                self.sole_master = false;
                self.enter_state(MasterState::Idle);
                StepOutcome::None
            }
            Some(FrameEvent::InvalidFrame(_)) => StepOutcome::None,
            None => {
                let threshold = t_no_token_ms(self.ts) + T_SLOT_MS * self.ts as u32;
                if silence_ms >= threshold {
                    self.event_count = 0;
                    self.enter_state(MasterState::PollForMaster);
                }
                StepOutcome::None
            }
        }
    }

    fn step_poll_for_master(
        &mut self,
        event: Option<FrameEvent>,
        silence_ms: u32,
        sink: &mut dyn SerialSink,
        clock: &dyn MonotonicClock,
    ) -> StepOutcome {
        if core::mem::take(&mut self.entered_state) {
            // First tick in this state: transmit the poll.
            let frame = MstpFrame::poll_for_master(self.ps, self.ts);
            send(sink, &frame, clock);
        }

        match event {
            Some(FrameEvent::ValidFrame(frame)) => {
                if frame.frame_type == MstpFrameType::ReplyToPollForMaster
                    && frame.source == self.ps
                {
                    self.ns = self.ps;
                    self.token_count = 0;
                    let token = MstpFrame::token(self.ns, self.ts);
                    send(sink, &token, clock);
                    self.enter_state(MasterState::PassToken);
                } else {
                    self.handle_addressed_valid_frame(&frame, sink, clock);
                }
                StepOutcome::None
            }
            Some(FrameEvent::ValidFrameNotForUs { .. }) => {
                self.sole_master = false;
                StepOutcome::None
            }
            Some(FrameEvent::InvalidFrame(_)) => StepOutcome::None,
            None => {
                if silence_ms >= T_USAGE_TIMEOUT_MS {
                    let wrapped = self.next_in_ring(self.ps) == self.ts;
                    if wrapped {
                        log::debug!("mstp master[{}]: sole master declared", self.ts);
                        self.sole_master = true;
                        self.ns = self.ts;
                        self.enter_state(MasterState::UseToken);
                    } else {
                        self.ps = self.next_in_ring(self.ps);
                        self.enter_state(MasterState::PollForMaster);
                    }
                }
                StepOutcome::None
            }
        }
    }

    fn step_answer_data_request(
        &mut self,
        silence_ms: u32,
        queue: &mut PduQueue,
        sink: &mut dyn SerialSink,
        clock: &dyn MonotonicClock,
    ) -> StepOutcome {
        let Some(wait) = self.answer_wait.as_ref() else {
            self.enter_state(MasterState::Idle);
            return StepOutcome::None;
        };

        if let Some(reply) = queue.get_reply(&wait.der_npdu, npdu_prefix::decode) {
            let frame = MstpFrame {
                frame_type: MstpFrameType::BacnetDataExpectingReply,
                destination: wait.source,
                source: self.ts,
                data: reply.data,
            };
            send(sink, &frame, clock);
            self.answer_wait = None;
            self.enter_state(MasterState::Idle);
            return StepOutcome::None;
        }

        if silence_ms >= T_REPLY_DELAY_MS {
            let postponed = MstpFrame::reply_postponed(wait.source, self.ts);
            send(sink, &postponed, clock);
            self.answer_wait = None;
            self.enter_state(MasterState::Idle);
        }
        StepOutcome::None
    }
}

fn send(sink: &mut dyn SerialSink, frame: &MstpFrame, clock: &dyn MonotonicClock) {
    let _ = clock;
    let bytes = frame.encode();
    let _ = sink.send_frame(&bytes);
}
