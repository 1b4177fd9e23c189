//! Slave FSM (C6): the minimal responder for non-master addresses.
//!
//! A slave node never holds the token and never initiates a transmission
//! except a reply to a Data-Expecting-Reply addressed to it.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use super::frame::{MstpFrame, MstpFrameType};
use super::npdu_prefix;
use super::pdu_queue::PduQueue;
use super::receive_fsm::FrameEvent;
use super::silence::MonotonicClock;
use super::SerialSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaveState {
    Idle,
    AnswerDataRequest,
}

#[derive(Debug, Clone)]
pub enum StepOutcome {
    None,
    DataIndication {
        expecting_reply: bool,
        source: u8,
        data: Vec<u8>,
    },
}

/// `T_reply_delay`, shared with the master FSM's reply timing.
pub const T_REPLY_DELAY_MS: u32 = 250;

pub struct SlaveFsm {
    state: SlaveState,
    ts: u8,
    wait: Option<Wait>,
}

struct Wait {
    source: u8,
    der_npdu: Vec<u8>,
}

impl SlaveFsm {
    pub fn new(ts: u8) -> Self {
        Self {
            state: SlaveState::Idle,
            ts,
            wait: None,
        }
    }

    pub fn state(&self) -> SlaveState {
        self.state
    }

    pub fn step(
        &mut self,
        event: Option<FrameEvent>,
        silence_ms: u32,
        queue: &mut PduQueue,
        sink: &mut dyn SerialSink,
    ) -> StepOutcome {
        match self.state {
            SlaveState::Idle => self.step_idle(event),
            SlaveState::AnswerDataRequest => {
                self.step_answer(silence_ms, queue, sink)
            }
        }
    }

    fn step_idle(&mut self, event: Option<FrameEvent>) -> StepOutcome {
        let Some(FrameEvent::ValidFrame(frame)) = event else {
            return StepOutcome::None;
        };
        if frame.destination != self.ts {
            return StepOutcome::None;
        }
        match frame.frame_type {
            MstpFrameType::BacnetDataExpectingReply => {
                self.wait = Some(Wait {
                    source: frame.source,
                    der_npdu: frame.data.clone(),
                });
                self.state = SlaveState::AnswerDataRequest;
                StepOutcome::DataIndication {
                    expecting_reply: true,
                    source: frame.source,
                    data: frame.data,
                }
            }
            MstpFrameType::BacnetDataNotExpectingReply => StepOutcome::DataIndication {
                expecting_reply: false,
                source: frame.source,
                data: frame.data,
            },
            _ => StepOutcome::None,
        }
    }

    fn step_answer(
        &mut self,
        silence_ms: u32,
        queue: &mut PduQueue,
        sink: &mut dyn SerialSink,
    ) -> StepOutcome {
        let Some(wait) = self.wait.as_ref() else {
            self.state = SlaveState::Idle;
            return StepOutcome::None;
        };

        if let Some(reply) = queue.get_reply(&wait.der_npdu, npdu_prefix::decode) {
            let frame = MstpFrame {
                frame_type: MstpFrameType::BacnetDataExpectingReply,
                destination: wait.source,
                source: self.ts,
                data: reply.data,
            };
            let _ = sink.send_frame(&frame.encode());
            self.wait = None;
            self.state = SlaveState::Idle;
            return StepOutcome::None;
        }

        if silence_ms >= T_REPLY_DELAY_MS {
            let postponed = MstpFrame::reply_postponed(wait.source, self.ts);
            let _ = sink.send_frame(&postponed.encode());
            self.wait = None;
            self.state = SlaveState::Idle;
        }
        StepOutcome::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datalink::mstp::frame::MstpFrameType;

    struct NullSink;
    impl SerialSink for NullSink {
        fn send_frame(&mut self, _bytes: &[u8]) -> Result<(), super::super::MstpError> {
            Ok(())
        }
        fn poll_byte(&mut self) -> Option<u8> {
            None
        }
    }

    #[test]
    fn ignores_frames_not_addressed_to_us() {
        let mut fsm = SlaveFsm::new(200);
        let mut queue = PduQueue::new();
        let mut sink = NullSink;
        let frame = MstpFrame::token(201, 5);
        let outcome = fsm.step(
            Some(FrameEvent::ValidFrame(frame)),
            0,
            &mut queue,
            &mut sink,
        );
        assert!(matches!(outcome, StepOutcome::None));
        assert_eq!(fsm.state(), SlaveState::Idle);
    }

    #[test]
    fn der_addressed_to_us_enters_answer_state() {
        let mut fsm = SlaveFsm::new(200);
        let mut queue = PduQueue::new();
        let mut sink = NullSink;
        let frame = MstpFrame::bacnet_data(200, 5, vec![1, 2, 3], true).unwrap();
        let outcome = fsm.step(
            Some(FrameEvent::ValidFrame(frame)),
            0,
            &mut queue,
            &mut sink,
        );
        assert!(matches!(outcome, StepOutcome::DataIndication { expecting_reply: true, .. }));
        assert_eq!(fsm.state(), SlaveState::AnswerDataRequest);
    }

    #[test]
    fn answer_times_out_to_reply_postponed() {
        let mut fsm = SlaveFsm::new(200);
        let mut queue = PduQueue::new();
        let mut sink = NullSink;
        let frame = MstpFrame::bacnet_data(200, 5, vec![1, 2, 3], true).unwrap();
        fsm.step(Some(FrameEvent::ValidFrame(frame)), 0, &mut queue, &mut sink);
        fsm.step(None, T_REPLY_DELAY_MS, &mut queue, &mut sink);
        assert_eq!(fsm.state(), SlaveState::Idle);
    }

    #[test]
    fn never_holds_token() {
        let mut fsm = SlaveFsm::new(200);
        let mut queue = PduQueue::new();
        let mut sink = NullSink;
        let frame = MstpFrame::token(200, 5);
        let outcome = fsm.step(
            Some(FrameEvent::ValidFrame(frame)),
            0,
            &mut queue,
            &mut sink,
        );
        assert!(matches!(outcome, StepOutcome::None));
        assert_eq!(fsm.state(), SlaveState::Idle);
        let _ = MstpFrameType::Token;
    }
}
