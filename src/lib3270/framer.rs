//! Splits the 3270 data stream into records
//!
//! Doubled IAC bytes are collapsed into a literal 0xFF and `IAC EOR` closes
//! the record being assembled. Completed records queue up in arrival order.

use std::collections::VecDeque;

use super::message::Message;
use super::negotiation::{Negotiator, SessionState};
use crate::error::NegotiationError;
use crate::events::Effects;
use crate::protocol_common::telnet_base::{TelnetCommand, IAC};

#[derive(Debug, Default)]
pub struct MessageFramer {
    queue: VecDeque<Message>,
    /// Option verb seen after IAC, waiting for its option byte
    pending_verb: Option<u8>,
}

impl MessageFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records queued so far, including the one still being assembled
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn reset(&mut self) {
        self.queue.clear();
        self.pending_verb = None;
    }

    /// Feed data mode bytes, driving the negotiator between data states
    pub fn process(
        &mut self,
        data: &[u8],
        negotiator: &mut Negotiator,
        effects: &mut Effects,
    ) -> Result<(), NegotiationError> {
        for &byte in data {
            self.process_byte(byte, negotiator, effects)?;
        }
        Ok(())
    }

    pub fn process_byte(
        &mut self,
        byte: u8,
        negotiator: &mut Negotiator,
        effects: &mut Effects,
    ) -> Result<(), NegotiationError> {
        if let Some(verb) = self.pending_verb.take() {
            negotiator.answer_option(verb, byte, effects);
            return Ok(());
        }

        match negotiator.state() {
            SessionState::StDsTn3270Data => {
                if byte == IAC {
                    negotiator.set_state(SessionState::StDsTn3270DataIac);
                } else {
                    self.current().push_byte(byte);
                }
            }
            SessionState::StDsTn3270DataIac => {
                match TelnetCommand::from_u8(byte) {
                    Some(TelnetCommand::IAC) => self.current().push_byte(IAC),
                    Some(TelnetCommand::EOR) => {
                        self.current().set_complete();
                        self.queue.push_back(Message::new());
                    }
                    Some(command) if command.is_option_verb() => self.pending_verb = Some(byte),
                    _ => log::error!("unexpected command {} in data stream", byte),
                }
                negotiator.set_state(SessionState::StDsTn3270Data);
            }
            state => {
                log::error!("framer called in state {}", state);
                return Err(NegotiationError::UnhandledState(state.name()));
            }
        }
        Ok(())
    }

    /// Pop every completed record off the front of the queue
    pub fn drain_completed(&mut self) -> Vec<Message> {
        let mut completed = Vec::new();
        while self.queue.front().map_or(false, Message::is_complete) {
            if let Some(message) = self.queue.pop_front() {
                if message.is_empty() {
                    log::warn!("skipping empty record {}", message.id);
                } else {
                    completed.push(message);
                }
            }
        }
        completed
    }

    fn current(&mut self) -> &mut Message {
        if self.queue.back().map_or(true, Message::is_complete) {
            self.queue.push_back(Message::new());
        }
        // Never empty after the push above
        let last = self.queue.len() - 1;
        &mut self.queue[last]
    }
}
