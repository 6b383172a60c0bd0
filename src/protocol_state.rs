//! TN3270 protocol state machine
//!
//! Ties the negotiator, message framer, command dispatcher and screen
//! together for one connection. Each inbound chunk is processed in a single
//! pass; writes for the host and lifecycle events accumulate in
//! [`Effects`] until the caller takes them. Nothing here touches a socket.

use std::sync::Arc;

use crate::error::{SessionError, WriteError};
use crate::events::{Effects, SessionEvent};
use crate::lib3270::codes::AidKey;
use crate::lib3270::device::DeviceType;
use crate::lib3270::dispatcher::CommandDispatcher;
use crate::lib3270::framer::MessageFramer;
use crate::lib3270::negotiation::{HostOptions, Negotiator, SessionState, Step};
use crate::lib3270::orders::{OrderHandler, OrderRegistry};
use crate::lib3270::screen::ScreenBuffer;
use crate::protocol_common::ebcdic::CodePageTranslator;
use crate::protocol_common::telnet_base::{DONT, IAC, WONT};

#[derive(Debug)]
pub struct ProtocolStateMachine {
    negotiator: Negotiator,
    framer: MessageFramer,
    dispatcher: CommandDispatcher,
    screen: ScreenBuffer,
    orders: OrderRegistry,
    /// Name asked for with CONNECT, restored on every reset
    requested_name: Option<String>,
    effects: Effects,
}

impl ProtocolStateMachine {
    pub fn new(
        device_type: DeviceType,
        device_name: Option<String>,
        translator: Arc<dyn CodePageTranslator>,
    ) -> Self {
        Self {
            negotiator: Negotiator::new(device_type, device_name.clone()),
            framer: MessageFramer::new(),
            dispatcher: CommandDispatcher::new(),
            screen: ScreenBuffer::new(device_type.model(), translator),
            orders: OrderRegistry::new(),
            requested_name: device_name,
            effects: Effects::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.negotiator.state()
    }

    pub fn is_connected(&self) -> bool {
        self.negotiator.state() != SessionState::Disconnected
    }

    pub fn is_tn3270e(&self) -> bool {
        self.negotiator.is_tn3270e()
    }

    pub fn host_options(&self) -> &HostOptions {
        self.negotiator.host_options()
    }

    pub fn device_type(&self) -> DeviceType {
        self.negotiator.device_type()
    }

    pub fn device_name(&self) -> &str {
        self.negotiator.device_name()
    }

    pub fn is_keyboard_locked(&self) -> bool {
        self.dispatcher.is_keyboard_locked()
    }

    pub fn aid(&self) -> AidKey {
        self.dispatcher.aid()
    }

    pub fn screen(&self) -> &ScreenBuffer {
        &self.screen
    }

    pub fn screen_mut(&mut self) -> &mut ScreenBuffer {
        &mut self.screen
    }

    pub fn register_order_handler(&mut self, code: u8, handler: Arc<dyn OrderHandler>) {
        self.orders.register(code, handler);
    }

    pub fn set_translator(&mut self, translator: Arc<dyn CodePageTranslator>) {
        self.screen.set_translator(translator);
    }

    /// Everything recorded since the last call
    pub fn take_effects(&mut self) -> Effects {
        self.effects.take()
    }

    /// Transport is up; negotiation starts with the next chunk
    pub fn on_connected(&mut self) {
        self.negotiator.on_connected();
        self.effects.emit(SessionEvent::SocketConnect);
    }

    /// Run one received chunk through negotiation, framing and dispatch
    ///
    /// An error is fatal: the caller must disconnect. Effects recorded
    /// before the failure are still available from [`Self::take_effects`].
    pub fn process_chunk(&mut self, data: &[u8]) -> Result<(), SessionError> {
        log::debug!("processing {} bytes in {}", data.len(), self.negotiator.state());

        let mut index = 0;
        while index < data.len() {
            if self.negotiator.state().is_data_stream() {
                self.framer
                    .process(&data[index..], &mut self.negotiator, &mut self.effects)?;
                break;
            }
            match self.negotiator.process_byte(data[index], &mut self.effects)? {
                Step::Consumed => index += 1,
                Step::Reprocess => {}
            }
        }

        self.dispatch_completed()
    }

    fn dispatch_completed(&mut self) -> Result<(), SessionError> {
        let tn3270e = self.negotiator.is_tn3270e();
        for message in self.framer.drain_completed() {
            self.dispatcher.dispatch(
                message,
                tn3270e,
                &mut self.screen,
                &self.orders,
                &mut self.effects,
            )?;
        }
        Ok(())
    }

    /// Send an attention key with `payload` after the cursor address
    pub fn send_aid(&mut self, aid: AidKey, payload: &[u8]) {
        let tn3270e = self.negotiator.is_tn3270e();
        self.dispatcher
            .send_aid(aid, payload, tn3270e, &self.screen, &mut self.effects);
    }

    /// PF1..PF24 with every modified field
    pub fn send_pf(&mut self, number: u8) -> Result<(), SessionError> {
        let aid = AidKey::pf(number).ok_or(SessionError::InvalidFunctionKey(number))?;
        let payload = self.screen.read_all_modified();
        self.send_aid(aid, &payload);
        Ok(())
    }

    pub fn send_enter(&mut self) {
        let payload = self.screen.read_all_modified();
        self.send_aid(AidKey::Enter, &payload);
    }

    pub fn write_string(&mut self, text: &str, position: Option<(usize, usize)>) -> Result<(), WriteError> {
        self.screen.write_string(text, position)
    }

    /// Drop all negotiation state and go back to `DISCONNECTED`
    ///
    /// Accepted options are revoked first when the session was connected.
    /// The screen keeps its last contents.
    pub fn disconnect(&mut self) {
        if self.is_connected() {
            for option in self.negotiator.host_options().accepted() {
                let code = option.code();
                self.effects.write(vec![IAC, WONT, code, IAC, DONT, code]);
            }
        }

        self.negotiator = Negotiator::new(self.negotiator.device_type(), self.requested_name.clone());
        self.framer.reset();
        self.dispatcher.reset();
        self.effects.emit(SessionEvent::Close);
    }
}
