//! Telnet / TN3270E negotiation state machine
//!
//! Bytes received before the session reaches 3270 data mode are fed here
//! one at a time. The machine answers option requests, handles the
//! TERMINAL-TYPE and TN3270E subnegotiations, and hands over to the message
//! framer once binary mode or the TN3270E function list is settled.

use std::fmt;

use super::codes::*;
use super::device::DeviceType;
use crate::error::NegotiationError;
use crate::events::{Effects, SessionEvent};
use crate::protocol_common::telnet_base::{
    build_negotiation, build_subnegotiation, TelnetCommand, TelnetOption, DO, DONT, IAC, SB, SE,
    TTYPE_IS, TTYPE_SEND, WILL, WONT,
};

/// Every state the session can be in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    Connected,
    StIac,
    StWill,
    StWont,
    StDo,
    StDont,
    StSb,
    StSbTn3270e,
    StSbTn3270eSend,
    StSbTn3270eSendDeviceType,
    StSbTn3270eDeviceType,
    StSbTn3270eDeviceTypeIs,
    StSbTn3270eDeviceTypeReject,
    StSbTn3270eDeviceTypeRejectReason,
    StSbConnect,
    StSbTn3270eFunctions,
    StSbTn3270eFunctionsIs,
    StSbTerminalType,
    StSbTerminalTypeSend,
    Negotiated,
    StDsTn3270Data,
    StDsTn3270DataIac,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connected => "CONNECTED",
            Self::StIac => "ST_IAC",
            Self::StWill => "ST_WILL",
            Self::StWont => "ST_WONT",
            Self::StDo => "ST_DO",
            Self::StDont => "ST_DONT",
            Self::StSb => "ST_SB",
            Self::StSbTn3270e => "ST_SB_TN3270E",
            Self::StSbTn3270eSend => "ST_SB_TN3270E_SEND",
            Self::StSbTn3270eSendDeviceType => "ST_SB_TN3270E_SEND_DEVICE_TYPE",
            Self::StSbTn3270eDeviceType => "ST_SB_TN3270E_DEVICE_TYPE",
            Self::StSbTn3270eDeviceTypeIs => "ST_SB_TN3270E_DEVICE_TYPE_IS",
            Self::StSbTn3270eDeviceTypeReject => "ST_SB_TN3270E_DEVICE_TYPE_REJECT",
            Self::StSbTn3270eDeviceTypeRejectReason => "ST_SB_TN3270E_DEVICE_TYPE_REJECT_REASON",
            Self::StSbConnect => "ST_SB_CONNECT",
            Self::StSbTn3270eFunctions => "ST_SB_TN3270E_FUNCTIONS",
            Self::StSbTn3270eFunctionsIs => "ST_SB_TN3270E_FUNCTIONS_IS",
            Self::StSbTerminalType => "ST_SB_TERMINAL_TYPE",
            Self::StSbTerminalTypeSend => "ST_SB_TERMINAL_TYPE_SEND",
            Self::Negotiated => "NEGOTIATED",
            Self::StDsTn3270Data => "ST_DS_TN3270_DATA",
            Self::StDsTn3270DataIac => "ST_DS_TN3270_DATA_IAC",
        }
    }

    /// True once bytes belong to the message framer
    pub fn is_data_stream(&self) -> bool {
        matches!(self, Self::StDsTn3270Data | Self::StDsTn3270DataIac)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Options whose acceptance the session tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOption {
    Binary,
    TerminalType,
    EndOfRecord,
    Tn3270e,
}

impl HostOption {
    pub fn from_u8(option: u8) -> Option<Self> {
        match TelnetOption::from_u8(option)? {
            TelnetOption::Binary => Some(Self::Binary),
            TelnetOption::TerminalType => Some(Self::TerminalType),
            TelnetOption::EndOfRecord => Some(Self::EndOfRecord),
            TelnetOption::Tn3270e => Some(Self::Tn3270e),
        }
    }

    pub fn code(self) -> u8 {
        let option = match self {
            Self::Binary => TelnetOption::Binary,
            Self::TerminalType => TelnetOption::TerminalType,
            Self::EndOfRecord => TelnetOption::EndOfRecord,
            Self::Tn3270e => TelnetOption::Tn3270e,
        };
        option as u8
    }
}

/// Accepted/rejected flag per host option, all false when constructed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostOptions {
    pub binary: bool,
    pub terminal_type: bool,
    pub end_of_record: bool,
    pub tn3270e: bool,
}

impl HostOptions {
    pub fn get(&self, option: HostOption) -> bool {
        match option {
            HostOption::Binary => self.binary,
            HostOption::TerminalType => self.terminal_type,
            HostOption::EndOfRecord => self.end_of_record,
            HostOption::Tn3270e => self.tn3270e,
        }
    }

    pub fn set(&mut self, option: HostOption, accepted: bool) {
        let slot = match option {
            HostOption::Binary => &mut self.binary,
            HostOption::TerminalType => &mut self.terminal_type,
            HostOption::EndOfRecord => &mut self.end_of_record,
            HostOption::Tn3270e => &mut self.tn3270e,
        };
        *slot = accepted;
    }

    /// Options currently accepted, in wire code order
    pub fn accepted(&self) -> Vec<HostOption> {
        [
            HostOption::Binary,
            HostOption::TerminalType,
            HostOption::EndOfRecord,
            HostOption::Tn3270e,
        ]
        .into_iter()
        .filter(|option| self.get(*option))
        .collect()
    }

    /// Record an option by wire code; codes outside the tracked set are ignored
    pub fn record(&mut self, option: u8, accepted: bool) {
        match HostOption::from_u8(option) {
            Some(known) => self.set(known, accepted),
            None => log::debug!("not tracking option {}", option),
        }
    }
}

/// Whether the byte just handed to [`Negotiator::process_byte`] was used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Consumed,
    /// Data mode was entered and the byte belongs to the framer
    Reprocess,
}

/// Negotiation state for one connection
#[derive(Debug, Clone)]
pub struct Negotiator {
    state: SessionState,
    host_options: HostOptions,
    device_type: DeviceType,
    /// Name requested with CONNECT, replaced by the name the host assigns
    device_name: String,
    functions: Vec<u8>,
    connect_fired: bool,
}

impl Negotiator {
    pub fn new(device_type: DeviceType, device_name: Option<String>) -> Self {
        Self {
            state: SessionState::Disconnected,
            host_options: HostOptions::default(),
            device_type,
            device_name: device_name.unwrap_or_default(),
            functions: Vec::new(),
            connect_fired: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            log::debug!("state changed from {} to {}", self.state, state);
        }
        self.state = state;
    }

    pub fn host_options(&self) -> &HostOptions {
        &self.host_options
    }

    pub fn is_tn3270e(&self) -> bool {
        self.host_options.tn3270e
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Function codes the host agreed to in FUNCTIONS IS
    pub fn functions(&self) -> &[u8] {
        &self.functions
    }

    /// Transport is up: start listening for negotiation
    pub fn on_connected(&mut self) {
        self.set_state(SessionState::Connected);
    }

    /// Feed one pre-data-mode byte
    ///
    /// Unknown bytes are logged and ignored. A device type rejection or a
    /// state that cannot be negotiated from is fatal.
    pub fn process_byte(&mut self, byte: u8, effects: &mut Effects) -> Result<Step, NegotiationError> {
        match self.state {
            SessionState::Connected => {
                if byte == IAC {
                    self.set_state(SessionState::StIac);
                }
            }
            SessionState::StIac => self.handle_iac_command(byte),
            SessionState::StWill => {
                effects.write(build_negotiation(TelnetCommand::DO, byte));
                self.host_options.record(byte, true);
                self.set_state(SessionState::Connected);
            }
            SessionState::StWont => {
                effects.write(build_negotiation(TelnetCommand::DONT, byte));
                self.host_options.record(byte, false);
                self.set_state(SessionState::Connected);
            }
            SessionState::StDo => {
                effects.write(build_negotiation(TelnetCommand::WILL, byte));
                self.host_options.record(byte, true);
                if byte == TelnetOption::Binary as u8 {
                    self.set_state(SessionState::Negotiated);
                    self.enter_data_stream(effects);
                } else {
                    self.set_state(SessionState::Connected);
                }
            }
            SessionState::StDont => {
                effects.write(build_negotiation(TelnetCommand::WONT, byte));
                self.host_options.record(byte, false);
                self.set_state(SessionState::Connected);
            }
            SessionState::StSb => match TelnetOption::from_u8(byte) {
                Some(TelnetOption::Tn3270e) => self.set_state(SessionState::StSbTn3270e),
                Some(TelnetOption::TerminalType) => self.set_state(SessionState::StSbTerminalType),
                _ => self.invalid(byte),
            },
            SessionState::StSbTn3270e => match byte {
                TN3270E_SEND => self.set_state(SessionState::StSbTn3270eSend),
                TN3270E_DEVICE_TYPE => self.set_state(SessionState::StSbTn3270eDeviceType),
                TN3270E_FUNCTIONS => self.set_state(SessionState::StSbTn3270eFunctions),
                _ => self.invalid(byte),
            },
            SessionState::StSbTn3270eSend => match byte {
                TN3270E_DEVICE_TYPE => {
                    self.set_state(SessionState::StSbTn3270eSendDeviceType);
                    self.send_device_type_request(effects);
                }
                _ => self.invalid(byte),
            },
            SessionState::StSbTn3270eSendDeviceType
            | SessionState::StSbTerminalTypeSend => match byte {
                IAC => self.set_state(SessionState::StIac),
                _ => self.invalid(byte),
            },
            SessionState::StSbTn3270eDeviceType => match byte {
                TN3270E_IS => self.set_state(SessionState::StSbTn3270eDeviceTypeIs),
                TN3270E_REJECT => self.set_state(SessionState::StSbTn3270eDeviceTypeReject),
                _ => self.invalid(byte),
            },
            SessionState::StSbTn3270eDeviceTypeIs => match byte {
                TN3270E_CONNECT => {
                    self.device_name.clear();
                    self.set_state(SessionState::StSbConnect);
                }
                IAC => {
                    self.set_state(SessionState::StIac);
                    self.send_functions_request(effects);
                }
                // Echo of the device type we asked for
                _ => {}
            },
            SessionState::StSbTn3270eDeviceTypeReject => match byte {
                TN3270E_REASON => self.set_state(SessionState::StSbTn3270eDeviceTypeRejectReason),
                _ => self.invalid(byte),
            },
            SessionState::StSbTn3270eDeviceTypeRejectReason => {
                let reason = reason_text(byte);
                log::error!("device type rejected: {}", reason);
                return Err(NegotiationError::DeviceTypeRejected { code: byte, reason });
            }
            SessionState::StSbConnect => {
                if byte == IAC {
                    log::debug!("host assigned device name '{}'", self.device_name);
                    self.set_state(SessionState::StIac);
                    self.send_functions_request(effects);
                } else {
                    self.device_name.push(byte as char);
                }
            }
            SessionState::StSbTn3270eFunctions => match byte {
                TN3270E_IS => {
                    self.functions.clear();
                    self.set_state(SessionState::StSbTn3270eFunctionsIs);
                }
                _ => self.invalid(byte),
            },
            SessionState::StSbTn3270eFunctionsIs => {
                if byte == IAC {
                    log::debug!("host functions: {:?}", self.functions);
                    self.set_state(SessionState::Negotiated);
                } else {
                    self.functions.push(byte);
                }
            }
            SessionState::StSbTerminalType => match byte {
                TTYPE_SEND => {
                    self.set_state(SessionState::StSbTerminalTypeSend);
                    self.send_terminal_type(effects);
                }
                _ => self.invalid(byte),
            },
            SessionState::Negotiated => {
                // Waiting for the SE that closes FUNCTIONS IS
                self.enter_data_stream(effects);
                if byte != SE {
                    return Ok(Step::Reprocess);
                }
            }
            SessionState::Disconnected
            | SessionState::StDsTn3270Data
            | SessionState::StDsTn3270DataIac => {
                log::error!("unhandled state: {}", self.state);
                return Err(NegotiationError::UnhandledState(self.state.name()));
            }
        }
        Ok(Step::Consumed)
    }

    /// Reply to an option verb seen while in data mode; state is not touched
    pub fn answer_option(&mut self, verb: u8, option: u8, effects: &mut Effects) {
        let (reply, accepted) = match verb {
            WILL => (TelnetCommand::DO, true),
            WONT => (TelnetCommand::DONT, false),
            DO => (TelnetCommand::WILL, true),
            DONT => (TelnetCommand::WONT, false),
            _ => {
                log::error!("not an option verb: {}", verb);
                return;
            }
        };
        effects.write(build_negotiation(reply, option));
        self.host_options.record(option, accepted);
    }

    fn handle_iac_command(&mut self, byte: u8) {
        let next = match byte {
            WILL => SessionState::StWill,
            WONT => SessionState::StWont,
            DO => SessionState::StDo,
            DONT => SessionState::StDont,
            SB => SessionState::StSb,
            SE => SessionState::Connected,
            _ => return self.invalid(byte),
        };
        self.set_state(next);
    }

    fn enter_data_stream(&mut self, effects: &mut Effects) {
        if !self.connect_fired {
            self.connect_fired = true;
            effects.emit(SessionEvent::Connect);
        }
        self.set_state(SessionState::StDsTn3270Data);
    }

    fn invalid(&self, byte: u8) {
        log::error!("invalid negotiation, invalid command {} in {}", byte, self.state);
    }

    /// IAC SB TN3270E DEVICE-TYPE REQUEST <type> [CONNECT <name>] IAC SE
    fn send_device_type_request(&self, effects: &mut Effects) {
        let mut data = vec![TN3270E_DEVICE_TYPE, TN3270E_REQUEST];
        data.extend_from_slice(self.device_type.as_bytes());
        if !self.device_name.is_empty() {
            data.push(TN3270E_CONNECT);
            data.extend_from_slice(self.device_name.as_bytes());
        }
        effects.write(build_subnegotiation(TelnetOption::Tn3270e as u8, &data));
    }

    /// IAC SB TN3270E FUNCTIONS REQUEST IAC SE
    fn send_functions_request(&self, effects: &mut Effects) {
        effects.write(build_subnegotiation(
            TelnetOption::Tn3270e as u8,
            &[TN3270E_FUNCTIONS, TN3270E_REQUEST],
        ));
    }

    /// IAC SB TERMINAL-TYPE IS <type> IAC SE
    fn send_terminal_type(&self, effects: &mut Effects) {
        let mut data = vec![TTYPE_IS];
        data.extend_from_slice(self.device_type.as_bytes());
        effects.write(build_subnegotiation(TelnetOption::TerminalType as u8, &data));
    }
}
