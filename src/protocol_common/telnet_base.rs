//! Telnet framing primitives shared by the TN3270 negotiator and framer
//!
//! Command and option codes from RFC 854/855, the TN3270E option (RFC 2355)
//! and helpers that build the byte-exact sequences written to the host.

/// Telnet command codes (RFC 854)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelnetCommand {
    /// Interpret As Command - 255 (0xFF)
    IAC = 255,
    /// Don't - 254 (0xFE)
    DONT = 254,
    /// Do - 253 (0xFD)
    DO = 253,
    /// Won't - 252 (0xFC)
    WONT = 252,
    /// Will - 251 (0xFB)
    WILL = 251,
    /// Subnegotiation Begin - 250 (0xFA)
    SB = 250,
    /// Go Ahead - 249 (0xF9)
    GA = 249,
    /// End of Record - 239 (0xEF)
    EOR = 239,
    /// No Operation - 241 (0xF1)
    NOP = 241,
    /// Subnegotiation End - 240 (0xF0)
    SE = 240,
}

impl TelnetCommand {
    /// Convert a byte to a TelnetCommand
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            255 => Some(TelnetCommand::IAC),
            254 => Some(TelnetCommand::DONT),
            253 => Some(TelnetCommand::DO),
            252 => Some(TelnetCommand::WONT),
            251 => Some(TelnetCommand::WILL),
            250 => Some(TelnetCommand::SB),
            249 => Some(TelnetCommand::GA),
            241 => Some(TelnetCommand::NOP),
            240 => Some(TelnetCommand::SE),
            239 => Some(TelnetCommand::EOR),
            _ => None,
        }
    }

    /// True for the four option-negotiation verbs
    pub fn is_option_verb(self) -> bool {
        matches!(
            self,
            TelnetCommand::WILL | TelnetCommand::WONT | TelnetCommand::DO | TelnetCommand::DONT
        )
    }
}

pub const IAC: u8 = TelnetCommand::IAC as u8;
pub const DONT: u8 = TelnetCommand::DONT as u8;
pub const DO: u8 = TelnetCommand::DO as u8;
pub const WONT: u8 = TelnetCommand::WONT as u8;
pub const WILL: u8 = TelnetCommand::WILL as u8;
pub const SB: u8 = TelnetCommand::SB as u8;
pub const SE: u8 = TelnetCommand::SE as u8;
pub const EOR: u8 = TelnetCommand::EOR as u8;

/// TERMINAL-TYPE subnegotiation verbs (RFC 1091)
pub const TTYPE_IS: u8 = 0;
pub const TTYPE_SEND: u8 = 1;

/// Telnet options the TN3270 client negotiates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelnetOption {
    /// Binary Transmission - 0
    Binary = 0,
    /// Terminal Type - 24
    TerminalType = 24,
    /// End of Record - 25
    EndOfRecord = 25,
    /// TN3270 Enhancements - 40
    Tn3270e = 40,
}

impl TelnetOption {
    /// Convert a byte to a TelnetOption
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(TelnetOption::Binary),
            24 => Some(TelnetOption::TerminalType),
            25 => Some(TelnetOption::EndOfRecord),
            40 => Some(TelnetOption::Tn3270e),
            _ => None,
        }
    }

    /// Get the option name as a string
    pub fn name(&self) -> &str {
        match self {
            TelnetOption::Binary => "Binary",
            TelnetOption::TerminalType => "Terminal Type",
            TelnetOption::EndOfRecord => "End of Record",
            TelnetOption::Tn3270e => "TN3270E",
        }
    }
}

/// Build a telnet negotiation sequence
///
/// ```
/// use tn3270r::protocol_common::telnet_base::{build_negotiation, TelnetCommand};
///
/// // "IAC WILL BINARY"
/// let seq = build_negotiation(TelnetCommand::WILL, 0);
/// assert_eq!(seq, vec![255, 251, 0]);
/// ```
pub fn build_negotiation(command: TelnetCommand, option: u8) -> Vec<u8> {
    vec![IAC, command as u8, option]
}

/// Build a telnet subnegotiation sequence `IAC SB <option> <data> IAC SE`
///
/// IAC bytes inside `data` are doubled.
///
/// ```
/// use tn3270r::protocol_common::telnet_base::build_subnegotiation;
///
/// // "IAC SB TERMINAL-TYPE IS IBM-3278-2 IAC SE"
/// let mut data = vec![0];
/// data.extend_from_slice(b"IBM-3278-2");
/// let seq = build_subnegotiation(24, &data);
/// assert_eq!(&seq[..4], &[255, 250, 24, 0]);
/// assert_eq!(&seq[seq.len() - 2..], &[255, 240]);
/// ```
pub fn build_subnegotiation(option: u8, data: &[u8]) -> Vec<u8> {
    let mut result = vec![IAC, SB, option];
    result.extend(escape_iac(data));
    result.push(IAC);
    result.push(SE);
    result
}

/// Double every IAC byte so the payload survives telnet framing
pub fn escape_iac(data: &[u8]) -> Vec<u8> {
    let mut escaped = Vec::with_capacity(data.len());
    for &byte in data {
        escaped.push(byte);
        if byte == IAC {
            escaped.push(IAC);
        }
    }
    escaped
}

/// Format bytes as a compact lowercase hex string for wire dumps
pub fn hex_dump(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}
