//! Protocol building blocks below the 3270 data stream
//!
//! - [`telnet_base`] - Telnet command/option codes and sequence builders
//! - [`ebcdic`] - EBCDIC code-page translation and the translator registry
//!
//! # Examples
//!
//! ```
//! use tn3270r::protocol_common::ebcdic::{ebcdic_to_ascii, ascii_to_ebcdic};
//!
//! assert_eq!(ebcdic_to_ascii(0xC1), 'A');
//! assert_eq!(ascii_to_ebcdic('A'), 0xC1);
//! ```

pub mod ebcdic;
pub mod telnet_base;

pub use ebcdic::{
    ascii_to_ebcdic, ebcdic_to_ascii, CodePageRegistry, CodePageTranslator, Cp037Translator,
    DEFAULT_CODE_PAGE,
};
pub use telnet_base::{build_negotiation, build_subnegotiation, escape_iac, TelnetCommand, TelnetOption};
