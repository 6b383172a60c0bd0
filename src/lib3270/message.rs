//! Inbound TN3270 records

use uuid::Uuid;

use super::codes::{TN3270E_DT_3270_DATA, TN3270E_HEADER_LEN};
use crate::error::DataStreamError;

/// TN3270E data header carried in front of each record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub data_type: u8,
    pub request_flag: u8,
    pub response_flag: u8,
    pub sequence_number: u16,
}

impl MessageHeader {
    /// Parse the five header bytes; the sequence number is little-endian
    pub fn parse(bytes: &[u8]) -> Result<Self, DataStreamError> {
        match bytes {
            [data_type, request_flag, response_flag, seq_lo, seq_hi, ..] => Ok(Self {
                data_type: *data_type,
                request_flag: *request_flag,
                response_flag: *response_flag,
                sequence_number: u16::from_le_bytes([*seq_lo, *seq_hi]),
            }),
            _ => Err(DataStreamError::TruncatedHeader(bytes.len())),
        }
    }

    pub fn is_3270_data(&self) -> bool {
        self.data_type == TN3270E_DT_3270_DATA
    }
}

/// A record assembled from the wire, complete once `IAC EOR` is seen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub header: Option<MessageHeader>,
    data: Vec<u8>,
    complete: bool,
}

impl Message {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            header: None,
            data: Vec::new(),
            complete: false,
        }
    }

    pub fn push_byte(&mut self, byte: u8) {
        self.data.push(byte);
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn set_complete(&mut self) {
        self.complete = true;
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Strip the TN3270E header off the front of the data
    pub fn parse_header(&mut self) -> Result<&MessageHeader, DataStreamError> {
        let header = MessageHeader::parse(&self.data)?;
        self.data.drain(..TN3270E_HEADER_LEN);
        Ok(self.header.insert(header))
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header_strips_prefix() {
        let mut message = Message::new();
        for byte in [0x00, 0x00, 0x02, 0x34, 0x12, 0xF5, 0xC3] {
            message.push_byte(byte);
        }

        let header = *message.parse_header().unwrap();
        assert!(header.is_3270_data());
        assert_eq!(header.response_flag, 0x02);
        assert_eq!(header.sequence_number, 0x1234);
        assert_eq!(message.data(), &[0xF5, 0xC3]);
    }

    #[test]
    fn test_parse_header_truncated() {
        let mut message = Message::new();
        message.push_byte(0x00);
        assert_eq!(message.parse_header(), Err(DataStreamError::TruncatedHeader(1)));
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(Message::new().id, Message::new().id);
    }
}
