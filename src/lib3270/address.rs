//! 3270 buffer geometry and addressing
//!
//! Linear buffer addresses run from 0 to `rows * cols - 1` and wrap
//! circularly. On the wire an address travels as two bytes, either as two
//! 6-bit values mapped through the address code table (12-bit form) or as a
//! plain 14-bit binary value.

use serde::{Deserialize, Serialize};

/// Standard 3270 terminal models and their primary geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TerminalModel {
    /// Model 2: 24 rows x 80 columns (1920 cells)
    #[default]
    Model2,
    /// Model 3: 32 rows x 80 columns (2560 cells)
    Model3,
    /// Model 4: 43 rows x 80 columns (3440 cells)
    Model4,
    /// Model 5: 27 rows x 132 columns (3564 cells)
    Model5,
}

impl TerminalModel {
    /// Model for the digit in an `IBM-3278-n` device type
    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            2 => Some(Self::Model2),
            3 => Some(Self::Model3),
            4 => Some(Self::Model4),
            5 => Some(Self::Model5),
            _ => None,
        }
    }

    pub fn number(&self) -> u8 {
        match self {
            Self::Model2 => 2,
            Self::Model3 => 3,
            Self::Model4 => 4,
            Self::Model5 => 5,
        }
    }

    /// Get the number of rows for this model
    pub fn rows(&self) -> usize {
        match self {
            Self::Model2 => 24,
            Self::Model3 => 32,
            Self::Model4 => 43,
            Self::Model5 => 27,
        }
    }

    /// Get the number of columns for this model
    pub fn cols(&self) -> usize {
        match self {
            Self::Model2 | Self::Model3 | Self::Model4 => 80,
            Self::Model5 => 132,
        }
    }

    /// Get the total buffer size (rows * cols)
    pub fn buffer_size(&self) -> usize {
        self.rows() * self.cols()
    }

    /// Move `address` by `amount` cells, wrapping in both directions
    pub fn add_to_address(&self, amount: i32, address: u16) -> u16 {
        let size = self.buffer_size() as i32;
        (address as i32 + amount).rem_euclid(size) as u16
    }

    pub fn subtract_from_address(&self, amount: i32, address: u16) -> u16 {
        self.add_to_address(-amount, address)
    }

    /// Cells travelled going forward from `from` to reach `to`
    pub fn distance(&self, from: u16, to: u16) -> usize {
        let size = self.buffer_size() as i32;
        (to as i32 - from as i32).rem_euclid(size) as usize
    }

    /// Convert (row, col) coordinates to a buffer address, wrapping
    pub fn row_col_to_address(&self, row: usize, col: usize) -> u16 {
        ((row * self.cols() + col) % self.buffer_size()) as u16
    }

    /// Convert a buffer address to (row, col) coordinates
    pub fn address_to_row_col(&self, address: u16) -> (usize, usize) {
        let addr = address as usize % self.buffer_size();
        (addr / self.cols(), addr % self.cols())
    }
}

/// 3270 address code table, indexed by 6-bit value
const ADDRESS_CODES: [u8; 64] = [
    0x40, 0xC1, 0xC2, 0xC3, 0xC4, 0xC5, 0xC6, 0xC7, // 0-7
    0xC8, 0xC9, 0x4A, 0x4B, 0x4C, 0x4D, 0x4E, 0x4F, // 8-15
    0x50, 0xD1, 0xD2, 0xD3, 0xD4, 0xD5, 0xD6, 0xD7, // 16-23
    0xD8, 0xD9, 0x5A, 0x5B, 0x5C, 0x5D, 0x5E, 0x5F, // 24-31
    0x60, 0x61, 0xE2, 0xE3, 0xE4, 0xE5, 0xE6, 0xE7, // 32-39
    0xE8, 0xE9, 0x6A, 0x6B, 0x6C, 0x6D, 0x6E, 0x6F, // 40-47
    0xF0, 0xF1, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6, 0xF7, // 48-55
    0xF8, 0xF9, 0x7A, 0x7B, 0x7C, 0x7D, 0x7E, 0x7F, // 56-63
];

/// Encode a buffer address in 12-bit coded form
///
/// ```
/// use tn3270r::lib3270::address::encode_address;
///
/// assert_eq!(encode_address(0), [0x40, 0x40]);
/// assert_eq!(encode_address(5), [0x40, 0xC5]);
/// ```
pub fn encode_address(address: u16) -> [u8; 2] {
    let high = ((address >> 6) & 0x3F) as usize;
    let low = (address & 0x3F) as usize;
    [ADDRESS_CODES[high], ADDRESS_CODES[low]]
}

/// Decode a two-byte buffer address
///
/// When the top two bits of the first byte are clear the pair is a 14-bit
/// binary address, otherwise both bytes carry 6-bit coded values.
///
/// ```
/// use tn3270r::lib3270::address::decode_address;
///
/// assert_eq!(decode_address(0x40, 0xC5), 5);
/// assert_eq!(decode_address(0x07, 0x80), 1920);
/// ```
pub fn decode_address(byte1: u8, byte2: u8) -> u16 {
    if byte1 & 0xC0 == 0 {
        (((byte1 & 0x3F) as u16) << 8) | byte2 as u16
    } else {
        (((byte1 & 0x3F) as u16) << 6) | (byte2 & 0x3F) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_geometry() {
        assert_eq!(TerminalModel::Model2.buffer_size(), 1920);
        assert_eq!(TerminalModel::Model3.buffer_size(), 2560);
        assert_eq!(TerminalModel::Model4.buffer_size(), 3440);
        assert_eq!(TerminalModel::Model5.buffer_size(), 3564);
        assert_eq!(TerminalModel::from_number(5), Some(TerminalModel::Model5));
        assert_eq!(TerminalModel::from_number(6), None);
    }

    #[test]
    fn test_wraparound() {
        let model = TerminalModel::Model2;
        assert_eq!(model.add_to_address(1, 1919), 0);
        assert_eq!(model.add_to_address(-1, 0), 1919);
        assert_eq!(model.subtract_from_address(3, 1), 1918);
        assert_eq!(model.add_to_address(1920 * 2 + 7, 0), 7);
        assert_eq!(model.distance(1918, 2), 4);
        assert_eq!(model.distance(5, 5), 0);
    }

    #[test]
    fn test_row_col_conversion() {
        let model = TerminalModel::Model2;
        assert_eq!(model.row_col_to_address(1, 1), 81);
        assert_eq!(model.address_to_row_col(81), (1, 1));
        assert_eq!(model.address_to_row_col(1919), (23, 79));
    }

    #[test]
    fn test_address_codes() {
        assert_eq!(encode_address(80), [0xC1, 0x50]);
        assert_eq!(decode_address(0xC1, 0x50), 80);
        assert_eq!(encode_address(3563), [0xF7, 0x6B]);
        assert_eq!(decode_address(0xF7, 0x6B), 3563);
    }
}
