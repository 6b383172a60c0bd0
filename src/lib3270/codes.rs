/// TN3270 protocol constants and codes
///
/// Write commands, orders, AIDs, attribute bits and the TN3270E
/// subnegotiation vocabulary.
///
/// # References
/// - RFC 1576: TN3270 Current Practices
/// - RFC 2355: TN3270 Enhancements
/// - IBM 3270 Data Stream Programmer's Reference (GA23-0059)

/// 3270 write-class commands, channel-attached (non-SNA) encoding
pub const CMD_WRITE: u8 = 0xF1;                 // Write
pub const CMD_ERASE_WRITE: u8 = 0xF5;           // Erase/Write
pub const CMD_WRITE_STRUCTURED_FIELD: u8 = 0xF3; // Write Structured Field
pub const CMD_READ_BUFFER: u8 = 0xF2;           // Read Buffer
pub const CMD_READ_MODIFIED: u8 = 0xF6;         // Read Modified
pub const CMD_READ_MODIFIED_ALL: u8 = 0x6E;     // Read Modified All
pub const CMD_ERASE_ALL_UNPROTECTED: u8 = 0x6F; // Erase All Unprotected

/// SNA encoding of the same commands
pub const CMD_SNA_WRITE: u8 = 0x01;
pub const CMD_SNA_ERASE_WRITE: u8 = 0x0D;
pub const CMD_SNA_WRITE_STRUCTURED_FIELD: u8 = 0x11;
pub const CMD_SNA_READ_BUFFER: u8 = 0x02;
pub const CMD_SNA_READ_MODIFIED: u8 = 0x06;
pub const CMD_SNA_READ_MODIFIED_ALL: u8 = 0x0E;
pub const CMD_SNA_ERASE_ALL_UNPROTECTED: u8 = 0x0F;

/// 3270 order codes embedded in Write / Erase/Write payloads
pub const ORDER_SF: u8 = 0x1D;    // Start Field
pub const ORDER_SFE: u8 = 0x29;   // Start Field Extended
pub const ORDER_SBA: u8 = 0x11;   // Set Buffer Address
pub const ORDER_SA: u8 = 0x28;    // Set Attribute
pub const ORDER_MF: u8 = 0x2C;    // Modify Field
pub const ORDER_IC: u8 = 0x13;    // Insert Cursor
pub const ORDER_PT: u8 = 0x05;    // Program Tab
pub const ORDER_RA: u8 = 0x3C;    // Repeat to Address
pub const ORDER_EUA: u8 = 0x12;   // Erase Unprotected to Address
pub const ORDER_GE: u8 = 0x08;    // Graphic Escape

/// Write Control Character bits
pub const WCC_RESTORE: u8 = 0x02;         // Unlock keyboard
pub const WCC_RESET_MDT: u8 = 0x01;       // Reset modified data tags

/// Field attribute byte bits
pub const ATTR_PROTECTED: u8 = 0x20;
pub const ATTR_NUMERIC: u8 = 0x10;
pub const ATTR_MDT: u8 = 0x01;            // Modified Data Tag

/// AID values sent ahead of inbound data
pub const AID_NO_AID: u8 = 0x60;
pub const AID_STRUCTURED_FIELD: u8 = 0x88;
pub const AID_ENTER: u8 = 0x7D;
pub const AID_CLEAR: u8 = 0x6D;
pub const AID_PA1: u8 = 0x6C;
pub const AID_PA2: u8 = 0x6E;
pub const AID_PA3: u8 = 0x6B;

/// PF1 through PF24, indexed by key number - 1
pub const AID_PF: [u8; 24] = [
    0xF1, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6, 0xF7, 0xF8, 0xF9, // PF1-PF9
    0x7A, 0x7B, 0x7C,                                     // PF10-PF12
    0xC1, 0xC2, 0xC3, 0xC4, 0xC5, 0xC6, 0xC7, 0xC8, 0xC9, // PF13-PF21
    0x4A, 0x4B, 0x4C,                                     // PF22-PF24
];

/// Structured field ids (Write Structured Field)
pub const SF_READ_PARTITION: u8 = 0x01;

/// Read Partition operation types
pub const SF_RP_QUERY: u8 = 0x02;
pub const SF_RP_QUERY_LIST: u8 = 0x03;

/// Partition id addressed by Read Partition queries
pub const SF_RP_PARTITION_ALL: u8 = 0xFF;

/// TN3270E subnegotiation commands (RFC 2355)
pub const TN3270E_CONNECT: u8 = 1;
pub const TN3270E_DEVICE_TYPE: u8 = 2;
pub const TN3270E_FUNCTIONS: u8 = 3;
pub const TN3270E_IS: u8 = 4;
pub const TN3270E_REASON: u8 = 5;
pub const TN3270E_REJECT: u8 = 6;
pub const TN3270E_REQUEST: u8 = 7;
pub const TN3270E_SEND: u8 = 8;

/// TN3270E header data types
pub const TN3270E_DT_3270_DATA: u8 = 0x00;
pub const TN3270E_DT_SCS_DATA: u8 = 0x01;
pub const TN3270E_DT_RESPONSE: u8 = 0x02;
pub const TN3270E_DT_BIND_IMAGE: u8 = 0x03;
pub const TN3270E_DT_UNBIND: u8 = 0x04;
pub const TN3270E_DT_NVT_DATA: u8 = 0x05;
pub const TN3270E_DT_REQUEST: u8 = 0x06;
pub const TN3270E_DT_SSCP_LU_DATA: u8 = 0x07;
pub const TN3270E_DT_PRINT_EOJ: u8 = 0x08;

/// Length of the TN3270E data header
pub const TN3270E_HEADER_LEN: usize = 5;

/// Write-class operation, SNA and non-SNA codes mapped together
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandCode {
    Write,
    EraseWrite,
    WriteStructuredField,
    ReadBuffer,
    ReadModified,
    ReadModifiedAll,
    EraseAllUnprotected,
}

impl CommandCode {
    /// Convert a byte value to a CommandCode enum
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            CMD_WRITE | CMD_SNA_WRITE => Some(Self::Write),
            CMD_ERASE_WRITE | CMD_SNA_ERASE_WRITE => Some(Self::EraseWrite),
            CMD_WRITE_STRUCTURED_FIELD | CMD_SNA_WRITE_STRUCTURED_FIELD => {
                Some(Self::WriteStructuredField)
            }
            CMD_READ_BUFFER | CMD_SNA_READ_BUFFER => Some(Self::ReadBuffer),
            CMD_READ_MODIFIED | CMD_SNA_READ_MODIFIED => Some(Self::ReadModified),
            CMD_READ_MODIFIED_ALL | CMD_SNA_READ_MODIFIED_ALL => Some(Self::ReadModifiedAll),
            CMD_ERASE_ALL_UNPROTECTED | CMD_SNA_ERASE_ALL_UNPROTECTED => {
                Some(Self::EraseAllUnprotected)
            }
            _ => None,
        }
    }

    /// Channel-attached byte value
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Write => CMD_WRITE,
            Self::EraseWrite => CMD_ERASE_WRITE,
            Self::WriteStructuredField => CMD_WRITE_STRUCTURED_FIELD,
            Self::ReadBuffer => CMD_READ_BUFFER,
            Self::ReadModified => CMD_READ_MODIFIED,
            Self::ReadModifiedAll => CMD_READ_MODIFIED_ALL,
            Self::EraseAllUnprotected => CMD_ERASE_ALL_UNPROTECTED,
        }
    }
}

/// Attention identifiers the client can send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AidKey {
    NoAid,
    Enter,
    Clear,
    PA1,
    PA2,
    PA3,
    /// Program function key 1..=24
    PF(u8),
    StructuredField,
}

impl AidKey {
    /// PF key by number, `None` outside 1..=24
    pub fn pf(number: u8) -> Option<Self> {
        if (1..=24).contains(&number) {
            Some(Self::PF(number))
        } else {
            None
        }
    }

    /// Convert a byte value to an AidKey enum
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            AID_NO_AID => Some(Self::NoAid),
            AID_ENTER => Some(Self::Enter),
            AID_CLEAR => Some(Self::Clear),
            AID_PA1 => Some(Self::PA1),
            AID_PA2 => Some(Self::PA2),
            AID_PA3 => Some(Self::PA3),
            AID_STRUCTURED_FIELD => Some(Self::StructuredField),
            other => AID_PF
                .iter()
                .position(|&b| b == other)
                .map(|index| Self::PF(index as u8 + 1)),
        }
    }

    /// Convert AidKey enum to byte value
    ///
    /// An out-of-range PF number encodes as `NoAid`.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::NoAid => AID_NO_AID,
            Self::Enter => AID_ENTER,
            Self::Clear => AID_CLEAR,
            Self::PA1 => AID_PA1,
            Self::PA2 => AID_PA2,
            Self::PA3 => AID_PA3,
            Self::PF(n) if (1..=24).contains(&n) => AID_PF[n as usize - 1],
            Self::PF(_) => AID_NO_AID,
            Self::StructuredField => AID_STRUCTURED_FIELD,
        }
    }
}

/// Text for a TN3270E DEVICE-TYPE REJECT reason code
pub fn reason_text(code: u8) -> &'static str {
    match code {
        0 => "Connection Partner",
        1 => "Device in Use",
        2 => "Invalid Associate",
        3 => "Invalid Name",
        4 => "Invalid Device Type",
        5 => "Type Name Error",
        6 => "Unknown Error",
        7 => "Unsupported Request",
        _ => "Unrecognized Reason",
    }
}
