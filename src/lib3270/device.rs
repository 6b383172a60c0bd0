//! 3278 device types accepted in TERMINAL-TYPE and TN3270E negotiation

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::address::TerminalModel;
use crate::error::ConfigError;

/// One of the eight IBM 3278 terminal types
///
/// The `-E` variants advertise support for the 3270 extended data stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceType {
    model: TerminalModel,
    extended: bool,
}

impl DeviceType {
    pub const VALID: [&'static str; 8] = [
        "IBM-3278-2",
        "IBM-3278-2-E",
        "IBM-3278-3",
        "IBM-3278-3-E",
        "IBM-3278-4",
        "IBM-3278-4-E",
        "IBM-3278-5",
        "IBM-3278-5-E",
    ];

    pub fn new(model: TerminalModel, extended: bool) -> Self {
        Self { model, extended }
    }

    pub fn model(&self) -> TerminalModel {
        self.model
    }

    pub fn is_extended(&self) -> bool {
        self.extended
    }

    /// Canonical name, e.g. `IBM-3278-2-E`
    pub fn as_str(&self) -> &'static str {
        let index = (self.model.number() as usize - 2) * 2 + usize::from(self.extended);
        Self::VALID[index]
    }

    /// Name bytes as sent on the wire
    pub fn as_bytes(&self) -> &'static [u8] {
        self.as_str().as_bytes()
    }
}

impl Default for DeviceType {
    fn default() -> Self {
        Self::new(TerminalModel::Model2, true)
    }
}

impl FromStr for DeviceType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let index = Self::VALID
            .iter()
            .position(|&valid| valid == s)
            .ok_or_else(|| ConfigError::InvalidDeviceType(s.to_string()))?;
        let model = TerminalModel::from_number(index as u8 / 2 + 2)
            .ok_or_else(|| ConfigError::InvalidDeviceType(s.to_string()))?;
        Ok(Self::new(model, index % 2 == 1))
    }
}

impl TryFrom<String> for DeviceType {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeviceType> for String {
    fn from(value: DeviceType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
