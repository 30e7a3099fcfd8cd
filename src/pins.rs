// src/pins.rs - Per-pin capability records
use crate::constants::Mode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pin record as populated by a driver during its connection handshake.
///
/// Every field is optional here because drivers fill them in piecemeal; the
/// validator rejects the table at readiness if anything is still missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinDescriptor {
    #[serde(default)]
    pub supported_modes: Option<Vec<Mode>>,
    #[serde(default)]
    pub mode: Option<Mode>,
    #[serde(default)]
    pub report: Option<u8>,
    #[serde(default)]
    pub analog_channel: Option<u8>,
}

impl PinDescriptor {
    /// Fully populated descriptor.
    pub fn new(supported_modes: Vec<Mode>, mode: Mode, report: u8, analog_channel: u8) -> Self {
        Self {
            supported_modes: Some(supported_modes),
            mode: Some(mode),
            report: Some(report),
            analog_channel: Some(analog_channel),
        }
    }
}

/// The fields every pin must carry before the board can become ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinField {
    SupportedModes,
    Mode,
    Report,
    AnalogChannel,
}

impl fmt::Display for PinField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PinField::SupportedModes => "supported_modes",
            PinField::Mode => "mode",
            PinField::Report => "report",
            PinField::AnalogChannel => "analog_channel",
        };
        f.write_str(name)
    }
}

/// Validated pin, only available once the board is ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pin {
    /// Distinct modes in the order the driver first reported them.
    pub supported_modes: Vec<Mode>,
    pub mode: Mode,
    pub report: bool,
    pub analog_channel: u8,
}

impl Pin {
    pub fn supports(&self, mode: Mode) -> bool {
        self.supported_modes.contains(&mode)
    }

    pub fn is_analog(&self) -> bool {
        self.supports(Mode::Analog)
    }
}
