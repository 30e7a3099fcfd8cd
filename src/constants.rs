//! Capability vocabulary shared by every board driver.
//!
//! All numeric values here are wire-stable and must not be renumbered.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Digital pin on value
pub const HIGH: u8 = 0x01;
/// Digital pin off value
pub const LOW: u8 = 0x00;

/// Analog channel value a driver reports for pins without an analog channel.
pub const NO_ANALOG_CHANNEL: u8 = 0x7F;

/// The various modes pins support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Mode {
    Input = 0x00,
    Output = 0x01,
    Analog = 0x02,
    Pwm = 0x03,
    Servo = 0x04,
    Shift = 0x05,
    I2c = 0x06,
    OneWire = 0x07,
    Stepper = 0x08,
    Ignore = 0x7F,
    Unknown = 0x10,
}

impl Mode {
    pub const ALL: [Mode; 11] = [
        Mode::Input,
        Mode::Output,
        Mode::Analog,
        Mode::Pwm,
        Mode::Servo,
        Mode::Shift,
        Mode::I2c,
        Mode::OneWire,
        Mode::Stepper,
        Mode::Ignore,
        Mode::Unknown,
    ];

    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn from_value(value: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| mode.value() == value)
    }

    /// Symbolic name as used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Mode::Input => "INPUT",
            Mode::Output => "OUTPUT",
            Mode::Analog => "ANALOG",
            Mode::Pwm => "PWM",
            Mode::Servo => "SERVO",
            Mode::Shift => "SHIFT",
            Mode::I2c => "I2C",
            Mode::OneWire => "ONEWIRE",
            Mode::Stepper => "STEPPER",
            Mode::Ignore => "IGNORE",
            Mode::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The various modes integrated circuits support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum I2cMode {
    Write = 0x00,
    Read = 0x01,
    ContinuousRead = 0x02,
    StopReading = 0x03,
}

impl I2cMode {
    pub fn value(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum StepperType {
    Driver = 0x01,
    TwoWire = 0x02,
    FourWire = 0x04,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum StepperRunState {
    Stop = 0x00,
    Accel = 0x01,
    Decel = 0x02,
    Run = 0x03,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum StepperDirection {
    Ccw = 0x00,
    Cw = 0x01,
}

impl StepperType {
    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Driver),
            0x02 => Some(Self::TwoWire),
            0x04 => Some(Self::FourWire),
            _ => None,
        }
    }
}

impl StepperDirection {
    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Ccw),
            0x01 => Some(Self::Cw),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SerialMode {
    ReadContinuous = 0x00,
    StopReading = 0x01,
}

/// Ids for hardware and software serial ports on the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SerialPortId {
    HwSerial0 = 0x00,
    HwSerial1 = 0x01,
    HwSerial2 = 0x02,
    HwSerial3 = 0x03,
    SwSerial0 = 0x08,
    SwSerial1 = 0x09,
    SwSerial2 = 0x10,
    SwSerial3 = 0x11,
}

/// Pin resolution values reported for serial pins in a capability response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SerialPinType {
    ResRx0 = 0x00,
    ResTx0 = 0x01,
    ResRx1 = 0x02,
    ResTx1 = 0x03,
    ResRx2 = 0x04,
    ResTx2 = 0x05,
    ResRx3 = 0x06,
    ResTx3 = 0x07,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_values_are_wire_stable() {
        assert_eq!(Mode::Input.value(), 0x00);
        assert_eq!(Mode::Stepper.value(), 0x08);
        assert_eq!(Mode::Ignore.value(), 0x7F);
        assert_eq!(Mode::Unknown.value(), 0x10);
        assert_eq!(I2cMode::StopReading.value(), 0x03);
        assert_eq!(StepperType::FourWire as u8, 0x04);
        assert_eq!(SerialPortId::SwSerial3 as u8, 0x11);
        assert_eq!((HIGH, LOW), (1, 0));
    }

    #[test]
    fn test_mode_lookup() {
        assert_eq!(Mode::from_value(0x06), Some(Mode::I2c));
        assert_eq!(Mode::from_value(0x42), None);
        assert_eq!(Mode::OneWire.to_string(), "ONEWIRE");
    }
}
