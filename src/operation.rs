//! Canonical operation records handed to a [`Transport`](crate::transport::Transport).
//!
//! Every variable-shape invocation is normalized into one of these before it
//! leaves the board, so a transport never has to guess at argument layout.
//! Completion handlers are not part of the record; they stay registered on the
//! board under the stream the reply will arrive on.

use crate::constants::{I2cMode, Mode, StepperDirection, StepperType};
use crate::events::OneWireDevice;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I2cWriteRequest {
    pub address: u8,
    pub register: Option<u8>,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I2cReadRequest {
    pub address: u8,
    pub register: Option<u8>,
    pub byte_count: u16,
    /// `Read` for one-shot reads, `ContinuousRead` for streaming ones.
    pub mode: I2cMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulseIn {
    pub pin: u8,
    pub value: u8,
    pub pulse_out: u32,
    pub timeout: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepperConfig {
    pub device: u8,
    pub stepper_type: StepperType,
    pub steps_per_rev: u16,
    /// Direction pin for `Driver` steppers, motor 1 pin otherwise.
    pub dir_or_motor1_pin: u8,
    /// Step pin for `Driver` steppers, motor 2 pin otherwise.
    pub step_or_motor2_pin: u8,
    pub motor3_pin: Option<u8>,
    pub motor4_pin: Option<u8>,
}

/// Acceleration and deceleration in units of 0.01 rad/s².
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ramp {
    pub accel: u32,
    pub decel: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepperStep {
    pub device: u8,
    pub direction: StepperDirection,
    pub steps: u32,
    /// Speed in units of 0.01 rad/s.
    pub speed: u32,
    pub ramp: Option<Ramp>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OneWireOp {
    Config { pin: u8, parasitic_power: bool },
    Search { pin: u8 },
    AlarmsSearch { pin: u8 },
    /// Issued by the board itself ahead of device-targeted operations.
    Select { pin: u8, device: OneWireDevice },
    Read {
        pin: u8,
        device: OneWireDevice,
        byte_count: u16,
        correlation_id: u16,
    },
    Reset { pin: u8 },
    Write {
        pin: u8,
        device: OneWireDevice,
        data: Vec<u8>,
    },
    Delay { pin: u8, delay_ms: u32 },
    WriteAndRead {
        pin: u8,
        device: OneWireDevice,
        data: Vec<u8>,
        byte_count: u16,
        correlation_id: u16,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    PinMode { pin: u8, mode: Mode },
    DigitalWrite { pin: u8, value: u8 },
    AnalogWrite { pin: u8, value: u16 },
    ServoWrite { pin: u8, value: u16 },
    ReportAnalogPin { pin: u8, enabled: bool },
    ReportDigitalPin { pin: u8, enabled: bool },
    SetSamplingInterval { interval_ms: u32 },
    QueryCapabilities,
    QueryAnalogMapping,
    QueryPinState { pin: u8 },
    ReportVersion,
    QueryFirmware,
    I2cConfig { delay_us: u32 },
    I2cWrite(I2cWriteRequest),
    I2cRead(I2cReadRequest),
    I2cStopReading { address: u8, register: Option<u8> },
    PulseIn(PulseIn),
    StepperConfig(StepperConfig),
    StepperStep(StepperStep),
    Reset,
    OneWire(OneWireOp),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::PinMode { .. } => "pin_mode",
            Operation::DigitalWrite { .. } => "digital_write",
            Operation::AnalogWrite { .. } => "analog_write",
            Operation::ServoWrite { .. } => "servo_write",
            Operation::ReportAnalogPin { .. } => "report_analog_pin",
            Operation::ReportDigitalPin { .. } => "report_digital_pin",
            Operation::SetSamplingInterval { .. } => "set_sampling_interval",
            Operation::QueryCapabilities => "query_capabilities",
            Operation::QueryAnalogMapping => "query_analog_mapping",
            Operation::QueryPinState { .. } => "query_pin_state",
            Operation::ReportVersion => "report_version",
            Operation::QueryFirmware => "query_firmware",
            Operation::I2cConfig { .. } => "i2c_config",
            Operation::I2cWrite(_) => "i2c_write",
            Operation::I2cRead(request) if request.mode == I2cMode::ContinuousRead => "i2c_read",
            Operation::I2cRead(_) => "i2c_read_once",
            Operation::I2cStopReading { .. } => "i2c_stop_reading",
            Operation::PulseIn(_) => "pulse_in",
            Operation::StepperConfig(_) => "stepper_config",
            Operation::StepperStep(_) => "stepper_step",
            Operation::Reset => "reset",
            Operation::OneWire(op) => match op {
                OneWireOp::Config { .. } => "one_wire_config",
                OneWireOp::Search { .. } => "one_wire_search",
                OneWireOp::AlarmsSearch { .. } => "one_wire_alarms_search",
                OneWireOp::Select { .. } => "one_wire_select",
                OneWireOp::Read { .. } => "one_wire_read",
                OneWireOp::Reset { .. } => "one_wire_reset",
                OneWireOp::Write { .. } => "one_wire_write",
                OneWireOp::Delay { .. } => "one_wire_delay",
                OneWireOp::WriteAndRead { .. } => "one_wire_write_and_read",
            },
        }
    }
}
