//! Simulated board for the `boardio` binary and tests.
//!
//! The simulator plays the firmware side: it answers canonical operations
//! with arrivals and, on every sampling tick, re-emits readings for the
//! streams that have reporting enabled.

use crate::config::Config;
use crate::constants::{I2cMode, Mode};
use crate::events::{Arrival, OneWireDevice, Reading, StreamKey};
use crate::operation::{OneWireOp, Operation};
use crate::pins::PinDescriptor;
use crate::transport::{Connector, TransportError};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct SimulatedBoard {
    pins: Vec<PinDescriptor>,
    devices: Vec<OneWireDevice>,
    fill_byte: u8,
    firmware: (String, u8, u8),
    sampling_interval: Duration,
    digital_levels: HashMap<u8, u8>,
    analog_counter: u16,
    reporting: BTreeSet<ReportKey>,
    continuous_i2c: HashMap<(u8, Option<u8>), u16>,
    onewire_buses: HashSet<u8>,
}

/// Reporting streams, ordered so ticks emit deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ReportKey {
    Analog(u8),
    Digital(u8),
}

impl SimulatedBoard {
    pub fn new(pins: Vec<PinDescriptor>) -> Self {
        Self {
            pins,
            devices: Vec::new(),
            fill_byte: 0xA5,
            firmware: ("boardio-sim".to_string(), 2, 5),
            sampling_interval: Duration::from_millis(19),
            digital_levels: HashMap::new(),
            analog_counter: 0,
            reporting: BTreeSet::new(),
            continuous_i2c: HashMap::new(),
            onewire_buses: HashSet::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut board = Self::new(config.pins.clone());
        board.devices = config
            .sim
            .onewire_devices
            .iter()
            .copied()
            .map(OneWireDevice)
            .collect();
        board.fill_byte = config.sim.fill_byte;
        let (major, minor) = config.sim.firmware_version;
        board.firmware = (config.sim.firmware_name.clone(), major, minor);
        let interval_ms = config.board.sampling_interval_ms.max(1);
        board.sampling_interval = Duration::from_millis(interval_ms as u64);
        board
    }

    pub fn with_devices(mut self, devices: Vec<OneWireDevice>) -> Self {
        self.devices = devices;
        self
    }

    fn bytes(&self, count: u16) -> Vec<u8> {
        (0..count).map(|i| self.fill_byte.wrapping_add(i as u8)).collect()
    }

    fn next_analog(&mut self) -> u16 {
        self.analog_counter = (self.analog_counter + 37) % 1024;
        self.analog_counter
    }

    /// Arrivals the board produces in reply to `operation`.
    pub fn respond(&mut self, operation: &Operation) -> Vec<Arrival> {
        match operation {
            Operation::DigitalWrite { pin, value } => {
                self.digital_levels.insert(*pin, *value);
                Vec::new()
            }
            Operation::ReportAnalogPin { pin, enabled } => {
                self.toggle(ReportKey::Analog(*pin), *enabled);
                if *enabled {
                    vec![self.sample(ReportKey::Analog(*pin))]
                } else {
                    Vec::new()
                }
            }
            Operation::ReportDigitalPin { pin, enabled } => {
                self.toggle(ReportKey::Digital(*pin), *enabled);
                if *enabled {
                    vec![self.sample(ReportKey::Digital(*pin))]
                } else {
                    Vec::new()
                }
            }
            Operation::SetSamplingInterval { interval_ms } => {
                self.sampling_interval = Duration::from_millis((*interval_ms).max(1) as u64);
                Vec::new()
            }
            Operation::QueryCapabilities => {
                let modes = self
                    .pins
                    .iter()
                    .map(|pin| pin.supported_modes.clone().unwrap_or_default())
                    .collect();
                vec![Arrival::data(StreamKey::Capabilities, Reading::Capabilities(modes))]
            }
            Operation::QueryAnalogMapping => {
                let mapping = self
                    .pins
                    .iter()
                    .map(|pin| pin.analog_channel.unwrap_or(crate::constants::NO_ANALOG_CHANNEL))
                    .collect();
                vec![Arrival::data(StreamKey::AnalogMapping, Reading::AnalogMapping(mapping))]
            }
            Operation::QueryPinState { pin } => {
                let key = StreamKey::PinState(*pin);
                match self.pins.get(*pin as usize) {
                    Some(descriptor) => {
                        let mode = descriptor.mode.unwrap_or(Mode::Unknown);
                        let state = self.digital_levels.get(pin).copied().unwrap_or(0) as u32;
                        vec![Arrival::data(key, Reading::PinState { mode, state })]
                    }
                    None => vec![Arrival::failure(
                        key,
                        TransportError::Board(format!("no such pin {}", pin)),
                    )],
                }
            }
            Operation::ReportVersion => {
                let (_, major, minor) = self.firmware;
                vec![Arrival::data(StreamKey::Version, Reading::Version { major, minor })]
            }
            Operation::QueryFirmware => {
                let (name, major, minor) = self.firmware.clone();
                vec![Arrival::data(StreamKey::Firmware, Reading::Firmware { name, major, minor })]
            }
            Operation::I2cRead(request) => {
                let key = StreamKey::I2c {
                    address: request.address,
                    register: request.register,
                };
                if request.mode == I2cMode::ContinuousRead {
                    self.continuous_i2c
                        .insert((request.address, request.register), request.byte_count);
                }
                vec![Arrival::data(key, Reading::Bytes(self.bytes(request.byte_count)))]
            }
            Operation::I2cStopReading { address, register } => {
                self.continuous_i2c.remove(&(*address, *register));
                Vec::new()
            }
            Operation::PulseIn(request) => {
                let duration = request.timeout.min(1500);
                let key = StreamKey::PulseIn(request.pin);
                vec![Arrival::data(key, Reading::PulseDuration(duration))]
            }
            Operation::StepperStep(step) => {
                vec![Arrival::data(StreamKey::Stepper(step.device), Reading::StepperDone)]
            }
            Operation::Reset => {
                self.reporting.clear();
                self.continuous_i2c.clear();
                self.digital_levels.clear();
                Vec::new()
            }
            Operation::OneWire(op) => self.respond_one_wire(op),
            _ => Vec::new(),
        }
    }

    fn respond_one_wire(&mut self, op: &OneWireOp) -> Vec<Arrival> {
        match op {
            OneWireOp::Config { pin, .. } => {
                self.onewire_buses.insert(*pin);
                Vec::new()
            }
            OneWireOp::Search { pin } => {
                let devices = Reading::Devices(self.devices.clone());
                vec![Arrival::data(StreamKey::OneWireSearch(*pin), devices)]
            }
            OneWireOp::AlarmsSearch { pin } => {
                let key = StreamKey::OneWireAlarmsSearch(*pin);
                vec![Arrival::data(key, Reading::Devices(Vec::new()))]
            }
            OneWireOp::Read {
                pin,
                byte_count,
                correlation_id,
                ..
            }
            | OneWireOp::WriteAndRead {
                pin,
                byte_count,
                correlation_id,
                ..
            } => {
                let key = StreamKey::OneWireReply(*correlation_id);
                if self.onewire_buses.contains(pin) {
                    vec![Arrival::data(key, Reading::Bytes(self.bytes(*byte_count)))]
                } else {
                    vec![Arrival::failure(
                        key,
                        TransportError::Board(format!("no OneWire bus configured on pin {}", pin)),
                    )]
                }
            }
            _ => Vec::new(),
        }
    }

    fn toggle(&mut self, key: ReportKey, enabled: bool) {
        if enabled {
            self.reporting.insert(key);
        } else {
            self.reporting.remove(&key);
        }
    }

    fn sample(&mut self, key: ReportKey) -> Arrival {
        match key {
            ReportKey::Analog(pin) => {
                let value = self.next_analog();
                Arrival::data(StreamKey::Analog(pin), Reading::Analog(value))
            }
            ReportKey::Digital(pin) => {
                let level = self.digital_levels.get(&pin).copied().unwrap_or(0);
                Arrival::data(StreamKey::Digital(pin), Reading::Digital(level))
            }
        }
    }

    /// Readings for every stream with reporting enabled.
    pub fn tick(&mut self) -> Vec<Arrival> {
        let reporting: Vec<_> = self.reporting.iter().copied().collect();
        let mut arrivals: Vec<Arrival> =
            reporting.into_iter().map(|key| self.sample(key)).collect();
        let mut reads: Vec<_> = self.continuous_i2c.iter().map(|(k, v)| (*k, *v)).collect();
        reads.sort();
        for ((address, register), byte_count) in reads {
            arrivals.push(Arrival::data(
                StreamKey::I2c { address, register },
                Reading::Bytes(self.bytes(byte_count)),
            ));
        }
        arrivals
    }

    /// Answers operations and emits sampling ticks until either channel closes.
    pub async fn serve(
        mut self,
        mut operations: mpsc::UnboundedReceiver<Operation>,
        arrivals: mpsc::UnboundedSender<Arrival>,
    ) {
        let mut ticker = tokio::time::interval(self.sampling_interval);
        ticker.tick().await;
        loop {
            let (batch, retime) = tokio::select! {
                operation = operations.recv() => match operation {
                    Some(operation) => {
                        tracing::trace!("Simulator <- {}", operation.name());
                        let retime = matches!(operation, Operation::SetSamplingInterval { .. });
                        (self.respond(&operation), retime)
                    }
                    None => break,
                },
                _ = ticker.tick() => (self.tick(), false),
            };
            if retime {
                ticker = tokio::time::interval(self.sampling_interval);
                ticker.tick().await;
            }
            for arrival in batch {
                if arrivals.send(arrival).is_err() {
                    tracing::info!("Simulator arrival channel closed");
                    return;
                }
            }
        }
        tracing::info!("Simulator terminated");
    }
}

#[async_trait]
impl Connector for SimulatedBoard {
    async fn connect(&mut self, pins: &mut Vec<PinDescriptor>) -> Result<(), TransportError> {
        tracing::debug!("Simulator reporting {} pins", self.pins.len());
        pins.clear();
        pins.extend(self.pins.iter().cloned());
        Ok(())
    }
}
