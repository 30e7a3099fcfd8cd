// src/board.rs - Board lifecycle and operation dispatch
use crate::constants::{I2cMode, Mode};
use crate::events::{
    Arrival, Handler, OneWireDevice, Reading, ReadySignal, StreamKey, StreamRegistry, Subscription,
};
use crate::normalize::{self, Arg, InvalidArgumentShape};
use crate::operation::{I2cReadRequest, OneWireOp, Operation, PulseIn, StepperConfig};
use crate::pins::{Pin, PinDescriptor};
use crate::transport::{Connector, Transport, TransportError};
use crate::validator::{self, StructuralError};
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Structural error: {0}")]
    Structural(#[from] StructuralError),
    #[error("Invalid argument shape: {0}")]
    Shape(#[from] InvalidArgumentShape),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Validated pin table of a ready board.
///
/// Cheap to clone and safe to share across tasks; it never changes after the
/// readiness transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyBoard {
    pins: Arc<[Pin]>,
    analog_pins: Arc<[usize]>,
}

impl ReadyBoard {
    pub fn pins(&self) -> &[Pin] {
        &self.pins
    }

    pub fn pin(&self, index: usize) -> Option<&Pin> {
        self.pins.get(index)
    }

    /// Indices into [`pins`](Self::pins) of every analog-capable pin, ascending.
    pub fn analog_pins(&self) -> &[usize] {
        &self.analog_pins
    }
}

#[derive(Debug)]
pub enum BoardState {
    Unready { pins: Vec<PinDescriptor> },
    Ready(ReadyBoard),
}

type FailureListener = Box<dyn FnMut(&'static str, &TransportError) + Send>;
type ReadyListener = Box<dyn FnOnce(&ReadyBoard) + Send>;

/// Transport failure held until the next delivery pass.
enum DeferredFailure {
    Handler(Subscription, TransportError),
    Listeners(&'static str, TransportError),
}

/// A board driven through an injected [`Transport`].
///
/// All methods take `&mut self` and return as soon as the canonical
/// operation has been handed to the transport; replies are fed back through
/// [`deliver`](Self::deliver). Operations issued before the board is ready
/// are accepted and dropped without reaching the transport.
///
/// A rejected submission never calls back into the caller: the failure is
/// queued and reported by the next [`deliver`](Self::deliver),
/// [`pump`](Self::pump) or [`drain_failures`](Self::drain_failures).
pub struct Board<T: Transport> {
    name: String,
    state: BoardState,
    transport: T,
    ready: ReadySignal<ReadyBoard>,
    streams: StreamRegistry,
    failure_listeners: Vec<FailureListener>,
    deferred: VecDeque<DeferredFailure>,
    next_correlation_id: u16,
}

impl<T: Transport> Board<T> {
    pub fn new(name: impl Into<String>, transport: T) -> Self {
        Self {
            name: name.into(),
            state: BoardState::Unready { pins: Vec::new() },
            transport,
            ready: ReadySignal::new(),
            streams: StreamRegistry::new(),
            failure_listeners: Vec::new(),
            deferred: VecDeque::new(),
            next_correlation_id: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &BoardState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, BoardState::Ready(_))
    }

    pub fn ready_board(&self) -> Option<&ReadyBoard> {
        match &self.state {
            BoardState::Ready(ready) => Some(ready),
            BoardState::Unready { .. } => None,
        }
    }

    /// Validated pins; `None` until the board is ready.
    pub fn pins(&self) -> Option<&[Pin]> {
        self.ready_board().map(ReadyBoard::pins)
    }

    /// Analog pin index; `None` until the board is ready.
    pub fn analog_pins(&self) -> Option<&[usize]> {
        self.ready_board().map(ReadyBoard::analog_pins)
    }

    /// Driver access to the raw pin table; `None` once the board is ready.
    pub fn pins_mut(&mut self) -> Option<&mut Vec<PinDescriptor>> {
        match &mut self.state {
            BoardState::Unready { pins } => Some(pins),
            BoardState::Ready(_) => None,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Registers a ready listener. Listeners added after the transition run
    /// immediately; each listener runs exactly once either way.
    pub fn on_ready<F>(&mut self, listener: F)
    where
        F: FnOnce(&ReadyBoard) + Send + 'static,
    {
        let listener: ReadyListener = Box::new(listener);
        let current = match &self.state {
            BoardState::Ready(ready) => Some(ready),
            BoardState::Unready { .. } => None,
        };
        self.ready.register(listener, current);
    }

    /// Listener for transport failures of operations that carry no handler.
    pub fn on_transport_failure<F>(&mut self, listener: F)
    where
        F: FnMut(&'static str, &TransportError) + Send + 'static,
    {
        self.failure_listeners.push(Box::new(listener));
    }

    /// Validates the pin table and flips the board to ready.
    ///
    /// On failure the board stays unready with its pin table untouched. Once
    /// ready, further calls are no-ops.
    pub fn become_ready(&mut self) -> Result<(), BoardError> {
        let pins = match &self.state {
            BoardState::Ready(_) => {
                tracing::debug!("Board {} is already ready", self.name);
                return Ok(());
            }
            BoardState::Unready { pins } => pins,
        };

        let table = validator::validate(pins).map_err(|e| {
            tracing::error!("Board {} failed validation: {}", self.name, e);
            e
        })?;

        let ready = ReadyBoard {
            pins: table.pins.into(),
            analog_pins: table.analog_pins.into(),
        };
        tracing::info!(
            "Board {} ready with {} pins ({} analog)",
            self.name,
            ready.pins.len(),
            ready.analog_pins.len()
        );
        self.state = BoardState::Ready(ready.clone());
        self.ready.fire(&ready);
        Ok(())
    }

    /// Runs the driver handshake and then the readiness transition.
    pub async fn connect<C: Connector>(&mut self, connector: &mut C) -> Result<(), BoardError> {
        if self.is_ready() {
            return Ok(());
        }
        tracing::info!("Connecting board {}", self.name);
        if let BoardState::Unready { pins } = &mut self.state {
            connector.connect(pins).await?;
        }
        self.become_ready()
    }

    /// Routes one arrival to its subscribers, after reporting any queued
    /// transport failures. Returns how many handlers the arrival reached.
    pub fn deliver(&mut self, arrival: Arrival) -> usize {
        self.drain_failures();
        tracing::trace!("Arrival on {:?}", arrival.key);
        self.streams.deliver(arrival)
    }

    /// Reports queued transport failures to their handlers or, for
    /// operations without one, to the transport-failure listeners.
    pub fn drain_failures(&mut self) -> usize {
        let mut reported = 0;
        while let Some(failure) = self.deferred.pop_front() {
            match failure {
                DeferredFailure::Handler(subscription, e) => subscription.fail(e),
                DeferredFailure::Listeners(operation, e) => {
                    for listener in &mut self.failure_listeners {
                        listener(operation, &e);
                    }
                }
            }
            reported += 1;
        }
        reported
    }

    /// Delivers arrivals from `arrivals` until the sending side closes.
    pub async fn pump(&mut self, arrivals: &mut mpsc::UnboundedReceiver<Arrival>) {
        self.drain_failures();
        while let Some(arrival) = arrivals.recv().await {
            self.deliver(arrival);
        }
        tracing::debug!("Arrival channel for board {} closed", self.name);
    }

    pub fn subscriber_count(&self, key: &StreamKey) -> usize {
        self.streams.subscriber_count(key)
    }

    fn dispatch(
        &mut self,
        operations: Vec<Operation>,
        completion: Option<(StreamKey, Subscription)>,
    ) {
        let Some(first) = operations.first() else {
            return;
        };
        if !self.is_ready() {
            tracing::warn!("Board {} not ready; dropping {}", self.name, first.name());
            return;
        }

        for operation in operations {
            let name = operation.name();
            tracing::debug!("Board {} <- {:?}", self.name, operation);
            if let Err(e) = self.transport.submit(operation) {
                tracing::warn!("Transport failed for {}: {}", name, e);
                let failure = match completion {
                    Some((_, subscription)) => DeferredFailure::Handler(subscription, e),
                    None => DeferredFailure::Listeners(name, e),
                };
                self.deferred.push_back(failure);
                return;
            }
        }

        if let Some((key, subscription)) = completion {
            self.streams.subscribe(key, subscription);
        }
    }

    fn send(&mut self, operation: Operation) {
        self.dispatch(vec![operation], None);
    }

    fn allocate_correlation_id(&mut self) -> u16 {
        let id = self.next_correlation_id;
        self.next_correlation_id = self.next_correlation_id.wrapping_add(1);
        id
    }

    pub fn pin_mode(&mut self, pin: u8, mode: Mode) {
        tracing::debug!("Set pin mode of pin {} to {}", pin, mode);
        self.send(Operation::PinMode { pin, mode });
    }

    pub fn digital_write(&mut self, pin: u8, value: u8) {
        self.send(Operation::DigitalWrite { pin, value });
    }

    /// Enables reporting on `pin` and streams every digital report to `handler`.
    pub fn digital_read<F>(&mut self, pin: u8, handler: F)
    where
        F: FnMut(Result<Reading, TransportError>) + Send + 'static,
    {
        self.dispatch(
            vec![Operation::ReportDigitalPin { pin, enabled: true }],
            Some((StreamKey::Digital(pin), Subscription::streaming(Box::new(handler)))),
        );
    }

    /// Enables reporting on analog channel `pin` and streams every value to `handler`.
    pub fn analog_read<F>(&mut self, pin: u8, handler: F)
    where
        F: FnMut(Result<Reading, TransportError>) + Send + 'static,
    {
        self.dispatch(
            vec![Operation::ReportAnalogPin { pin, enabled: true }],
            Some((StreamKey::Analog(pin), Subscription::streaming(Box::new(handler)))),
        );
    }

    pub fn analog_write(&mut self, pin: u8, value: u16) {
        self.send(Operation::AnalogWrite { pin, value });
    }

    /// `value` is the target angle in degrees.
    pub fn servo_write(&mut self, pin: u8, value: u16) {
        self.send(Operation::ServoWrite { pin, value });
    }

    pub fn query_capabilities<F>(&mut self, handler: F)
    where
        F: FnMut(Result<Reading, TransportError>) + Send + 'static,
    {
        self.query(Operation::QueryCapabilities, StreamKey::Capabilities, Box::new(handler));
    }

    pub fn query_analog_mapping<F>(&mut self, handler: F)
    where
        F: FnMut(Result<Reading, TransportError>) + Send + 'static,
    {
        self.query(Operation::QueryAnalogMapping, StreamKey::AnalogMapping, Box::new(handler));
    }

    pub fn query_pin_state<F>(&mut self, pin: u8, handler: F)
    where
        F: FnMut(Result<Reading, TransportError>) + Send + 'static,
    {
        self.query(Operation::QueryPinState { pin }, StreamKey::PinState(pin), Box::new(handler));
    }

    pub fn report_version<F>(&mut self, handler: F)
    where
        F: FnMut(Result<Reading, TransportError>) + Send + 'static,
    {
        self.query(Operation::ReportVersion, StreamKey::Version, Box::new(handler));
    }

    pub fn query_firmware<F>(&mut self, handler: F)
    where
        F: FnMut(Result<Reading, TransportError>) + Send + 'static,
    {
        self.query(Operation::QueryFirmware, StreamKey::Firmware, Box::new(handler));
    }

    fn query(&mut self, operation: Operation, key: StreamKey, handler: Handler) {
        self.dispatch(vec![operation], Some((key, Subscription::once(handler))));
    }

    /// Must be sent before any I2C read or write. `delay_us` is applied
    /// between the register write and the read.
    pub fn i2c_config(&mut self, delay_us: u32) {
        self.send(Operation::I2cConfig { delay_us });
    }

    /// `(address, payload)` or `(address, register, payload)`.
    pub fn i2c_write(&mut self, args: Vec<Arg>) -> Result<(), BoardError> {
        let request = normalize::i2c_write(args)?;
        self.send(Operation::I2cWrite(request));
        Ok(())
    }

    pub fn i2c_write_reg(&mut self, address: u8, register: u8, payload: Vec<u8>) {
        self.send(Operation::I2cWrite(crate::operation::I2cWriteRequest {
            address,
            register: Some(register),
            payload,
        }));
    }

    /// `(address, byte_count, handler)` or `(address, register, byte_count, handler)`.
    ///
    /// The handler receives every reply for the (address, register) pair until
    /// [`i2c_stop_reading`](Self::i2c_stop_reading).
    pub fn i2c_read(&mut self, args: Vec<Arg>) -> Result<(), BoardError> {
        let (target, handler) = normalize::i2c_read("i2c_read", args)?;
        self.i2c_read_with(target, I2cMode::ContinuousRead, Subscription::streaming(handler));
        Ok(())
    }

    /// Same shapes as [`i2c_read`](Self::i2c_read); the handler fires once.
    pub fn i2c_read_once(&mut self, args: Vec<Arg>) -> Result<(), BoardError> {
        let (target, handler) = normalize::i2c_read("i2c_read_once", args)?;
        self.i2c_read_with(target, I2cMode::Read, Subscription::once(handler));
        Ok(())
    }

    fn i2c_read_with(
        &mut self,
        target: normalize::I2cReadTarget,
        mode: I2cMode,
        subscription: Subscription,
    ) {
        let key = StreamKey::I2c {
            address: target.address,
            register: target.register,
        };
        let request = I2cReadRequest {
            address: target.address,
            register: target.register,
            byte_count: target.byte_count,
            mode,
        };
        self.dispatch(vec![Operation::I2cRead(request)], Some((key, subscription)));
    }

    /// Cancels continuous reads for the (address, register) pair. A pending
    /// [`i2c_read_once`](Self::i2c_read_once) on the same pair still fires.
    pub fn i2c_stop_reading(&mut self, address: u8, register: Option<u8>) {
        if !self.is_ready() {
            tracing::warn!("Board {} not ready; dropping i2c_stop_reading", self.name);
            return;
        }
        let key = StreamKey::I2c { address, register };
        let removed = self.streams.unsubscribe_streaming(&key);
        tracing::debug!(
            "Stopped reading I2C {:#04x} register {:?} ({} handlers removed)",
            address,
            register,
            removed
        );
        self.send(Operation::I2cStopReading { address, register });
    }

    #[deprecated(note = "use i2c_config")]
    pub fn send_i2c_config(&mut self, delay_us: u32) {
        self.i2c_config(delay_us);
    }

    #[deprecated(note = "use i2c_write")]
    pub fn send_i2c_write_request(&mut self, address: u8, bytes: Vec<u8>) {
        self.send(Operation::I2cWrite(crate::operation::I2cWriteRequest {
            address,
            register: None,
            payload: bytes,
        }));
    }

    #[deprecated(note = "use i2c_read or i2c_read_once")]
    pub fn send_i2c_read_request<F>(&mut self, address: u8, byte_count: u16, handler: F)
    where
        F: FnMut(Result<Reading, TransportError>) + Send + 'static,
    {
        let target = normalize::I2cReadTarget {
            address,
            register: None,
            byte_count,
        };
        self.i2c_read_with(target, I2cMode::Read, Subscription::once(Box::new(handler)));
    }

    /// Sampling interval in milliseconds; firmware defaults to 19.
    pub fn set_sampling_interval(&mut self, interval_ms: u32) {
        self.send(Operation::SetSamplingInterval { interval_ms });
    }

    pub fn report_analog_pin(&mut self, pin: u8, enabled: bool) {
        self.send(Operation::ReportAnalogPin { pin, enabled });
    }

    pub fn report_digital_pin(&mut self, pin: u8, enabled: bool) {
        self.send(Operation::ReportDigitalPin { pin, enabled });
    }

    pub fn pulse_in<F>(&mut self, request: PulseIn, handler: F)
    where
        F: FnMut(Result<Reading, TransportError>) + Send + 'static,
    {
        let key = StreamKey::PulseIn(request.pin);
        self.query(Operation::PulseIn(request), key, Box::new(handler));
    }

    /// Motor 3 and 4 pins are required for four-wire steppers and rejected
    /// for the other types.
    pub fn stepper_config(&mut self, config: StepperConfig) -> Result<(), BoardError> {
        use crate::constants::StepperType;
        let four_wire = config.stepper_type == StepperType::FourWire;
        let has_extra_pins = config.motor3_pin.is_some() && config.motor4_pin.is_some();
        let has_any_extra = config.motor3_pin.is_some() || config.motor4_pin.is_some();
        if four_wire != has_extra_pins || (!four_wire && has_any_extra) {
            return Err(InvalidArgumentShape {
                operation: "stepper_config",
                arity: 5 + config.motor3_pin.iter().count() + config.motor4_pin.iter().count(),
                detail: format!(
                    "{:?} steppers {} motor3/motor4 pins",
                    config.stepper_type,
                    if four_wire { "require" } else { "do not take" }
                ),
            }
            .into());
        }
        self.send(Operation::StepperConfig(config));
        Ok(())
    }

    /// `(device, direction, steps, speed, handler)` or
    /// `(device, direction, steps, speed, accel, decel, handler)`.
    pub fn stepper_step(&mut self, args: Vec<Arg>) -> Result<(), BoardError> {
        let (step, handler) = normalize::stepper_step(args)?;
        let key = StreamKey::Stepper(step.device);
        self.query(Operation::StepperStep(step), key, handler);
        Ok(())
    }

    pub fn reset(&mut self) {
        self.send(Operation::Reset);
    }

    /// Makes `pin` the bus master; `parasitic_power` powers the bus from the
    /// data line.
    pub fn one_wire_config(&mut self, pin: u8, parasitic_power: bool) {
        self.send(Operation::OneWire(OneWireOp::Config {
            pin,
            parasitic_power,
        }));
    }

    /// The handler receives `Reading::Devices`, empty when nothing answered.
    pub fn one_wire_search<F>(&mut self, pin: u8, handler: F)
    where
        F: FnMut(Result<Reading, TransportError>) + Send + 'static,
    {
        self.query(
            Operation::OneWire(OneWireOp::Search { pin }),
            StreamKey::OneWireSearch(pin),
            Box::new(handler),
        );
    }

    pub fn one_wire_alarms_search<F>(&mut self, pin: u8, handler: F)
    where
        F: FnMut(Result<Reading, TransportError>) + Send + 'static,
    {
        self.query(
            Operation::OneWire(OneWireOp::AlarmsSearch { pin }),
            StreamKey::OneWireAlarmsSearch(pin),
            Box::new(handler),
        );
    }

    pub fn one_wire_read<F>(&mut self, pin: u8, device: OneWireDevice, byte_count: u16, handler: F)
    where
        F: FnMut(Result<Reading, TransportError>) + Send + 'static,
    {
        if !self.is_ready() {
            tracing::warn!("Board {} not ready; dropping one_wire_read", self.name);
            return;
        }
        let correlation_id = self.allocate_correlation_id();
        self.dispatch(
            vec![
                Operation::OneWire(OneWireOp::Select { pin, device }),
                Operation::OneWire(OneWireOp::Read {
                    pin,
                    device,
                    byte_count,
                    correlation_id,
                }),
            ],
            Some((
                StreamKey::OneWireReply(correlation_id),
                Subscription::once(Box::new(handler)),
            )),
        );
    }

    pub fn one_wire_reset(&mut self, pin: u8) {
        self.send(Operation::OneWire(OneWireOp::Reset { pin }));
    }

    /// `device` should come from an earlier search.
    pub fn one_wire_write(&mut self, pin: u8, device: OneWireDevice, data: Vec<u8>) {
        self.dispatch(
            vec![
                Operation::OneWire(OneWireOp::Select { pin, device }),
                Operation::OneWire(OneWireOp::Write { pin, device, data }),
            ],
            None,
        );
    }

    /// Tells the bus master to idle for `delay_ms`, e.g. while a sensor converts.
    pub fn one_wire_delay(&mut self, pin: u8, delay_ms: u32) {
        self.send(Operation::OneWire(OneWireOp::Delay { pin, delay_ms }));
    }

    pub fn one_wire_write_and_read<F>(
        &mut self,
        pin: u8,
        device: OneWireDevice,
        data: Vec<u8>,
        byte_count: u16,
        handler: F,
    ) where
        F: FnMut(Result<Reading, TransportError>) + Send + 'static,
    {
        if !self.is_ready() {
            tracing::warn!("Board {} not ready; dropping one_wire_write_and_read", self.name);
            return;
        }
        let correlation_id = self.allocate_correlation_id();
        self.dispatch(
            vec![
                Operation::OneWire(OneWireOp::Select { pin, device }),
                Operation::OneWire(OneWireOp::WriteAndRead {
                    pin,
                    device,
                    data,
                    byte_count,
                    correlation_id,
                }),
            ],
            Some((
                StreamKey::OneWireReply(correlation_id),
                Subscription::once(Box::new(handler)),
            )),
        );
    }
}

impl<T: Transport> std::fmt::Debug for Board<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Board")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("ready", &self.ready)
            .field("streams", &self.streams)
            .field("deferred_failures", &self.deferred.len())
            .finish()
    }
}
