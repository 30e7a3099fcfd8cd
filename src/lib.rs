//! boardio-rs: the contract between a physical board driver and a generic
//! peripheral-orchestration layer.
//!
//! A driver populates the pin table during its handshake, the [`Board`]
//! validates it and flips to ready exactly once, and callers then issue
//! operations that are normalized into canonical [`Operation`] records before
//! reaching the injected [`Transport`]. Replies come back as [`Arrival`]s and
//! are routed to the handlers registered for their stream.

pub mod board;
pub mod config;
pub mod constants;
pub mod events;
pub mod normalize;
pub mod operation;
pub mod pins;
pub mod sim;
pub mod transport;
pub mod validator;

pub use board::{Board, BoardError, BoardState, ReadyBoard};
pub use constants::{HIGH, I2cMode, LOW, Mode, StepperDirection, StepperRunState, StepperType};
pub use events::{Arrival, OneWireDevice, Reading, StreamKey};
pub use normalize::{Arg, InvalidArgumentShape};
pub use operation::Operation;
pub use pins::{Pin, PinDescriptor};
pub use transport::{ChannelTransport, Connector, Transport, TransportError};
pub use validator::StructuralError;
