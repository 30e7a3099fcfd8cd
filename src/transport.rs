// src/transport.rs - Seams to the external transport and driver handshake
use crate::operation::Operation;
use crate::pins::PinDescriptor;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;

/// Failure reported by the transport, always delivered through the same
/// completion channel a success would have used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,
    #[error("transport rejected {operation}: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },
    #[error("board reported failure: {0}")]
    Board(String),
}

/// Non-blocking sink for canonical operations.
///
/// `submit` must not wait for the board; replies come back later as
/// [`Arrival`](crate::events::Arrival)s.
pub trait Transport: Send {
    fn submit(&mut self, operation: Operation) -> Result<(), TransportError>;
}

/// Driver-side connection handshake.
///
/// Implementations open whatever link they need and populate the pin table.
/// Validation and the ready notification are handled by the board afterwards.
#[async_trait]
pub trait Connector: Send {
    async fn connect(&mut self, pins: &mut Vec<PinDescriptor>) -> Result<(), TransportError>;
}

/// Transport statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub operations_sent: u64,
    pub errors: u64,
}

/// Transport that queues operations on an unbounded tokio channel for a
/// writer task to drain.
#[derive(Debug)]
pub struct ChannelTransport {
    operation_tx: mpsc::UnboundedSender<Operation>,
    stats: TransportStats,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Operation>) {
        let (operation_tx, operation_rx) = mpsc::unbounded_channel();
        (
            Self {
                operation_tx,
                stats: TransportStats::default(),
            },
            operation_rx,
        )
    }

    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }
}

impl Transport for ChannelTransport {
    fn submit(&mut self, operation: Operation) -> Result<(), TransportError> {
        match self.operation_tx.send(operation) {
            Ok(()) => {
                self.stats.operations_sent += 1;
                Ok(())
            }
            Err(e) => {
                self.stats.errors += 1;
                tracing::error!("Failed to queue {}: receiver dropped", e.0.name());
                Err(TransportError::Closed)
            }
        }
    }
}

/// In-memory transport that records every submitted operation.
///
/// Clones share the same log, so a test can keep one handle and give the
/// other to the board.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    log: Arc<Mutex<Vec<Operation>>>,
    failure: Option<TransportError>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport that rejects every submission with `error`.
    pub fn failing(error: TransportError) -> Self {
        Self {
            log: Arc::default(),
            failure: Some(error),
        }
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl Transport for RecordingTransport {
    fn submit(&mut self, operation: Operation) -> Result<(), TransportError> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(operation);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_transport_preserves_order() {
        let (mut transport, mut rx) = ChannelTransport::new();
        transport.submit(Operation::Reset).unwrap();
        transport.submit(Operation::QueryCapabilities).unwrap();
        assert_eq!(rx.recv().await, Some(Operation::Reset));
        assert_eq!(rx.recv().await, Some(Operation::QueryCapabilities));
        assert_eq!(transport.stats().operations_sent, 2);
    }

    #[test]
    fn test_channel_transport_closed() {
        let (mut transport, rx) = ChannelTransport::new();
        drop(rx);
        assert_eq!(transport.submit(Operation::Reset), Err(TransportError::Closed));
        assert_eq!(transport.stats().errors, 1);
    }
}
