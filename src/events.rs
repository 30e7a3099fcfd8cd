// src/events.rs - Ready signal and per-stream data notifications
use crate::constants::Mode;
use crate::transport::TransportError;
use std::collections::HashMap;
use std::fmt;

/// 64-bit OneWire ROM id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OneWireDevice(pub [u8; 8]);

impl fmt::Display for OneWireDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Payload carried by an arrival.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reading {
    Analog(u16),
    Digital(u8),
    Bytes(Vec<u8>),
    /// OneWire search result; empty means no devices were found.
    Devices(Vec<OneWireDevice>),
    Capabilities(Vec<Vec<Mode>>),
    AnalogMapping(Vec<u8>),
    PinState { mode: Mode, state: u32 },
    Version { major: u8, minor: u8 },
    Firmware { name: String, major: u8, minor: u8 },
    PulseDuration(u32),
    StepperDone,
}

/// Identifies one notification stream. Delivery is FIFO within a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKey {
    Analog(u8),
    Digital(u8),
    I2c { address: u8, register: Option<u8> },
    OneWireSearch(u8),
    OneWireAlarmsSearch(u8),
    OneWireReply(u16),
    Capabilities,
    AnalogMapping,
    PinState(u8),
    Version,
    Firmware,
    PulseIn(u8),
    Stepper(u8),
}

/// Something the transport received from the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arrival {
    pub key: StreamKey,
    pub result: Result<Reading, TransportError>,
}

impl Arrival {
    pub fn data(key: StreamKey, reading: Reading) -> Self {
        Self {
            key,
            result: Ok(reading),
        }
    }

    pub fn failure(key: StreamKey, error: TransportError) -> Self {
        Self {
            key,
            result: Err(error),
        }
    }
}

pub type Handler = Box<dyn FnMut(Result<Reading, TransportError>) + Send>;

pub(crate) struct Subscription {
    handler: Handler,
    once: bool,
}

impl Subscription {
    pub(crate) fn streaming(handler: Handler) -> Self {
        Self {
            handler,
            once: false,
        }
    }

    pub(crate) fn once(handler: Handler) -> Self {
        Self {
            handler,
            once: true,
        }
    }

    pub(crate) fn fail(mut self, error: TransportError) {
        (self.handler)(Err(error));
    }
}

/// Registered data handlers, keyed by stream.
///
/// Streaming subscriptions see every arrival until removed. One-shot
/// subscriptions on the same stream are satisfied oldest first, one per
/// arrival, and are dropped after their single delivery.
#[derive(Default)]
pub struct StreamRegistry {
    streams: HashMap<StreamKey, Vec<Subscription>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn subscribe(&mut self, key: StreamKey, subscription: Subscription) {
        self.streams.entry(key).or_default().push(subscription);
    }

    /// Drops the streaming subscriptions on `key`, returning how many were
    /// removed. Pending one-shot subscriptions stay in place.
    pub fn unsubscribe_streaming(&mut self, key: &StreamKey) -> usize {
        let Some(subscriptions) = self.streams.get_mut(key) else {
            return 0;
        };
        let before = subscriptions.len();
        subscriptions.retain(|subscription| subscription.once);
        let removed = before - subscriptions.len();
        if subscriptions.is_empty() {
            self.streams.remove(key);
        }
        removed
    }

    pub fn subscriber_count(&self, key: &StreamKey) -> usize {
        self.streams.get(key).map_or(0, Vec::len)
    }

    /// Hands an arrival to its subscribers and returns how many handlers ran.
    pub fn deliver(&mut self, arrival: Arrival) -> usize {
        let Some(subscriptions) = self.streams.get_mut(&arrival.key) else {
            tracing::trace!("No subscribers for {:?}, dropping arrival", arrival.key);
            return 0;
        };

        let mut delivered = 0;
        let mut once_served = false;
        subscriptions.retain_mut(|subscription| {
            if subscription.once {
                if once_served {
                    return true;
                }
                once_served = true;
            }
            (subscription.handler)(arrival.result.clone());
            delivered += 1;
            !subscription.once
        });

        if subscriptions.is_empty() {
            self.streams.remove(&arrival.key);
        }
        delivered
    }
}

impl fmt::Debug for StreamRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamRegistry")
            .field("streams", &self.streams.len())
            .finish()
    }
}

/// Single-fire notification.
///
/// Listeners registered before [`fire`](Self::fire) run in registration order
/// when it happens; firing again is a no-op.
pub struct ReadySignal<T> {
    listeners: Vec<Box<dyn FnOnce(&T) + Send>>,
    fired: bool,
}

impl<T> ReadySignal<T> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            fired: false,
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Queues `listener`, or runs it immediately against `current` when the
    /// signal has already fired.
    pub fn register(&mut self, listener: Box<dyn FnOnce(&T) + Send>, current: Option<&T>) {
        match (self.fired, current) {
            (true, Some(value)) => listener(value),
            _ => self.listeners.push(listener),
        }
    }

    pub fn fire(&mut self, value: &T) -> usize {
        if self.fired {
            return 0;
        }
        self.fired = true;
        let listeners = std::mem::take(&mut self.listeners);
        let count = listeners.len();
        for listener in listeners {
            listener(value);
        }
        count
    }
}

impl<T> Default for ReadySignal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ReadySignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadySignal")
            .field("listeners", &self.listeners.len())
            .field("fired", &self.fired)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder() -> (Arc<Mutex<Vec<Reading>>>, Handler) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: Handler = Box::new(move |result| {
            if let Ok(reading) = result {
                sink.lock().unwrap().push(reading);
            }
        });
        (seen, handler)
    }

    #[test]
    fn test_streaming_subscription_sees_every_arrival_in_order() {
        let mut registry = StreamRegistry::new();
        let (seen, handler) = recorder();
        registry.subscribe(StreamKey::Analog(0), Subscription::streaming(handler));

        for value in [10, 20, 30] {
            registry.deliver(Arrival::data(StreamKey::Analog(0), Reading::Analog(value)));
        }
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Reading::Analog(10), Reading::Analog(20), Reading::Analog(30)]
        );
        assert_eq!(registry.subscriber_count(&StreamKey::Analog(0)), 1);
    }

    #[test]
    fn test_once_subscriptions_served_oldest_first() {
        let mut registry = StreamRegistry::new();
        let (first, first_handler) = recorder();
        let (second, second_handler) = recorder();
        registry.subscribe(StreamKey::Capabilities, Subscription::once(first_handler));
        registry.subscribe(StreamKey::Capabilities, Subscription::once(second_handler));

        let reply = Reading::Capabilities(vec![vec![Mode::Input]]);
        assert_eq!(registry.deliver(Arrival::data(StreamKey::Capabilities, reply.clone())), 1);
        assert_eq!(first.lock().unwrap().len(), 1);
        assert!(second.lock().unwrap().is_empty());

        assert_eq!(registry.deliver(Arrival::data(StreamKey::Capabilities, reply)), 1);
        assert_eq!(second.lock().unwrap().len(), 1);
        assert_eq!(registry.subscriber_count(&StreamKey::Capabilities), 0);
    }

    #[test]
    fn test_unsubscribe_streaming_keeps_pending_once() {
        let mut registry = StreamRegistry::new();
        let key = StreamKey::I2c { address: 0x48, register: Some(0) };
        let (once, once_handler) = recorder();
        let (stream, stream_handler) = recorder();
        registry.subscribe(key, Subscription::once(once_handler));
        registry.subscribe(key, Subscription::streaming(stream_handler));

        assert_eq!(registry.unsubscribe_streaming(&key), 1);
        assert_eq!(registry.subscriber_count(&key), 1);
        assert_eq!(registry.deliver(Arrival::data(key, Reading::Bytes(vec![1, 2]))), 1);
        assert_eq!(*once.lock().unwrap(), vec![Reading::Bytes(vec![1, 2])]);
        assert!(stream.lock().unwrap().is_empty());
        assert_eq!(registry.unsubscribe_streaming(&key), 0);
    }

    #[test]
    fn test_unmatched_arrival_is_dropped() {
        let mut registry = StreamRegistry::new();
        assert_eq!(registry.deliver(Arrival::data(StreamKey::Digital(3), Reading::Digital(1))), 0);
    }

    #[test]
    fn test_ready_signal_fires_once() {
        let count = Arc::new(Mutex::new(Vec::new()));
        let mut signal: ReadySignal<u8> = ReadySignal::new();
        for id in 0..3 {
            let count = count.clone();
            signal.register(Box::new(move |_| count.lock().unwrap().push(id)), None);
        }
        assert_eq!(signal.fire(&7), 3);
        assert_eq!(signal.fire(&7), 0);
        assert_eq!(*count.lock().unwrap(), vec![0, 1, 2]);

        let late = count.clone();
        signal.register(Box::new(move |v| late.lock().unwrap().push(*v)), Some(&7));
        assert_eq!(*count.lock().unwrap(), vec![0, 1, 2, 7]);
    }
}
