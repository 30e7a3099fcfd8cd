// End-to-end tests: board, channel transport and simulator wired together

use boardio_rs::config::Config;
use boardio_rs::sim::SimulatedBoard;
use boardio_rs::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

const PROFILE: &str = r#"
[board]
name = "sim-uno"
sampling_interval_ms = 10

[[pins]]
supported_modes = ["input", "output"]
mode = "output"
report = 0
analog_channel = 127

[[pins]]
supported_modes = ["input", "output", "one_wire"]
mode = "input"
report = 0
analog_channel = 127

[[pins]]
supported_modes = ["input", "analog"]
mode = "analog"
report = 1
analog_channel = 0

[sim]
onewire_devices = [[0x28, 0xff, 0x4c, 0x2a, 0x61, 0x16, 0x04, 0x3e]]
onewire_pin = 1
"#;

type Seen = Arc<Mutex<Vec<Result<Reading, TransportError>>>>;

fn recorder() -> (Seen, impl FnMut(Result<Reading, TransportError>) + Send + 'static) {
    let seen: Seen = Arc::default();
    let sink = seen.clone();
    (seen, move |result| sink.lock().unwrap().push(result))
}

async fn connected() -> (
    Board<ChannelTransport>,
    mpsc::UnboundedReceiver<Arrival>,
    tokio::task::JoinHandle<()>,
) {
    let config: Config = toml::from_str(PROFILE).unwrap();
    config.validate().unwrap();
    let mut simulator = SimulatedBoard::from_config(&config);
    let (transport, operations) = ChannelTransport::new();
    let (arrival_tx, arrivals) = mpsc::unbounded_channel();

    let mut board = Board::new(config.board.name.clone(), transport);
    board.connect(&mut simulator).await.unwrap();
    let responder = tokio::spawn(simulator.serve(operations, arrival_tx));
    (board, arrivals, responder)
}

async fn pump_for(
    board: &mut Board<ChannelTransport>,
    arrivals: &mut mpsc::UnboundedReceiver<Arrival>,
    ms: u64,
) {
    let _ = tokio::time::timeout(Duration::from_millis(ms), board.pump(arrivals)).await;
}

#[tokio::test]
async fn test_connect_makes_board_ready() {
    let (board, _arrivals, _responder) = connected().await;
    assert!(board.is_ready());
    assert_eq!(board.analog_pins(), Some(&[2usize][..]));
    assert_eq!(board.transport().stats().operations_sent, 0);
}

#[tokio::test]
async fn test_queries_answered_once() {
    let (mut board, mut arrivals, _responder) = connected().await;
    let (firmware, handler) = recorder();
    board.query_firmware(handler);
    let (mapping, handler) = recorder();
    board.query_analog_mapping(handler);
    board.query_firmware(|_| {});

    pump_for(&mut board, &mut arrivals, 100).await;

    assert_eq!(
        *firmware.lock().unwrap(),
        vec![Ok(Reading::Firmware { name: "boardio-sim".to_string(), major: 2, minor: 5 })]
    );
    assert_eq!(
        *mapping.lock().unwrap(),
        vec![Ok(Reading::AnalogMapping(vec![0x7F, 0x7F, 0]))]
    );
    assert_eq!(board.subscriber_count(&StreamKey::Firmware), 0);
}

#[tokio::test]
async fn test_analog_reporting_streams() {
    let (mut board, mut arrivals, _responder) = connected().await;
    let (values, handler) = recorder();
    board.analog_read(0, handler);

    pump_for(&mut board, &mut arrivals, 120).await;

    let values = values.lock().unwrap();
    assert!(values.len() > 1, "expected repeated reports, got {}", values.len());
    assert!(values.iter().all(|v| matches!(v, Ok(Reading::Analog(_)))));
}

#[tokio::test]
async fn test_one_wire_search_and_read() {
    let (mut board, mut arrivals, _responder) = connected().await;
    let (found, handler) = recorder();
    board.one_wire_config(1, false);
    board.one_wire_search(1, handler);
    pump_for(&mut board, &mut arrivals, 50).await;

    let device = match found.lock().unwrap().first() {
        Some(Ok(Reading::Devices(devices))) => devices[0],
        other => panic!("unexpected search result: {other:?}"),
    };
    assert_eq!(device.to_string(), "28ff4c2a6116043e");

    let (scratchpad, handler) = recorder();
    board.one_wire_write_and_read(1, device, vec![0xBE], 3, handler);
    let (unconfigured, handler) = recorder();
    board.one_wire_read(0, device, 3, handler);
    pump_for(&mut board, &mut arrivals, 50).await;

    assert_eq!(*scratchpad.lock().unwrap(), vec![Ok(Reading::Bytes(vec![0xA5, 0xA6, 0xA7]))]);
    assert!(matches!(
        unconfigured.lock().unwrap().as_slice(),
        [Err(TransportError::Board(_))]
    ));
}

#[tokio::test]
async fn test_stepper_completion() {
    let (mut board, mut arrivals, _responder) = connected().await;
    let (done, handler) = recorder();
    let mut step = args![0, 1, 200, 1000, 50, 50];
    step.push(Arg::handler(handler));
    board.stepper_step(step).unwrap();

    pump_for(&mut board, &mut arrivals, 50).await;
    assert_eq!(*done.lock().unwrap(), vec![Ok(Reading::StepperDone)]);
}

#[tokio::test]
async fn test_closed_transport_reported_to_listener() {
    let (mut board, _arrivals, responder) = connected().await;
    responder.abort();
    let _ = responder.await;

    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = failures.clone();
    board.on_transport_failure(move |name, e| sink.lock().unwrap().push((name, e.clone())));
    board.digital_write(0, HIGH);
    assert!(failures.lock().unwrap().is_empty());

    assert_eq!(board.drain_failures(), 1);
    assert_eq!(*failures.lock().unwrap(), vec![("digital_write", TransportError::Closed)]);
}
