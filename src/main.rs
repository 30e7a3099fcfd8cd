// src/main.rs - Drive a simulated board from a TOML profile
use boardio_rs::config;
use boardio_rs::sim::SimulatedBoard;
use boardio_rs::{Arg, Board, ChannelTransport, HIGH, Mode, Reading, args};
use clap::Parser;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Parser)]
#[command(
    name = "boardio",
    version,
    about = "Exercise the board contract against a simulated board"
)]
struct Cli {
    /// Board profile to load
    #[arg(short, long, default_value = "board.toml")]
    config: String,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    /// How long to pump board replies before exiting
    #[arg(long, default_value_t = 500)]
    duration_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();

    let mut config = config::load_config(&cli.config).map_err(|e| {
        eprintln!("Failed to load config from '{}': {}", cli.config, e);
        Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
    })?;
    config.logging.quiet |= cli.quiet;

    tracing_subscriber::fmt()
        .with_max_level(config.logging.max_level()?)
        .init();

    tracing::info!("Starting boardio");
    tracing::info!("Board: {} ({} pins declared)", config.board.name, config.pins.len());

    let (transport, operations) = ChannelTransport::new();
    let (arrival_tx, mut arrivals) = mpsc::unbounded_channel();
    let mut simulator = SimulatedBoard::from_config(&config);

    let mut board = Board::new(config.board.name.clone(), transport);
    board.on_ready(|ready| {
        tracing::info!("Analog pins: {:?}", ready.analog_pins());
    });
    board.on_transport_failure(|operation, e| {
        tracing::error!("{} failed: {}", operation, e);
    });

    if let Err(e) = board.connect(&mut simulator).await {
        tracing::error!("Board failed to become ready: {}", e);
        return Err(e.into());
    }
    let responder = tokio::spawn(simulator.serve(operations, arrival_tx));

    run_demo(&mut board, &config)?;

    let pump_for = Duration::from_millis(cli.duration_ms);
    let _ = tokio::time::timeout(pump_for, board.pump(&mut arrivals)).await;
    drop(board);
    let _ = responder.await;

    tracing::info!("boardio finished");
    Ok(())
}

fn run_demo(
    board: &mut Board<ChannelTransport>,
    config: &config::Config,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    board.set_sampling_interval(config.board.sampling_interval_ms);
    board.report_version(log_reading("version"));
    board.query_firmware(log_reading("firmware"));
    board.query_capabilities(log_reading("capabilities"));
    board.query_analog_mapping(log_reading("analog mapping"));

    let first_output = board
        .pins()
        .and_then(|pins| pins.iter().position(|pin| pin.supports(Mode::Output)));
    if let Some(pin) = first_output {
        let pin = u8::try_from(pin)?;
        board.pin_mode(pin, Mode::Output);
        board.digital_write(pin, HIGH);
        board.query_pin_state(pin, log_reading("pin state"));
    }

    if let Some(&analog) = board.analog_pins().and_then(|pins| pins.first()) {
        let channel = board.pins().map_or(0, |pins| pins[analog].analog_channel);
        board.analog_read(channel, log_reading("analog"));
    }

    board.i2c_config(config.board.i2c_delay_us);
    board.i2c_write(args![0x48, 0x01, [0x60u8, 0xA0]])?;
    let mut read_once = args![0x48, 0x00, 2];
    read_once.push(Arg::handler(log_reading("i2c read once")));
    board.i2c_read_once(read_once)?;

    if let Some(&rom) = config.sim.onewire_devices.first() {
        let pin = config.sim.onewire_pin;
        board.one_wire_config(pin, true);
        board.one_wire_search(pin, log_reading("onewire search"));
        let device = boardio_rs::OneWireDevice(rom);
        let scratchpad = log_reading("onewire scratchpad");
        board.one_wire_write_and_read(pin, device, vec![0x44], 9, scratchpad);
    }

    let mut step = args![0, 1, 200, 1000];
    step.push(Arg::handler(log_reading("stepper")));
    board.stepper_step(step)?;
    Ok(())
}

fn log_reading(
    label: &'static str,
) -> impl FnMut(Result<Reading, boardio_rs::TransportError>) + Send + 'static {
    move |result| match result {
        Ok(reading) => tracing::info!("{}: {:?}", label, reading),
        Err(e) => tracing::warn!("{} failed: {}", label, e),
    }
}
