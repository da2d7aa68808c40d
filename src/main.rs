use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{info, warn};
use midir::MidiOutput;

use keyboard_midi::config::{Config, DEFAULT_CONFIG_FILE};
use keyboard_midi::general::check;
use keyboard_midi::general::keymap::NoteMapper;
use keyboard_midi::general::tracker::{NoteTracker, ReleasePolicy};
use keyboard_midi::general::transpose::OffsetState;
use keyboard_midi::io::keyboard::{spawn_keyboard_reader, Terminal};
use keyboard_midi::io::output::{connect_output, list_output_ports};
use keyboard_midi::remote::mqtt_listener::spawn_mqtt_listener;
use keyboard_midi::remote::osc_listener::spawn_osc_listener;
use keyboard_midi::router::InputRouter;
use keyboard_midi::session::{Command, Session};
use keyboard_midi::Result;

#[derive(Parser)]
#[command(name = "keyboard-midi")]
#[command(about = "Play a MIDI output device from the computer keyboard", long_about = None)]
struct Cli {
    /// Path to the JSON config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Substring of the output port name (default: first port)
    #[arg(short, long)]
    port: Option<String>,

    /// Note-on velocity, 1-127
    #[arg(long)]
    velocity: Option<u8>,

    /// MIDI channel, 0-15
    #[arg(long)]
    channel: Option<u8>,

    /// Initial transpose in semitones
    #[arg(short, long, allow_hyphen_values = true)]
    transpose: Option<i32>,

    /// How key releases find the note to stop
    #[arg(long, value_enum)]
    release_policy: Option<ReleasePolicy>,

    /// List MIDI output ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    use simplelog::{LevelFilter, WriteLogger};

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };

    let log_path = dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("keyboard-midi")
        .join("keyboard-midi.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = match File::create(&log_path) {
        Ok(file) => file,
        Err(_) => match File::create(std::env::temp_dir().join("keyboard-midi.log")) {
            Ok(file) => file,
            // nowhere to log to, run without a logger
            Err(_) => return,
        },
    };

    let _ = WriteLogger::init(log_level, simplelog::Config::default(), log_file);
    info!("keyboard-midi starting (log level: {:?})", log_level);
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(&cli.config)?;
    if let Some(port) = &cli.port {
        config.midi.output_port = port.clone();
    }
    if let Some(velocity) = cli.velocity {
        config.midi.velocity = velocity;
    }
    if let Some(channel) = cli.channel {
        config.midi.channel = channel;
    }
    if let Some(transpose) = cli.transpose {
        config.transpose.initial = transpose;
    }
    if let Some(policy) = cli.release_policy {
        config.keyboard.release_policy = policy;
    }
    config.validate()?;
    Ok(config)
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if let Err(err) = run(cli) {
        log::error!("{}", err);
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    if cli.list_ports {
        let midi_out = MidiOutput::new("keyboard-midi")?;
        for (i, name) in list_output_ports(&midi_out).iter().enumerate() {
            println!("{}: {}", i, name);
        }
        return Ok(());
    }

    let config = load_config(&cli)?;

    let sink = match connect_output(&config.midi.output_port, config.midi.channel) {
        Ok(sink) => sink,
        Err(err) => {
            warn!("MIDI output unavailable: {}", err);
            None
        }
    };
    match &sink {
        Some(s) => check::print_output_connected(s.port_name()),
        None => check::print_output_missing(),
    }

    let mapper = NoteMapper::with_overrides(config.keymap_entries()?);
    let mut tracker = NoteTracker::new(
        mapper,
        OffsetState::new(config.transpose.initial),
        config.keyboard.release_policy,
    );
    tracker.set_velocity(config.midi.velocity);

    let mut session = Session::new(tracker, sink).with_echo(true);
    if config.keyboard.sustain_on_start {
        session.apply(Command::Sustain(true));
    }

    let exit = Arc::new(AtomicBool::new(false));
    let (tx, rx) = channel::<Command>();
    let mut handles = Vec::new();

    if config.osc.enabled {
        let address = format!("{}:{}", config.osc.listening_host, config.osc.listening_port);
        match spawn_osc_listener(config.osc.clone(), tx.clone(), Arc::clone(&exit)) {
            Ok(handle) => {
                check::print_remote_started("OSC", &address);
                handles.push(handle);
            }
            Err(err) => warn!("OSC bind failed on {}: {}", address, err),
        }
    }
    if config.mqtt.enabled {
        let address = format!("{}:{}", config.mqtt.broker_host, config.mqtt.broker_port);
        handles.push(spawn_mqtt_listener(
            config.mqtt.clone(),
            tx.clone(),
            session.status(),
            Arc::clone(&exit),
        ));
        check::print_remote_started("MQTT", &address);
    }

    let terminal = Terminal::start()?;
    if !terminal.reports_release() {
        check::print_release_fallback(config.keyboard.hold_timeout_ms);
    }
    let router = InputRouter::new(
        terminal.reports_release(),
        Duration::from_millis(config.keyboard.hold_timeout_ms),
    );
    handles.push(spawn_keyboard_reader(router, tx, Arc::clone(&exit)));

    let tracker = session.tracker();
    check::print_status(tracker.transpose(), tracker.sustain(), tracker.velocity());

    session.run(&rx);

    exit.store(true, Ordering::SeqCst);
    for handle in handles {
        let _ = handle.join();
    }
    drop(terminal);
    println!("Closing connection and exiting...");
    Ok(())
}
