use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use rosc::{decoder, OscMessage, OscPacket, OscType};

use crate::config::OscConfig;
use crate::error::Result;
use crate::session::Command;

/// Bind the configured UDP address and spawn a thread that turns OSC messages
/// into session commands. The thread checks `exit` periodically to shut down.
///
/// Recognized paths (configurable): `/transpose` with a numeric argument sets
/// the transpose, `/transposeUp` and `/transposeDown` step it when the
/// argument is 1 or true, `/sustain` sets sustain from its argument and
/// `/panic` stops all notes.
pub fn spawn_osc_listener(
    config: OscConfig,
    tx: Sender<Command>,
    exit: Arc<AtomicBool>,
) -> Result<thread::JoinHandle<()>> {
    let bind_addr = format!("{}:{}", config.listening_host, config.listening_port);
    let socket = UdpSocket::bind(&bind_addr)?;
    // Timeout so we can check the exit flag periodically
    socket.set_read_timeout(Some(Duration::from_millis(200)))?;
    info!("OSC listener bound on {}", bind_addr);

    Ok(thread::spawn(move || {
        let mut buf = [0u8; decoder::MTU];
        while !exit.load(Ordering::SeqCst) {
            match socket.recv_from(&mut buf) {
                Ok((size, peer_addr)) => match decoder::decode_udp(&buf[..size]) {
                    Ok((_, packet)) => {
                        let mut commands = Vec::new();
                        collect_commands(packet, &config, &mut commands);
                        for command in commands {
                            if tx.send(command).is_err() {
                                return;
                            }
                        }
                    }
                    Err(err) => warn!("OSC decode error from {}: {}", peer_addr, err),
                },
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(err) => warn!("OSC recv error: {}", err),
            }
        }
        debug!("OSC listener exiting");
    }))
}

fn collect_commands(packet: OscPacket, config: &OscConfig, out: &mut Vec<Command>) {
    match packet {
        OscPacket::Message(msg) => out.extend(command_for(&msg, config)),
        OscPacket::Bundle(bundle) => {
            for pkt in bundle.content {
                collect_commands(pkt, config, out);
            }
        }
    }
}

/// Map one OSC message to a command, if it is one we understand.
pub fn command_for(msg: &OscMessage, config: &OscConfig) -> Option<Command> {
    let addr = msg.addr.as_str();
    let arg = msg.args.first();

    if addr == config.panic_path {
        return Some(Command::AllStop);
    }
    let Some(arg) = arg else {
        warn!("[OSC] {} without argument ignored", addr);
        return None;
    };

    if addr == config.transpose_path {
        let value = match *arg {
            OscType::Int(v) => Some(v),
            OscType::Long(v) => i32::try_from(v).ok(),
            OscType::Float(v) => Some(v.round() as i32),
            OscType::Double(v) => Some(v.round() as i32),
            _ => None,
        };
        if value.is_none() {
            warn!("[OSC] {} requires numeric argument (got {:?})", addr, arg);
        }
        value.map(Command::SetTranspose)
    } else if addr == config.transpose_up_path {
        is_one(arg).then_some(Command::Transpose(1))
    } else if addr == config.transpose_down_path {
        is_one(arg).then_some(Command::Transpose(-1))
    } else if addr == config.sustain_path {
        Some(Command::Sustain(is_truthy(arg)))
    } else {
        debug!("[OSC] unhandled path {}", addr);
        None
    }
}

fn is_one(arg: &OscType) -> bool {
    match *arg {
        OscType::Int(v) => v == 1,
        OscType::Long(v) => v == 1,
        OscType::Float(v) => (v - 1.0).abs() < f32::EPSILON,
        OscType::Double(v) => (v - 1.0).abs() < f64::EPSILON,
        OscType::Bool(b) => b,
        _ => false,
    }
}

fn is_truthy(arg: &OscType) -> bool {
    match *arg {
        OscType::Int(v) => v != 0,
        OscType::Long(v) => v != 0,
        OscType::Float(v) => v >= 0.5,
        OscType::Double(v) => v >= 0.5,
        OscType::Bool(b) => b,
        _ => false,
    }
}
