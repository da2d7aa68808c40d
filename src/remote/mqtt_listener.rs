use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use rumqttc::{Client, Connection, Event, Incoming, LastWill, MqttOptions, QoS};

use crate::config::MqttConfig;
use crate::session::{Command, SharedStatus};

const CLIENT_ID: &str = "keyboard-midi";
const KEEP_ALIVE_SECS: u64 = 30;
const RECONNECT_DELAY_SECS: u64 = 1;
const QUEUE_SIZE: usize = 10;

/// Topics under the configured base topic.
#[derive(Debug, Clone)]
pub struct MqttTopics {
    pub transpose_set: String,
    pub transpose_up: String,
    pub transpose_down: String,
    pub sustain_set: String,
    pub panic: String,
    pub transpose_state: String,
    pub sustain_state: String,
    pub availability: String,
}

impl MqttTopics {
    pub fn new(base_topic: &str) -> Self {
        Self {
            transpose_set: format!("{}/transpose", base_topic),
            transpose_up: format!("{}/transposeUp", base_topic),
            transpose_down: format!("{}/transposeDown", base_topic),
            sustain_set: format!("{}/sustain", base_topic),
            panic: format!("{}/panic", base_topic),
            transpose_state: format!("{}/state/transpose", base_topic),
            sustain_state: format!("{}/state/sustain", base_topic),
            availability: format!("{}/availability", base_topic),
        }
    }

    fn command_topics(&self) -> [&str; 5] {
        [
            &self.transpose_set,
            &self.transpose_up,
            &self.transpose_down,
            &self.sustain_set,
            &self.panic,
        ]
    }
}

/// Integers, or floats rounded to the nearest semitone.
fn parse_transpose_payload(payload: &[u8]) -> Option<i32> {
    let s = std::str::from_utf8(payload).ok()?.trim();
    if let Ok(v) = s.parse::<i32>() {
        return Some(v);
    }
    s.parse::<f32>().ok().map(|v| v.round() as i32)
}

fn parse_boolean_payload(payload: &[u8]) -> bool {
    let s = std::str::from_utf8(payload)
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    s == "1" || s == "true" || s == "on" || s == "127"
}

/// Map a publish on one of our command topics to a command.
pub fn command_for(topics: &MqttTopics, topic: &str, payload: &[u8]) -> Option<Command> {
    if topic == topics.transpose_set {
        let value = parse_transpose_payload(payload);
        if value.is_none() {
            warn!("[MQTT] invalid transpose payload: {:?}", payload);
        }
        value.map(Command::SetTranspose)
    } else if topic == topics.transpose_up {
        parse_boolean_payload(payload).then_some(Command::Transpose(1))
    } else if topic == topics.transpose_down {
        parse_boolean_payload(payload).then_some(Command::Transpose(-1))
    } else if topic == topics.sustain_set {
        Some(Command::Sustain(parse_boolean_payload(payload)))
    } else if topic == topics.panic {
        Some(Command::AllStop)
    } else {
        None
    }
}

fn create_mqtt_options(config: &MqttConfig, availability_topic: &str) -> MqttOptions {
    let mut options = MqttOptions::new(CLIENT_ID, config.broker_host.as_str(), config.broker_port);
    options.set_keep_alive(Duration::from_secs(KEEP_ALIVE_SECS));
    if !config.username.is_empty() {
        options.set_credentials(config.username.as_str(), config.password.as_str());
    }
    // Marks us offline when the connection drops
    options.set_last_will(LastWill::new(
        availability_topic,
        "offline",
        QoS::AtLeastOnce,
        true,
    ));
    options
}

/// Spawn a thread that feeds MQTT commands to `tx` and publishes transpose
/// and sustain state from `status` whenever it changes.
///
/// Subscribed: `<base>/transpose`, `<base>/transposeUp`, `<base>/transposeDown`,
/// `<base>/sustain`, `<base>/panic`.
/// Published (retained): `<base>/state/transpose`, `<base>/state/sustain`,
/// `<base>/availability`.
pub fn spawn_mqtt_listener(
    config: MqttConfig,
    tx: Sender<Command>,
    status: Arc<SharedStatus>,
    exit: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let topics = MqttTopics::new(&config.base_topic);
        let options = create_mqtt_options(&config, &topics.availability);
        let (client, connection) = Client::new(options, QUEUE_SIZE);

        for topic in topics.command_topics() {
            if let Err(err) = client.subscribe(topic, QoS::AtLeastOnce) {
                warn!("[MQTT] subscribe to {} failed: {}", topic, err);
                return;
            }
        }
        info!(
            "[MQTT] connecting to {}:{} (base topic '{}')",
            config.broker_host, config.broker_port, config.base_topic
        );

        let _ = client.publish(&topics.availability, QoS::AtLeastOnce, true, "online");
        run_message_loop(connection, &client, &topics, &tx, &status, &exit);
        let _ = client.publish(&topics.availability, QoS::AtLeastOnce, true, "offline");
        let _ = client.disconnect();
    })
}

fn publish_state(client: &Client, topics: &MqttTopics, state: (i32, bool)) {
    let (transpose, sustain) = state;
    let _ = client.try_publish(
        &topics.transpose_state,
        QoS::AtLeastOnce,
        true,
        transpose.to_string(),
    );
    let _ = client.try_publish(
        &topics.sustain_state,
        QoS::AtLeastOnce,
        true,
        if sustain { "on" } else { "off" },
    );
}

fn run_message_loop(
    mut connection: Connection,
    client: &Client,
    topics: &MqttTopics,
    tx: &Sender<Command>,
    status: &SharedStatus,
    exit: &AtomicBool,
) {
    let mut last_state: Option<(i32, bool)> = None;

    while !exit.load(Ordering::SeqCst) {
        match connection.recv_timeout(Duration::from_millis(200)) {
            Ok(Ok(Event::Incoming(Incoming::Publish(publish)))) => {
                if let Some(command) = command_for(topics, &publish.topic, &publish.payload) {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
            }
            Ok(Ok(Event::Incoming(Incoming::ConnAck(_)))) => {
                info!("[MQTT] connected");
                // republish after every reconnect
                last_state = None;
            }
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                warn!(
                    "[MQTT] connection error: {} (reconnecting in {}s)",
                    err, RECONNECT_DELAY_SECS
                );
                thread::sleep(Duration::from_secs(RECONNECT_DELAY_SECS));
            }
            Err(_) => {}
        }

        let current = (status.transpose(), status.sustain());
        if last_state != Some(current) {
            publish_state(client, topics, current);
            last_state = Some(current);
        }
    }
    debug!("[MQTT] exit requested, stopping listener");
}
