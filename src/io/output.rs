use log::info;
use midir::{MidiOutput, MidiOutputPort};

use crate::error::Result;
use crate::io::sink::MidirSink;

const CLIENT_NAME: &str = "keyboard-midi";
const CONNECTION_NAME: &str = "keyboard-midi-output";

/// Names of all output ports, in the order midir reports them.
pub fn list_output_ports(midi_out: &MidiOutput) -> Vec<String> {
    midi_out
        .ports()
        .iter()
        .map(|p| midi_out.port_name(p).unwrap_or_else(|_| "<unknown>".to_string()))
        .collect()
}

/// Pick an output port: the first whose name contains `name_substr`, else the
/// first port there is. `None` when the system has no outputs at all.
pub fn choose_output_port(port_names: &[String], name_substr: &str) -> Option<usize> {
    if port_names.is_empty() {
        return None;
    }
    if !name_substr.is_empty() {
        if let Some(idx) = port_names.iter().position(|name| name.contains(name_substr)) {
            return Some(idx);
        }
        info!(
            "no output port matches '{}', falling back to '{}'",
            name_substr, port_names[0]
        );
    }
    Some(0)
}

/// Open the chosen output port. Returns `Ok(None)` when there is nothing to
/// connect to, so the caller can keep running without a device.
pub fn connect_output(name_substr: &str, channel: u8) -> Result<Option<MidirSink>> {
    let midi_out = MidiOutput::new(CLIENT_NAME)?;
    let names = list_output_ports(&midi_out);
    let Some(idx) = choose_output_port(&names, name_substr) else {
        return Ok(None);
    };

    let ports: Vec<MidiOutputPort> = midi_out.ports();
    let Some(port) = ports.get(idx) else {
        // port list changed between the two calls
        return Ok(None);
    };
    let port_name = midi_out.port_name(port)?;
    info!("connecting to output port '{}'", port_name);
    let conn = midi_out.connect(port, CONNECTION_NAME)?;
    Ok(Some(MidirSink::new(conn, channel, port_name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_ports_means_no_output() {
        assert_eq!(choose_output_port(&[], ""), None);
        assert_eq!(choose_output_port(&[], "Synth"), None);
    }

    #[test]
    fn substring_match_wins() {
        let ports = names(&["Midi Through", "USB Synth 1", "USB Synth 2"]);
        assert_eq!(choose_output_port(&ports, "Synth 2"), Some(2));
        assert_eq!(choose_output_port(&ports, "Synth"), Some(1));
    }

    #[test]
    fn falls_back_to_first_port() {
        let ports = names(&["Midi Through", "USB Synth"]);
        assert_eq!(choose_output_port(&ports, ""), Some(0));
        assert_eq!(choose_output_port(&ports, "Piano"), Some(0));
    }
}
