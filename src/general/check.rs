use std::io::Write;

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

// The terminal runs in raw mode, so every line carries its own carriage return.
fn colored_line(color: Color, text: &str) {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(color)).set_intense(true));
    let _ = write!(&mut stdout, "{}\r\n", text);
    let _ = stdout.reset();
    let _ = stdout.flush();
}

fn plain_line(text: &str) {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let _ = write!(&mut stdout, "{}\r\n", text);
    let _ = stdout.flush();
}

pub fn print_quick_help() {
    colored_line(Color::Blue, "Press '?' for key bindings, Esc to quit");
}

pub fn print_output_connected(port_name: &str) {
    colored_line(Color::Green, &format!("MIDI output connected | {}", port_name));
    print_quick_help();
}

pub fn print_output_missing() {
    colored_line(
        Color::Red,
        "No MIDI output | keys are tracked but nothing is sent",
    );
    print_quick_help();
}

pub fn print_release_fallback(hold_timeout_ms: u64) {
    colored_line(
        Color::Yellow,
        &format!(
            "Terminal does not report key releases | notes stop {} ms after the last key event",
            hold_timeout_ms
        ),
    );
}

pub fn print_remote_started(kind: &str, address: &str) {
    colored_line(Color::Cyan, &format!("{} control listening on {}", kind, address));
}

/// One-line summary of the live controls.
pub fn print_status(transpose: i32, sustain: bool, velocity: u8) {
    plain_line(&format!(
        "Transpose {:+} | Sustain is {} | Velocity {}",
        transpose,
        if sustain { "ON" } else { "OFF" },
        velocity
    ));
}

pub fn print_key_help() {
    plain_line("Keys:");
    plain_line("  1-0, Q-P, A-L, Z-M  - Play notes (Shift adds a semitone)");
    plain_line("  Up/Down             - Transpose +1/-1");
    plain_line("  Left/Right          - Velocity -8/+8");
    plain_line("  Space               - Hold to lift sustain");
    plain_line("  Tab                 - Toggle sustain");
    plain_line("  Backspace           - Stop all notes");
    plain_line("  ?                   - Show this help");
    plain_line("  Esc/Ctrl+C          - Quit");
}
