//! `config.json` loading.
//!
//! Every field has a default, so a missing file or a partial file is fine.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::general::tracker::{ReleasePolicy, DEFAULT_VELOCITY};

pub const DEFAULT_CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub midi: MidiConfig,
    pub keyboard: KeyboardConfig,
    pub transpose: TransposeConfig,
    pub osc: OscConfig,
    pub mqtt: MqttConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MidiConfig {
    /// Substring of the output port name. Empty picks the first port.
    pub output_port: String,
    pub channel: u8,
    pub velocity: u8,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            output_port: String::new(),
            channel: 0,
            velocity: DEFAULT_VELOCITY,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeyboardConfig {
    pub release_policy: ReleasePolicy,
    /// Used only when the terminal cannot report key releases.
    pub hold_timeout_ms: u64,
    pub sustain_on_start: bool,
    /// Extra or replacement keys, e.g. `{ ";": 98 }`.
    pub keymap: BTreeMap<String, u8>,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            release_policy: ReleasePolicy::default(),
            hold_timeout_ms: 600,
            sustain_on_start: false,
            keymap: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TransposeConfig {
    pub initial: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OscConfig {
    pub enabled: bool,
    pub listening_host: String,
    pub listening_port: u16,
    pub transpose_path: String,
    pub transpose_up_path: String,
    pub transpose_down_path: String,
    pub sustain_path: String,
    pub panic_path: String,
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listening_host: "127.0.0.1".to_string(),
            listening_port: 9069,
            transpose_path: "/transpose".to_string(),
            transpose_up_path: "/transposeUp".to_string(),
            transpose_down_path: "/transposeDown".to_string(),
            sustain_path: "/sustain".to_string(),
            panic_path: "/panic".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub enabled: bool,
    pub broker_host: String,
    pub broker_port: u16,
    pub base_topic: String,
    pub username: String,
    pub password: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            base_topic: "keyboard_midi".to_string(),
            username: String::new(),
            password: String::new(),
        }
    }
}

impl Config {
    /// Read `path`, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("{} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let config = Self::parse(&text).map_err(|source| Error::ConfigParse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(text: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.midi.channel > 15 {
            return Err(Error::Config(format!(
                "midi.channel must be 0-15, got {}",
                self.midi.channel
            )));
        }
        if !(1..=127).contains(&self.midi.velocity) {
            return Err(Error::Config(format!(
                "midi.velocity must be 1-127, got {}",
                self.midi.velocity
            )));
        }
        self.keymap_entries().map(|_| ())
    }

    /// Keymap overrides as `(glyph, base note)` pairs.
    pub fn keymap_entries(&self) -> Result<Vec<(char, u8)>> {
        self.keyboard
            .keymap
            .iter()
            .map(|(key, &note)| {
                let mut chars = key.chars();
                let glyph = match (chars.next(), chars.next()) {
                    (Some(c), None) => c,
                    _ => {
                        return Err(Error::Config(format!(
                            "keymap key {:?} must be a single character",
                            key
                        )))
                    }
                };
                if note > 127 {
                    return Err(Error::Config(format!(
                        "keymap note for {:?} must be 0-127, got {}",
                        key, note
                    )));
                }
                Ok((glyph, note))
            })
            .collect()
    }
}
