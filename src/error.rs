//! Error type for startup and glue failures.
//!
//! The note tracker itself never fails; everything here comes from config
//! loading, device setup or the terminal.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("config: {0}")]
    Config(String),

    #[error("config file {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("MIDI init: {0}")]
    MidiInit(#[from] midir::InitError),

    #[error("MIDI connect: {0}")]
    MidiConnect(#[from] midir::ConnectError<midir::MidiOutput>),

    #[error("MIDI port: {0}")]
    MidiPort(#[from] midir::PortInfoError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
