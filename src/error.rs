use std::path::PathBuf;

use thiserror::Error;

/// Failures talking to MIDI ports.
#[derive(Debug, Error)]
pub enum MidiError {
    #[error("failed to create MIDI client: {0}")]
    Init(#[from] midir::InitError),

    #[error("no MIDI port at index {0}")]
    InvalidPort(usize),

    #[error("no MIDI port matching {0:?}")]
    PortNotFound(String),

    #[error("failed to connect to {port}: {reason}")]
    Connect { port: String, reason: String },

    #[error("failed to send MIDI message: {0}")]
    Send(#[from] midir::SendError),
}

/// Failures loading or validating the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}
