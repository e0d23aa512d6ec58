/// MIDI output using midir
use midir::{MidiOutput, MidiOutputConnection};

use crate::controller::NoteOutput;
use crate::error::MidiError;

pub mod clock;

pub use clock::{parse_clock_message, MidiClockInput};

const CLIENT_NAME: &str = "stepgrid MIDI Output";

pub struct MidiOutputDevice {
    connection: Option<MidiOutputConnection>,
    port_name: Option<String>,
    channel: u8,
}

impl MidiOutputDevice {
    pub fn new(channel: u8) -> Self {
        Self {
            connection: None,
            port_name: None,
            channel: channel & 0x0F,
        }
    }

    pub fn available_ports() -> Vec<String> {
        if let Ok(midi_out) = MidiOutput::new(CLIENT_NAME) {
            midi_out
                .ports()
                .iter()
                .filter_map(|p| midi_out.port_name(p).ok())
                .collect()
        } else {
            vec![]
        }
    }

    pub fn connect(&mut self, port_index: usize) -> Result<(), MidiError> {
        let midi_out = MidiOutput::new(CLIENT_NAME)?;

        let ports = midi_out.ports();
        let port = ports.get(port_index).ok_or(MidiError::InvalidPort(port_index))?;
        let port_name = midi_out
            .port_name(port)
            .unwrap_or_else(|_| "Unknown".to_string());

        let connection = midi_out
            .connect(port, "stepgrid")
            .map_err(|e| MidiError::Connect {
                port: port_name.clone(),
                reason: e.to_string(),
            })?;

        log::info!("MIDI output connected to {}", port_name);
        self.connection = Some(connection);
        self.port_name = Some(port_name);
        Ok(())
    }

    /// Connects to the first port whose name contains `needle`.
    pub fn connect_named(&mut self, needle: &str) -> Result<(), MidiError> {
        let index = find_port(&Self::available_ports(), needle)
            .ok_or_else(|| MidiError::PortNotFound(needle.to_string()))?;
        self.connect(index)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    pub fn send_note_on(&mut self, note: u8, velocity: u8) -> Result<(), MidiError> {
        self.send(&[0x90 | self.channel, note & 0x7F, velocity & 0x7F])
    }

    pub fn send_note_off(&mut self, note: u8, velocity: u8) -> Result<(), MidiError> {
        self.send(&[0x80 | self.channel, note & 0x7F, velocity & 0x7F])
    }

    pub fn send_control_change(&mut self, controller: u8, value: u8) -> Result<(), MidiError> {
        self.send(&[0xB0 | self.channel, controller & 0x7F, value & 0x7F])
    }

    fn send(&mut self, message: &[u8]) -> Result<(), MidiError> {
        if let Some(ref mut conn) = self.connection {
            conn.send(message)?;
        }
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.close();
        }
        self.port_name = None;
    }
}

impl Default for MidiOutputDevice {
    fn default() -> Self {
        Self::new(0)
    }
}

impl NoteOutput for MidiOutputDevice {
    fn note_on(&mut self, pitch: u8, velocity: u8) -> Result<(), MidiError> {
        self.send_note_on(pitch, velocity)
    }

    fn note_off(&mut self, pitch: u8, velocity: u8) -> Result<(), MidiError> {
        self.send_note_off(pitch, velocity)
    }

    fn control_change(&mut self, controller: u8, value: u8) -> Result<(), MidiError> {
        self.send_control_change(controller, value)
    }
}

/// Index of the first port name containing `needle`, ignoring case.
pub fn find_port(names: &[String], needle: &str) -> Option<usize> {
    let needle = needle.to_lowercase();
    names.iter().position(|name| name.to_lowercase().contains(&needle))
}

pub fn midi_note_name(note: u8) -> String {
    let note_names = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
    let octave = (note / 12) as i32 - 1;
    let note_index = (note % 12) as usize;
    format!("{}{}", note_names[note_index], octave)
}
