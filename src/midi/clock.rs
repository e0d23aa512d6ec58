/// MIDI clock and transport input using midir
///
/// The driver callback only parses and forwards; the control loop drains the
/// channel one event per cycle.
use std::sync::mpsc::{self, Receiver};

use midir::{Ignore, MidiInput, MidiInputConnection};

use super::find_port;
use crate::error::MidiError;
use crate::sequencer::playback::ClockEvent;

const CLIENT_NAME: &str = "stepgrid Clock Input";

const TIMING_CLOCK: u8 = 0xF8;
const START: u8 = 0xFA;
const STOP: u8 = 0xFC;
const SONG_POSITION: u8 = 0xF2;

/// Parses one raw MIDI message into a clock event.
pub fn parse_clock_message(data: &[u8]) -> Option<ClockEvent> {
    let status = *data.first()?;

    let event = match status {
        TIMING_CLOCK => ClockEvent::Tick,
        START => ClockEvent::TransportStart { phase: 0 },
        STOP => ClockEvent::TransportStop,
        SONG_POSITION if data.len() >= 3 => {
            let phase = u16::from(data[1] & 0x7F) | (u16::from(data[2] & 0x7F) << 7);
            ClockEvent::TransportStart { phase }
        }
        other => ClockEvent::Other(other),
    };
    Some(event)
}

pub struct MidiClockInput {
    connection: Option<MidiInputConnection<()>>,
    receiver: Option<Receiver<ClockEvent>>,
    port_name: Option<String>,
}

impl MidiClockInput {
    pub fn new() -> Self {
        Self {
            connection: None,
            receiver: None,
            port_name: None,
        }
    }

    pub fn available_ports() -> Vec<String> {
        if let Ok(midi_in) = MidiInput::new(CLIENT_NAME) {
            midi_in
                .ports()
                .iter()
                .filter_map(|p| midi_in.port_name(p).ok())
                .collect()
        } else {
            vec![]
        }
    }

    pub fn connect(&mut self, port_index: usize) -> Result<(), MidiError> {
        self.disconnect();

        let mut midi_in = MidiInput::new(CLIENT_NAME)?;
        // Timing messages are dropped by default; they are the whole point here.
        midi_in.ignore(Ignore::SysexAndActiveSense);

        let ports = midi_in.ports();
        let port = ports.get(port_index).ok_or(MidiError::InvalidPort(port_index))?;
        let port_name = midi_in
            .port_name(port)
            .unwrap_or_else(|_| "Unknown".to_string());

        let (tx, rx) = mpsc::channel();
        let connection = midi_in
            .connect(
                port,
                "stepgrid-clock",
                move |_timestamp, message, _| {
                    if let Some(event) = parse_clock_message(message) {
                        let _ = tx.send(event);
                    }
                },
                (),
            )
            .map_err(|e| MidiError::Connect {
                port: port_name.clone(),
                reason: e.to_string(),
            })?;

        log::info!("MIDI clock input connected to {}", port_name);
        self.connection = Some(connection);
        self.receiver = Some(rx);
        self.port_name = Some(port_name);
        Ok(())
    }

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

    /// Next pending clock event, if any (non-blocking).
    pub fn poll_event(&self) -> Option<ClockEvent> {
        self.receiver.as_ref()?.try_recv().ok()
    }

    pub fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.close();
        }
        self.receiver = None;
        self.port_name = None;
    }
}

impl Default for MidiClockInput {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MidiClockInput {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_realtime_messages() {
        assert_eq!(parse_clock_message(&[0xF8]), Some(ClockEvent::Tick));
        assert_eq!(parse_clock_message(&[0xFA]), Some(ClockEvent::TransportStart { phase: 0 }));
        assert_eq!(parse_clock_message(&[0xFC]), Some(ClockEvent::TransportStop));
        assert_eq!(parse_clock_message(&[]), None);
    }

    #[test]
    fn test_parse_song_position() {
        assert_eq!(
            parse_clock_message(&[0xF2, 0x10, 0x00]),
            Some(ClockEvent::TransportStart { phase: 16 })
        );
        assert_eq!(
            parse_clock_message(&[0xF2, 0x01, 0x01]),
            Some(ClockEvent::TransportStart { phase: 129 })
        );
        // truncated pointer is not a transport start
        assert_eq!(parse_clock_message(&[0xF2, 0x01]), Some(ClockEvent::Other(0xF2)));
    }

    #[test]
    fn test_parse_other_messages() {
        assert_eq!(parse_clock_message(&[0x90, 60, 100]), Some(ClockEvent::Other(0x90)));
        assert_eq!(parse_clock_message(&[0xFB]), Some(ClockEvent::Other(0xFB)));
    }

    #[test]
    fn test_unconnected_input_has_no_events() {
        let input = MidiClockInput::new();
        assert!(!input.is_connected());
        assert_eq!(input.poll_event(), None);
    }
}
