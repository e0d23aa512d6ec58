/// stepgrid - A chorded grid MIDI step sequencer
///
/// This library provides the pieces of a clock-following step sequencer
/// driven from a small button matrix:
/// - Two-track grid state with swing and accents
/// - Chord interpreter for single-key and multi-key gestures
/// - MIDI clock input and note output
/// - Controller cycle that flushes notes and lamp colors to the outputs

pub mod config;
pub mod controller;
pub mod error;
pub mod midi;
pub mod sequencer;

// Re-export commonly used types
pub use config::{Config, MidiSettings};
pub use controller::{Controller, CycleSummary, LampOutput, NoteOutput};
pub use error::{ConfigError, MidiError};
pub use midi::{midi_note_name, MidiClockInput, MidiOutputDevice};
pub use sequencer::chords::{ChordAction, ChordTable, KeyAction, KeyEvent, KeyId};
pub use sequencer::playback::{ClockEvent, PlaybackEvent};
pub use sequencer::view::Layout;
pub use sequencer::{Grid, ManualMode, Palette, Rgb, Sequencer, SequencerConfig, Step, Track};
