/// Controller cycle - one cooperative polling step around the sequencer
///
/// Each cycle feeds at most one clock event and every pending key event into
/// the sequencer, then flushes what they produced: MIDI in order, lamps with
/// the last write per index winning.
use std::collections::BTreeMap;

use crate::error::MidiError;
use crate::sequencer::chords::KeyEvent;
use crate::sequencer::playback::{ClockEvent, PlaybackEvent};
use crate::sequencer::{Rgb, Sequencer};

pub trait NoteOutput {
    fn note_on(&mut self, pitch: u8, velocity: u8) -> Result<(), MidiError>;
    fn note_off(&mut self, pitch: u8, velocity: u8) -> Result<(), MidiError>;
    fn control_change(&mut self, controller: u8, value: u8) -> Result<(), MidiError>;
}

pub trait LampOutput {
    fn set_lamp(&mut self, index: u8, color: Rgb);
}

/// What a cycle flushed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub step_advanced: Option<usize>,
    pub midi_sent: usize,
    pub midi_failed: usize,
    pub lamps_written: usize,
}

pub struct Controller {
    sequencer: Sequencer,
}

impl Controller {
    pub fn new(sequencer: Sequencer) -> Self {
        Self { sequencer }
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn sequencer_mut(&mut self) -> &mut Sequencer {
        &mut self.sequencer
    }

    pub fn cycle<N, L>(
        &mut self,
        clock: Option<ClockEvent>,
        keys: impl IntoIterator<Item = KeyEvent>,
        notes: &mut N,
        lamps: &mut L,
    ) -> CycleSummary
    where
        N: NoteOutput + ?Sized,
        L: LampOutput + ?Sized,
    {
        let mut events = Vec::new();

        if let Some(event) = clock {
            events.extend(self.sequencer.advance(event));
        }
        for key in keys {
            events.extend(self.sequencer.apply_input(key));
        }

        flush(events, notes, lamps)
    }

    /// Writes the whole window to `lamps`, returning how many lamps were set.
    pub fn repaint<L>(&self, lamps: &mut L) -> usize
    where
        L: LampOutput + ?Sized,
    {
        let mut written = 0;
        for event in self.sequencer.repaint() {
            if let PlaybackEvent::SetLamp(index, color) = event {
                lamps.set_lamp(index, color);
                written += 1;
            }
        }
        written
    }
}

fn flush<N, L>(events: Vec<PlaybackEvent>, notes: &mut N, lamps: &mut L) -> CycleSummary
where
    N: NoteOutput + ?Sized,
    L: LampOutput + ?Sized,
{
    let mut summary = CycleSummary::default();
    let mut lamp_writes = BTreeMap::new();

    for event in events {
        let sent = match event {
            PlaybackEvent::NoteOn(pitch, velocity) => notes.note_on(pitch, velocity),
            PlaybackEvent::NoteOff(pitch, velocity) => notes.note_off(pitch, velocity),
            PlaybackEvent::ControlChange(controller, value) => notes.control_change(controller, value),
            PlaybackEvent::SetLamp(index, color) => {
                lamp_writes.insert(index, color);
                continue;
            }
            PlaybackEvent::StepAdvanced(column) => {
                summary.step_advanced = Some(column);
                continue;
            }
        };
        match sent {
            Ok(()) => summary.midi_sent += 1,
            Err(e) => {
                log::warn!("dropping {:?}: {}", event, e);
                summary.midi_failed += 1;
            }
        }
    }

    for (index, color) in lamp_writes {
        lamps.set_lamp(index, color);
        summary.lamps_written += 1;
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::{SequencerConfig, Track};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingNotes {
        sent: Vec<(u8, u8, u8)>,
        fail: bool,
    }

    impl NoteOutput for RecordingNotes {
        fn note_on(&mut self, pitch: u8, velocity: u8) -> Result<(), MidiError> {
            if self.fail {
                return Err(MidiError::InvalidPort(0));
            }
            self.sent.push((0x90, pitch, velocity));
            Ok(())
        }

        fn note_off(&mut self, pitch: u8, velocity: u8) -> Result<(), MidiError> {
            self.sent.push((0x80, pitch, velocity));
            Ok(())
        }

        fn control_change(&mut self, controller: u8, value: u8) -> Result<(), MidiError> {
            self.sent.push((0xB0, controller, value));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingLamps {
        writes: Vec<(u8, Rgb)>,
    }

    impl LampOutput for RecordingLamps {
        fn set_lamp(&mut self, index: u8, color: Rgb) {
            self.writes.push((index, color));
        }
    }

    fn controller() -> Controller {
        Controller::new(Sequencer::new(SequencerConfig::default()).unwrap())
    }

    #[test]
    fn test_lamp_writes_deduplicated() {
        let mut controller = controller();
        controller.sequencer_mut().grid_mut(Track::Main).set(0, 0, true);
        let mut notes = RecordingNotes::default();
        let mut lamps = RecordingLamps::default();

        let summary = controller.cycle(Some(ClockEvent::Tick), [], &mut notes, &mut lamps);

        assert_eq!(summary.step_advanced, Some(0));
        assert_eq!(summary.lamps_written, 32);
        assert_eq!(lamps.writes.len(), 32);
        let palette = *controller.sequencer().palette();
        // the window repaint is overwritten by the playhead
        assert!(lamps.writes.contains(&(0, palette.playhead)));
        assert!(!lamps.writes.contains(&(0, palette.main_on)));
        assert_eq!(notes.sent, vec![(0x90, 59, 96)]);
    }

    #[test]
    fn test_clock_then_keys_in_one_cycle() {
        let mut controller = controller();
        let mut notes = RecordingNotes::default();
        let mut lamps = RecordingLamps::default();
        let keys = [
            KeyEvent::pressed(0, Duration::from_millis(0)),
            KeyEvent::released(0, Duration::from_millis(20)),
        ];

        controller.cycle(Some(ClockEvent::Tick), keys, &mut notes, &mut lamps);

        assert!(controller.sequencer().grid(Track::Main).is_on(0, 0));
        assert_eq!(controller.sequencer().tick(), 1);
        assert!(notes.sent.is_empty());
    }

    #[test]
    fn test_send_failures_are_counted_not_fatal() {
        let mut controller = controller();
        controller.sequencer_mut().grid_mut(Track::Main).set(0, 0, true);
        controller.sequencer_mut().grid_mut(Track::Main).set(1, 0, true);
        let mut notes = RecordingNotes {
            fail: true,
            ..Default::default()
        };
        let mut lamps = RecordingLamps::default();

        for _ in 0..13 {
            controller.cycle(Some(ClockEvent::Tick), [], &mut notes, &mut lamps);
        }

        // both note-ons failed, the note-off still went out
        assert_eq!(notes.sent, vec![(0x80, 59, 0)]);
        assert_eq!(controller.sequencer().tick(), 13);
    }

    #[test]
    fn test_repaint_without_clock() {
        let mut controller = controller();
        controller.sequencer_mut().grid_mut(Track::Main).set(4, 2, true);
        let mut lamps = RecordingLamps::default();

        assert_eq!(controller.repaint(&mut lamps), 32);

        let palette = *controller.sequencer().palette();
        assert!(lamps.writes.contains(&(20, palette.main_on)));
        assert_eq!(lamps.writes.iter().filter(|(_, c)| *c == palette.off).count(), 31);
        assert_eq!(controller.sequencer().tick(), 0);
    }

    #[test]
    fn test_idle_cycle_flushes_nothing() {
        let mut controller = controller();
        let mut notes = RecordingNotes::default();
        let mut lamps = RecordingLamps::default();
        let summary = controller.cycle(None, [], &mut notes, &mut lamps);
        assert_eq!(summary, CycleSummary::default());
    }
}
