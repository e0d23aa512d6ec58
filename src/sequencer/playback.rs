/// Playback scheduler - turns clock ticks into note and lamp events
use super::view::{step_index, MEASURE_TICKS, SIXTEENTH_TICKS, TICKS_PER_STEP};
use super::{Rgb, Sequencer, Track, Voice, VELOCITY_RELEASE};

/// Output of one call into the sequencer, flushed by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    StepAdvanced(usize),
    NoteOn(u8, u8),        // note, velocity
    NoteOff(u8, u8),       // note, velocity
    ControlChange(u8, u8), // controller, value
    SetLamp(u8, Rgb),
}

/// Clock and transport input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    Tick,
    /// Start or reposition; `phase` counts sixteenth notes from the song start.
    TransportStart { phase: u16 },
    TransportStop,
    Other(u8),
}

impl Sequencer {
    pub fn advance(&mut self, event: ClockEvent) -> Vec<PlaybackEvent> {
        let mut out = Vec::new();

        match event {
            ClockEvent::Tick => self.on_tick(&mut out),
            ClockEvent::TransportStart { phase } => {
                self.tick = u32::from(phase) * SIXTEENTH_TICKS;
                log::info!("transport start at sixteenth {} (tick {})", phase, self.tick);
                // the new position may sit on another page
                self.paint_window(&mut out);
            }
            // Sounding notes are left to their own note-offs.
            ClockEvent::TransportStop => log::info!("transport stop at tick {}", self.tick),
            ClockEvent::Other(status) => log::debug!("ignoring clock message 0x{:02X}", status),
        }

        out
    }

    fn on_tick(&mut self, out: &mut Vec<PlaybackEvent>) {
        let tick = self.tick;
        self.tick = tick.wrapping_add(1);

        if tick % MEASURE_TICKS == 0 {
            self.paint_window(out);
        }

        let phase = tick % TICKS_PER_STEP;
        if phase == 0 {
            let column = self.play_column(Track::Main, tick, out);
            out.push(PlaybackEvent::StepAdvanced(column));
        }
        if phase == self.swing {
            self.play_column(Track::Shift, tick, out);
        }
    }

    /// Releases the track's previous voice and starts the column due at `tick`.
    fn play_column(&mut self, track: Track, tick: u32, out: &mut Vec<PlaybackEvent>) -> usize {
        let column = step_index(tick) as usize % self.last_step;
        let previous = std::mem::take(&mut self.voices[track.index()]);

        for &row in &previous.rows {
            out.push(PlaybackEvent::NoteOff(self.layout.pitch_for_row(row), VELOCITY_RELEASE));
        }
        for &row in &previous.rows {
            self.paint_step(track, previous.column, row, out);
        }

        let grid = self.grid(track);
        let rows: Vec<usize> = (0..grid.rows()).filter(|&row| grid.is_on(column, row)).collect();
        for &row in &rows {
            if let Some(step) = grid.step(column, row) {
                out.push(PlaybackEvent::NoteOn(step.pitch, step.velocity()));
            }
        }
        for &row in &rows {
            self.paint_playhead(track, column, row, out);
        }

        self.voices[track.index()] = Voice { column, rows };
        column
    }
}
