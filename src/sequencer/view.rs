/// View addressing - maps the physical button/lamp window onto the logical grid
///
/// Everything here is pure: the functions take the tick and scroll state they
/// need as arguments so both the scheduler and the input side agree on what
/// is currently on screen.
use super::chords::KeyId;

/// Clock ticks per musical step (MIDI clock runs at 24 per quarter note).
pub const TICKS_PER_STEP: u32 = 12;
/// Clock ticks per measure; the visible window pages once per measure.
pub const MEASURE_TICKS: u32 = 96;
/// Clock ticks per sixteenth note, the unit of a song position pointer.
pub const SIXTEENTH_TICKS: u32 = 6;

pub fn step_index(tick: u32) -> u32 {
    tick / TICKS_PER_STEP
}

pub fn measure_index(tick: u32) -> u32 {
    tick / MEASURE_TICKS
}

/// First grid column shown in the window at `tick`.
pub fn column_scroll(tick: u32, last_step: usize, window_width: usize) -> usize {
    let pages = (last_step / window_width).max(1);
    (measure_index(tick) as usize % pages) * window_width
}

pub fn grid_column(visible_col: usize, scroll: usize) -> usize {
    visible_col + scroll
}

pub fn grid_row(visible_row: usize, pitch_offset: usize) -> usize {
    visible_row + pitch_offset
}

/// Which half of the matrix acts as the manual keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Half {
    Left,
    Right,
}

/// Grid geometry and pitch assignment.
///
/// Rows run from high to low pitch: row 0 is `first_pitch() - 1` and the last
/// row is `base_note`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub columns: usize,
    pub rows: usize,
    pub window_width: usize,
    pub window_height: usize,
    pub base_note: u8,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            columns: 32,
            rows: 24,
            window_width: 8,
            window_height: 4,
            base_note: 36,
        }
    }
}

impl Layout {
    /// One above the pitch of row 0.
    pub fn first_pitch(&self) -> i32 {
        i32::from(self.base_note) + self.rows as i32
    }

    pub fn pitch_for_row(&self, row: usize) -> u8 {
        (self.first_pitch() - 1 - row as i32).clamp(0, 127) as u8
    }

    pub fn row_for_pitch(&self, pitch: i32) -> Option<usize> {
        let row = self.first_pitch() - 1 - pitch;
        (0..self.rows as i32).contains(&row).then_some(row as usize)
    }

    pub fn lamp_index(&self, column: usize, row: usize) -> u8 {
        ((column % self.window_width) + (row % self.window_height) * self.window_width) as u8
    }

    pub fn key_count(&self) -> usize {
        self.window_width * self.window_height
    }

    /// `(visible_col, visible_row)` of a key, if it exists on this matrix.
    pub fn key_position(&self, key: KeyId) -> Option<(usize, usize)> {
        let index = usize::from(key.0);
        (index < self.key_count()).then(|| (index % self.window_width, index / self.window_width))
    }

    pub fn key_at(&self, visible_col: usize, visible_row: usize) -> KeyId {
        KeyId((visible_row * self.window_width + visible_col) as u8)
    }

    pub fn max_pitch_offset(&self) -> usize {
        self.rows.saturating_sub(self.window_height)
    }

    pub fn pitch_in_visible_band(&self, pitch: u8, pitch_offset: usize) -> bool {
        let pitch = i32::from(pitch);
        let top = self.first_pitch() - pitch_offset as i32;
        top - self.window_height as i32 <= pitch && pitch < top
    }

    /// Pitch of the bottom visible row, the root of the manual keyboard.
    pub fn lowest_visible_pitch(&self, pitch_offset: usize) -> i32 {
        self.first_pitch() - pitch_offset as i32 - self.window_height as i32
    }

    pub fn half_width(&self) -> usize {
        self.window_width / 2
    }

    pub fn half_of(&self, visible_col: usize) -> Half {
        if visible_col < self.half_width() {
            Half::Left
        } else {
            Half::Right
        }
    }

    pub fn half_start(&self, half: Half) -> usize {
        match half {
            Half::Left => 0,
            Half::Right => self.half_width(),
        }
    }

    pub fn keyboard_size(&self) -> usize {
        self.half_width() * self.window_height
    }

    /// Semitone offset of a keyboard sub-key. The bottom row is lowest and
    /// each row continues where the one below it ends.
    pub fn keyboard_offset(&self, sub_col: usize, sub_row: usize) -> usize {
        (self.window_height - 1 - sub_row) * self.half_width() + sub_col
    }

    /// Inverse of [`Layout::keyboard_offset`].
    pub fn keyboard_sub_key(&self, offset: usize) -> Option<(usize, usize)> {
        if offset >= self.keyboard_size() {
            return None;
        }
        let half = self.half_width();
        Some((offset % half, self.window_height - 1 - offset / half))
    }
}
