// Tape Program Emission
//
// Builds the straight-line operation stream for the tape engine while tracking
// where the engine's head will be. The cursor is pure bookkeeping: it must
// match the real head position at every point of the emitted program.

use std::fmt;

/// Primitive operations understood by the tape engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapeOp {
    Forward,
    Back,
    Inc,
    Dec,
    LoopOpen,
    LoopClose,
    Trigger,
}

impl TapeOp {
    pub const fn symbol(self) -> char {
        match self {
            TapeOp::Forward => '>',
            TapeOp::Back => '<',
            TapeOp::Inc => '+',
            TapeOp::Dec => '-',
            TapeOp::LoopOpen => '[',
            TapeOp::LoopClose => ']',
            TapeOp::Trigger => '%',
        }
    }

    pub fn from_symbol(symbol: char) -> Option<TapeOp> {
        match symbol {
            '>' => Some(TapeOp::Forward),
            '<' => Some(TapeOp::Back),
            '+' => Some(TapeOp::Inc),
            '-' => Some(TapeOp::Dec),
            '[' => Some(TapeOp::LoopOpen),
            ']' => Some(TapeOp::LoopClose),
            '%' => Some(TapeOp::Trigger),
            _ => None,
        }
    }
}

impl fmt::Display for TapeOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Loop-until-zero idiom that clears the current cell whatever it held
pub const CLEAR_CELL: [TapeOp; 3] = [TapeOp::LoopOpen, TapeOp::Dec, TapeOp::LoopClose];

/// Direction and step count for a head movement
pub fn movement(cursor: usize, target: usize) -> (TapeOp, usize) {
    if target > cursor {
        (TapeOp::Forward, target - cursor)
    } else {
        (TapeOp::Back, cursor - target)
    }
}

/// Accumulates program text and the compile-time head position
#[derive(Debug, Clone, Default)]
pub struct ProgramBuilder {
    code: String,
    cursor: usize,
    cells_written: usize,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn cells_written(&self) -> usize {
        self.cells_written
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Move the head from the cursor to `target` one cell at a time
    pub fn move_to(&mut self, target: usize) {
        let (op, steps) = movement(self.cursor, target);
        self.push_run(op, steps);
        self.cursor = target;
    }

    /// Write `bytes` starting at `target`.
    ///
    /// Each cell is cleared before it is counted up, then the head steps right,
    /// so the cursor ends one past the last byte written.
    pub fn write_bytes_at(&mut self, target: usize, bytes: &[u8]) {
        self.move_to(target);
        for &byte in bytes {
            for op in CLEAR_CELL {
                self.push(op);
            }
            self.push_run(TapeOp::Inc, byte as usize);
            self.push(TapeOp::Forward);
        }
        self.cursor = target + bytes.len();
        self.cells_written += bytes.len();
    }

    /// Return the head to `target` and fire the syscall frame found there
    pub fn trigger_at(&mut self, target: usize) {
        self.move_to(target);
        self.push(TapeOp::Trigger);
    }

    pub fn finish(self) -> String {
        self.code
    }

    fn push(&mut self, op: TapeOp) {
        self.code.push(op.symbol());
    }

    fn push_run(&mut self, op: TapeOp, count: usize) {
        self.code.extend(std::iter::repeat(op.symbol()).take(count));
    }
}
