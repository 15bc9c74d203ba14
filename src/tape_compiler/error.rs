// Compiler Error Handling

use crate::tape_compiler::frame::FrameError;
use crate::tape_compiler::layout::RegionKind;
use std::fmt;
use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompilerError {
    // Layout errors
    RegionOverlap(RegionKind, Range<usize>, RegionKind, Range<usize>),
    OffsetOutOfRange(RegionKind, usize), // region, offset that needs a 2-byte descriptor

    // Frame encoding errors
    Frame(FrameError),
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CompilerError::RegionOverlap(a, range_a, b, range_b) => {
                write!(
                    f,
                    "Tape layout overlap: {} [{}..{}) collides with {} [{}..{})",
                    a, range_a.start, range_a.end, b, range_b.start, range_b.end
                )
            }
            CompilerError::OffsetOutOfRange(region, offset) => {
                write!(
                    f,
                    "{} offset {} does not fit a 2-byte cell pointer (max {})",
                    region,
                    offset,
                    u16::MAX
                )
            }
            CompilerError::Frame(err) => write!(f, "Syscall frame error: {}", err),
        }
    }
}

impl std::error::Error for CompilerError {}

impl From<FrameError> for CompilerError {
    fn from(err: FrameError) -> Self {
        CompilerError::Frame(err)
    }
}
