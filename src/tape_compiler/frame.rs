/// Syscall frame encoding
///
/// The trigger operation reads a frame starting at the head:
///
/// ```text
/// +--------+------+--------------------+--------------------+-----
/// | sysno  | argc | tag | len | value  | tag | len | value  | ...
/// +--------+------+--------------------+--------------------+-----
///    1 B     1 B    1 B   1 B   len B
/// ```
///
/// The only tag the engine understands is the cell pointer: a 2-byte
/// big-endian tape offset that the engine turns into `TAPE_BASE + offset`
/// before making the real call.
use std::fmt;

/// Linux x86-64 `execve`
pub const SYS_EXECVE: u8 = 59;

pub const TAG_CELL_POINTER: u8 = 2;
const CELL_POINTER_LEN: u8 = 2;

const FRAME_HEADER_LEN: usize = 2;
const DESCRIPTOR_HEADER_LEN: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    Truncated { needed: usize, available: usize },
    UnknownTag(u8),
    BadLength { tag: u8, len: u8 },
    TooManyArguments(usize),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FrameError::Truncated { needed, available } => write!(
                f,
                "frame truncated: needed {} bytes, {} available",
                needed, available
            ),
            FrameError::UnknownTag(tag) => write!(f, "unknown argument tag {}", tag),
            FrameError::BadLength { tag, len } => {
                write!(f, "argument tag {} cannot have length {}", tag, len)
            }
            FrameError::TooManyArguments(count) => {
                write!(f, "{} arguments do not fit the 1-byte count", count)
            }
        }
    }
}

impl std::error::Error for FrameError {}

/// One tagged syscall argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgDescriptor {
    /// Tape offset, resolved by the engine to `TAPE_BASE + offset`
    CellPointer(u16),
}

impl ArgDescriptor {
    pub fn tag(&self) -> u8 {
        match self {
            ArgDescriptor::CellPointer(_) => TAG_CELL_POINTER,
        }
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            ArgDescriptor::CellPointer(_) => DESCRIPTOR_HEADER_LEN + CELL_POINTER_LEN as usize,
        }
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            ArgDescriptor::CellPointer(offset) => {
                out.push(TAG_CELL_POINTER);
                out.push(CELL_POINTER_LEN);
                out.extend_from_slice(&offset.to_be_bytes());
            }
        }
    }

    /// Decode one descriptor, returning it and the number of bytes consumed
    pub fn decode(bytes: &[u8]) -> Result<(ArgDescriptor, usize), FrameError> {
        require(bytes, DESCRIPTOR_HEADER_LEN)?;
        let (tag, len) = (bytes[0], bytes[1]);

        match tag {
            TAG_CELL_POINTER => {
                if len != CELL_POINTER_LEN {
                    return Err(FrameError::BadLength { tag, len });
                }
                let total = DESCRIPTOR_HEADER_LEN + len as usize;
                require(bytes, total)?;
                let offset = u16::from_be_bytes([bytes[2], bytes[3]]);
                Ok((ArgDescriptor::CellPointer(offset), total))
            }
            _ => Err(FrameError::UnknownTag(tag)),
        }
    }
}

/// Syscall number plus its tagged arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyscallFrame {
    number: u8,
    args: Vec<ArgDescriptor>,
}

impl SyscallFrame {
    pub fn new(number: u8, args: Vec<ArgDescriptor>) -> Result<Self, FrameError> {
        if args.len() > u8::MAX as usize {
            return Err(FrameError::TooManyArguments(args.len()));
        }
        Ok(SyscallFrame { number, args })
    }

    /// `execve(pathname, argv, envp)` with all three as tape offsets
    pub fn execve(path: u16, argv: u16, envp: u16) -> Self {
        SyscallFrame {
            number: SYS_EXECVE,
            args: vec![
                ArgDescriptor::CellPointer(path),
                ArgDescriptor::CellPointer(argv),
                ArgDescriptor::CellPointer(envp),
            ],
        }
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn args(&self) -> &[ArgDescriptor] {
        &self.args
    }

    pub fn encoded_len(&self) -> usize {
        FRAME_HEADER_LEN + self.args.iter().map(|a| a.encoded_len()).sum::<usize>()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.push(self.number);
        out.push(self.args.len() as u8);
        for arg in &self.args {
            arg.encode_into(&mut out);
        }
        out
    }

    /// Decode a frame from the start of `bytes`, returning it and its length
    pub fn decode(bytes: &[u8]) -> Result<(SyscallFrame, usize), FrameError> {
        require(bytes, FRAME_HEADER_LEN)?;
        let number = bytes[0];
        let argc = bytes[1] as usize;

        let mut pos = FRAME_HEADER_LEN;
        let mut args = Vec::with_capacity(argc);
        for _ in 0..argc {
            let (arg, used) = ArgDescriptor::decode(&bytes[pos..])?;
            args.push(arg);
            pos += used;
        }

        Ok((SyscallFrame { number, args }, pos))
    }
}

fn require(bytes: &[u8], needed: usize) -> Result<(), FrameError> {
    if bytes.len() < needed {
        return Err(FrameError::Truncated {
            needed,
            available: bytes.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execve_frame_bytes() {
        let frame = SyscallFrame::execve(1000, 2000, 2100);
        assert_eq!(
            frame.encode(),
            vec![
                59, 3, //
                2, 2, 0x03, 0xE8, // 1000
                2, 2, 0x07, 0xD0, // 2000
                2, 2, 0x08, 0x34, // 2100
            ]
        );
        assert_eq!(frame.encoded_len(), 14);
    }

    #[test]
    fn test_decode_execve_frame() {
        let bytes = SyscallFrame::execve(1000, 2000, 2100).encode();
        let (frame, used) = SyscallFrame::decode(&bytes).unwrap();

        assert_eq!(used, bytes.len());
        assert_eq!(frame.number(), SYS_EXECVE);
        assert_eq!(
            frame.args(),
            &[
                ArgDescriptor::CellPointer(1000),
                ArgDescriptor::CellPointer(2000),
                ArgDescriptor::CellPointer(2100),
            ]
        );
    }

    #[test]
    fn test_decode_ignores_trailing_cells() {
        let mut bytes = SyscallFrame::execve(1, 2, 3).encode();
        bytes.extend_from_slice(&[0xAA; 16]);
        let (_, used) = SyscallFrame::decode(&bytes).unwrap();
        assert_eq!(used, 14);
    }

    #[test]
    fn test_unknown_tag_rejected() {
        // tag 1 would be an immediate integer; the engine defines no such tag
        let bytes = [59, 1, 1, 8, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(
            SyscallFrame::decode(&bytes),
            Err(FrameError::UnknownTag(1))
        );
    }

    #[test]
    fn test_cell_pointer_length_must_be_two() {
        let bytes = [TAG_CELL_POINTER, 4, 0, 0, 0, 1];
        assert_eq!(
            ArgDescriptor::decode(&bytes),
            Err(FrameError::BadLength { tag: 2, len: 4 })
        );
    }

    #[test]
    fn test_truncated_frames() {
        assert_eq!(
            SyscallFrame::decode(&[59]),
            Err(FrameError::Truncated {
                needed: 2,
                available: 1
            })
        );
        assert_eq!(
            SyscallFrame::decode(&[59, 1, 2, 2, 0x03]),
            Err(FrameError::Truncated {
                needed: 4,
                available: 3
            })
        );
    }

    #[test]
    fn test_argument_count_limit() {
        let args = vec![ArgDescriptor::CellPointer(0); 256];
        assert_eq!(
            SyscallFrame::new(SYS_EXECVE, args),
            Err(FrameError::TooManyArguments(256))
        );
        assert!(SyscallFrame::new(0, Vec::new()).is_ok());
    }
}
