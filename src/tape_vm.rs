/// Reference tape engine
///
/// Executes generated programs the way the systemf engine does, stopping at
/// the trigger instead of performing a real syscall. The tape starts out full
/// of random bytes: the generator may not assume anything about prior cell
/// contents, and a program that forgets to clear a cell produces garbage here.
use crate::tape_compiler::emitter::TapeOp;
use crate::tape_compiler::frame::{ArgDescriptor, FrameError, SyscallFrame, SYS_EXECVE};
use crate::tape_compiler::layout::POINTER_WIDTH;
use log::debug;
use rand::{rngs::StdRng, RngCore, SeedableRng};
use std::fmt;

/// Cell count of the systemf tape
pub const DEFAULT_TAPE_LEN: usize = 30_000;

/// Upper bound on executed operations, guards against runaway loops
pub const DEFAULT_STEP_LIMIT: u64 = 100_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    UnmatchedOpen(usize),  // program position
    UnmatchedClose(usize), // program position
    HeadUnderflow(usize),  // program position
    HeadOverflow(usize),   // program position
    StepLimit(u64),
    NoTrigger,
    EmptyTape,
    OutOfBounds(usize),      // tape offset
    AddressOutsideTape(u64), // absolute address
    Frame(FrameError),
    NotExecve(u8),
    ArgumentCount(usize),
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VmError::UnmatchedOpen(pos) => write!(f, "Unmatched '[' at position {}", pos),
            VmError::UnmatchedClose(pos) => write!(f, "Unmatched ']' at position {}", pos),
            VmError::HeadUnderflow(pos) => {
                write!(f, "Head moved left of cell 0 at position {}", pos)
            }
            VmError::HeadOverflow(pos) => {
                write!(f, "Head moved past the end of the tape at position {}", pos)
            }
            VmError::StepLimit(limit) => write!(f, "Step limit of {} exceeded", limit),
            VmError::NoTrigger => write!(f, "Program ended without a trigger"),
            VmError::EmptyTape => write!(f, "Tape has no cells"),
            VmError::OutOfBounds(offset) => write!(f, "Tape offset {} is out of bounds", offset),
            VmError::AddressOutsideTape(addr) => {
                write!(f, "Address 0x{:x} does not point into the tape", addr)
            }
            VmError::Frame(err) => write!(f, "Bad syscall frame: {}", err),
            VmError::NotExecve(number) => {
                write!(f, "Syscall {} is not execve ({})", number, SYS_EXECVE)
            }
            VmError::ArgumentCount(count) => {
                write!(f, "execve takes 3 arguments, frame has {}", count)
            }
        }
    }
}

impl std::error::Error for VmError {}

impl From<FrameError> for VmError {
    fn from(err: FrameError) -> Self {
        VmError::Frame(err)
    }
}

/// The syscall the engine would make, with cell pointers made absolute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyscallInvocation {
    pub number: u8,
    pub args: Vec<u64>,
}

/// Decoded execve arguments, read back from the tape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecveCall {
    pub path: String,
    pub argv: Vec<String>,
    pub envp: Vec<String>,
}

pub struct TapeMachine {
    pub tape: Vec<u8>,
    pub head: usize,
    tape_base: u64,
    step_limit: u64,
    steps: u64,
}

impl TapeMachine {
    /// Tape of `tape_len` cells filled with seeded random bytes
    pub fn new(tape_base: u64, tape_len: usize, seed: u64) -> Self {
        let mut tape = vec![0u8; tape_len];
        StdRng::seed_from_u64(seed).fill_bytes(&mut tape);
        TapeMachine {
            tape,
            head: 0,
            tape_base,
            step_limit: DEFAULT_STEP_LIMIT,
            steps: 0,
        }
    }

    pub fn with_step_limit(mut self, step_limit: u64) -> Self {
        self.step_limit = step_limit;
        self
    }

    pub fn tape_base(&self) -> u64 {
        self.tape_base
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Run until the trigger and return the head position it fired at.
    /// Characters outside the operation alphabet are ignored.
    pub fn run(&mut self, program: &str) -> Result<usize, VmError> {
        if self.tape.is_empty() {
            return Err(VmError::EmptyTape);
        }
        let ops: Vec<TapeOp> = program.chars().filter_map(TapeOp::from_symbol).collect();
        let jumps = match_brackets(&ops)?;

        let mut pc = 0;
        while pc < ops.len() {
            self.steps += 1;
            if self.steps > self.step_limit {
                return Err(VmError::StepLimit(self.step_limit));
            }

            match ops[pc] {
                TapeOp::Forward => {
                    if self.head + 1 >= self.tape.len() {
                        return Err(VmError::HeadOverflow(pc));
                    }
                    self.head += 1;
                }
                TapeOp::Back => {
                    if self.head == 0 {
                        return Err(VmError::HeadUnderflow(pc));
                    }
                    self.head -= 1;
                }
                TapeOp::Inc => self.tape[self.head] = self.tape[self.head].wrapping_add(1),
                TapeOp::Dec => self.tape[self.head] = self.tape[self.head].wrapping_sub(1),
                TapeOp::LoopOpen => {
                    if self.tape[self.head] == 0 {
                        pc = jumps[pc];
                    }
                }
                TapeOp::LoopClose => {
                    if self.tape[self.head] != 0 {
                        pc = jumps[pc];
                    }
                }
                TapeOp::Trigger => {
                    debug!(
                        "⚡ Trigger at head {} after {} steps",
                        self.head, self.steps
                    );
                    return Ok(self.head);
                }
            }
            pc += 1;
        }

        Err(VmError::NoTrigger)
    }

    /// Decode the frame at `head` the way the engine does before calling
    pub fn syscall_at(&self, head: usize) -> Result<SyscallInvocation, VmError> {
        let bytes = self.tape.get(head..).ok_or(VmError::OutOfBounds(head))?;
        let (frame, _) = SyscallFrame::decode(bytes)?;

        let args = frame
            .args()
            .iter()
            .map(|arg| match arg {
                ArgDescriptor::CellPointer(offset) => self.tape_base.wrapping_add(*offset as u64),
            })
            .collect();

        Ok(SyscallInvocation {
            number: frame.number(),
            args,
        })
    }

    /// Decode an execve frame and follow its pointers back into the tape
    pub fn execve_at(&self, head: usize) -> Result<ExecveCall, VmError> {
        let call = self.syscall_at(head)?;
        if call.number != SYS_EXECVE {
            return Err(VmError::NotExecve(call.number));
        }
        if call.args.len() != 3 {
            return Err(VmError::ArgumentCount(call.args.len()));
        }

        let path = self.read_cstring(self.offset_of(call.args[0])?)?;
        let argv = self.read_string_vector(call.args[1])?;
        let envp = self.read_string_vector(call.args[2])?;

        Ok(ExecveCall { path, argv, envp })
    }

    /// Bytes from `offset` up to the next zero cell
    pub fn read_cstring(&self, offset: usize) -> Result<String, VmError> {
        let rest = self.tape.get(offset..).ok_or(VmError::OutOfBounds(offset))?;
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(VmError::OutOfBounds(self.tape.len()))?;
        Ok(String::from_utf8_lossy(&rest[..len]).into_owned())
    }

    pub fn read_pointer(&self, offset: usize) -> Result<u64, VmError> {
        let end = offset + POINTER_WIDTH;
        let bytes = self.tape.get(offset..end).ok_or(VmError::OutOfBounds(end))?;
        let mut word = [0u8; POINTER_WIDTH];
        word.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(word))
    }

    fn read_string_vector(&self, table: u64) -> Result<Vec<String>, VmError> {
        let mut offset = self.offset_of(table)?;
        let mut strings = Vec::new();
        loop {
            let pointer = self.read_pointer(offset)?;
            if pointer == 0 {
                return Ok(strings);
            }
            strings.push(self.read_cstring(self.offset_of(pointer)?)?);
            offset += POINTER_WIDTH;
        }
    }

    fn offset_of(&self, address: u64) -> Result<usize, VmError> {
        address
            .checked_sub(self.tape_base)
            .map(|offset| offset as usize)
            .filter(|&offset| offset < self.tape.len())
            .ok_or(VmError::AddressOutsideTape(address))
    }
}

/// Matching bracket position for every `[` and `]`
fn match_brackets(ops: &[TapeOp]) -> Result<Vec<usize>, VmError> {
    let mut jumps = vec![0; ops.len()];
    let mut open = Vec::new();

    for (pos, op) in ops.iter().enumerate() {
        match op {
            TapeOp::LoopOpen => open.push(pos),
            TapeOp::LoopClose => {
                let start = open.pop().ok_or(VmError::UnmatchedClose(pos))?;
                jumps[start] = pos;
                jumps[pos] = start;
            }
            _ => {}
        }
    }

    match open.pop() {
        Some(pos) => Err(VmError::UnmatchedOpen(pos)),
        None => Ok(jumps),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_fill_is_seeded() {
        let a = TapeMachine::new(0, 64, 7);
        let b = TapeMachine::new(0, 64, 7);
        let c = TapeMachine::new(0, 64, 8);
        assert_eq!(a.tape, b.tape);
        assert_ne!(a.tape, c.tape);
    }

    #[test]
    fn test_clear_idiom_zeroes_any_cell() {
        for value in [0u8, 1, 127, 255] {
            let mut vm = TapeMachine::new(0, 4, 0);
            vm.tape[0] = value;
            assert_eq!(vm.run("[-]%"), Ok(0));
            assert_eq!(vm.tape[0], 0);
        }
    }

    #[test]
    fn test_cells_wrap() {
        let mut vm = TapeMachine::new(0, 4, 0);
        vm.tape[1] = 255;
        vm.tape[2] = 0;
        vm.run(">+>-%").unwrap();
        assert_eq!(vm.tape[1], 0);
        assert_eq!(vm.tape[2], 255);
    }

    #[test]
    fn test_other_characters_ignored() {
        let mut vm = TapeMachine::new(0, 4, 0);
        assert_eq!(vm.run("> > # comment\n%"), Ok(2));
    }

    #[test]
    fn test_head_bounds() {
        let mut vm = TapeMachine::new(0, 2, 0);
        assert_eq!(vm.run("<%"), Err(VmError::HeadUnderflow(0)));

        let mut vm = TapeMachine::new(0, 2, 0);
        assert_eq!(vm.run(">>%"), Err(VmError::HeadOverflow(1)));
    }

    #[test]
    fn test_empty_tape_is_rejected() {
        let mut vm = TapeMachine::new(0, 0, 0);
        assert_eq!(vm.run("+%"), Err(VmError::EmptyTape));
        assert_eq!(vm.run("%"), Err(VmError::EmptyTape));
        assert_eq!(vm.steps(), 0);
    }

    #[test]
    fn test_unbalanced_brackets() {
        let mut vm = TapeMachine::new(0, 4, 0);
        assert_eq!(vm.run("[-"), Err(VmError::UnmatchedOpen(0)));
        assert_eq!(vm.run("+]"), Err(VmError::UnmatchedClose(1)));
    }

    #[test]
    fn test_missing_trigger() {
        let mut vm = TapeMachine::new(0, 4, 0);
        assert_eq!(vm.run("[-]+"), Err(VmError::NoTrigger));
    }

    #[test]
    fn test_step_limit() {
        let mut vm = TapeMachine::new(0, 4, 0).with_step_limit(10);
        vm.tape[0] = 1;
        assert_eq!(vm.run("[+-]%"), Err(VmError::StepLimit(10)));
    }

    #[test]
    fn test_syscall_resolves_cell_pointers() {
        let mut vm = TapeMachine::new(0x1000, 64, 0);
        let frame = SyscallFrame::execve(40, 16, 32).encode();
        vm.tape[..frame.len()].copy_from_slice(&frame);

        let call = vm.syscall_at(0).unwrap();
        assert_eq!(call.number, SYS_EXECVE);
        assert_eq!(call.args, vec![0x1000 + 40, 0x1000 + 16, 0x1000 + 32]);
    }

    #[test]
    fn test_execve_reads_tables() {
        let base = 0x4000;
        let mut vm = TapeMachine::new(base, 96, 3);

        let frame = SyscallFrame::execve(64, 16, 40).encode();
        vm.tape[..frame.len()].copy_from_slice(&frame);
        vm.tape[64..71].copy_from_slice(b"/bin/x\0");
        vm.tape[71..73].copy_from_slice(b"x\0");
        // argv: pointer to "x", then null
        vm.tape[16..24].copy_from_slice(&(base + 71).to_le_bytes());
        vm.tape[24..32].copy_from_slice(&0u64.to_le_bytes());
        // envp: null only
        vm.tape[40..48].copy_from_slice(&0u64.to_le_bytes());

        let call = vm.execve_at(0).unwrap();
        assert_eq!(call.path, "/bin/x");
        assert_eq!(call.argv, ["x"]);
        assert!(call.envp.is_empty());
    }

    #[test]
    fn test_execve_rejects_foreign_pointers() {
        let mut vm = TapeMachine::new(0x4000, 64, 0);
        let frame = SyscallFrame::execve(20, 16, 40).encode();
        vm.tape[..frame.len()].copy_from_slice(&frame);
        vm.tape[20] = 0;
        vm.tape[16..24].copy_from_slice(&0x10u64.to_le_bytes());

        assert_eq!(vm.execve_at(0), Err(VmError::AddressOutsideTape(0x10)));
    }

    #[test]
    fn test_not_execve() {
        let mut vm = TapeMachine::new(0, 16, 0);
        vm.tape[..2].copy_from_slice(&[60, 0]);
        assert_eq!(vm.execve_at(0), Err(VmError::NotExecve(60)));
    }
}
